use chrono::NaiveDate;

use crate::domain::{DailySummary, DailyTargets, Profile};

pub fn render_daily_report(
    name: &str,
    date: NaiveDate,
    summary: &DailySummary,
    targets: Option<&DailyTargets>,
) -> String {
    let mut lines = vec![format!("*Daily report for {name}, {}*", date.format("%d.%m.%Y"))];

    let line = |label: &str, value: f64, target: Option<u32>, unit: &str| match target {
        Some(target) => format!(
            "{label}: {value:.0} / {target} {unit} ({}%)",
            percent(value, target)
        ),
        None => format!("{label}: {value:.0} {unit}"),
    };

    lines.push(format!("Meals logged: {}", summary.meals));
    lines.push(line(
        "Calories",
        summary.calories,
        targets.map(|t| t.calories),
        "kcal",
    ));
    lines.push(line(
        "Protein",
        summary.protein_g,
        targets.map(|t| t.protein_g),
        "g",
    ));
    lines.push(line("Fat", summary.fat_g, targets.map(|t| t.fat_g), "g"));
    lines.push(line("Carbs", summary.carbs_g, targets.map(|t| t.carbs_g), "g"));
    lines.push(line(
        "Water",
        summary.water_ml as f64,
        targets.map(|t| t.water_ml),
        "ml",
    ));
    lines.push(line(
        "Steps",
        summary.steps as f64,
        targets.map(|t| t.steps),
        "",
    ));

    if let Some(targets) = targets {
        lines.push(String::new());
        lines.push(verdict(summary, targets).to_string());
    }
    lines
        .into_iter()
        .map(|line| line.trim_end().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_profile(profile: &Profile, targets: Option<&DailyTargets>) -> String {
    let mut text = format!(
        "*{}*\nGender: {}\nAge: {}\nHeight: {:.0} cm\nWeight: {:.1} kg\nGoal: {}\nActivity: {}",
        profile.name,
        profile.gender.label(),
        profile.age,
        profile.height_cm,
        profile.weight_kg,
        profile.goal.label(),
        profile.activity_level.as_str().replace('_', " "),
    );
    if let Some(targets) = targets {
        text.push_str("\n\n");
        text.push_str(&render_targets(targets));
    }
    text
}

pub fn render_targets(targets: &DailyTargets) -> String {
    format!(
        "*Daily targets*\nCalories: {} kcal\nProtein: {} g\nFat: {} g\nCarbs: {} g\nWater: {} ml\nSteps: {}",
        targets.calories,
        targets.protein_g,
        targets.fat_g,
        targets.carbs_g,
        targets.water_ml,
        targets.steps
    )
}

fn percent(value: f64, target: u32) -> u32 {
    if target == 0 {
        return 0;
    }
    (value / target as f64 * 100.0).round().max(0.0) as u32
}

fn verdict(summary: &DailySummary, targets: &DailyTargets) -> &'static str {
    if summary.meals == 0 {
        return "No meals logged today. Log your meals to get a precise report.";
    }
    let calories = percent(summary.calories, targets.calories);
    match calories {
        0..=79 => "You are well below your calorie target today.",
        80..=110 => "Great job, you are on target today!",
        _ => "You are above your calorie target today.",
    }
}
