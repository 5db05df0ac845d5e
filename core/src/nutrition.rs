use crate::domain::{DailyTargets, Gender, Goal, MealEstimate, Profile};

const FAT_SHARE_OF_CALORIES: f64 = 0.25;
const WATER_ML_PER_KG: f64 = 30.0;
const MAX_MEAL_CALORIES: f64 = 10_000.0;

/// Daily targets derived from a profile: Mifflin–St Jeor BMR scaled by activity,
/// adjusted for the goal, then split into macros.
pub fn daily_targets(profile: &Profile) -> DailyTargets {
    let base = 10.0 * profile.weight_kg + 6.25 * profile.height_cm - 5.0 * profile.age as f64;
    let bmr = match profile.gender {
        Gender::Male => base + 5.0,
        Gender::Female => base - 161.0,
    };
    let maintenance = bmr * profile.activity_level.factor();
    let (calorie_factor, protein_per_kg, steps) = match profile.goal {
        Goal::LoseWeight => (0.85, 2.0, 10_000),
        Goal::Maintain => (1.0, 1.6, 8_000),
        Goal::GainMuscle => (1.10, 2.0, 7_000),
    };

    let calories = (maintenance * calorie_factor).round().max(1_200.0);
    let protein_g = (profile.weight_kg * protein_per_kg).round();
    let fat_g = (calories * FAT_SHARE_OF_CALORIES / 9.0).round();
    let carbs_g = ((calories - protein_g * 4.0 - fat_g * 9.0) / 4.0).round().max(0.0);

    DailyTargets {
        calories: calories as u32,
        protein_g: protein_g as u32,
        fat_g: fat_g as u32,
        carbs_g: carbs_g as u32,
        water_ml: (profile.weight_kg * WATER_ML_PER_KG).round() as u32,
        steps,
    }
}

/// Extract the JSON meal estimate from a completion answer. The model sometimes
/// wraps the object in prose or code fences; only the outermost object is read.
pub fn parse_meal_estimate(raw: &str) -> Result<MealEstimate, String> {
    let start = raw.find('{').ok_or("no JSON object in answer")?;
    let end = raw.rfind('}').ok_or("no JSON object in answer")?;
    if end < start {
        return Err("no JSON object in answer".to_string());
    }
    let estimate: MealEstimate =
        serde_json::from_str(&raw[start..=end]).map_err(|err| err.to_string())?;

    if estimate.name.trim().is_empty() {
        return Err("estimate has an empty name".to_string());
    }
    let values = [estimate.calories, estimate.protein, estimate.fat, estimate.carbs];
    if values.iter().any(|v| !v.is_finite() || *v < 0.0) || estimate.calories > MAX_MEAL_CALORIES
    {
        return Err(format!("implausible nutrition values: {values:?}"));
    }
    Ok(estimate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ActivityLevel;

    fn ann() -> Profile {
        Profile {
            user_id: 1,
            chat_id: 1,
            name: "Ann".to_string(),
            gender: Gender::Male,
            age: 29,
            height_cm: 178.0,
            weight_kg: 74.5,
            goal: Goal::LoseWeight,
            activity_level: ActivityLevel::Moderate,
        }
    }

    #[test]
    fn targets_for_weight_loss_profile() {
        let targets = daily_targets(&ann());
        assert_eq!(targets.calories, 2263);
        assert_eq!(targets.protein_g, 149);
        assert_eq!(targets.fat_g, 63);
        assert_eq!(targets.carbs_g, 275);
        assert_eq!(targets.water_ml, 2235);
        assert_eq!(targets.steps, 10_000);
    }

    #[test]
    fn heavier_profile_gets_more_calories() {
        let mut heavier = ann();
        heavier.weight_kg = 90.0;
        assert!(daily_targets(&heavier).calories > daily_targets(&ann()).calories);
    }

    #[test]
    fn parses_estimate_inside_code_fence() {
        let raw = "Here you go:\n```json\n{\"name\":\"Oatmeal\",\"calories\":350,\"protein\":12,\"fat\":6,\"carbs\":60}\n```";
        let estimate = parse_meal_estimate(raw).expect("estimate should parse");
        assert_eq!(estimate.name, "Oatmeal");
        assert_eq!(estimate.calories, 350.0);
    }

    #[test]
    fn rejects_missing_or_implausible_estimates() {
        assert!(parse_meal_estimate("I cannot tell").is_err());
        assert!(parse_meal_estimate("{\"name\":\"x\",\"calories\":-5}").is_err());
        assert!(parse_meal_estimate("{\"name\":\"\",\"calories\":100}").is_err());
    }
}
