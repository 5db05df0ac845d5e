use std::collections::BTreeMap;

use crate::domain::{PlanKind, Profile};
use crate::flows::plan::questions;

pub const MEAL_RECOGNITION_SYSTEM: &str = "You are a nutrition assistant. Estimate the nutrition \
facts of the meal the user describes. Answer with a single JSON object and nothing else: \
{\"name\": string, \"calories\": number, \"protein\": number, \"fat\": number, \"carbs\": number}. \
Grams for macros, kcal for calories. Assume typical portions when the amount is not given.";

pub const MEAL_PHOTO_PROMPT: &str =
    "Identify the food in this photo and estimate its nutrition facts for the visible portion.";

pub const WORKOUT_PLAN_SYSTEM: &str = "You are a certified personal trainer. Write a one-week \
workout plan in Markdown for the client described by the user. Use headings per day, list \
exercises with sets, reps and rest, and add a short warm-up and cool-down. Respect every \
limitation the client mentions.";

pub const NUTRITION_PLAN_SYSTEM: &str = "You are a registered dietitian. Write a one-week meal \
plan in Markdown for the client described by the user. Use headings per day, give every meal \
with approximate calories and macros, and end with a shopping list. Respect the diet type and \
every allergy the client mentions.";

pub const QUESTION_SYSTEM: &str = "You are a friendly health and fitness assistant. Answer the \
user's question concisely and practically, taking their profile into account when it is given. \
Recommend seeing a professional when the question needs one.";

pub const MEDICAL_SYSTEM: &str = "You are a careful medical information assistant. Explain the \
user's symptoms, lab results or documents in plain language, list possible causes without \
diagnosing, and say clearly when they should see a doctor urgently. Never prescribe medication.";

pub const MEDICAL_IMAGE_PROMPT: &str = "Describe what this medical document or image shows and \
explain the relevant values in plain language.";

pub const MEDICAL_DISCLAIMER: &str =
    "_This is general information, not a diagnosis. Please consult a doctor._";

pub fn plan_system_prompt(kind: PlanKind) -> &'static str {
    match kind {
        PlanKind::Workout => WORKOUT_PLAN_SYSTEM,
        PlanKind::Nutrition => NUTRITION_PLAN_SYSTEM,
    }
}

pub fn describe_profile(profile: &Profile) -> String {
    format!(
        "{} years old, {}, {:.0} cm, {:.1} kg, goal: {}, activity: {}",
        profile.age,
        profile.gender.as_str(),
        profile.height_cm,
        profile.weight_kg,
        profile.goal.label().to_lowercase(),
        profile.activity_level.as_str().replace('_', " ")
    )
}

/// User prompt for plan synthesis: profile line plus one line per answered question,
/// phrased with the question text so the model sees what each answer means.
pub fn plan_user_prompt(
    kind: PlanKind,
    answers: &BTreeMap<String, String>,
    profile: Option<&Profile>,
) -> String {
    let mut prompt = String::new();
    if let Some(profile) = profile {
        prompt.push_str(&format!("Client: {}.\n", describe_profile(profile)));
    }
    for question in questions(kind) {
        if let Some(answer) = answers.get(question.key) {
            let shown = question.display_value(answer);
            prompt.push_str(&format!("{} {}\n", question.prompt, shown));
        }
    }
    prompt
}

pub fn question_user_prompt(question: &str, profile: Option<&Profile>) -> String {
    match profile {
        Some(profile) => format!("My profile: {}.\n\n{}", describe_profile(profile), question),
        None => question.to_string(),
    }
}
