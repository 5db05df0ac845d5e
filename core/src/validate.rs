//! Step validators. Each returns the typed value or a [`ValidationError`] whose message
//! is shown to the user as the re-prompt.

use std::sync::LazyLock;

use regex::Regex;

use crate::domain::{ActivityLevel, Gender, Goal};
use crate::error::ValidationError;

pub const AGE_RANGE: std::ops::RangeInclusive<u32> = 10..=120;
pub const HEIGHT_RANGE_CM: std::ops::RangeInclusive<f64> = 100.0..=250.0;
pub const WEIGHT_RANGE_KG: std::ops::RangeInclusive<f64> = 30.0..=300.0;
pub const WATER_RANGE_ML: std::ops::RangeInclusive<u32> = 1..=5_000;
pub const STEPS_RANGE: std::ops::RangeInclusive<u32> = 1..=100_000;
pub const NAME_MAX_CHARS: usize = 64;
pub const FREE_TEXT_MAX_CHARS: usize = 2_000;

/// Digit groups ("5 000", "1'500") are tried before a plain or decimal number.
static AMOUNT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d{1,3}(?:[ ']\d{3})+|\d+(?:[.,]\d+)?)\s*(ml|l|liters?|litres?)?\b")
        .expect("valid amount regex")
});

pub fn validate_name(raw: &str) -> Result<String, ValidationError> {
    let name = raw.trim();
    if name.is_empty() || name.starts_with('/') {
        return Err(ValidationError::new("name", "Please send your name as plain text."));
    }
    if name.chars().count() > NAME_MAX_CHARS {
        return Err(ValidationError::new(
            "name",
            format!("Name must be at most {NAME_MAX_CHARS} characters."),
        ));
    }
    Ok(name.to_string())
}

pub fn validate_gender(raw: &str) -> Result<Gender, ValidationError> {
    Gender::parse(raw)
        .ok_or_else(|| ValidationError::new("gender", "Please choose Male or Female."))
}

pub fn validate_age(raw: &str) -> Result<u32, ValidationError> {
    let age: u32 = raw.trim().parse().map_err(|_| {
        ValidationError::new("age", "Age must be a whole number, for example 29.")
    })?;
    if !AGE_RANGE.contains(&age) {
        return Err(ValidationError::new(
            "age",
            format!(
                "Age must be between {} and {}.",
                AGE_RANGE.start(),
                AGE_RANGE.end()
            ),
        ));
    }
    Ok(age)
}

pub fn validate_height(raw: &str) -> Result<f64, ValidationError> {
    let height = parse_decimal(raw).ok_or_else(|| {
        ValidationError::new("height", "Height must be a number in centimetres, for example 178.")
    })?;
    if !HEIGHT_RANGE_CM.contains(&height) {
        return Err(ValidationError::new(
            "height",
            format!(
                "Height must be between {} and {} cm.",
                HEIGHT_RANGE_CM.start(),
                HEIGHT_RANGE_CM.end()
            ),
        ));
    }
    Ok(height)
}

pub fn validate_weight(raw: &str) -> Result<f64, ValidationError> {
    let weight = parse_decimal(raw).ok_or_else(|| {
        ValidationError::new("weight", "Weight must be a number in kilograms, for example 74.5.")
    })?;
    if !WEIGHT_RANGE_KG.contains(&weight) {
        return Err(ValidationError::new(
            "weight",
            format!(
                "Weight must be between {} and {} kg.",
                WEIGHT_RANGE_KG.start(),
                WEIGHT_RANGE_KG.end()
            ),
        ));
    }
    Ok(weight)
}

pub fn validate_goal(raw: &str) -> Result<Goal, ValidationError> {
    Goal::parse(raw).ok_or_else(|| {
        ValidationError::new(
            "goal",
            "Please choose a goal: lose weight, maintain weight or gain muscle.",
        )
    })
}

pub fn validate_activity(raw: &str) -> Result<ActivityLevel, ValidationError> {
    ActivityLevel::parse(raw).ok_or_else(|| {
        ValidationError::new(
            "activity_level",
            "Activity level must be one of: sedentary, light, moderate, active, very active.",
        )
    })
}

/// Interpret free text like "250", "300 ml" or "0.5 l" as millilitres.
pub fn parse_water_ml(raw: &str) -> Result<u32, ValidationError> {
    let invalid = || {
        ValidationError::new(
            "water",
            format!(
                "Send the amount of water in ml, between {} and {}.",
                WATER_RANGE_ML.start(),
                WATER_RANGE_ML.end()
            ),
        )
    };
    let captures = AMOUNT_PATTERN.captures(raw).ok_or_else(invalid)?;
    let value: f64 = captures[1]
        .replace([' ', '\''], "")
        .replace(',', ".")
        .parse()
        .map_err(|_| invalid())?;
    let is_litres = captures
        .get(2)
        .map(|unit| unit.as_str().to_lowercase().starts_with('l'))
        .unwrap_or(false);
    let ml = if is_litres { value * 1000.0 } else { value };
    let ml = ml.round();
    if ml < *WATER_RANGE_ML.start() as f64 || ml > *WATER_RANGE_ML.end() as f64 {
        return Err(invalid());
    }
    Ok(ml as u32)
}

/// Step counts may carry thousands separators: "10 000", "10,000". A decimal point
/// is not a separator, so "10.5" is rejected.
pub fn validate_steps(raw: &str) -> Result<u32, ValidationError> {
    let digits: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | ',' | '\''))
        .collect();
    let steps: u32 = digits.parse().map_err(|_| {
        ValidationError::new("steps", "Send the step count as a whole number, for example 8500.")
    })?;
    if !STEPS_RANGE.contains(&steps) {
        return Err(ValidationError::new(
            "steps",
            format!(
                "Step count must be between {} and {}.",
                STEPS_RANGE.start(),
                STEPS_RANGE.end()
            ),
        ));
    }
    Ok(steps)
}

pub fn validate_free_text(raw: &str, field: &'static str) -> Result<String, ValidationError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(ValidationError::new(field, "Please send a text message."));
    }
    if text.chars().count() > FREE_TEXT_MAX_CHARS {
        return Err(ValidationError::new(
            field,
            format!("Please keep it under {FREE_TEXT_MAX_CHARS} characters."),
        ));
    }
    Ok(text.to_string())
}

fn parse_decimal(raw: &str) -> Option<f64> {
    let value: f64 = raw.trim().replace(',', ".").parse().ok()?;
    value.is_finite().then_some(value)
}
