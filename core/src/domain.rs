use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ChatId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub const ALL: [Gender; 2] = [Gender::Male, Gender::Female];

    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "male" | "m" | "man" => Some(Self::Male),
            "female" | "f" | "woman" => Some(Self::Female),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Goal {
    LoseWeight,
    Maintain,
    GainMuscle,
}

impl Goal {
    pub const ALL: [Goal; 3] = [Goal::LoseWeight, Goal::Maintain, Goal::GainMuscle];

    pub fn as_str(self) -> &'static str {
        match self {
            Goal::LoseWeight => "lose_weight",
            Goal::Maintain => "maintain",
            Goal::GainMuscle => "gain_muscle",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Goal::LoseWeight => "Lose weight",
            Goal::Maintain => "Maintain weight",
            Goal::GainMuscle => "Gain muscle",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "lose_weight" | "lose" => Some(Self::LoseWeight),
            "maintain" | "maintain_weight" => Some(Self::Maintain),
            "gain_muscle" | "gain" | "bulk" => Some(Self::GainMuscle),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Sedentary,
    Light,
    #[default]
    Moderate,
    Active,
    VeryActive,
}

impl ActivityLevel {
    pub const ALL: [ActivityLevel; 5] = [
        ActivityLevel::Sedentary,
        ActivityLevel::Light,
        ActivityLevel::Moderate,
        ActivityLevel::Active,
        ActivityLevel::VeryActive,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActivityLevel::Sedentary => "sedentary",
            ActivityLevel::Light => "light",
            ActivityLevel::Moderate => "moderate",
            ActivityLevel::Active => "active",
            ActivityLevel::VeryActive => "very_active",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase().replace([' ', '-'], "_");
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == normalized)
    }

    /// Multiplier applied to the basal metabolic rate.
    pub fn factor(self) -> f64 {
        match self {
            ActivityLevel::Sedentary => 1.2,
            ActivityLevel::Light => 1.375,
            ActivityLevel::Moderate => 1.55,
            ActivityLevel::Active => 1.725,
            ActivityLevel::VeryActive => 1.9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub name: String,
    pub gender: Gender,
    pub age: u32,
    pub height_cm: f64,
    pub weight_kg: f64,
    pub goal: Goal,
    #[serde(default)]
    pub activity_level: ActivityLevel,
}

/// Editable profile fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileField {
    Name,
    Gender,
    Age,
    Height,
    Weight,
    Goal,
    ActivityLevel,
}

impl ProfileField {
    pub const ALL: [ProfileField; 7] = [
        ProfileField::Name,
        ProfileField::Gender,
        ProfileField::Age,
        ProfileField::Height,
        ProfileField::Weight,
        ProfileField::Goal,
        ProfileField::ActivityLevel,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProfileField::Name => "name",
            ProfileField::Gender => "gender",
            ProfileField::Age => "age",
            ProfileField::Height => "height",
            ProfileField::Weight => "weight",
            ProfileField::Goal => "goal",
            ProfileField::ActivityLevel => "activity_level",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.as_str() == raw)
    }

    pub fn label(self) -> &'static str {
        match self {
            ProfileField::Name => "Name",
            ProfileField::Gender => "Gender",
            ProfileField::Age => "Age",
            ProfileField::Height => "Height",
            ProfileField::Weight => "Weight",
            ProfileField::Goal => "Goal",
            ProfileField::ActivityLevel => "Activity level",
        }
    }

    /// Whether a change to this field changes the derived daily targets.
    pub fn affects_targets(self) -> bool {
        !matches!(self, ProfileField::Name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyTargets {
    pub calories: u32,
    pub protein_g: u32,
    pub fat_g: u32,
    pub carbs_g: u32,
    pub water_ml: u32,
    pub steps: u32,
}

/// Nutrition estimate for one meal as returned by the completion service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealEstimate {
    pub name: String,
    pub calories: f64,
    #[serde(default)]
    pub protein: f64,
    #[serde(default)]
    pub fat: f64,
    #[serde(default)]
    pub carbs: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MealSource {
    Manual,
    Photo,
}

impl MealSource {
    pub fn as_str(self) -> &'static str {
        match self {
            MealSource::Manual => "manual",
            MealSource::Photo => "photo",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealRecord {
    /// Fixed when the estimate is proposed; a second insert with the same id is a no-op.
    pub id: Uuid,
    pub user_id: UserId,
    pub description: String,
    pub estimate: MealEstimate,
    pub source: MealSource,
    pub eaten_at: DateTime<Utc>,
}

/// Totals for one user and one local calendar day.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DailySummary {
    pub date: Option<NaiveDate>,
    pub meals: u32,
    pub calories: f64,
    pub protein_g: f64,
    pub fat_g: f64,
    pub carbs_g: f64,
    pub water_ml: u32,
    pub steps: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanKind {
    Workout,
    Nutrition,
}

impl PlanKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PlanKind::Workout => "workout",
            PlanKind::Nutrition => "nutrition",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "workout" => Some(Self::Workout),
            "nutrition" => Some(Self::Nutrition),
            _ => None,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            PlanKind::Workout => "workout plan",
            PlanKind::Nutrition => "nutrition plan",
        }
    }
}

/// Stored questionnaire answers, keyed by question key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanPreferences {
    pub user_id: UserId,
    pub kind: PlanKind,
    pub answers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeMetric {
    Steps,
    WaterMl,
}

impl ChallengeMetric {
    pub fn as_str(self) -> &'static str {
        match self {
            ChallengeMetric::Steps => "steps",
            ChallengeMetric::WaterMl => "water_ml",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "steps" => Some(Self::Steps),
            "water_ml" => Some(Self::WaterMl),
            _ => None,
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            ChallengeMetric::Steps => "steps",
            ChallengeMetric::WaterMl => "ml",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub metric: ChallengeMetric,
    pub target: u32,
    pub week_start: NaiveDate,
}

/// A registered user the scheduler can reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recipient {
    pub user_id: UserId,
    pub chat_id: ChatId,
}
