//! Compact action protocol carried in inline-button payloads.
//!
//! Wire form is `domain_verb_params…` joined by `_`, at most
//! [`MAX_CALLBACK_DATA_BYTES`] long. The first segment picks the domain; every domain
//! owns its own encode/decode pair and re-joins trailing segments where a value may
//! itself contain `_` (goals, profile fields, questionnaire answers).

use uuid::Uuid;

use crate::domain::{Gender, Goal, PlanKind, ProfileField};

/// Platform ceiling for button payloads.
pub const MAX_CALLBACK_DATA_BYTES: usize = 64;

const SEPARATOR: char = '_';

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallbackError {
    #[error("empty callback payload")]
    Empty,
    #[error("callback payload exceeds the 64-byte ceiling")]
    TooLong,
    #[error("unknown callback domain '{0}'")]
    UnknownDomain(String),
    #[error("malformed '{domain}' callback payload")]
    Malformed { domain: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    Registration(RegistrationAction),
    Meal(MealAction),
    Water(WaterAction),
    Steps(StepsAction),
    Plan(PlanKind, PlanAction),
    Profile(ProfileAction),
    Challenge(ChallengeAction),
    Menu(MenuItem),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationAction {
    Gender(Gender),
    Goal(Goal),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MealAction {
    Confirm(String),
    Cancel(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaterAction {
    /// Quick add of a fixed amount. Every tap is an independent write.
    Add(u32),
    /// Ask the user to type an amount.
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepsAction {
    Custom,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanAction {
    /// Reuse stored preferences and regenerate.
    Reuse,
    /// Skip the plan and ask a free question instead.
    OpenQuestion,
    /// Drop stored preferences and run the questionnaire again.
    Restart,
    Answer { step: usize, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileAction {
    Show,
    Edit(ProfileField),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeAction {
    Join(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuItem {
    AddMeal,
    Water,
    Steps,
    Workout,
    Nutrition,
    Profile,
    Report,
    Question,
    Medical,
    Challenge,
}

impl MenuItem {
    pub const ALL: [MenuItem; 10] = [
        MenuItem::AddMeal,
        MenuItem::Water,
        MenuItem::Steps,
        MenuItem::Workout,
        MenuItem::Nutrition,
        MenuItem::Profile,
        MenuItem::Report,
        MenuItem::Question,
        MenuItem::Medical,
        MenuItem::Challenge,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MenuItem::AddMeal => "add_meal",
            MenuItem::Water => "water",
            MenuItem::Steps => "steps",
            MenuItem::Workout => "workout",
            MenuItem::Nutrition => "nutrition",
            MenuItem::Profile => "profile",
            MenuItem::Report => "report",
            MenuItem::Question => "question",
            MenuItem::Medical => "medical",
            MenuItem::Challenge => "challenge",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|item| item.as_str() == raw)
    }

    pub fn label(self) -> &'static str {
        match self {
            MenuItem::AddMeal => "🍽 Add meal",
            MenuItem::Water => "💧 Water",
            MenuItem::Steps => "👣 Steps",
            MenuItem::Workout => "🏋 Workout plan",
            MenuItem::Nutrition => "🥗 Nutrition plan",
            MenuItem::Profile => "👤 Profile",
            MenuItem::Report => "📊 Today",
            MenuItem::Question => "❓ Ask",
            MenuItem::Medical => "🩺 Medical",
            MenuItem::Challenge => "🏆 Challenge",
        }
    }
}

impl CallbackAction {
    pub fn encode(&self) -> String {
        let encoded = match self {
            CallbackAction::Registration(action) => registration::encode(action),
            CallbackAction::Meal(action) => meal::encode(action),
            CallbackAction::Water(action) => water::encode(action),
            CallbackAction::Steps(action) => steps::encode(action),
            CallbackAction::Plan(kind, action) => plan::encode(*kind, action),
            CallbackAction::Profile(action) => profile::encode(action),
            CallbackAction::Challenge(action) => challenge::encode(action),
            CallbackAction::Menu(item) => menu::encode(*item),
        };
        debug_assert!(
            encoded.len() <= MAX_CALLBACK_DATA_BYTES,
            "callback payload '{encoded}' exceeds the platform ceiling"
        );
        encoded
    }

    pub fn decode(raw: &str) -> Result<Self, CallbackError> {
        if raw.is_empty() {
            return Err(CallbackError::Empty);
        }
        if raw.len() > MAX_CALLBACK_DATA_BYTES {
            return Err(CallbackError::TooLong);
        }
        let mut parts = raw.split(SEPARATOR);
        let domain = parts.next().unwrap_or_default();
        let params: Vec<&str> = parts.collect();

        match domain {
            registration::DOMAIN => registration::decode(&params)
                .map(CallbackAction::Registration)
                .ok_or(CallbackError::Malformed {
                    domain: registration::DOMAIN,
                }),
            meal::DOMAIN => meal::decode(&params)
                .map(CallbackAction::Meal)
                .ok_or(CallbackError::Malformed { domain: meal::DOMAIN }),
            water::DOMAIN => water::decode(&params)
                .map(CallbackAction::Water)
                .ok_or(CallbackError::Malformed {
                    domain: water::DOMAIN,
                }),
            steps::DOMAIN => steps::decode(&params)
                .map(CallbackAction::Steps)
                .ok_or(CallbackError::Malformed {
                    domain: steps::DOMAIN,
                }),
            plan::WORKOUT_DOMAIN => plan::decode(&params)
                .map(|action| CallbackAction::Plan(PlanKind::Workout, action))
                .ok_or(CallbackError::Malformed {
                    domain: plan::WORKOUT_DOMAIN,
                }),
            plan::NUTRITION_DOMAIN => plan::decode(&params)
                .map(|action| CallbackAction::Plan(PlanKind::Nutrition, action))
                .ok_or(CallbackError::Malformed {
                    domain: plan::NUTRITION_DOMAIN,
                }),
            profile::DOMAIN => profile::decode(&params)
                .map(CallbackAction::Profile)
                .ok_or(CallbackError::Malformed {
                    domain: profile::DOMAIN,
                }),
            challenge::DOMAIN => challenge::decode(&params)
                .map(CallbackAction::Challenge)
                .ok_or(CallbackError::Malformed {
                    domain: challenge::DOMAIN,
                }),
            menu::DOMAIN => menu::decode(&params)
                .map(CallbackAction::Menu)
                .ok_or(CallbackError::Malformed { domain: menu::DOMAIN }),
            other => Err(CallbackError::UnknownDomain(other.to_string())),
        }
    }
}

/// Join trailing params back into one value; `None` when nothing is left.
fn rest(params: &[&str]) -> Option<String> {
    if params.is_empty() || params.iter().all(|p| p.is_empty()) {
        return None;
    }
    Some(params.join("_"))
}

mod registration {
    use super::*;

    pub const DOMAIN: &str = "reg";

    pub fn encode(action: &RegistrationAction) -> String {
        match action {
            RegistrationAction::Gender(gender) => format!("{DOMAIN}_gender_{}", gender.as_str()),
            RegistrationAction::Goal(goal) => format!("{DOMAIN}_goal_{}", goal.as_str()),
        }
    }

    pub fn decode(params: &[&str]) -> Option<RegistrationAction> {
        let (verb, tail) = params.split_first()?;
        let value = rest(tail)?;
        match *verb {
            "gender" => Gender::ALL
                .into_iter()
                .find(|g| g.as_str() == value)
                .map(RegistrationAction::Gender),
            "goal" => Goal::ALL
                .into_iter()
                .find(|g| g.as_str() == value)
                .map(RegistrationAction::Goal),
            _ => None,
        }
    }
}

mod meal {
    use super::*;

    pub const DOMAIN: &str = "meal";

    pub fn encode(action: &MealAction) -> String {
        match action {
            MealAction::Confirm(token) => format!("{DOMAIN}_confirm_{token}"),
            MealAction::Cancel(token) => format!("{DOMAIN}_cancel_{token}"),
        }
    }

    pub fn decode(params: &[&str]) -> Option<MealAction> {
        let [verb, token] = params else {
            return None;
        };
        if token.is_empty() || !token.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        match *verb {
            "confirm" => Some(MealAction::Confirm(token.to_string())),
            "cancel" => Some(MealAction::Cancel(token.to_string())),
            _ => None,
        }
    }
}

mod water {
    use super::*;
    use crate::validate::WATER_RANGE_ML;

    pub const DOMAIN: &str = "water";

    pub fn encode(action: &WaterAction) -> String {
        match action {
            WaterAction::Add(ml) => format!("{DOMAIN}_add_{ml}"),
            WaterAction::Custom => format!("{DOMAIN}_custom"),
        }
    }

    pub fn decode(params: &[&str]) -> Option<WaterAction> {
        match params {
            ["add", amount] => amount
                .parse::<u32>()
                .ok()
                .filter(|ml| WATER_RANGE_ML.contains(ml))
                .map(WaterAction::Add),
            ["custom"] => Some(WaterAction::Custom),
            _ => None,
        }
    }
}

mod steps {
    use super::*;

    pub const DOMAIN: &str = "steps";

    pub fn encode(action: &StepsAction) -> String {
        match action {
            StepsAction::Custom => format!("{DOMAIN}_custom"),
        }
    }

    pub fn decode(params: &[&str]) -> Option<StepsAction> {
        match params {
            ["custom"] => Some(StepsAction::Custom),
            _ => None,
        }
    }
}

mod plan {
    use super::*;

    pub const WORKOUT_DOMAIN: &str = "workout";
    pub const NUTRITION_DOMAIN: &str = "nutrition";

    pub fn encode(kind: PlanKind, action: &PlanAction) -> String {
        let domain = kind.as_str();
        match action {
            PlanAction::Reuse => format!("{domain}_yes"),
            PlanAction::OpenQuestion => format!("{domain}_no"),
            PlanAction::Restart => format!("{domain}_restart"),
            PlanAction::Answer { step, value } => format!("{domain}_ans_{step}_{value}"),
        }
    }

    pub fn decode(params: &[&str]) -> Option<PlanAction> {
        let (verb, tail) = params.split_first()?;
        match (*verb, tail) {
            ("yes", []) => Some(PlanAction::Reuse),
            ("no", []) => Some(PlanAction::OpenQuestion),
            ("restart", []) => Some(PlanAction::Restart),
            ("ans", [step, value @ ..]) => {
                let step = step.parse().ok()?;
                let value = rest(value)?;
                Some(PlanAction::Answer { step, value })
            }
            _ => None,
        }
    }
}

mod profile {
    use super::*;

    pub const DOMAIN: &str = "profile";

    pub fn encode(action: &ProfileAction) -> String {
        match action {
            ProfileAction::Show => format!("{DOMAIN}_show"),
            ProfileAction::Edit(field) => format!("{DOMAIN}_edit_{}", field.as_str()),
        }
    }

    pub fn decode(params: &[&str]) -> Option<ProfileAction> {
        let (verb, tail) = params.split_first()?;
        match (*verb, tail) {
            ("show", []) => Some(ProfileAction::Show),
            ("edit", field) => ProfileField::parse(&rest(field)?).map(ProfileAction::Edit),
            _ => None,
        }
    }
}

mod challenge {
    use super::*;

    pub const DOMAIN: &str = "challenge";

    pub fn encode(action: &ChallengeAction) -> String {
        match action {
            ChallengeAction::Join(id) => format!("{DOMAIN}_join_{}", id.simple()),
        }
    }

    pub fn decode(params: &[&str]) -> Option<ChallengeAction> {
        match params {
            ["join", id] => Uuid::try_parse(id).ok().map(ChallengeAction::Join),
            _ => None,
        }
    }
}

mod menu {
    use super::*;

    pub const DOMAIN: &str = "menu";

    pub fn encode(item: MenuItem) -> String {
        format!("{DOMAIN}_{}", item.as_str())
    }

    pub fn decode(params: &[&str]) -> Option<MenuItem> {
        MenuItem::parse(&rest(params)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::plan::questions;

    fn assert_round_trip(action: CallbackAction) {
        let encoded = action.encode();
        assert!(
            encoded.len() <= MAX_CALLBACK_DATA_BYTES,
            "{encoded} is too long"
        );
        assert_eq!(CallbackAction::decode(&encoded), Ok(action), "{encoded}");
    }

    #[test]
    fn registration_round_trip() {
        for gender in Gender::ALL {
            assert_round_trip(CallbackAction::Registration(RegistrationAction::Gender(gender)));
        }
        for goal in Goal::ALL {
            assert_round_trip(CallbackAction::Registration(RegistrationAction::Goal(goal)));
        }
    }

    #[test]
    fn meal_round_trip() {
        let token = crate::auth::generate_confirmation_token();
        assert_round_trip(CallbackAction::Meal(MealAction::Confirm(token.clone())));
        assert_round_trip(CallbackAction::Meal(MealAction::Cancel(token)));
    }

    #[test]
    fn water_and_steps_round_trip() {
        for ml in [200, 250, 500] {
            assert_round_trip(CallbackAction::Water(WaterAction::Add(ml)));
        }
        assert_round_trip(CallbackAction::Water(WaterAction::Custom));
        assert_round_trip(CallbackAction::Steps(StepsAction::Custom));
    }

    #[test]
    fn plan_round_trip_covers_every_question_option() {
        for kind in [PlanKind::Workout, PlanKind::Nutrition] {
            assert_round_trip(CallbackAction::Plan(kind, PlanAction::Reuse));
            assert_round_trip(CallbackAction::Plan(kind, PlanAction::OpenQuestion));
            assert_round_trip(CallbackAction::Plan(kind, PlanAction::Restart));
            for (step, question) in questions(kind).iter().enumerate() {
                for option in question.options() {
                    assert_round_trip(CallbackAction::Plan(
                        kind,
                        PlanAction::Answer {
                            step,
                            value: option.value.to_string(),
                        },
                    ));
                }
            }
        }
    }

    #[test]
    fn profile_round_trip() {
        assert_round_trip(CallbackAction::Profile(ProfileAction::Show));
        for field in ProfileField::ALL {
            assert_round_trip(CallbackAction::Profile(ProfileAction::Edit(field)));
        }
    }

    #[test]
    fn challenge_and_menu_round_trip() {
        assert_round_trip(CallbackAction::Challenge(ChallengeAction::Join(Uuid::new_v4())));
        for item in MenuItem::ALL {
            assert_round_trip(CallbackAction::Menu(item));
        }
    }

    #[test]
    fn values_containing_separator_decode_unambiguously() {
        assert_eq!(
            CallbackAction::decode("reg_goal_lose_weight"),
            Ok(CallbackAction::Registration(RegistrationAction::Goal(
                Goal::LoseWeight
            )))
        );
        assert_eq!(
            CallbackAction::decode("workout_ans_2_home_gym"),
            Ok(CallbackAction::Plan(
                PlanKind::Workout,
                PlanAction::Answer {
                    step: 2,
                    value: "home_gym".to_string()
                }
            ))
        );
        assert_eq!(
            CallbackAction::decode("profile_edit_activity_level"),
            Ok(CallbackAction::Profile(ProfileAction::Edit(
                ProfileField::ActivityLevel
            )))
        );
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert_eq!(CallbackAction::decode(""), Err(CallbackError::Empty));
        assert_eq!(
            CallbackAction::decode("pizza_now"),
            Err(CallbackError::UnknownDomain("pizza".to_string()))
        );
        assert_eq!(
            CallbackAction::decode("water_add_lots"),
            Err(CallbackError::Malformed { domain: "water" })
        );
        assert_eq!(
            CallbackAction::decode("water_add_0"),
            Err(CallbackError::Malformed { domain: "water" })
        );
        assert_eq!(
            CallbackAction::decode("meal_confirm"),
            Err(CallbackError::Malformed { domain: "meal" })
        );
        assert_eq!(
            CallbackAction::decode("workout_ans_x_gym"),
            Err(CallbackError::Malformed { domain: "workout" })
        );
        assert_eq!(
            CallbackAction::decode("reg_goal_fly"),
            Err(CallbackError::Malformed { domain: "reg" })
        );
        assert_eq!(
            CallbackAction::decode(&"menu_".repeat(20)),
            Err(CallbackError::TooLong)
        );
    }
}
