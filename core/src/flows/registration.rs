//! Registration: name → gender → age → height → weight → goal → persist.
//!
//! The table below is the whole state machine. Each row names the prompt shown on
//! entering the step, the keyboard offered with it, the validator that accepts input
//! for it and the step that follows. The last row has no successor; accepting its
//! input completes the draft, which is then persisted as one profile upsert and one
//! targets save.

use crate::callback::{CallbackAction, RegistrationAction};
use crate::collaborators::{Button, Keyboard};
use crate::domain::{Gender, Goal, Profile};
use crate::error::{FlowError, ValidationError};
use crate::nutrition::daily_targets;
use crate::report::render_targets;
use crate::session::FlowKind;
use crate::validate::{
    validate_age, validate_gender, validate_goal, validate_height, validate_name,
    validate_weight,
};
use crate::{ChatId, UserId};

use super::{FlowContext, Party, main_menu};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStep {
    AskName,
    AskGender,
    AskAge,
    AskHeight,
    AskWeight,
    AskGoal,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RegistrationDraft {
    pub name: Option<String>,
    pub gender: Option<Gender>,
    pub age: Option<u32>,
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    pub goal: Option<Goal>,
}

impl RegistrationDraft {
    /// `None` while any field is still missing.
    pub fn into_profile(self, user_id: UserId, chat_id: ChatId) -> Option<Profile> {
        Some(Profile {
            user_id,
            chat_id,
            name: self.name?,
            gender: self.gender?,
            age: self.age?,
            height_cm: self.height_cm?,
            weight_kg: self.weight_kg?,
            goal: self.goal?,
            activity_level: Default::default(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationState {
    pub step: RegistrationStep,
    pub draft: RegistrationDraft,
}

impl RegistrationState {
    pub fn new() -> Self {
        Self {
            step: RegistrationStep::AskName,
            draft: RegistrationDraft::default(),
        }
    }
}

impl Default for RegistrationState {
    fn default() -> Self {
        Self::new()
    }
}

/// Input for a registration step: typed text or a tapped button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepInput<'a> {
    Text(&'a str),
    Choice(RegistrationAction),
}

pub struct Transition {
    pub step: RegistrationStep,
    pub prompt: &'static str,
    keyboard: fn() -> Option<Keyboard>,
    accept: fn(&mut RegistrationDraft, StepInput<'_>) -> Result<(), ValidationError>,
    pub next: Option<RegistrationStep>,
}

impl Transition {
    pub fn keyboard(&self) -> Option<Keyboard> {
        (self.keyboard)()
    }
}

const TRANSITIONS: [Transition; 6] = [
    Transition {
        step: RegistrationStep::AskName,
        prompt: "What is your name?",
        keyboard: no_keyboard,
        accept: accept_name,
        next: Some(RegistrationStep::AskGender),
    },
    Transition {
        step: RegistrationStep::AskGender,
        prompt: "What is your gender?",
        keyboard: gender_keyboard,
        accept: accept_gender,
        next: Some(RegistrationStep::AskAge),
    },
    Transition {
        step: RegistrationStep::AskAge,
        prompt: "How old are you?",
        keyboard: no_keyboard,
        accept: accept_age,
        next: Some(RegistrationStep::AskHeight),
    },
    Transition {
        step: RegistrationStep::AskHeight,
        prompt: "What is your height in cm?",
        keyboard: no_keyboard,
        accept: accept_height,
        next: Some(RegistrationStep::AskWeight),
    },
    Transition {
        step: RegistrationStep::AskWeight,
        prompt: "What is your weight in kg?",
        keyboard: no_keyboard,
        accept: accept_weight,
        next: Some(RegistrationStep::AskGoal),
    },
    Transition {
        step: RegistrationStep::AskGoal,
        prompt: "What is your goal?",
        keyboard: goal_keyboard,
        accept: accept_goal,
        next: None,
    },
];

pub fn transition(step: RegistrationStep) -> &'static Transition {
    &TRANSITIONS[step as usize]
}

fn no_keyboard() -> Option<Keyboard> {
    None
}

fn gender_keyboard() -> Option<Keyboard> {
    Some(Keyboard::default().row(Gender::ALL.map(|gender| {
        Button::new(
            gender.label(),
            CallbackAction::Registration(RegistrationAction::Gender(gender)),
        )
    })))
}

fn goal_keyboard() -> Option<Keyboard> {
    Some(Keyboard::single_column(Goal::ALL.map(|goal| {
        Button::new(
            goal.label(),
            CallbackAction::Registration(RegistrationAction::Goal(goal)),
        )
    })))
}

fn text_only<'a>(input: StepInput<'a>, field: &'static str) -> Result<&'a str, ValidationError> {
    match input {
        StepInput::Text(text) => Ok(text),
        StepInput::Choice(_) => Err(ValidationError::new(field, "Please answer with a message.")),
    }
}

fn accept_name(draft: &mut RegistrationDraft, input: StepInput<'_>) -> Result<(), ValidationError> {
    draft.name = Some(validate_name(text_only(input, "name")?)?);
    Ok(())
}

fn accept_gender(
    draft: &mut RegistrationDraft,
    input: StepInput<'_>,
) -> Result<(), ValidationError> {
    let gender = match input {
        StepInput::Text(text) => validate_gender(text)?,
        StepInput::Choice(RegistrationAction::Gender(gender)) => gender,
        StepInput::Choice(_) => {
            return Err(ValidationError::new("gender", "Please choose Male or Female."));
        }
    };
    draft.gender = Some(gender);
    Ok(())
}

fn accept_age(draft: &mut RegistrationDraft, input: StepInput<'_>) -> Result<(), ValidationError> {
    draft.age = Some(validate_age(text_only(input, "age")?)?);
    Ok(())
}

fn accept_height(
    draft: &mut RegistrationDraft,
    input: StepInput<'_>,
) -> Result<(), ValidationError> {
    draft.height_cm = Some(validate_height(text_only(input, "height")?)?);
    Ok(())
}

fn accept_weight(
    draft: &mut RegistrationDraft,
    input: StepInput<'_>,
) -> Result<(), ValidationError> {
    draft.weight_kg = Some(validate_weight(text_only(input, "weight")?)?);
    Ok(())
}

fn accept_goal(draft: &mut RegistrationDraft, input: StepInput<'_>) -> Result<(), ValidationError> {
    let goal = match input {
        StepInput::Text(text) => validate_goal(text)?,
        StepInput::Choice(RegistrationAction::Goal(goal)) => goal,
        StepInput::Choice(_) => {
            return Err(ValidationError::new("goal", "Please choose your goal below."));
        }
    };
    draft.goal = Some(goal);
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    Next(RegistrationState),
    Complete(RegistrationDraft),
}

/// Apply one input to the current step. Pure: the caller decides what to store.
pub fn advance(state: &RegistrationState, input: StepInput<'_>) -> Result<Advance, ValidationError> {
    let row = transition(state.step);
    let mut draft = state.draft.clone();
    (row.accept)(&mut draft, input)?;
    Ok(match row.next {
        Some(step) => Advance::Next(RegistrationState { step, draft }),
        None => Advance::Complete(draft),
    })
}

impl FlowContext {
    pub async fn start_registration(&self, party: Party) {
        self.sessions.clear_all(party.user_id).await;
        self.sessions
            .registration
            .set(party.user_id, RegistrationState::new())
            .await;
        self.say(
            party.chat_id,
            "Hi! I am your personal health assistant. I will count calories, track water \
             and steps and build plans for you. First, a few questions about you.",
        )
        .await;
        self.prompt_registration_step(party.chat_id, RegistrationStep::AskName, None)
            .await;
    }

    async fn prompt_registration_step(
        &self,
        chat_id: ChatId,
        step: RegistrationStep,
        problem: Option<&str>,
    ) {
        let row = transition(step);
        let text = match problem {
            Some(problem) => format!("{problem}\n{}", row.prompt),
            None => row.prompt.to_string(),
        };
        match row.keyboard() {
            Some(keyboard) => self.say_with(chat_id, &text, &keyboard).await,
            None => self.say(chat_id, &text).await,
        }
    }

    pub async fn handle_registration(
        &self,
        party: Party,
        input: StepInput<'_>,
    ) -> Result<(), FlowError> {
        let state = self
            .sessions
            .registration
            .get(party.user_id)
            .await
            .ok_or_else(|| FlowError::StaleReference("no registration in progress".to_string()))?;

        match advance(&state, input) {
            Err(invalid) => {
                self.prompt_registration_step(party.chat_id, state.step, Some(&invalid.message))
                    .await;
                Ok(())
            }
            Ok(Advance::Next(next)) => {
                let step = next.step;
                self.sessions.registration.set(party.user_id, next).await;
                self.prompt_registration_step(party.chat_id, step, None)
                    .await;
                Ok(())
            }
            Ok(Advance::Complete(draft)) => self.persist_registration(party, draft).await,
        }
    }

    /// The slot stays on the last step until both writes succeed, so a failed
    /// persist is retried by answering the last question again.
    async fn persist_registration(
        &self,
        party: Party,
        draft: RegistrationDraft,
    ) -> Result<(), FlowError> {
        let profile = draft
            .into_profile(party.user_id, party.chat_id)
            .ok_or_else(|| {
                FlowError::InternalInconsistency("registration completed with gaps".to_string())
            })?;
        let targets = daily_targets(&profile);
        let fallback = "Could not save your profile right now. Please send your goal again in a minute.";

        let stored = profile.clone();
        self.io
            .store("upsert_profile", fallback, move |store| async move {
                store.upsert_profile(&stored).await
            })
            .await?;
        let user_id = party.user_id;
        self.io
            .store("save_daily_targets", fallback, move |store| async move {
                store.save_daily_targets(user_id, &targets).await
            })
            .await?;

        self.sessions.clear(party.user_id, FlowKind::Registration).await;
        tracing::info!(user_id, goal = profile.goal.as_str(), "registration completed");
        self.say_markdown(
            party.chat_id,
            &format!(
                "Welcome, {}! Your profile is saved.\n\n{}",
                profile.name,
                render_targets(&targets)
            ),
            Some(&main_menu()),
        )
        .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(state: &RegistrationState, input: &str) -> Result<Advance, ValidationError> {
        advance(state, StepInput::Text(input))
    }

    fn next(result: Result<Advance, ValidationError>) -> RegistrationState {
        match result {
            Ok(Advance::Next(state)) => state,
            other => panic!("expected next step, got {other:?}"),
        }
    }

    #[test]
    fn table_rows_follow_step_order() {
        let mut step = Some(RegistrationStep::AskName);
        let mut visited = 0;
        while let Some(current) = step {
            assert_eq!(transition(current).step, current);
            step = transition(current).next;
            visited += 1;
        }
        assert_eq!(visited, TRANSITIONS.len());
    }

    #[test]
    fn full_walk_completes_the_draft() {
        let state = RegistrationState::new();
        let state = next(text(&state, "Ann"));
        let state = next(advance(
            &state,
            StepInput::Choice(RegistrationAction::Gender(Gender::Female)),
        ));
        let state = next(text(&state, "29"));
        let state = next(text(&state, "178"));
        let state = next(text(&state, "74.5"));
        assert_eq!(state.step, RegistrationStep::AskGoal);

        match advance(&state, StepInput::Choice(RegistrationAction::Goal(Goal::LoseWeight))) {
            Ok(Advance::Complete(draft)) => {
                let profile = draft.into_profile(7, 70).expect("complete");
                assert_eq!(profile.name, "Ann");
                assert_eq!(profile.gender, Gender::Female);
                assert_eq!(profile.age, 29);
                assert_eq!(profile.goal, Goal::LoseWeight);
            }
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[test]
    fn invalid_input_keeps_the_step() {
        let state = RegistrationState {
            step: RegistrationStep::AskAge,
            draft: RegistrationDraft::default(),
        };
        let err = text(&state, "140").expect_err("out of range");
        assert_eq!(err.field, "age");

        let err = advance(
            &state,
            StepInput::Choice(RegistrationAction::Goal(Goal::Maintain)),
        )
        .expect_err("buttons do not answer the age");
        assert_eq!(err.field, "age");
    }

    #[test]
    fn gender_accepts_text_and_rejects_goal_button() {
        let state = RegistrationState {
            step: RegistrationStep::AskGender,
            draft: RegistrationDraft::default(),
        };
        let state = next(text(&state, "male"));
        assert_eq!(state.draft.gender, Some(Gender::Male));

        let state = RegistrationState {
            step: RegistrationStep::AskGender,
            draft: RegistrationDraft::default(),
        };
        assert!(
            advance(&state, StepInput::Choice(RegistrationAction::Goal(Goal::Maintain))).is_err()
        );
    }

    #[test]
    fn incomplete_draft_yields_no_profile() {
        let draft = RegistrationDraft {
            name: Some("Ann".into()),
            ..Default::default()
        };
        assert!(draft.into_profile(1, 1).is_none());
    }
}
