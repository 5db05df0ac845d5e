//! Workout and nutrition plan flow.
//!
//! ```text
//! start ──stored prefs──▶ AwaitingEntryChoice ──yes──▶ ReadyToGenerate ──▶ document
//!   │                         │        └──no──▶ question_wait
//!   │                         └──restart──▶ Question{0}
//!   └──no prefs──▶ Question{0} ──▶ … ──▶ Question{n-1} ──▶ ReadyToGenerate
//! ```
//!
//! A failed synthesis leaves the slot on `ReadyToGenerate` so the user can retry
//! without answering again.

use std::collections::BTreeMap;

use crate::callback::{CallbackAction, PlanAction};
use crate::collaborators::{Button, Keyboard, OutgoingDocument};
use crate::domain::{PlanKind, PlanPreferences, Profile};
use crate::error::{FlowError, ValidationError};
use crate::prompts;
use crate::session::{FlowKind, SlotMap};
use crate::validate::validate_free_text;

use super::{FlowContext, Party};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChoiceOption {
    pub value: &'static str,
    pub label: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerKind {
    Choice(&'static [ChoiceOption]),
    Number { min: u32, max: u32 },
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Question {
    pub key: &'static str,
    pub prompt: &'static str,
    pub kind: AnswerKind,
}

const fn option(value: &'static str, label: &'static str) -> ChoiceOption {
    ChoiceOption { value, label }
}

const WORKOUT_QUESTIONS: [Question; 6] = [
    Question {
        key: "goal",
        prompt: "What is the main goal of your training?",
        kind: AnswerKind::Choice(&[
            option("fat_loss", "Lose fat"),
            option("muscle", "Build muscle"),
            option("endurance", "Endurance"),
            option("health", "General health"),
        ]),
    },
    Question {
        key: "experience",
        prompt: "How experienced are you?",
        kind: AnswerKind::Choice(&[
            option("beginner", "Beginner"),
            option("intermediate", "Intermediate"),
            option("advanced", "Advanced"),
        ]),
    },
    Question {
        key: "location",
        prompt: "Where will you train?",
        kind: AnswerKind::Choice(&[
            option("home", "At home"),
            option("gym", "In a gym"),
            option("home_gym", "Both"),
            option("outdoor", "Outdoors"),
        ]),
    },
    Question {
        key: "days_per_week",
        prompt: "How many days per week can you train?",
        kind: AnswerKind::Number { min: 1, max: 7 },
    },
    Question {
        key: "session_minutes",
        prompt: "How many minutes per session?",
        kind: AnswerKind::Number { min: 15, max: 180 },
    },
    Question {
        key: "limitations",
        prompt: "Any injuries or limitations? Write \"none\" if not.",
        kind: AnswerKind::Text,
    },
];

const NUTRITION_QUESTIONS: [Question; 5] = [
    Question {
        key: "diet_type",
        prompt: "Which diet do you follow?",
        kind: AnswerKind::Choice(&[
            option("omnivore", "Everything"),
            option("vegetarian", "Vegetarian"),
            option("vegan", "Vegan"),
            option("keto", "Keto"),
        ]),
    },
    Question {
        key: "meals_per_day",
        prompt: "How many meals per day do you prefer?",
        kind: AnswerKind::Number { min: 2, max: 6 },
    },
    Question {
        key: "allergies",
        prompt: "Any allergies or foods you avoid? Write \"none\" if not.",
        kind: AnswerKind::Text,
    },
    Question {
        key: "budget",
        prompt: "What is your food budget?",
        kind: AnswerKind::Choice(&[
            option("low", "Low"),
            option("medium", "Medium"),
            option("high", "High"),
        ]),
    },
    Question {
        key: "cooking_time",
        prompt: "How much time can you spend cooking per day?",
        kind: AnswerKind::Choice(&[
            option("15min", "Up to 15 min"),
            option("30min", "Up to 30 min"),
            option("60min", "An hour or more"),
        ]),
    },
];

pub fn questions(kind: PlanKind) -> &'static [Question] {
    match kind {
        PlanKind::Workout => &WORKOUT_QUESTIONS,
        PlanKind::Nutrition => &NUTRITION_QUESTIONS,
    }
}

impl Question {
    pub fn options(&self) -> &'static [ChoiceOption] {
        match self.kind {
            AnswerKind::Choice(options) => options,
            AnswerKind::Number { .. } | AnswerKind::Text => &[],
        }
    }

    /// Human form of a stored answer: the option label for choices, the raw value
    /// otherwise.
    pub fn display_value(&self, value: &str) -> String {
        self.options()
            .iter()
            .find(|option| option.value == value)
            .map(|option| option.label.to_string())
            .unwrap_or_else(|| value.to_string())
    }

    /// Answer given by tapping a button. `None` for values this question never offers.
    pub fn accept_choice(&self, value: &str) -> Option<String> {
        self.options()
            .iter()
            .find(|option| option.value == value)
            .map(|option| option.value.to_string())
    }

    /// Answer typed as text. Choices match their value or label case-insensitively.
    pub fn accept_text(&self, raw: &str) -> Result<String, ValidationError> {
        let text = raw.trim();
        match self.kind {
            AnswerKind::Choice(options) => options
                .iter()
                .find(|option| {
                    option.value.eq_ignore_ascii_case(text)
                        || option.label.eq_ignore_ascii_case(text)
                })
                .map(|option| option.value.to_string())
                .ok_or_else(|| {
                    ValidationError::new(self.key, "Please pick one of the buttons below.")
                }),
            AnswerKind::Number { min, max } => {
                let invalid =
                    || ValidationError::new(self.key, format!("Send a number from {min} to {max}."));
                let value: u32 = text.parse().map_err(|_| invalid())?;
                if (min..=max).contains(&value) {
                    Ok(value.to_string())
                } else {
                    Err(invalid())
                }
            }
            AnswerKind::Text => validate_free_text(text, self.key),
        }
    }

    pub fn keyboard(&self, kind: PlanKind, step: usize) -> Option<Keyboard> {
        let options = self.options();
        if options.is_empty() {
            return None;
        }
        Some(Keyboard::single_column(options.iter().map(|option| {
            Button::new(
                option.label,
                CallbackAction::Plan(
                    kind,
                    PlanAction::Answer {
                        step,
                        value: option.value.to_string(),
                    },
                ),
            )
        })))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanStep {
    /// Stored preferences exist; waiting for reuse / question / restart.
    AwaitingEntryChoice,
    Question {
        index: usize,
        answers: BTreeMap<String, String>,
    },
    /// All answers collected; synthesis pending or failed.
    ReadyToGenerate { answers: BTreeMap<String, String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanState {
    pub kind: PlanKind,
    pub step: PlanStep,
}

impl PlanState {
    pub fn questionnaire(kind: PlanKind) -> Self {
        Self {
            kind,
            step: PlanStep::Question {
                index: 0,
                answers: BTreeMap::new(),
            },
        }
    }
}

/// Record the answer to question `index` and move to the next question, or to
/// `ReadyToGenerate` after the last one.
pub fn record_answer(
    kind: PlanKind,
    index: usize,
    mut answers: BTreeMap<String, String>,
    value: String,
) -> PlanState {
    let questions = questions(kind);
    answers.insert(questions[index].key.to_string(), value);
    let step = if index + 1 < questions.len() {
        PlanStep::Question {
            index: index + 1,
            answers,
        }
    } else {
        PlanStep::ReadyToGenerate { answers }
    };
    PlanState { kind, step }
}

pub fn flow_kind(kind: PlanKind) -> FlowKind {
    match kind {
        PlanKind::Workout => FlowKind::WorkoutPlan,
        PlanKind::Nutrition => FlowKind::NutritionPlan,
    }
}

pub fn plan_filename(kind: PlanKind) -> String {
    format!("{}_plan.md", kind.as_str())
}

fn entry_keyboard(kind: PlanKind) -> Keyboard {
    Keyboard::single_column([
        Button::new("✅ Yes, use them", CallbackAction::Plan(kind, PlanAction::Reuse)),
        Button::new(
            "❓ No, I have a question",
            CallbackAction::Plan(kind, PlanAction::OpenQuestion),
        ),
        Button::new("🔄 Start over", CallbackAction::Plan(kind, PlanAction::Restart)),
    ])
}

fn retry_keyboard(kind: PlanKind) -> Keyboard {
    Keyboard::single_column([
        Button::new("🔁 Generate again", CallbackAction::Plan(kind, PlanAction::Reuse)),
        Button::new("🔄 Start over", CallbackAction::Plan(kind, PlanAction::Restart)),
    ])
}

fn summarize_answers(kind: PlanKind, answers: &BTreeMap<String, String>) -> String {
    questions(kind)
        .iter()
        .filter_map(|question| {
            answers
                .get(question.key)
                .map(|answer| format!("• {} {}", question.prompt, question.display_value(answer)))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

impl FlowContext {
    fn plan_slots(&self, kind: PlanKind) -> &SlotMap<PlanState> {
        match kind {
            PlanKind::Workout => &self.sessions.workout_plan,
            PlanKind::Nutrition => &self.sessions.nutrition_plan,
        }
    }

    pub async fn start_plan(&self, party: Party, kind: PlanKind) -> Result<(), FlowError> {
        self.sessions
            .clear_except(party.user_id, flow_kind(kind))
            .await;
        let user_id = party.user_id;
        let stored = self
            .io
            .store(
                "get_plan_preferences",
                "Could not load your preferences right now. Please try again later.",
                move |store| async move { store.get_plan_preferences(user_id, kind).await },
            )
            .await?;

        match stored {
            Some(preferences) if !preferences.answers.is_empty() => {
                self.plan_slots(kind)
                    .set(
                        user_id,
                        PlanState {
                            kind,
                            step: PlanStep::AwaitingEntryChoice,
                        },
                    )
                    .await;
                let text = format!(
                    "Your saved preferences for the {}:\n{}\n\nUse them to build a new plan?",
                    kind.title(),
                    summarize_answers(kind, &preferences.answers)
                );
                self.say_with(party.chat_id, &text, &entry_keyboard(kind))
                    .await;
            }
            _ => {
                self.plan_slots(kind)
                    .set(user_id, PlanState::questionnaire(kind))
                    .await;
                self.ask_plan_question(party, kind, 0).await;
            }
        }
        Ok(())
    }

    async fn ask_plan_question(&self, party: Party, kind: PlanKind, index: usize) {
        let question = &questions(kind)[index];
        let text = format!(
            "Question {}/{}: {}",
            index + 1,
            questions(kind).len(),
            question.prompt
        );
        match question.keyboard(kind, index) {
            Some(keyboard) => self.say_with(party.chat_id, &text, &keyboard).await,
            None => self.say(party.chat_id, &text).await,
        }
    }

    pub async fn handle_plan_action(
        &self,
        party: Party,
        kind: PlanKind,
        action: PlanAction,
    ) -> Result<(), FlowError> {
        let slots = self.plan_slots(kind);
        let state = slots
            .get(party.user_id)
            .await
            .ok_or_else(|| FlowError::StaleReference(format!("no {} in progress", kind.title())))?;

        match (action, state.step) {
            (PlanAction::Reuse, PlanStep::AwaitingEntryChoice) => {
                let user_id = party.user_id;
                let stored = self
                    .io
                    .store(
                        "get_plan_preferences",
                        "Could not load your preferences right now. Please try again later.",
                        move |store| async move { store.get_plan_preferences(user_id, kind).await },
                    )
                    .await?
                    .ok_or_else(|| {
                        FlowError::StaleReference("stored preferences disappeared".to_string())
                    })?;
                self.generate_plan(party, kind, stored.answers).await
            }
            (PlanAction::Reuse, PlanStep::ReadyToGenerate { answers }) => {
                self.generate_plan(party, kind, answers).await
            }
            (PlanAction::OpenQuestion, PlanStep::AwaitingEntryChoice) => {
                slots.clear(party.user_id).await;
                self.start_question(party).await;
                Ok(())
            }
            (PlanAction::Restart, _) => {
                let user_id = party.user_id;
                self.io
                    .store(
                        "delete_plan_preferences",
                        "Could not reset your preferences right now. Please try again later.",
                        move |store| async move { store.delete_plan_preferences(user_id, kind).await },
                    )
                    .await?;
                slots.set(user_id, PlanState::questionnaire(kind)).await;
                self.ask_plan_question(party, kind, 0).await;
                Ok(())
            }
            (PlanAction::Answer { step, value }, PlanStep::Question { index, answers })
                if step == index =>
            {
                let value = questions(kind)[index].accept_choice(&value).ok_or_else(|| {
                    FlowError::StaleReference(format!("option '{value}' not offered at step {step}"))
                })?;
                self.advance_plan(party, kind, index, answers, value).await
            }
            (action, step) => Err(FlowError::StaleReference(format!(
                "{action:?} does not apply to {step:?}"
            ))),
        }
    }

    pub async fn handle_plan_text(
        &self,
        party: Party,
        kind: PlanKind,
        text: &str,
    ) -> Result<(), FlowError> {
        let state = self
            .plan_slots(kind)
            .get(party.user_id)
            .await
            .ok_or_else(|| FlowError::StaleReference(format!("no {} in progress", kind.title())))?;

        match state.step {
            PlanStep::AwaitingEntryChoice => {
                self.say_with(
                    party.chat_id,
                    "Please choose one of the options below.",
                    &entry_keyboard(kind),
                )
                .await;
                Ok(())
            }
            PlanStep::Question { index, answers } => {
                match questions(kind)[index].accept_text(text) {
                    Ok(value) => self.advance_plan(party, kind, index, answers, value).await,
                    Err(invalid) => {
                        self.say(party.chat_id, &invalid.message).await;
                        self.ask_plan_question(party, kind, index).await;
                        Ok(())
                    }
                }
            }
            PlanStep::ReadyToGenerate { .. } => {
                self.say_with(
                    party.chat_id,
                    "Your answers are saved. Tap below to generate the plan.",
                    &retry_keyboard(kind),
                )
                .await;
                Ok(())
            }
        }
    }

    async fn advance_plan(
        &self,
        party: Party,
        kind: PlanKind,
        index: usize,
        answers: BTreeMap<String, String>,
        value: String,
    ) -> Result<(), FlowError> {
        let next = record_answer(kind, index, answers, value);
        match next.step {
            PlanStep::Question { index, .. } => {
                self.plan_slots(kind).set(party.user_id, next).await;
                self.ask_plan_question(party, kind, index).await;
                Ok(())
            }
            PlanStep::ReadyToGenerate { answers } => {
                self.generate_plan(party, kind, answers).await
            }
            PlanStep::AwaitingEntryChoice => Err(FlowError::InternalInconsistency(
                "questionnaire returned to the entry choice".to_string(),
            )),
        }
    }

    async fn generate_plan(
        &self,
        party: Party,
        kind: PlanKind,
        answers: BTreeMap<String, String>,
    ) -> Result<(), FlowError> {
        let user_id = party.user_id;
        self.plan_slots(kind)
            .set(
                user_id,
                PlanState {
                    kind,
                    step: PlanStep::ReadyToGenerate {
                        answers: answers.clone(),
                    },
                },
            )
            .await;
        self.say(
            party.chat_id,
            &format!("Generating your {}, this can take a minute…", kind.title()),
        )
        .await;
        self.typing(party.chat_id).await;

        let profile: Option<Profile> = self
            .io
            .store("get_profile", "", move |store| async move {
                store.get_profile(user_id).await
            })
            .await
            .ok()
            .flatten();
        let user_prompt = prompts::plan_user_prompt(kind, &answers, profile.as_ref());
        let max_tokens = self.config.plan_max_tokens;
        let synthesized = self
            .io
            .completion(
                "plan_synthesis",
                self.io.budgets.plan,
                "",
                move |completion| async move {
                    completion
                        .complete(prompts::plan_system_prompt(kind), &user_prompt, max_tokens)
                        .await
                },
            )
            .await;
        let plan = match synthesized {
            Ok(plan) if !plan.trim().is_empty() => plan,
            other => {
                if other.is_ok() {
                    tracing::warn!(user_id, kind = kind.as_str(), "plan synthesis returned empty text");
                }
                self.say_with(
                    party.chat_id,
                    &format!(
                        "Could not generate your {} right now. Your answers are kept, tap below to try again.",
                        kind.title()
                    ),
                    &retry_keyboard(kind),
                )
                .await;
                return Ok(());
            }
        };

        let preferences = PlanPreferences {
            user_id,
            kind,
            answers,
        };
        if let Err(failure) = self
            .io
            .store("save_plan_preferences", "", move |store| async move {
                store.save_plan_preferences(&preferences).await
            })
            .await
        {
            tracing::warn!(user_id, operation = failure.operation, "plan delivered without saving preferences");
        }

        let document = OutgoingDocument {
            filename: plan_filename(kind),
            content: plan.into_bytes(),
            caption: Some(format!("Your {} is ready!", kind.title())),
        };
        let chat_id = party.chat_id;
        let delivered = self
            .io
            .transport("send_document", move |messenger| async move {
                messenger.send_document(chat_id, &document).await
            })
            .await;
        if delivered.is_err() {
            self.say_with(
                party.chat_id,
                &format!("Could not deliver your {}. Tap below to try again.", kind.title()),
                &retry_keyboard(kind),
            )
            .await;
            return Ok(());
        }

        self.plan_slots(kind).clear(user_id).await;
        Ok(())
    }
}
