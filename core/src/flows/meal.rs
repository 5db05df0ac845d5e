//! Meal capture: the user describes a meal (or sends a photo), the completion
//! service estimates it, and the estimate is held behind a confirmation token until
//! the user confirms or cancels. A token is consumed at most once.

use chrono::Utc;
use uuid::Uuid;

use crate::callback::{CallbackAction, MealAction};
use crate::collaborators::{Button, Keyboard};
use crate::domain::{MealEstimate, MealRecord, MealSource};
use crate::error::FlowError;
use crate::nutrition::parse_meal_estimate;
use crate::prompts::{MEAL_PHOTO_PROMPT, MEAL_RECOGNITION_SYSTEM};
use crate::session::FlowKind;
use crate::validate::validate_free_text;
use crate::MessageId;

use super::{FlowContext, Party, main_menu};

const RECOGNITION_FALLBACK: &str =
    "Could not recognize the meal right now. Please try again in a minute.";
const SAVE_FALLBACK: &str = "Could not save the meal. Tap confirm to try again.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManualAddState {
    AwaitingInput,
    AwaitingConfirmation { token: String },
}

/// Estimate waiting for the user's confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMeal {
    pub id: Uuid,
    pub description: String,
    pub estimate: MealEstimate,
    pub source: MealSource,
}

pub fn render_estimate(estimate: &MealEstimate) -> String {
    format!(
        "🍽 {}\nCalories: {:.0} kcal\nProtein: {:.1} g\nFat: {:.1} g\nCarbs: {:.1} g",
        estimate.name, estimate.calories, estimate.protein, estimate.fat, estimate.carbs
    )
}

fn confirmation_keyboard(token: &str) -> Keyboard {
    Keyboard::default().row([
        Button::new(
            "✅ Save",
            CallbackAction::Meal(MealAction::Confirm(token.to_string())),
        ),
        Button::new(
            "❌ Cancel",
            CallbackAction::Meal(MealAction::Cancel(token.to_string())),
        ),
    ])
}

impl FlowContext {
    pub async fn start_manual_add(&self, party: Party) {
        self.sessions
            .clear_except(party.user_id, FlowKind::ManualAdd)
            .await;
        self.sessions
            .manual_add
            .set(party.user_id, ManualAddState::AwaitingInput)
            .await;
        self.say(
            party.chat_id,
            "Describe what you ate, for example: \"oatmeal with banana, 300 g\".",
        )
        .await;
    }

    pub async fn handle_manual_add_text(&self, party: Party, text: &str) -> Result<(), FlowError> {
        let state = self
            .sessions
            .manual_add
            .get(party.user_id)
            .await
            .ok_or_else(|| FlowError::StaleReference("no meal entry in progress".to_string()))?;

        match state {
            ManualAddState::AwaitingConfirmation { .. } => {
                self.say(
                    party.chat_id,
                    "Please save or cancel the meal above first, or send /cancel.",
                )
                .await;
                Ok(())
            }
            ManualAddState::AwaitingInput => {
                let description = match validate_free_text(text, "meal") {
                    Ok(description) => description,
                    Err(invalid) => {
                        self.say(party.chat_id, &invalid.message).await;
                        return Ok(());
                    }
                };
                self.typing(party.chat_id).await;
                let estimate = self.recognize_meal_text(&description).await?;
                self.propose_meal(
                    party,
                    PendingMeal {
                        id: Uuid::now_v7(),
                        description,
                        estimate,
                        source: MealSource::Manual,
                    },
                )
                .await;
                Ok(())
            }
        }
    }

    /// Meal photo outside any flow: estimate and propose, no slot involved.
    pub async fn handle_meal_photo(&self, party: Party, image: Vec<u8>) -> Result<(), FlowError> {
        let max_tokens = self.config.completion_max_tokens;
        let raw = self
            .io
            .completion(
                "meal_photo_recognition",
                self.io.budgets.completion,
                RECOGNITION_FALLBACK,
                move |completion| async move {
                    completion
                        .describe_image(
                            MEAL_RECOGNITION_SYSTEM,
                            MEAL_PHOTO_PROMPT,
                            image,
                            "image/jpeg",
                            max_tokens,
                        )
                        .await
                },
            )
            .await?;
        let estimate = parse_estimate(&raw)?;
        self.propose_meal(
            party,
            PendingMeal {
                id: Uuid::now_v7(),
                description: estimate.name.clone(),
                estimate,
                source: MealSource::Photo,
            },
        )
        .await;
        Ok(())
    }

    async fn recognize_meal_text(&self, description: &str) -> Result<MealEstimate, FlowError> {
        let max_tokens = self.config.completion_max_tokens;
        let description = description.to_string();
        let raw = self
            .io
            .completion(
                "meal_recognition",
                self.io.budgets.completion,
                RECOGNITION_FALLBACK,
                move |completion| async move {
                    completion
                        .complete(MEAL_RECOGNITION_SYSTEM, &description, max_tokens)
                        .await
                },
            )
            .await?;
        parse_estimate(&raw)
    }

    /// Issue a token for `pending` and show the estimate with save/cancel buttons.
    /// Manual entries also park the token in the manual-add slot.
    async fn propose_meal(&self, party: Party, pending: PendingMeal) {
        let text = render_estimate(&pending.estimate);
        let source = pending.source;
        let token = self.confirmations.issue(party.user_id, pending).await;
        if source == MealSource::Manual {
            self.sessions
                .manual_add
                .set(
                    party.user_id,
                    ManualAddState::AwaitingConfirmation {
                        token: token.clone(),
                    },
                )
                .await;
        }
        self.say_with(party.chat_id, &text, &confirmation_keyboard(&token))
            .await;
    }

    async fn release_manual_slot(&self, party: Party, token: &str) {
        if let Some(ManualAddState::AwaitingConfirmation { token: parked }) =
            self.sessions.manual_add.get(party.user_id).await
            && parked == token
        {
            self.sessions.manual_add.clear(party.user_id).await;
        }
    }

    pub async fn handle_meal_action(
        &self,
        party: Party,
        message_id: MessageId,
        action: MealAction,
    ) -> Result<(), FlowError> {
        match action {
            MealAction::Confirm(token) => self.confirm_meal(party, message_id, &token).await,
            MealAction::Cancel(token) => {
                let consumed = self.confirmations.consume(party.user_id, &token).await;
                self.release_manual_slot(party, &token).await;
                consumed.map_err(|_| {
                    FlowError::StaleReference("meal confirmation token not found".to_string())
                })?;
                self.edit(party.chat_id, message_id, "Meal discarded.", None)
                    .await;
                Ok(())
            }
        }
    }

    async fn confirm_meal(
        &self,
        party: Party,
        message_id: MessageId,
        token: &str,
    ) -> Result<(), FlowError> {
        let pending = match self.confirmations.consume(party.user_id, token).await {
            Ok(pending) => pending,
            Err(_) => {
                self.release_manual_slot(party, token).await;
                return Err(FlowError::StaleReference(
                    "meal confirmation token not found".to_string(),
                ));
            }
        };

        let record = MealRecord {
            id: pending.id,
            user_id: party.user_id,
            description: pending.description.clone(),
            estimate: pending.estimate.clone(),
            source: pending.source,
            eaten_at: Utc::now(),
        };
        let saved = self
            .io
            .store("insert_meal", SAVE_FALLBACK, move |store| async move {
                store.insert_meal(&record).await
            })
            .await;

        match saved {
            Ok(()) => {
                self.release_manual_slot(party, token).await;
                let text = format!("✅ Saved.\n{}", render_estimate(&pending.estimate));
                self.edit(party.chat_id, message_id, &text, None).await;
                self.show_menu(party.chat_id, "What's next?").await;
                Ok(())
            }
            Err(failure) => {
                // The old token is spent; park the payload under a fresh one. A timed-out
                // insert may still land, so the retry reuses the meal id.
                let source = pending.source;
                let fresh = self.confirmations.issue(party.user_id, pending).await;
                if source == MealSource::Manual {
                    self.sessions
                        .manual_add
                        .set(
                            party.user_id,
                            ManualAddState::AwaitingConfirmation {
                                token: fresh.clone(),
                            },
                        )
                        .await;
                }
                self.say_with(party.chat_id, &failure.fallback, &confirmation_keyboard(&fresh))
                    .await;
                Ok(())
            }
        }
    }
}

fn parse_estimate(raw: &str) -> Result<MealEstimate, FlowError> {
    parse_meal_estimate(raw).map_err(|detail| {
        tracing::warn!(detail = %detail, "meal estimate could not be parsed");
        FlowError::CollaboratorFailure {
            operation: "meal_recognition",
            fallback: "Could not recognize the meal. Please describe it in more detail.".to_string(),
        }
    })
}
