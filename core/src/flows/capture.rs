//! Single-answer flows: one prompt, one reply, slot cleared on success.

use chrono::Utc;

use crate::callback::{CallbackAction, StepsAction, WaterAction};
use crate::collaborators::{Button, Keyboard};
use crate::domain::Profile;
use crate::error::FlowError;
use crate::prompts::{MEDICAL_DISCLAIMER, MEDICAL_SYSTEM, QUESTION_SYSTEM, question_user_prompt};
use crate::session::FlowKind;
use crate::validate::{parse_water_ml, validate_free_text, validate_steps};

use super::{FlowContext, Party};

const WATER_FALLBACK: &str = "Could not record the water right now. Please try again.";
const STEPS_FALLBACK: &str = "Could not record your steps right now. Please send them again.";
const ANSWER_FALLBACK: &str =
    "Could not get an answer right now. Please send your question again in a minute.";

impl FlowContext {
    pub async fn show_water_menu(&self, party: Party) {
        let presets = self.config.water_presets.iter().map(|ml| {
            Button::new(
                format!("+{ml} ml"),
                CallbackAction::Water(WaterAction::Add(*ml)),
            )
        });
        let keyboard = Keyboard::default().row(presets).row([Button::new(
            "✏️ Other amount",
            CallbackAction::Water(WaterAction::Custom),
        )]);
        self.say_with(party.chat_id, "💧 How much water did you drink?", &keyboard)
            .await;
    }

    pub async fn start_water_input(&self, party: Party) {
        self.sessions
            .clear_except(party.user_id, FlowKind::WaterWait)
            .await;
        self.sessions.water_wait.set(party.user_id, ()).await;
        self.say(party.chat_id, "Send the amount, for example 300 or 0.5 l.")
            .await;
    }

    pub async fn handle_water_action(&self, party: Party, action: WaterAction) -> Result<(), FlowError> {
        match action {
            WaterAction::Add(ml) => self.record_water(party, ml).await,
            WaterAction::Custom => {
                self.start_water_input(party).await;
                Ok(())
            }
        }
    }

    pub async fn handle_water_text(&self, party: Party, text: &str) -> Result<(), FlowError> {
        match parse_water_ml(text) {
            Ok(ml) => {
                self.record_water(party, ml).await?;
                self.sessions.water_wait.clear(party.user_id).await;
                Ok(())
            }
            Err(invalid) => {
                self.say(party.chat_id, &invalid.message).await;
                Ok(())
            }
        }
    }

    /// One independent write per call; repeated taps add repeatedly.
    async fn record_water(&self, party: Party, ml: u32) -> Result<(), FlowError> {
        let user_id = party.user_id;
        let at = Utc::now();
        self.io
            .store("add_water", WATER_FALLBACK, move |store| async move {
                store.add_water(user_id, ml, at).await
            })
            .await?;
        let text = match self.today_water_total(party).await {
            Some(total) => format!("💧 +{ml} ml. Today: {total} ml."),
            None => format!("💧 +{ml} ml."),
        };
        self.say(party.chat_id, &text).await;
        Ok(())
    }

    async fn today_water_total(&self, party: Party) -> Option<u32> {
        let user_id = party.user_id;
        let today = self.today();
        let timezone = self.config.timezone;
        self.io
            .store("daily_summary", "", move |store| async move {
                store.daily_summary(user_id, today, timezone).await
            })
            .await
            .ok()
            .map(|summary| summary.water_ml)
    }

    pub async fn start_steps_input(&self, party: Party) {
        self.sessions
            .clear_except(party.user_id, FlowKind::StepsWait)
            .await;
        self.sessions.steps_wait.set(party.user_id, ()).await;
        self.say(party.chat_id, "👣 How many steps did you walk today?")
            .await;
    }

    pub async fn handle_steps_action(&self, party: Party, action: StepsAction) {
        match action {
            StepsAction::Custom => self.start_steps_input(party).await,
        }
    }

    pub async fn handle_steps_text(&self, party: Party, text: &str) -> Result<(), FlowError> {
        let steps = match validate_steps(text) {
            Ok(steps) => steps,
            Err(invalid) => {
                self.say(party.chat_id, &invalid.message).await;
                return Ok(());
            }
        };
        let user_id = party.user_id;
        let at = Utc::now();
        self.io
            .store("add_steps", STEPS_FALLBACK, move |store| async move {
                store.add_steps(user_id, steps, at).await
            })
            .await?;
        self.sessions.steps_wait.clear(user_id).await;
        self.say(party.chat_id, &format!("👣 {steps} steps recorded."))
            .await;
        Ok(())
    }

    pub async fn start_question(&self, party: Party) {
        self.sessions
            .clear_except(party.user_id, FlowKind::QuestionWait)
            .await;
        self.sessions.question_wait.set(party.user_id, ()).await;
        self.say(party.chat_id, "❓ What would you like to ask?").await;
    }

    pub async fn handle_question_text(&self, party: Party, text: &str) -> Result<(), FlowError> {
        let question = match validate_free_text(text, "question") {
            Ok(question) => question,
            Err(invalid) => {
                self.say(party.chat_id, &invalid.message).await;
                return Ok(());
            }
        };
        self.typing(party.chat_id).await;
        let profile = self.profile_for_prompt(party).await;
        let prompt = question_user_prompt(&question, profile.as_ref());
        let max_tokens = self.config.completion_max_tokens;
        let answer = self
            .io
            .completion(
                "answer_question",
                self.io.budgets.completion,
                ANSWER_FALLBACK,
                move |completion| async move {
                    completion.complete(QUESTION_SYSTEM, &prompt, max_tokens).await
                },
            )
            .await?;
        self.sessions.question_wait.clear(party.user_id).await;
        self.say_markdown(party.chat_id, &answer, None).await;
        Ok(())
    }

    pub async fn start_medical(&self, party: Party) {
        self.sessions
            .clear_except(party.user_id, FlowKind::MedicalWait)
            .await;
        self.sessions.medical_wait.set(party.user_id, ()).await;
        self.say(
            party.chat_id,
            "🩺 Describe your symptoms or send a photo or file of your test results.",
        )
        .await;
    }

    pub async fn handle_medical_text(&self, party: Party, text: &str) -> Result<(), FlowError> {
        let request = match validate_free_text(text, "medical") {
            Ok(request) => request,
            Err(invalid) => {
                self.say(party.chat_id, &invalid.message).await;
                return Ok(());
            }
        };
        self.typing(party.chat_id).await;
        let profile = self.profile_for_prompt(party).await;
        let prompt = question_user_prompt(&request, profile.as_ref());
        let max_tokens = self.config.completion_max_tokens;
        let answer = self
            .io
            .completion(
                "medical_analysis",
                self.io.budgets.completion,
                ANSWER_FALLBACK,
                move |completion| async move {
                    completion.complete(MEDICAL_SYSTEM, &prompt, max_tokens).await
                },
            )
            .await?;
        self.deliver_medical_answer(party, &answer).await;
        Ok(())
    }

    pub(super) async fn deliver_medical_answer(&self, party: Party, answer: &str) {
        self.sessions.medical_wait.clear(party.user_id).await;
        self.say_markdown(
            party.chat_id,
            &format!("{answer}\n\n{MEDICAL_DISCLAIMER}"),
            None,
        )
        .await;
    }

    /// Profile used to personalize prompts. Missing or unavailable is not an error.
    pub(super) async fn profile_for_prompt(&self, party: Party) -> Option<Profile> {
        let user_id = party.user_id;
        self.io
            .store("get_profile", "", move |store| async move {
                store.get_profile(user_id).await
            })
            .await
            .ok()
            .flatten()
    }
}
