//! Entry point for inbound chat events.
//!
//! Order per event: rate limit, per-user gate, callback acknowledgement, then
//! commands, button callbacks, the active slot in routing order, and finally the
//! menu hint. Each event is handled inside its own task so a panic in a handler is
//! logged and answered instead of taking the caller down.

use std::sync::Arc;

use chrono::Utc;

use crate::callback::{CallbackAction, ChallengeAction, MenuItem, ProfileAction};
use crate::domain::PlanKind;
use crate::error::FlowError;
use crate::events::InboundEvent;
use crate::flows::plan;
use crate::flows::registration::StepInput;
use crate::flows::{FlowContext, Party};
use crate::rate_limit::RateLimiter;
use crate::session::{FlowKind, UserGate};
use crate::MessageId;

pub const HELP_TEXT: &str = "I can help you with:\n\
/add - log a meal (or just send a photo of it)\n\
/water - log water\n\
/steps - log steps\n\
/report - today's summary\n\
/workout - personal workout plan\n\
/nutrition - personal nutrition plan\n\
/ask - ask a health question\n\
/medical - analyze symptoms or test results\n\
/challenge - this week's challenge\n\
/profile - view or edit your profile\n\
/cancel - stop the current action\n\
/start - start over";

const THROTTLED_TEXT: &str = "You are sending messages too fast. Please wait a minute.";
const UNEXPECTED_TEXT: &str = "Something went wrong on our side. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Menu,
    Cancel,
    Help,
    Profile,
    Report,
    Water,
    Steps,
    Add,
    Workout,
    Nutrition,
    Ask,
    Medical,
    Challenge,
}

impl Command {
    /// Parse `/name`, `/name@bot` and `/name payload`. `None` for plain text and
    /// unknown commands.
    pub fn parse(text: &str) -> Option<Self> {
        let word = text.trim().strip_prefix('/')?.split_whitespace().next()?;
        let name = word.split('@').next().unwrap_or(word).to_ascii_lowercase();
        Some(match name.as_str() {
            "start" => Command::Start,
            "menu" => Command::Menu,
            "cancel" => Command::Cancel,
            "help" => Command::Help,
            "profile" => Command::Profile,
            "report" | "today" => Command::Report,
            "water" => Command::Water,
            "steps" => Command::Steps,
            "add" | "meal" => Command::Add,
            "workout" => Command::Workout,
            "nutrition" => Command::Nutrition,
            "ask" | "question" => Command::Ask,
            "medical" => Command::Medical,
            "challenge" => Command::Challenge,
            _ => return None,
        })
    }
}

impl From<MenuItem> for Command {
    fn from(item: MenuItem) -> Self {
        match item {
            MenuItem::AddMeal => Command::Add,
            MenuItem::Water => Command::Water,
            MenuItem::Steps => Command::Steps,
            MenuItem::Workout => Command::Workout,
            MenuItem::Nutrition => Command::Nutrition,
            MenuItem::Profile => Command::Profile,
            MenuItem::Report => Command::Report,
            MenuItem::Question => Command::Ask,
            MenuItem::Medical => Command::Medical,
            MenuItem::Challenge => Command::Challenge,
        }
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    ctx: Arc<FlowContext>,
    limiter: Arc<RateLimiter>,
    gate: Arc<UserGate>,
}

impl Dispatcher {
    pub fn new(ctx: Arc<FlowContext>) -> Self {
        let limiter = RateLimiter::new(ctx.config.rate_limit_ceiling, ctx.config.rate_limit_window);
        Self {
            ctx,
            limiter: Arc::new(limiter),
            gate: Arc::new(UserGate::default()),
        }
    }

    pub fn context(&self) -> &Arc<FlowContext> {
        &self.ctx
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn gate(&self) -> &Arc<UserGate> {
        &self.gate
    }

    pub async fn dispatch(&self, event: InboundEvent) {
        let party = Party {
            user_id: event.user_id(),
            chat_id: event.chat_id(),
        };
        if !self.limiter.admit(party.user_id).await {
            self.reject(&event, party).await;
            return;
        }

        let _turn = self.gate.acquire(party.user_id).await;
        let kind = event.kind();
        tracing::debug!(user_id = party.user_id, kind, "dispatching event");

        let this = self.clone();
        let handled = tokio::spawn(async move { this.route(party, event).await }).await;
        if let Err(err) = handled {
            tracing::error!(
                user_id = party.user_id,
                kind,
                error = %err,
                "event handler panicked"
            );
            self.ctx.say(party.chat_id, UNEXPECTED_TEXT).await;
        }
    }

    async fn reject(&self, event: &InboundEvent, party: Party) {
        if let InboundEvent::Callback { callback_id, .. } = event {
            self.acknowledge(callback_id, Some(THROTTLED_TEXT)).await;
        }
        tracing::info!(
            user_id = party.user_id,
            kind = event.kind(),
            "event rejected by rate limiter"
        );
        if self
            .limiter
            .take_rejection_notice(party.user_id, Utc::now())
            .await
        {
            self.ctx.say(party.chat_id, THROTTLED_TEXT).await;
        }
    }

    async fn acknowledge(&self, callback_id: &str, text: Option<&str>) {
        let callback_id = callback_id.to_string();
        let text = text.map(str::to_string);
        let _ = self
            .ctx
            .io
            .transport("answer_callback", move |messenger| async move {
                messenger
                    .answer_callback(&callback_id, text.as_deref())
                    .await
            })
            .await;
    }

    async fn route(&self, party: Party, event: InboundEvent) {
        let ctx = &self.ctx;
        match event {
            InboundEvent::Text { text, .. } => self.route_text(party, &text).await,
            InboundEvent::Callback {
                message_id,
                callback_id,
                data,
                ..
            } => {
                self.acknowledge(&callback_id, None).await;
                self.route_callback(party, message_id, &data).await;
            }
            InboundEvent::Voice { file_ref, .. } => {
                match ctx.transcribe_voice(party, &file_ref).await {
                    Ok(Some(transcript)) => self.route_text(party, &transcript).await,
                    Ok(None) => {}
                    Err(err) => ctx.report_failure(party, None, err).await,
                }
            }
            InboundEvent::Photo { file_ref, .. } => {
                if let Err(err) = ctx.handle_photo(party, &file_ref).await {
                    ctx.report_failure(party, None, err).await;
                }
            }
            InboundEvent::Document {
                file_ref,
                mime_type,
                file_name,
                ..
            } => {
                if let Err(err) = ctx
                    .handle_document(party, &file_ref, mime_type.as_deref(), file_name.as_deref())
                    .await
                {
                    ctx.report_failure(party, None, err).await;
                }
            }
        }
    }

    async fn route_text(&self, party: Party, text: &str) {
        if let Some(command) = Command::parse(text) {
            if let Err(err) = self.run_command(party, command).await {
                self.ctx.report_failure(party, None, err).await;
            }
            return;
        }

        let ctx = &self.ctx;
        let flow = ctx.sessions.active_flow(party.user_id).await;
        let result = match flow {
            Some(FlowKind::Registration) => {
                ctx.handle_registration(party, StepInput::Text(text)).await
            }
            Some(FlowKind::ProfileEdit) => ctx.handle_profile_edit_text(party, text).await,
            Some(FlowKind::ManualAdd) => ctx.handle_manual_add_text(party, text).await,
            Some(FlowKind::WorkoutPlan) => {
                ctx.handle_plan_text(party, PlanKind::Workout, text).await
            }
            Some(FlowKind::NutritionPlan) => {
                ctx.handle_plan_text(party, PlanKind::Nutrition, text).await
            }
            Some(FlowKind::WaterWait) => ctx.handle_water_text(party, text).await,
            Some(FlowKind::StepsWait) => ctx.handle_steps_text(party, text).await,
            Some(FlowKind::MedicalWait) => ctx.handle_medical_text(party, text).await,
            Some(FlowKind::QuestionWait) => ctx.handle_question_text(party, text).await,
            None => {
                ctx.show_menu(party.chat_id, "Choose an action below or send /help.")
                    .await;
                Ok(())
            }
        };
        if let Err(err) = result {
            ctx.report_failure(party, flow, err).await;
        }
    }

    /// A stale button clears the slot of the flow it belongs to; any other failure
    /// keeps every slot.
    async fn route_callback(&self, party: Party, message_id: MessageId, data: &str) {
        let ctx = &self.ctx;
        let action = match CallbackAction::decode(data) {
            Ok(action) => action,
            Err(err) => {
                tracing::warn!(user_id = party.user_id, data, error = %err, "undecodable callback");
                ctx.show_menu(
                    party.chat_id,
                    "This button is no longer supported. Please use the menu.",
                )
                .await;
                return;
            }
        };

        let flow = owning_flow(&action);
        let result = match action {
            CallbackAction::Registration(choice) => {
                ctx.handle_registration(party, StepInput::Choice(choice)).await
            }
            CallbackAction::Meal(action) => ctx.handle_meal_action(party, message_id, action).await,
            CallbackAction::Water(action) => ctx.handle_water_action(party, action).await,
            CallbackAction::Steps(action) => {
                ctx.handle_steps_action(party, action).await;
                Ok(())
            }
            CallbackAction::Plan(kind, action) => ctx.handle_plan_action(party, kind, action).await,
            CallbackAction::Profile(ProfileAction::Show) => ctx.show_profile(party).await,
            CallbackAction::Profile(ProfileAction::Edit(field)) => {
                ctx.start_profile_edit(party, field).await
            }
            CallbackAction::Challenge(ChallengeAction::Join(id)) => {
                ctx.join_challenge(party, id).await
            }
            CallbackAction::Menu(item) => self.run_command(party, item.into()).await,
        };
        if let Err(err) = result {
            ctx.report_failure(party, flow, err).await;
        }
    }

    async fn run_command(&self, party: Party, command: Command) -> Result<(), FlowError> {
        let ctx = &self.ctx;
        tracing::debug!(user_id = party.user_id, command = ?command, "command");
        match command {
            Command::Start => {
                ctx.sessions.clear_all(party.user_id).await;
                let user_id = party.user_id;
                let profile = ctx
                    .io
                    .store(
                        "get_profile",
                        "The service is temporarily unavailable. Please send /start again in a minute.",
                        move |store| async move { store.get_profile(user_id).await },
                    )
                    .await?;
                match profile {
                    Some(profile) => {
                        ctx.show_menu(party.chat_id, &format!("Welcome back, {}!", profile.name))
                            .await
                    }
                    None => ctx.start_registration(party).await,
                }
            }
            Command::Menu => ctx.show_menu(party.chat_id, "Main menu").await,
            Command::Cancel => {
                ctx.sessions.clear_all(party.user_id).await;
                ctx.show_menu(party.chat_id, "Cancelled.").await;
            }
            Command::Help => ctx.say(party.chat_id, HELP_TEXT).await,
            Command::Profile => ctx.show_profile(party).await?,
            Command::Report => ctx.show_today_report(party).await?,
            Command::Water => ctx.show_water_menu(party).await,
            Command::Steps => ctx.start_steps_input(party).await,
            Command::Add => ctx.start_manual_add(party).await,
            Command::Workout => ctx.start_plan(party, PlanKind::Workout).await?,
            Command::Nutrition => ctx.start_plan(party, PlanKind::Nutrition).await?,
            Command::Ask => ctx.start_question(party).await,
            Command::Medical => ctx.start_medical(party).await,
            Command::Challenge => ctx.show_challenge(party).await?,
        }
        Ok(())
    }
}

/// Slot a button was issued for. Meal buttons release their own slot by token.
fn owning_flow(action: &CallbackAction) -> Option<FlowKind> {
    match action {
        CallbackAction::Registration(_) => Some(FlowKind::Registration),
        CallbackAction::Plan(kind, _) => Some(plan::flow_kind(*kind)),
        _ => None,
    }
}
