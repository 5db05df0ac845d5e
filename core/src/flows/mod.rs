//! Dialogue flows. Every flow is a transition table over named steps plus a handful
//! of async handlers on [`FlowContext`] that perform the side effects of a step.
//!
//! Handlers return `Err(FlowError)` only for failures the dispatcher must report;
//! validation errors are answered with a re-prompt inside the handler.

pub mod capture;
pub mod challenge;
pub mod meal;
pub mod media;
pub mod plan;
pub mod profile;
pub mod registration;

use chrono::{NaiveDate, Utc};

use crate::callback::{CallbackAction, MenuItem};
use crate::collaborators::{Button, Collaborators, Keyboard, TextFormat};
use crate::config::OrchestratorConfig;
use crate::confirmation::ConfirmationCache;
use crate::error::FlowError;
use crate::session::{FlowKind, SessionStore};
use crate::{ChatId, MessageId, UserId};

use self::meal::PendingMeal;

/// Who an event came from and where to answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Party {
    pub user_id: UserId,
    pub chat_id: ChatId,
}

pub struct FlowContext {
    pub io: Collaborators,
    pub sessions: SessionStore,
    pub confirmations: ConfirmationCache<PendingMeal>,
    pub config: OrchestratorConfig,
}

impl FlowContext {
    pub fn new(io: Collaborators, config: OrchestratorConfig) -> Self {
        Self {
            io,
            sessions: SessionStore::default(),
            confirmations: ConfirmationCache::new(config.confirmation_ttl),
            config,
        }
    }

    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.config.timezone).date_naive()
    }

    pub async fn say(&self, chat_id: ChatId, text: &str) {
        self.send(chat_id, text, TextFormat::Plain, None).await;
    }

    pub async fn say_with(&self, chat_id: ChatId, text: &str, keyboard: &Keyboard) {
        self.send(chat_id, text, TextFormat::Plain, Some(keyboard)).await;
    }

    pub async fn say_markdown(&self, chat_id: ChatId, text: &str, keyboard: Option<&Keyboard>) {
        self.send(chat_id, text, TextFormat::Markdown, keyboard).await;
    }

    /// Send one message. Delivery failures are logged by the transport wrapper;
    /// there is no other channel to report them on.
    pub async fn send(
        &self,
        chat_id: ChatId,
        text: &str,
        format: TextFormat,
        keyboard: Option<&Keyboard>,
    ) -> Option<MessageId> {
        let text = text.to_string();
        let keyboard = keyboard.cloned();
        self.io
            .transport("send_message", move |messenger| async move {
                messenger
                    .send_message(chat_id, &text, format, keyboard.as_ref())
                    .await
            })
            .await
            .ok()
    }

    pub async fn edit(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) {
        let text = text.to_string();
        let keyboard = keyboard.cloned();
        let _ = self
            .io
            .transport("edit_message", move |messenger| async move {
                messenger
                    .edit_message(chat_id, message_id, &text, keyboard.as_ref())
                    .await
            })
            .await;
    }

    pub async fn typing(&self, chat_id: ChatId) {
        let _ = self
            .io
            .transport("send_typing", move |messenger| async move {
                messenger.send_typing(chat_id).await
            })
            .await;
    }

    pub async fn show_menu(&self, chat_id: ChatId, text: &str) {
        self.say_with(chat_id, text, &main_menu()).await;
    }

    /// Turn a handler failure into its one user-visible message, clearing the slot
    /// of `flow` when the failure kind requires it.
    pub async fn report_failure(&self, party: Party, flow: Option<FlowKind>, err: FlowError) {
        match &err {
            FlowError::InternalInconsistency(detail) => tracing::error!(
                user_id = party.user_id,
                flow = flow.map(FlowKind::as_str),
                detail = %detail,
                "flow reached an inconsistent state"
            ),
            FlowError::StaleReference(detail) => tracing::info!(
                user_id = party.user_id,
                flow = flow.map(FlowKind::as_str),
                detail = %detail,
                "stale reference"
            ),
            other => tracing::warn!(
                user_id = party.user_id,
                flow = flow.map(FlowKind::as_str),
                error = %other,
                "flow step failed"
            ),
        }
        if err.clears_slot()
            && let Some(kind) = flow
        {
            self.sessions.clear(party.user_id, kind).await;
        }
        self.say(party.chat_id, &err.user_message()).await;
    }
}

pub fn main_menu() -> Keyboard {
    let button = |item: MenuItem| Button::new(item.label(), CallbackAction::Menu(item));
    Keyboard::default()
        .row([button(MenuItem::AddMeal), button(MenuItem::Report)])
        .row([button(MenuItem::Water), button(MenuItem::Steps)])
        .row([button(MenuItem::Workout), button(MenuItem::Nutrition)])
        .row([button(MenuItem::Question), button(MenuItem::Medical)])
        .row([button(MenuItem::Profile), button(MenuItem::Challenge)])
}
