//! Boundary contracts for the external services the orchestration layer depends on.
//!
//! Concrete adapters (Telegram, OpenAI-compatible completion, PostgreSQL) live in the
//! service crate; tests use the in-memory fakes from `testing`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use uuid::Uuid;

use crate::callback::CallbackAction;
use crate::domain::{
    Challenge, ChallengeMetric, DailySummary, DailyTargets, MealRecord, PlanKind,
    PlanPreferences, Profile, Recipient,
};
use crate::resilience::CallBudgets;
use crate::{ChatId, MessageId, UserId};

#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The platform answered and refused the request.
    #[error("chat platform rejected the request: {0}")]
    Api(String),
    #[error("chat platform unreachable: {0}")]
    Network(String),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CompletionError {
    #[error("completion service returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("completion service unreachable: {0}")]
    Network(String),
    #[error("completion service returned an unusable answer: {0}")]
    Malformed(String),
}

/// Store failures, split by who is at fault. Callers see one uniform failure; the
/// split only drives logging in `guarded_store_call`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The store answered with a logical error (constraint, missing row, bad data).
    #[error("store rejected the operation: {0}")]
    Rejected(String),
    /// The store could not be reached (network, pool exhausted, shut down).
    #[error("store unreachable: {0}")]
    Unreachable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub data: String,
}

impl Button {
    pub fn new(label: impl Into<String>, action: CallbackAction) -> Self {
        Self {
            label: label.into(),
            data: action.encode(),
        }
    }
}

/// Inline keyboard, row by row.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn single_column(buttons: impl IntoIterator<Item = Button>) -> Self {
        Self {
            rows: buttons.into_iter().map(|button| vec![button]).collect(),
        }
    }

    pub fn row(mut self, buttons: impl IntoIterator<Item = Button>) -> Self {
        self.rows.push(buttons.into_iter().collect());
        self
    }

    pub fn buttons(&self) -> impl Iterator<Item = &Button> {
        self.rows.iter().flatten()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    Plain,
    Markdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingDocument {
    pub filename: String,
    pub content: Vec<u8>,
    pub caption: Option<String>,
}

#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        format: TextFormat,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageId, TransportError>;

    async fn edit_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), TransportError>;

    async fn send_document(
        &self,
        chat_id: ChatId,
        document: &OutgoingDocument,
    ) -> Result<(), TransportError>;

    async fn send_typing(&self, chat_id: ChatId) -> Result<(), TransportError>;

    /// Must be called promptly for every callback event to clear the button spinner.
    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
    ) -> Result<(), TransportError>;

    async fn download_file(&self, file_ref: &str) -> Result<Vec<u8>, TransportError>;

    async fn probe(&self) -> Result<(), TransportError>;
}

#[async_trait]
pub trait Completion: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
    ) -> Result<String, CompletionError>;

    async fn describe_image(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        image: Vec<u8>,
        mime_type: &str,
        max_tokens: u32,
    ) -> Result<String, CompletionError>;

    async fn transcribe(&self, audio: Vec<u8>, filename: &str) -> Result<String, CompletionError>;

    async fn probe(&self) -> Result<(), CompletionError>;
}

#[async_trait]
pub trait HealthStore: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    async fn get_profile(&self, user_id: UserId) -> Result<Option<Profile>, StoreError>;
    async fn upsert_profile(&self, profile: &Profile) -> Result<(), StoreError>;
    async fn get_daily_targets(&self, user_id: UserId) -> Result<Option<DailyTargets>, StoreError>;
    async fn save_daily_targets(
        &self,
        user_id: UserId,
        targets: &DailyTargets,
    ) -> Result<(), StoreError>;
    async fn list_recipients(&self) -> Result<Vec<Recipient>, StoreError>;

    async fn insert_meal(&self, meal: &MealRecord) -> Result<(), StoreError>;
    async fn add_water(&self, user_id: UserId, ml: u32, at: DateTime<Utc>) -> Result<(), StoreError>;
    async fn add_steps(
        &self,
        user_id: UserId,
        steps: u32,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    async fn daily_summary(
        &self,
        user_id: UserId,
        date: NaiveDate,
        timezone: Tz,
    ) -> Result<DailySummary, StoreError>;

    async fn get_plan_preferences(
        &self,
        user_id: UserId,
        kind: PlanKind,
    ) -> Result<Option<PlanPreferences>, StoreError>;
    async fn save_plan_preferences(&self, preferences: &PlanPreferences) -> Result<(), StoreError>;
    async fn delete_plan_preferences(&self, user_id: UserId, kind: PlanKind)
    -> Result<(), StoreError>;

    async fn create_challenge(&self, challenge: &Challenge) -> Result<(), StoreError>;
    async fn current_challenge(&self, today: NaiveDate) -> Result<Option<Challenge>, StoreError>;
    /// Returns `false` when the user had already joined.
    async fn join_challenge(&self, challenge_id: Uuid, user_id: UserId) -> Result<bool, StoreError>;
    async fn challenge_participants(&self, challenge_id: Uuid)
    -> Result<Vec<Recipient>, StoreError>;
    async fn metric_total(
        &self,
        user_id: UserId,
        metric: ChallengeMetric,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError>;
}

/// Handles to every collaborator plus the time budgets for calling them.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn HealthStore>,
    pub completion: Arc<dyn Completion>,
    pub messenger: Arc<dyn Messenger>,
    pub budgets: CallBudgets,
}
