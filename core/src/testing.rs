//! In-memory collaborators for tests. Every fake records what it was asked to do.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use uuid::Uuid;

use crate::callback::CallbackAction;
use crate::collaborators::{
    Collaborators, Completion, CompletionError, HealthStore, Keyboard, Messenger,
    OutgoingDocument, StoreError, TextFormat, TransportError,
};
use crate::config::OrchestratorConfig;
use crate::dispatcher::Dispatcher;
use crate::domain::{
    ActivityLevel, Challenge, ChallengeMetric, DailySummary, DailyTargets, Gender, Goal,
    MealRecord, PlanKind, PlanPreferences, Profile, Recipient,
};
use crate::events::InboundEvent;
use crate::flows::FlowContext;
use crate::{ChatId, MessageId, UserId};

pub fn sample_profile(user_id: UserId) -> Profile {
    Profile {
        user_id,
        chat_id: user_id,
        name: "Ann".into(),
        gender: Gender::Female,
        age: 29,
        height_cm: 168.0,
        weight_kg: 62.0,
        goal: Goal::Maintain,
        activity_level: ActivityLevel::Moderate,
    }
}

#[derive(Default)]
pub struct FakeStore {
    calls: Mutex<Vec<&'static str>>,
    failing: Mutex<HashSet<&'static str>>,
    failing_users: Mutex<HashSet<UserId>>,
    delays: Mutex<HashMap<&'static str, Duration>>,
    profiles: Mutex<HashMap<UserId, Profile>>,
    targets: Mutex<HashMap<UserId, DailyTargets>>,
    meals: Mutex<Vec<MealRecord>>,
    water: Mutex<Vec<(UserId, u32, DateTime<Utc>)>>,
    steps: Mutex<Vec<(UserId, u32, DateTime<Utc>)>>,
    preferences: Mutex<HashMap<(UserId, PlanKind), PlanPreferences>>,
    challenges: Mutex<Vec<Challenge>>,
    participants: Mutex<Vec<(Uuid, UserId)>>,
}

impl FakeStore {
    fn record(&self, operation: &'static str) -> Result<(), StoreError> {
        self.calls.lock().unwrap().push(operation);
        if self.failing.lock().unwrap().contains(operation) {
            return Err(StoreError::Unreachable(format!("{operation} is down")));
        }
        Ok(())
    }

    fn record_for(&self, operation: &'static str, user_id: UserId) -> Result<(), StoreError> {
        self.record(operation)?;
        if self.failing_users.lock().unwrap().contains(&user_id) {
            return Err(StoreError::Rejected(format!("{operation} rejected for {user_id}")));
        }
        Ok(())
    }

    /// Hold `operation` for `delay` before it takes effect.
    pub fn delay(&self, operation: &'static str, delay: Duration) {
        self.delays.lock().unwrap().insert(operation, delay);
    }

    pub fn clear_delay(&self, operation: &'static str) {
        self.delays.lock().unwrap().remove(operation);
    }

    async fn pause(&self, operation: &'static str) {
        let delay = self.delays.lock().unwrap().get(operation).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    pub fn count(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| **call == operation)
            .count()
    }

    pub fn fail(&self, operation: &'static str) {
        self.failing.lock().unwrap().insert(operation);
    }

    pub fn recover(&self, operation: &'static str) {
        self.failing.lock().unwrap().remove(operation);
    }

    /// Every per-user read for this user is rejected.
    pub fn fail_user(&self, user_id: UserId) {
        self.failing_users.lock().unwrap().insert(user_id);
    }

    pub fn seed_profile(&self, profile: Profile) {
        self.profiles.lock().unwrap().insert(profile.user_id, profile);
    }

    pub fn seed_preferences(&self, preferences: PlanPreferences) {
        self.preferences
            .lock()
            .unwrap()
            .insert((preferences.user_id, preferences.kind), preferences);
    }

    pub fn seed_challenge(&self, challenge: Challenge) {
        self.challenges.lock().unwrap().push(challenge);
    }

    pub fn profile(&self, user_id: UserId) -> Option<Profile> {
        self.profiles.lock().unwrap().get(&user_id).cloned()
    }

    pub fn targets(&self, user_id: UserId) -> Option<DailyTargets> {
        self.targets.lock().unwrap().get(&user_id).copied()
    }

    pub fn preferences(&self, user_id: UserId, kind: PlanKind) -> Option<PlanPreferences> {
        self.preferences.lock().unwrap().get(&(user_id, kind)).cloned()
    }

    pub fn meals(&self) -> Vec<MealRecord> {
        self.meals.lock().unwrap().clone()
    }

    pub fn water_entries(&self, user_id: UserId) -> Vec<u32> {
        self.water
            .lock()
            .unwrap()
            .iter()
            .filter(|(user, _, _)| *user == user_id)
            .map(|(_, ml, _)| *ml)
            .collect()
    }

    pub fn challenges(&self) -> Vec<Challenge> {
        self.challenges.lock().unwrap().clone()
    }
}

#[async_trait]
impl HealthStore for FakeStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.record("ping")
    }

    async fn get_profile(&self, user_id: UserId) -> Result<Option<Profile>, StoreError> {
        self.record_for("get_profile", user_id)?;
        Ok(self.profile(user_id))
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<(), StoreError> {
        self.record("upsert_profile")?;
        self.seed_profile(profile.clone());
        Ok(())
    }

    async fn get_daily_targets(&self, user_id: UserId) -> Result<Option<DailyTargets>, StoreError> {
        self.record_for("get_daily_targets", user_id)?;
        Ok(self.targets(user_id))
    }

    async fn save_daily_targets(
        &self,
        user_id: UserId,
        targets: &DailyTargets,
    ) -> Result<(), StoreError> {
        self.record("save_daily_targets")?;
        self.targets.lock().unwrap().insert(user_id, *targets);
        Ok(())
    }

    async fn list_recipients(&self) -> Result<Vec<Recipient>, StoreError> {
        self.record("list_recipients")?;
        let mut recipients: Vec<Recipient> = self
            .profiles
            .lock()
            .unwrap()
            .values()
            .map(|profile| Recipient {
                user_id: profile.user_id,
                chat_id: profile.chat_id,
            })
            .collect();
        recipients.sort_by_key(|recipient| recipient.user_id);
        Ok(recipients)
    }

    async fn insert_meal(&self, meal: &MealRecord) -> Result<(), StoreError> {
        self.record("insert_meal")?;
        self.pause("insert_meal").await;
        let mut meals = self.meals.lock().unwrap();
        if !meals.iter().any(|stored| stored.id == meal.id) {
            meals.push(meal.clone());
        }
        Ok(())
    }

    async fn add_water(&self, user_id: UserId, ml: u32, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.record("add_water")?;
        self.pause("add_water").await;
        self.water.lock().unwrap().push((user_id, ml, at));
        Ok(())
    }

    async fn add_steps(&self, user_id: UserId, steps: u32, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.record("add_steps")?;
        if steps == 0 {
            return Err(StoreError::Rejected("steps must be positive".into()));
        }
        self.steps.lock().unwrap().push((user_id, steps, at));
        Ok(())
    }

    async fn daily_summary(
        &self,
        user_id: UserId,
        date: NaiveDate,
        _timezone: Tz,
    ) -> Result<DailySummary, StoreError> {
        self.record_for("daily_summary", user_id)?;
        let meals: Vec<MealRecord> = self
            .meals
            .lock()
            .unwrap()
            .iter()
            .filter(|meal| meal.user_id == user_id)
            .cloned()
            .collect();
        Ok(DailySummary {
            date: Some(date),
            meals: meals.len() as u32,
            calories: meals.iter().map(|m| m.estimate.calories).sum(),
            protein_g: meals.iter().map(|m| m.estimate.protein).sum(),
            fat_g: meals.iter().map(|m| m.estimate.fat).sum(),
            carbs_g: meals.iter().map(|m| m.estimate.carbs).sum(),
            water_ml: self.water_entries(user_id).iter().sum(),
            steps: self
                .steps
                .lock()
                .unwrap()
                .iter()
                .filter(|(user, _, _)| *user == user_id)
                .map(|(_, steps, _)| *steps)
                .sum(),
        })
    }

    async fn get_plan_preferences(
        &self,
        user_id: UserId,
        kind: PlanKind,
    ) -> Result<Option<PlanPreferences>, StoreError> {
        self.record("get_plan_preferences")?;
        Ok(self.preferences(user_id, kind))
    }

    async fn save_plan_preferences(&self, preferences: &PlanPreferences) -> Result<(), StoreError> {
        self.record("save_plan_preferences")?;
        self.seed_preferences(preferences.clone());
        Ok(())
    }

    async fn delete_plan_preferences(&self, user_id: UserId, kind: PlanKind) -> Result<(), StoreError> {
        self.record("delete_plan_preferences")?;
        self.preferences.lock().unwrap().remove(&(user_id, kind));
        Ok(())
    }

    async fn create_challenge(&self, challenge: &Challenge) -> Result<(), StoreError> {
        self.record("create_challenge")?;
        self.seed_challenge(challenge.clone());
        Ok(())
    }

    async fn current_challenge(&self, today: NaiveDate) -> Result<Option<Challenge>, StoreError> {
        self.record("current_challenge")?;
        Ok(self
            .challenges
            .lock()
            .unwrap()
            .iter()
            .filter(|challenge| {
                challenge.week_start <= today && (today - challenge.week_start).num_days() < 7
            })
            .max_by_key(|challenge| challenge.week_start)
            .cloned())
    }

    async fn join_challenge(&self, challenge_id: Uuid, user_id: UserId) -> Result<bool, StoreError> {
        self.record("join_challenge")?;
        let mut participants = self.participants.lock().unwrap();
        if participants.contains(&(challenge_id, user_id)) {
            return Ok(false);
        }
        participants.push((challenge_id, user_id));
        Ok(true)
    }

    async fn challenge_participants(&self, challenge_id: Uuid) -> Result<Vec<Recipient>, StoreError> {
        self.record("challenge_participants")?;
        Ok(self
            .participants
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == challenge_id)
            .map(|(_, user_id)| Recipient {
                user_id: *user_id,
                chat_id: *user_id,
            })
            .collect())
    }

    async fn metric_total(
        &self,
        user_id: UserId,
        metric: ChallengeMetric,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.record_for("metric_total", user_id)?;
        let entries = match metric {
            ChallengeMetric::Steps => self.steps.lock().unwrap().clone(),
            ChallengeMetric::WaterMl => self.water.lock().unwrap().clone(),
        };
        Ok(entries
            .iter()
            .filter(|(user, _, at)| *user == user_id && *at >= since)
            .map(|(_, amount, _)| u64::from(*amount))
            .sum())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Message {
        chat_id: ChatId,
        text: String,
        format: TextFormat,
        keyboard: Option<Keyboard>,
    },
    Edit {
        chat_id: ChatId,
        message_id: MessageId,
        text: String,
    },
    Document {
        chat_id: ChatId,
        filename: String,
        content: String,
    },
    Typing {
        chat_id: ChatId,
    },
    CallbackAnswer {
        callback_id: String,
        text: Option<String>,
    },
}

impl Sent {
    fn chat_id(&self) -> Option<ChatId> {
        match self {
            Sent::Message { chat_id, .. }
            | Sent::Edit { chat_id, .. }
            | Sent::Document { chat_id, .. }
            | Sent::Typing { chat_id } => Some(*chat_id),
            Sent::CallbackAnswer { .. } => None,
        }
    }
}

#[derive(Default)]
pub struct FakeMessenger {
    sent: Mutex<Vec<Sent>>,
    next_message_id: AtomicI64,
    unreachable_chats: Mutex<HashSet<ChatId>>,
    down: Mutex<bool>,
}

impl FakeMessenger {
    fn check(&self, chat_id: Option<ChatId>) -> Result<(), TransportError> {
        if *self.down.lock().unwrap() {
            return Err(TransportError::Network("platform down".into()));
        }
        if let Some(chat_id) = chat_id
            && self.unreachable_chats.lock().unwrap().contains(&chat_id)
        {
            return Err(TransportError::Api(format!("chat {chat_id} blocked the bot")));
        }
        Ok(())
    }

    pub fn block_chat(&self, chat_id: ChatId) {
        self.unreachable_chats.lock().unwrap().insert(chat_id);
    }

    pub fn set_down(&self, down: bool) {
        *self.down.lock().unwrap() = down;
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, chat_id: ChatId) -> Vec<Sent> {
        self.sent()
            .into_iter()
            .filter(|sent| sent.chat_id() == Some(chat_id))
            .collect()
    }

    /// Texts of plain and markdown messages sent to `chat_id`, oldest first.
    pub fn texts(&self, chat_id: ChatId) -> Vec<String> {
        self.sent_to(chat_id)
            .into_iter()
            .filter_map(|sent| match sent {
                Sent::Message { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn last_text(&self, chat_id: ChatId) -> Option<String> {
        self.texts(chat_id).pop()
    }

    pub fn last_keyboard(&self, chat_id: ChatId) -> Option<Keyboard> {
        self.sent_to(chat_id).into_iter().rev().find_map(|sent| match sent {
            Sent::Message { keyboard, .. } => keyboard,
            _ => None,
        })
    }

    pub fn last_document(&self, chat_id: ChatId) -> Option<(String, String)> {
        self.sent_to(chat_id).into_iter().rev().find_map(|sent| match sent {
            Sent::Document {
                filename, content, ..
            } => Some((filename, content)),
            _ => None,
        })
    }

    pub fn callback_answers(&self) -> usize {
        self.sent()
            .iter()
            .filter(|sent| matches!(sent, Sent::CallbackAnswer { .. }))
            .count()
    }
}

#[async_trait]
impl Messenger for FakeMessenger {
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        format: TextFormat,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageId, TransportError> {
        self.check(Some(chat_id))?;
        self.sent.lock().unwrap().push(Sent::Message {
            chat_id,
            text: text.to_string(),
            format,
            keyboard: keyboard.cloned(),
        });
        Ok(self.next_message_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn edit_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        _keyboard: Option<&Keyboard>,
    ) -> Result<(), TransportError> {
        self.check(Some(chat_id))?;
        self.sent.lock().unwrap().push(Sent::Edit {
            chat_id,
            message_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_document(
        &self,
        chat_id: ChatId,
        document: &OutgoingDocument,
    ) -> Result<(), TransportError> {
        self.check(Some(chat_id))?;
        self.sent.lock().unwrap().push(Sent::Document {
            chat_id,
            filename: document.filename.clone(),
            content: String::from_utf8_lossy(&document.content).into_owned(),
        });
        Ok(())
    }

    async fn send_typing(&self, chat_id: ChatId) -> Result<(), TransportError> {
        self.check(Some(chat_id))?;
        self.sent.lock().unwrap().push(Sent::Typing { chat_id });
        Ok(())
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
    ) -> Result<(), TransportError> {
        self.check(None)?;
        self.sent.lock().unwrap().push(Sent::CallbackAnswer {
            callback_id: callback_id.to_string(),
            text: text.map(str::to_string),
        });
        Ok(())
    }

    async fn download_file(&self, file_ref: &str) -> Result<Vec<u8>, TransportError> {
        self.check(None)?;
        Ok(format!("bytes of {file_ref}").into_bytes())
    }

    async fn probe(&self) -> Result<(), TransportError> {
        self.check(None)
    }
}

/// Completion fake answering from a queue of scripted replies, falling back to a
/// fixed text when the queue is empty.
pub struct FakeCompletion {
    replies: Mutex<VecDeque<Result<String, CompletionError>>>,
    transcript: Mutex<String>,
    prompts: Mutex<Vec<(String, String)>>,
    healthy: Mutex<bool>,
}

impl Default for FakeCompletion {
    fn default() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            transcript: Mutex::new(String::new()),
            prompts: Mutex::new(Vec::new()),
            healthy: Mutex::new(true),
        }
    }
}

impl FakeCompletion {
    pub fn push_reply(&self, reply: Result<String, CompletionError>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn set_transcript(&self, transcript: &str) {
        *self.transcript.lock().unwrap() = transcript.to_string();
    }

    pub fn set_healthy(&self, healthy: bool) {
        *self.healthy.lock().unwrap() = healthy;
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_user_prompt(&self) -> String {
        self.prompts
            .lock()
            .unwrap()
            .last()
            .map(|(_, user)| user.clone())
            .unwrap_or_default()
    }

    fn answer(&self, system: &str, user: &str) -> Result<String, CompletionError> {
        self.prompts
            .lock()
            .unwrap()
            .push((system.to_string(), user.to_string()));
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("Drink water and sleep well.".to_string()))
    }
}

#[async_trait]
impl Completion for FakeCompletion {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        _max_tokens: u32,
    ) -> Result<String, CompletionError> {
        self.answer(system_prompt, user_prompt)
    }

    async fn describe_image(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        _image: Vec<u8>,
        _mime_type: &str,
        _max_tokens: u32,
    ) -> Result<String, CompletionError> {
        self.answer(system_prompt, user_prompt)
    }

    async fn transcribe(&self, _audio: Vec<u8>, _filename: &str) -> Result<String, CompletionError> {
        Ok(self.transcript.lock().unwrap().clone())
    }

    async fn probe(&self) -> Result<(), CompletionError> {
        if *self.healthy.lock().unwrap() {
            Ok(())
        } else {
            Err(CompletionError::Network("unreachable".into()))
        }
    }
}

/// A dispatcher wired to fresh fakes.
pub struct Harness {
    pub store: Arc<FakeStore>,
    pub messenger: Arc<FakeMessenger>,
    pub completion: Arc<FakeCompletion>,
    pub dispatcher: Dispatcher,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(OrchestratorConfig::default())
    }

    pub fn with_config(config: OrchestratorConfig) -> Self {
        let store = Arc::new(FakeStore::default());
        let messenger = Arc::new(FakeMessenger::default());
        let completion = Arc::new(FakeCompletion::default());
        let io = Collaborators {
            store: store.clone(),
            completion: completion.clone(),
            messenger: messenger.clone(),
            budgets: config.budgets,
        };
        let ctx = Arc::new(FlowContext::new(io, config));
        Self {
            store,
            messenger,
            completion,
            dispatcher: Dispatcher::new(ctx),
        }
    }

    pub fn ctx(&self) -> &FlowContext {
        self.dispatcher.context()
    }

    pub async fn dispatch(&self, event: InboundEvent) {
        self.dispatcher.dispatch(event).await;
    }

    pub async fn text(&self, user_id: UserId, text: &str) {
        self.dispatch(InboundEvent::Text {
            user_id,
            chat_id: user_id,
            text: text.to_string(),
        })
        .await;
    }

    pub async fn tap(&self, user_id: UserId, action: CallbackAction) {
        self.tap_raw(user_id, &action.encode()).await;
    }

    pub async fn tap_raw(&self, user_id: UserId, data: &str) {
        self.dispatch(InboundEvent::Callback {
            user_id,
            chat_id: user_id,
            message_id: 1,
            callback_id: format!("cb-{user_id}"),
            data: data.to_string(),
        })
        .await;
    }
}
