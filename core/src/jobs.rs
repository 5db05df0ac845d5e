//! Entry points of the recurring jobs and their default schedule.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tokio::sync::RwLock;
use utoipa::ToSchema;

use crate::collaborators::TextFormat;
use crate::dispatcher::Dispatcher;
use crate::domain::{Challenge, Recipient};
use crate::flows::FlowContext;
use crate::flows::challenge::{
    challenge_for_week, join_keyboard, local_midnight_utc, render_challenge, week_start,
};
use crate::report::render_daily_report;
use crate::scheduler::{JobError, Scheduler, SchedulerError};

pub const DAILY_REPORT_CRON: &str = "0 0 21 * * *";
pub const HEALTH_PROBE_CRON: &str = "0 0/30 * * * *";
pub const GARBAGE_COLLECTION_CRON: &str = "0 0 * * * *";
pub const CHALLENGE_CREATION_CRON: &str = "0 0 9 * * Mon";
pub const CHALLENGE_REMINDER_CRON: &str = "0 0 18 * * Wed,Sat";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct HealthStatus {
    /// `ok` or `degraded`.
    pub status: String,
    /// Collaborators that failed the last probe.
    pub failing: Vec<String>,
    /// `None` until the first probe ran.
    pub checked_at: Option<DateTime<Utc>>,
}

impl HealthStatus {
    fn from_failures(failing: Vec<String>, checked_at: DateTime<Utc>) -> Self {
        let status = if failing.is_empty() { "ok" } else { "degraded" };
        Self {
            status: status.to_string(),
            failing,
            checked_at: Some(checked_at),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.failing.is_empty()
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            failing: Vec::new(),
            checked_at: None,
        }
    }
}

/// Result of the last health probe, shared with the HTTP health endpoint.
#[derive(Clone, Default)]
pub struct HealthMonitor {
    status: Arc<RwLock<HealthStatus>>,
}

impl HealthMonitor {
    pub async fn current(&self) -> HealthStatus {
        self.status.read().await.clone()
    }

    async fn record(&self, status: HealthStatus) {
        *self.status.write().await = status;
    }
}

/// Delivery counts of one broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Broadcast {
    pub delivered: usize,
    pub failed: usize,
}

impl Broadcast {
    fn count(&mut self, delivered: bool) {
        if delivered {
            self.delivered += 1;
        } else {
            self.failed += 1;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Collected {
    pub rate_windows: usize,
    pub confirmations: usize,
    pub gates: usize,
}

#[derive(Clone)]
pub struct Jobs {
    dispatcher: Dispatcher,
    health: HealthMonitor,
}

impl Jobs {
    pub fn new(dispatcher: Dispatcher, health: HealthMonitor) -> Self {
        Self { dispatcher, health }
    }

    fn ctx(&self) -> &FlowContext {
        self.dispatcher.context()
    }

    async fn recipients(&self) -> Result<Vec<Recipient>, JobError> {
        Ok(self
            .ctx()
            .io
            .store("list_recipients", "", |store| async move {
                store.list_recipients().await
            })
            .await?)
    }

    /// Send every registered user today's report. A failure for one user is logged
    /// and counted; the rest still get theirs.
    pub async fn daily_report_broadcast(&self) -> Result<Broadcast, JobError> {
        let recipients = self.recipients().await?;
        let mut outcome = Broadcast::default();
        for recipient in recipients {
            let delivered = self.send_daily_report(recipient).await;
            if !delivered {
                tracing::warn!(user_id = recipient.user_id, "daily report not delivered");
            }
            outcome.count(delivered);
        }
        tracing::info!(
            delivered = outcome.delivered,
            failed = outcome.failed,
            "daily report broadcast finished"
        );
        Ok(outcome)
    }

    async fn send_daily_report(&self, recipient: Recipient) -> bool {
        let ctx = self.ctx();
        let user_id = recipient.user_id;
        let today = ctx.today();
        let timezone = ctx.config.timezone;

        let profile = ctx
            .io
            .store("get_profile", "", move |store| async move {
                store.get_profile(user_id).await
            })
            .await;
        let summary = ctx
            .io
            .store("daily_summary", "", move |store| async move {
                store.daily_summary(user_id, today, timezone).await
            })
            .await;
        let targets = ctx
            .io
            .store("get_daily_targets", "", move |store| async move {
                store.get_daily_targets(user_id).await
            })
            .await;
        let (Ok(profile), Ok(summary), Ok(targets)) = (profile, summary, targets) else {
            return false;
        };

        let name = profile.map(|p| p.name).unwrap_or_else(|| "you".to_string());
        let text = render_daily_report(&name, today, &summary, targets.as_ref());
        ctx.send(recipient.chat_id, &text, TextFormat::Markdown, None)
            .await
            .is_some()
    }

    /// Probe every collaborator and publish the result.
    pub async fn probe_health(&self) -> HealthStatus {
        let io = &self.ctx().io;
        let mut failing = Vec::new();

        if io
            .store("store_probe", "", |store| async move { store.ping().await })
            .await
            .is_err()
        {
            failing.push("store".to_string());
        }
        if io
            .completion("completion_probe", io.budgets.completion, "", |completion| async move {
                completion.probe().await
            })
            .await
            .is_err()
        {
            failing.push("completion".to_string());
        }
        if io
            .transport("messenger_probe", |messenger| async move {
                messenger.probe().await
            })
            .await
            .is_err()
        {
            failing.push("messenger".to_string());
        }

        let status = HealthStatus::from_failures(failing, Utc::now());
        if status.is_ok() {
            tracing::debug!("health probe passed");
        } else {
            tracing::warn!(failing = ?status.failing, "health probe degraded");
        }
        self.health.record(status.clone()).await;
        status
    }

    /// Drop aged-out rate windows, expired confirmation tokens and idle user locks.
    pub async fn collect_garbage(&self, now: DateTime<Utc>) -> Collected {
        let collected = Collected {
            rate_windows: self.dispatcher.limiter().sweep(now).await,
            confirmations: self.ctx().confirmations.sweep(now).await,
            gates: self.dispatcher.gate().sweep().await,
        };
        tracing::info!(
            rate_windows = collected.rate_windows,
            confirmations = collected.confirmations,
            gates = collected.gates,
            "in-memory state collected"
        );
        collected
    }

    /// Create this week's challenge unless it already exists, then announce it.
    pub async fn create_weekly_challenge(&self) -> Result<(Challenge, Broadcast), JobError> {
        let ctx = self.ctx();
        let today = ctx.today();
        let monday = week_start(today);

        let existing = ctx
            .io
            .store("current_challenge", "", move |store| async move {
                store.current_challenge(today).await
            })
            .await?;
        let challenge = match existing {
            Some(challenge) if challenge.week_start == monday => {
                tracing::info!(challenge_id = %challenge.id, "weekly challenge already exists");
                challenge
            }
            _ => {
                let challenge = challenge_for_week(monday);
                let stored = challenge.clone();
                ctx.io
                    .store("create_challenge", "", move |store| async move {
                        store.create_challenge(&stored).await
                    })
                    .await?;
                tracing::info!(
                    challenge_id = %challenge.id,
                    title = %challenge.title,
                    "weekly challenge created"
                );
                challenge
            }
        };

        let text = format!("New weekly challenge!\n\n{}", render_challenge(&challenge));
        let keyboard = join_keyboard(&challenge);
        let mut outcome = Broadcast::default();
        for recipient in self.recipients().await? {
            let delivered = ctx
                .send(recipient.chat_id, &text, TextFormat::Markdown, Some(&keyboard))
                .await
                .is_some();
            outcome.count(delivered);
        }
        Ok((challenge, outcome))
    }

    /// Remind participants of the current challenge how far they are.
    pub async fn remind_challenge_participants(&self) -> Result<Broadcast, JobError> {
        let ctx = self.ctx();
        let today = ctx.today();
        let Some(challenge) = ctx
            .io
            .store("current_challenge", "", move |store| async move {
                store.current_challenge(today).await
            })
            .await?
        else {
            tracing::debug!("no active challenge; skipping reminders");
            return Ok(Broadcast::default());
        };

        let challenge_id = challenge.id;
        let participants = ctx
            .io
            .store("challenge_participants", "", move |store| async move {
                store.challenge_participants(challenge_id).await
            })
            .await?;

        let since = local_midnight_utc(challenge.week_start, ctx.config.timezone);
        let metric = challenge.metric;
        let mut outcome = Broadcast::default();
        for participant in participants {
            let user_id = participant.user_id;
            let progress = ctx
                .io
                .store("metric_total", "", move |store| async move {
                    store.metric_total(user_id, metric, since).await
                })
                .await;
            let Ok(progress) = progress else {
                outcome.count(false);
                continue;
            };
            let text = format!(
                "Reminder: *{}*\nYour progress: {progress} / {} {}. Keep going!",
                challenge.title,
                challenge.target,
                metric.unit()
            );
            let delivered = ctx
                .send(participant.chat_id, &text, TextFormat::Markdown, None)
                .await
                .is_some();
            outcome.count(delivered);
        }
        Ok(outcome)
    }
}

/// Register the standard job set on `scheduler`.
pub fn register_default_jobs(
    scheduler: &mut Scheduler,
    jobs: Jobs,
    timezone: Tz,
) -> Result<(), SchedulerError> {
    let job = jobs.clone();
    scheduler.register("daily_report", DAILY_REPORT_CRON, timezone, move || {
        let job = job.clone();
        async move { job.daily_report_broadcast().await.map(|_| ()) }
    })?;

    let job = jobs.clone();
    scheduler.register("health_probe", HEALTH_PROBE_CRON, timezone, move || {
        let job = job.clone();
        async move {
            job.probe_health().await;
            Ok(())
        }
    })?;

    let job = jobs.clone();
    scheduler.register("garbage_collection", GARBAGE_COLLECTION_CRON, timezone, move || {
        let job = job.clone();
        async move {
            job.collect_garbage(Utc::now()).await;
            Ok(())
        }
    })?;

    let job = jobs.clone();
    scheduler.register("challenge_creation", CHALLENGE_CREATION_CRON, timezone, move || {
        let job = job.clone();
        async move { job.create_weekly_challenge().await.map(|_| ()) }
    })?;

    scheduler.register("challenge_reminders", CHALLENGE_REMINDER_CRON, timezone, move || {
        let job = jobs.clone();
        async move { job.remind_challenge_participants().await.map(|_| ()) }
    })?;

    Ok(())
}
