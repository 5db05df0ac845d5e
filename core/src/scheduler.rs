//! Recurring jobs on cron schedules.
//!
//! Every job runs on its own loop. Each run is a separate task, so a job that
//! fails or panics is logged and fires again at its next slot; other jobs are
//! never affected.

use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use tokio::task::JoinHandle;

use crate::resilience::CallFailure;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("invalid cron expression '{expression}' for job {job}: {reason}")]
    InvalidCron {
        job: &'static str,
        expression: String,
        reason: String,
    },
    #[error("unknown timezone '{0}'")]
    UnknownTimezone(String),
    #[error("job {0} is already registered")]
    DuplicateJob(&'static str),
}

/// Failure of one job run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct JobError(pub String);

impl From<CallFailure> for JobError {
    fn from(failure: CallFailure) -> Self {
        JobError(format!("{} failed ({:?})", failure.operation, failure.kind))
    }
}

pub type JobFuture = Pin<Box<dyn Future<Output = Result<(), JobError>> + Send>>;
pub type JobHandler = Arc<dyn Fn() -> JobFuture + Send + Sync>;

/// How a single run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobRun {
    Completed,
    Failed(String),
    Panicked,
}

pub fn parse_timezone(raw: &str) -> Result<Tz, SchedulerError> {
    raw.trim()
        .parse()
        .map_err(|_| SchedulerError::UnknownTimezone(raw.to_string()))
}

struct ScheduledJob {
    name: &'static str,
    expression: String,
    schedule: Schedule,
    timezone: Tz,
    handler: JobHandler,
}

impl ScheduledJob {
    fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule
            .after(&after.with_timezone(&self.timezone))
            .next()
            .map(|next| next.with_timezone(&Utc))
    }
}

#[derive(Default)]
pub struct Scheduler {
    jobs: Vec<ScheduledJob>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` to run whenever `cron` (seconds-first, seven fields
    /// allowed) matches local time in `timezone`.
    pub fn register<F, Fut>(
        &mut self,
        name: &'static str,
        cron: &str,
        timezone: Tz,
        handler: F,
    ) -> Result<(), SchedulerError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), JobError>> + Send + 'static,
    {
        if self.jobs.iter().any(|job| job.name == name) {
            return Err(SchedulerError::DuplicateJob(name));
        }
        let schedule = Schedule::from_str(cron).map_err(|err| SchedulerError::InvalidCron {
            job: name,
            expression: cron.to_string(),
            reason: err.to_string(),
        })?;
        let handler: JobHandler = Arc::new(move || Box::pin(handler()) as JobFuture);
        self.jobs.push(ScheduledJob {
            name,
            expression: cron.to_string(),
            schedule,
            timezone,
            handler,
        });
        Ok(())
    }

    pub fn job_names(&self) -> Vec<&'static str> {
        self.jobs.iter().map(|job| job.name).collect()
    }

    pub fn next_fire(&self, name: &str, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.jobs
            .iter()
            .find(|job| job.name == name)
            .and_then(|job| job.next_after(after))
    }

    /// Start one loop per job. Missed fires are not replayed.
    pub fn spawn(self) -> Vec<JoinHandle<()>> {
        self.jobs
            .into_iter()
            .map(|job| {
                tracing::info!(
                    job = job.name,
                    cron = %job.expression,
                    timezone = %job.timezone,
                    "scheduled job registered"
                );
                tokio::spawn(run_loop(job))
            })
            .collect()
    }
}

async fn run_loop(job: ScheduledJob) {
    let mut last_fire: Option<DateTime<Utc>> = None;
    loop {
        let now = Utc::now();
        let from = last_fire.map_or(now, |last| last.max(now));
        let Some(next) = job.next_after(from) else {
            tracing::warn!(job = job.name, "cron expression has no future occurrence; job stopped");
            return;
        };
        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;
        last_fire = Some(next);
        run_job_once(job.name, &job.handler).await;
    }
}

/// Run one job invocation in its own task, logging failures and panics.
pub async fn run_job_once(name: &'static str, handler: &JobHandler) -> JobRun {
    let started = std::time::Instant::now();
    tracing::debug!(job = name, "job started");
    match tokio::spawn(handler()).await {
        Ok(Ok(())) => {
            tracing::info!(
                job = name,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "job completed"
            );
            JobRun::Completed
        }
        Ok(Err(err)) => {
            tracing::error!(job = name, error = %err, "job failed");
            JobRun::Failed(err.0)
        }
        Err(err) => {
            tracing::error!(job = name, error = %err, "job panicked");
            JobRun::Panicked
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn berlin() -> Tz {
        parse_timezone("Europe/Berlin").expect("known zone")
    }

    fn explode() -> Result<(), JobError> {
        panic!("job exploded")
    }

    #[test]
    fn invalid_cron_is_rejected_at_registration() {
        let mut scheduler = Scheduler::new();
        let err = scheduler
            .register("broken", "every day at nine", berlin(), || async { Ok(()) })
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidCron { job: "broken", .. }));
        assert!(scheduler.job_names().is_empty());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut scheduler = Scheduler::new();
        scheduler
            .register("gc", "0 0 * * * *", berlin(), || async { Ok(()) })
            .unwrap();
        assert_eq!(
            scheduler.register("gc", "0 30 * * * *", berlin(), || async { Ok(()) }),
            Err(SchedulerError::DuplicateJob("gc"))
        );
    }

    #[test]
    fn unknown_timezone_is_reported() {
        assert_eq!(
            parse_timezone("Mars/Olympus"),
            Err(SchedulerError::UnknownTimezone("Mars/Olympus".into()))
        );
        assert_eq!(parse_timezone(" UTC "), Ok(chrono_tz::UTC));
    }

    #[test]
    fn next_fire_follows_local_time() {
        let mut scheduler = Scheduler::new();
        scheduler
            .register("daily_report", "0 0 21 * * *", berlin(), || async { Ok(()) })
            .unwrap();
        let after = DateTime::parse_from_rfc3339("2026-01-05T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let next = scheduler.next_fire("daily_report", after).unwrap();
        assert_eq!(next.to_rfc3339(), "2026-01-05T20:00:00+00:00");

        // Summer time shifts the UTC instant.
        let after = DateTime::parse_from_rfc3339("2026-07-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let next = scheduler.next_fire("daily_report", after).unwrap();
        assert_eq!(next.to_rfc3339(), "2026-07-01T19:00:00+00:00");
        assert_eq!(scheduler.next_fire("missing", after), None);
    }

    #[tokio::test]
    async fn failures_and_panics_are_contained() {
        let failing: JobHandler =
            Arc::new(|| Box::pin(async { Err(JobError("store down".into())) }) as JobFuture);
        assert_eq!(
            run_job_once("failing", &failing).await,
            JobRun::Failed("store down".into())
        );

        let panicking: JobHandler = Arc::new(|| Box::pin(async { explode() }) as JobFuture);
        assert_eq!(run_job_once("panicking", &panicking).await, JobRun::Panicked);

        let fine: JobHandler = Arc::new(|| Box::pin(async { Ok(()) }) as JobFuture);
        assert_eq!(run_job_once("fine", &fine).await, JobRun::Completed);
    }

    #[tokio::test]
    async fn failing_job_keeps_firing_and_does_not_stop_others() {
        let failures = Arc::new(AtomicUsize::new(0));
        let successes = Arc::new(AtomicUsize::new(0));

        let mut scheduler = Scheduler::new();
        let counter = failures.clone();
        scheduler
            .register("always_fails", "* * * * * *", chrono_tz::UTC, move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    explode()
                }
            })
            .unwrap();
        let counter = successes.clone();
        scheduler
            .register("healthy", "* * * * * *", chrono_tz::UTC, move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .unwrap();

        let handles = scheduler.spawn();
        tokio::time::sleep(Duration::from_millis(3_200)).await;
        for handle in &handles {
            handle.abort();
        }

        assert!(failures.load(Ordering::SeqCst) >= 2);
        assert!(successes.load(Ordering::SeqCst) >= 2);
    }
}
