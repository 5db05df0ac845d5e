//! Wrappers around every collaborator call.
//!
//! `timed_call` bounds the wait, `guarded_call` turns any failure into a tagged
//! [`CallFailure`] carrying the text to show the user, and `guarded_store_call`
//! does the same for the store while logging logical rejections and outages apart.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::collaborators::{
    Collaborators, Completion, CompletionError, HealthStore, Messenger, StoreError,
    TransportError,
};
use crate::error::FlowError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallBudgets {
    pub completion: Duration,
    pub plan: Duration,
    pub store: Duration,
    pub transport: Duration,
}

impl Default for CallBudgets {
    fn default() -> Self {
        Self {
            completion: Duration::from_secs(60),
            plan: Duration::from_secs(120),
            store: Duration::from_secs(10),
            transport: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimedCallError {
    #[error("{operation} exceeded its {budget:?} budget")]
    Timeout {
        operation: &'static str,
        budget: Duration,
    },
    #[error("{operation} aborted before producing a result")]
    Aborted { operation: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    Failed,
    StoreRejected,
    StoreUnreachable,
}

/// Uniform failure shape handed back to flow handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFailure {
    pub operation: &'static str,
    pub kind: FailureKind,
    pub fallback: String,
}

impl From<CallFailure> for FlowError {
    fn from(failure: CallFailure) -> Self {
        match failure.kind {
            FailureKind::Timeout => FlowError::CollaboratorTimeout {
                operation: failure.operation,
                fallback: failure.fallback,
            },
            _ => FlowError::CollaboratorFailure {
                operation: failure.operation,
                fallback: failure.fallback,
            },
        }
    }
}

/// Race `op` against `budget`. The operation runs as its own task: on expiry the
/// wait ends with [`TimedCallError::Timeout`] and the task is left to finish on its
/// own, its result dropped.
pub async fn timed_call<F>(
    operation: &'static str,
    budget: Duration,
    op: F,
) -> Result<F::Output, TimedCallError>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let handle = tokio::spawn(op);
    match tokio::time::timeout(budget, handle).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => {
            tracing::error!(operation, error = %err, "collaborator task aborted");
            Err(TimedCallError::Aborted { operation })
        }
        Err(_) => {
            tracing::warn!(
                operation,
                budget_ms = budget.as_millis() as u64,
                "collaborator call exceeded budget; abandoning"
            );
            Err(TimedCallError::Timeout { operation, budget })
        }
    }
}

/// Await `op` and convert any error into a [`CallFailure`] carrying `fallback`.
/// Never propagates the underlying error.
pub async fn guarded_call<T, E, F>(
    operation: &'static str,
    fallback: &str,
    op: F,
) -> Result<T, CallFailure>
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    match op.await {
        Ok(value) => Ok(value),
        Err(err) => {
            tracing::warn!(operation, error = %err, "collaborator call failed");
            Err(CallFailure {
                operation,
                kind: FailureKind::Failed,
                fallback: fallback.to_string(),
            })
        }
    }
}

/// `guarded_call` with a time budget.
pub async fn guarded_timed_call<T, E, F>(
    operation: &'static str,
    budget: Duration,
    fallback: &str,
    op: F,
) -> Result<T, CallFailure>
where
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Display + Send + 'static,
{
    match timed_call(operation, budget, op).await {
        Ok(result) => guarded_call(operation, fallback, std::future::ready(result)).await,
        Err(TimedCallError::Timeout { .. }) => Err(CallFailure {
            operation,
            kind: FailureKind::Timeout,
            fallback: fallback.to_string(),
        }),
        Err(TimedCallError::Aborted { .. }) => Err(CallFailure {
            operation,
            kind: FailureKind::Failed,
            fallback: fallback.to_string(),
        }),
    }
}

/// Store call with a time budget. Rejections are logged at warn, outages at error;
/// the caller sees the same failure shape for both.
pub async fn guarded_store_call<T, F>(
    operation: &'static str,
    budget: Duration,
    fallback: &str,
    op: F,
) -> Result<T, CallFailure>
where
    F: Future<Output = Result<T, StoreError>> + Send + 'static,
    T: Send + 'static,
{
    let failure = |kind| CallFailure {
        operation,
        kind,
        fallback: fallback.to_string(),
    };
    match timed_call(operation, budget, op).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(StoreError::Rejected(detail))) => {
            tracing::warn!(operation, detail = %detail, "store rejected operation");
            Err(failure(FailureKind::StoreRejected))
        }
        Ok(Err(StoreError::Unreachable(detail))) => {
            tracing::error!(operation, detail = %detail, "store unreachable");
            Err(failure(FailureKind::StoreUnreachable))
        }
        Err(TimedCallError::Timeout { .. }) => Err(failure(FailureKind::Timeout)),
        Err(TimedCallError::Aborted { .. }) => Err(failure(FailureKind::StoreUnreachable)),
    }
}

impl Collaborators {
    pub async fn store<T, F, Fut>(
        &self,
        operation: &'static str,
        fallback: &str,
        call: F,
    ) -> Result<T, CallFailure>
    where
        F: FnOnce(Arc<dyn HealthStore>) -> Fut,
        Fut: Future<Output = Result<T, StoreError>> + Send + 'static,
        T: Send + 'static,
    {
        guarded_store_call(
            operation,
            self.budgets.store,
            fallback,
            call(self.store.clone()),
        )
        .await
    }

    pub async fn completion<T, F, Fut>(
        &self,
        operation: &'static str,
        budget: Duration,
        fallback: &str,
        call: F,
    ) -> Result<T, CallFailure>
    where
        F: FnOnce(Arc<dyn Completion>) -> Fut,
        Fut: Future<Output = Result<T, CompletionError>> + Send + 'static,
        T: Send + 'static,
    {
        guarded_timed_call(operation, budget, fallback, call(self.completion.clone())).await
    }

    /// Outbound transport call. There is no channel left to tell the user about a
    /// failed send, so the fallback is empty and failures are only logged.
    pub async fn transport<T, F, Fut>(&self, operation: &'static str, call: F) -> Result<T, CallFailure>
    where
        F: FnOnce(Arc<dyn Messenger>) -> Fut,
        Fut: Future<Output = Result<T, TransportError>> + Send + 'static,
        T: Send + 'static,
    {
        guarded_timed_call(
            operation,
            self.budgets.transport,
            "",
            call(self.messenger.clone()),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn timed_call_returns_value_within_budget() {
        let value = timed_call("fast", Duration::from_secs(1), async { 42 }).await;
        assert_eq!(value, Ok(42));
    }

    #[tokio::test]
    async fn timed_call_abandons_without_cancelling() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let result = timed_call("slow", Duration::from_millis(10), async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            flag.store(true, Ordering::SeqCst);
            "late"
        })
        .await;

        assert!(matches!(result, Err(TimedCallError::Timeout { operation: "slow", .. })));
        assert!(!finished.load(Ordering::SeqCst));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(finished.load(Ordering::SeqCst), "abandoned task keeps running");
    }

    #[tokio::test]
    async fn timed_call_reports_panicking_task() {
        let result = timed_call("boom", Duration::from_secs(1), async {
            panic!("collaborator exploded");
        })
        .await;
        assert_eq!(result, Err::<(), _>(TimedCallError::Aborted { operation: "boom" }));
    }

    #[tokio::test]
    async fn guarded_call_wraps_error_with_fallback() {
        let result: Result<u8, CallFailure> =
            guarded_call("op", "try again", async { Err::<u8, _>("bad gateway") }).await;
        let failure = result.expect_err("error must be converted");
        assert_eq!(failure.kind, FailureKind::Failed);
        assert_eq!(failure.fallback, "try again");
    }

    #[tokio::test]
    async fn guarded_timed_call_maps_timeout() {
        let result: Result<(), CallFailure> = guarded_timed_call(
            "slow",
            Duration::from_millis(5),
            "later",
            async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok::<(), CompletionError>(())
            },
        )
        .await;
        let failure = result.expect_err("timeout expected");
        assert_eq!(failure.kind, FailureKind::Timeout);
        assert!(matches!(
            FlowError::from(failure),
            FlowError::CollaboratorTimeout { .. }
        ));
    }

    #[tokio::test]
    async fn store_failures_share_one_shape() {
        let rejected: Result<(), CallFailure> = guarded_store_call(
            "upsert",
            Duration::from_secs(1),
            "could not save",
            async { Err(StoreError::Rejected("duplicate key".into())) },
        )
        .await;
        let unreachable: Result<(), CallFailure> = guarded_store_call(
            "upsert",
            Duration::from_secs(1),
            "could not save",
            async { Err(StoreError::Unreachable("connection refused".into())) },
        )
        .await;

        let rejected = rejected.expect_err("rejected");
        let unreachable = unreachable.expect_err("unreachable");
        assert_eq!(rejected.kind, FailureKind::StoreRejected);
        assert_eq!(unreachable.kind, FailureKind::StoreUnreachable);
        assert_eq!(rejected.fallback, unreachable.fallback);
        assert!(matches!(
            FlowError::from(rejected),
            FlowError::CollaboratorFailure { .. }
        ));
    }
}
