use serde::Serialize;
use utoipa::ToSchema;

/// Structured error response for the HTTP surface (webhook, health).
/// Chat users never see this; it is for the transport and operators.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    /// Machine-readable error code (e.g. "validation_failed", "unauthorized")
    pub error: String,
    /// Human-readable description of what went wrong
    pub message: String,
    /// Which field caused the error (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// The value that was received (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<serde_json::Value>,
    /// Request ID for tracing and debugging
    pub request_id: String,
    /// Hint about what the correct usage looks like
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_hint: Option<String>,
}

/// Error codes used across the HTTP surface
pub mod codes {
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const INTERNAL_ERROR: &str = "internal_error";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const RATE_LIMITED: &str = "rate_limited";
}

/// Input rejected by a step validator. Never leaves the step handler:
/// the user is re-prompted and the flow stays on the same step.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Failure taxonomy of the dialogue engine. Every variant maps to exactly one
/// chat message for the affected user.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    /// Remote call exceeded its budget. The flow slot is kept for a retry.
    #[error("{operation} timed out")]
    CollaboratorTimeout {
        operation: &'static str,
        fallback: String,
    },
    /// Remote call failed. The flow slot is kept for a retry.
    #[error("{operation} failed")]
    CollaboratorFailure {
        operation: &'static str,
        fallback: String,
    },
    /// Confirmation token or session slot missing or expired. The slot is cleared.
    #[error("stale reference: {0}")]
    StaleReference(String),
    /// State the engine should never reach. Logged at error level, slot cleared.
    #[error("internal inconsistency: {0}")]
    InternalInconsistency(String),
}

impl FlowError {
    /// The one chat message shown for this failure.
    pub fn user_message(&self) -> String {
        match self {
            FlowError::Validation(err) => err.message.clone(),
            FlowError::CollaboratorTimeout { fallback, .. }
            | FlowError::CollaboratorFailure { fallback, .. } => fallback.clone(),
            FlowError::StaleReference(_) => {
                "This choice has expired. Please start the action again.".to_string()
            }
            FlowError::InternalInconsistency(_) => {
                "Something went wrong on our side. Please try again.".to_string()
            }
        }
    }

    /// Whether the active flow slot must be dropped after this failure.
    pub fn clears_slot(&self) -> bool {
        matches!(
            self,
            FlowError::StaleReference(_) | FlowError::InternalInconsistency(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collaborator_failures_keep_the_slot() {
        let err = FlowError::CollaboratorTimeout {
            operation: "completion",
            fallback: "retry later".to_string(),
        };
        assert!(!err.clears_slot());
        assert_eq!(err.user_message(), "retry later");
    }

    #[test]
    fn stale_and_inconsistent_clear_the_slot() {
        assert!(FlowError::StaleReference("token".into()).clears_slot());
        assert!(FlowError::InternalInconsistency("field".into()).clears_slot());
        assert!(
            FlowError::StaleReference("token".into())
                .user_message()
                .contains("expired")
        );
    }

    #[test]
    fn validation_message_is_shown_verbatim() {
        let err: FlowError = ValidationError::new("age", "Age must be between 10 and 120.").into();
        assert_eq!(err.user_message(), "Age must be between 10 and 120.");
    }
}
