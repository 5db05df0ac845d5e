//! Webhook authentication: Telegram echoes the secret registered with `setWebhook`
//! in a header on every delivery.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use healthmate_core::auth::secret_matches;

use crate::error::AppError;
use crate::state::AppState;

pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Proof that the request carried the configured webhook secret.
#[derive(Debug, Clone, Copy)]
pub struct VerifiedWebhook;

pub fn verify_secret(headers: &HeaderMap, expected: &str) -> Result<VerifiedWebhook, AppError> {
    let presented = headers
        .get(SECRET_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(AppError::Unauthorized)?;
    if secret_matches(presented, expected) {
        Ok(VerifiedWebhook)
    } else {
        Err(AppError::Unauthorized)
    }
}

impl FromRequestParts<AppState> for VerifiedWebhook {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        verify_secret(&parts.headers, &state.webhook_secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn matching_secret_is_accepted() {
        let mut headers = HeaderMap::new();
        headers.insert(SECRET_HEADER, HeaderValue::from_static("hook-secret"));
        assert!(verify_secret(&headers, "hook-secret").is_ok());
    }

    #[test]
    fn missing_or_wrong_secret_is_rejected() {
        let headers = HeaderMap::new();
        assert!(matches!(
            verify_secret(&headers, "hook-secret"),
            Err(AppError::Unauthorized)
        ));

        let mut headers = HeaderMap::new();
        headers.insert(SECRET_HEADER, HeaderValue::from_static("hook-secreT"));
        assert!(matches!(
            verify_secret(&headers, "hook-secret"),
            Err(AppError::Unauthorized)
        ));
    }
}
