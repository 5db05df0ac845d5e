use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use healthmate_core::error::{self, ApiError};

/// HTTP-level failures of the webhook surface, converted to structured API responses
#[derive(Debug)]
pub enum AppError {
    /// Request body could not be read as an update (400)
    Validation {
        message: String,
        field: Option<String>,
        received: Option<serde_json::Value>,
        docs_hint: Option<String>,
    },
    /// Webhook secret missing or wrong (401)
    Unauthorized,
    /// IP-level limit hit (429)
    RateLimited { retry_after_secs: u64 },
    /// Internal error (500)
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::now_v7().to_string();

        let (status, api_error) = match self {
            AppError::Validation {
                message,
                field,
                received,
                docs_hint,
            } => (
                StatusCode::BAD_REQUEST,
                ApiError {
                    error: error::codes::VALIDATION_FAILED.to_string(),
                    message,
                    field,
                    received,
                    request_id,
                    docs_hint,
                },
            ),
            AppError::Unauthorized => {
                tracing::warn!(request_id = %request_id, "webhook secret rejected");
                (
                    StatusCode::UNAUTHORIZED,
                    ApiError {
                        error: error::codes::UNAUTHORIZED.to_string(),
                        message: "Missing or invalid webhook secret".to_string(),
                        field: Some("X-Telegram-Bot-Api-Secret-Token".to_string()),
                        received: None,
                        request_id,
                        docs_hint: Some(
                            "Register the webhook with the same secret_token the service is configured with."
                                .to_string(),
                        ),
                    },
                )
            }
            AppError::RateLimited { retry_after_secs } => {
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(ApiError {
                        error: error::codes::RATE_LIMITED.to_string(),
                        message: format!(
                            "Too many requests. Retry after {retry_after_secs} seconds."
                        ),
                        field: None,
                        received: None,
                        request_id,
                        docs_hint: None,
                    }),
                )
                    .into_response();
                response.headers_mut().insert(
                    axum::http::header::RETRY_AFTER,
                    axum::http::HeaderValue::from(retry_after_secs),
                );
                return response;
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError {
                        error: error::codes::INTERNAL_ERROR.to_string(),
                        message: "An internal error occurred".to_string(),
                        field: None,
                        received: None,
                        request_id,
                        docs_hint: None,
                    },
                )
            }
        };

        (status, Json(api_error)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_maps_to_401() {
        let response = AppError::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn rate_limited_sets_retry_after() {
        let response = AppError::RateLimited { retry_after_secs: 3 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["retry-after"], "3");
    }

    #[test]
    fn validation_maps_to_400() {
        let response = AppError::Validation {
            message: "bad".into(),
            field: None,
            received: None,
            docs_hint: None,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
