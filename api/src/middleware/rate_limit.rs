use axum::http::Response;
use axum::response::IntoResponse;
use tower_governor::{
    GovernorError, GovernorLayer, governor::GovernorConfigBuilder,
    key_extractor::SmartIpKeyExtractor,
};

use crate::error::AppError;

type RateLimitLayer =
    GovernorLayer<SmartIpKeyExtractor, governor::middleware::NoOpMiddleware, axum::body::Body>;

/// Flood guard for POST /webhook/telegram: 1200 requests/minute per source address,
/// bursts of 200. Updates arrive from the platform's few delivery addresses, so one
/// bucket is shared by every chat user behind an address; per-user fairness is the
/// dispatcher's `RateLimiter`. Any other source drains only its own bucket.
pub fn webhook_layer() -> RateLimitLayer {
    per_source_layer(50, 200)
}

fn per_source_layer(replenish_ms: u64, burst: u32) -> RateLimitLayer {
    GovernorLayer::new(
        GovernorConfigBuilder::default()
            .per_millisecond(replenish_ms)
            .burst_size(burst)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .expect("invalid governor config for webhook"),
    )
    .error_handler(json_error_handler)
}

/// Governor rejections in the `ApiError` JSON format.
fn json_error_handler(err: GovernorError) -> Response<axum::body::Body> {
    let app_error = match err {
        GovernorError::TooManyRequests { wait_time, .. } => AppError::RateLimited {
            retry_after_secs: wait_time,
        },
        GovernorError::UnableToExtractKey => {
            AppError::Internal("unable to determine client identity for rate limiting".to_string())
        }
        GovernorError::Other { code, msg, .. } => {
            AppError::Internal(format!("rate limiter failed ({code}): {}", msg.unwrap_or_default()))
        }
    };
    app_error.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::{Request, StatusCode};
    use axum::routing::post;
    use tower::ServiceExt;

    fn update_from(address: &str) -> Request<axum::body::Body> {
        Request::post("/webhook/telegram")
            .header("x-forwarded-for", address)
            .body(axum::body::Body::empty())
            .unwrap()
    }

    #[test]
    fn too_many_requests_becomes_429() {
        let response = json_error_handler(GovernorError::TooManyRequests {
            wait_time: 3,
            headers: None,
        });
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["retry-after"], "3");
    }

    #[test]
    fn missing_client_key_is_an_internal_error() {
        let response = json_error_handler(GovernorError::UnableToExtractKey);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn flooding_source_does_not_drain_the_platform_bucket() {
        let app = Router::new()
            .route("/webhook/telegram", post(|| async { StatusCode::OK }))
            .layer(per_source_layer(60_000, 2));

        for _ in 0..2 {
            let response = app.clone().oneshot(update_from("203.0.113.7")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        let throttled = app.clone().oneshot(update_from("203.0.113.7")).await.unwrap();
        assert_eq!(throttled.status(), StatusCode::TOO_MANY_REQUESTS);

        let platform = app.oneshot(update_from("149.154.167.197")).await.unwrap();
        assert_eq!(platform.status(), StatusCode::OK);
    }
}
