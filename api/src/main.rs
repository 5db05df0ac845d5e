use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use chrono::{DateTime, Utc};
use healthmate_core::collaborators::Collaborators;
use healthmate_core::dispatcher::Dispatcher;
use healthmate_core::flows::FlowContext;
use healthmate_core::jobs::{HealthMonitor, Jobs, register_default_jobs};
use healthmate_core::scheduler::Scheduler;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod auth;
mod completion;
mod config;
mod error;
mod extract;
mod middleware;
mod routes;
mod state;
mod store;
mod telegram;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Healthmate API",
        version = "0.1.0",
        description = "Webhook surface of the healthmate chat assistant."
    ),
    paths(
        routes::health::health_check,
        routes::webhook::telegram_webhook,
    ),
    components(schemas(
        HealthResponse,
        healthmate_core::error::ApiError,
        routes::webhook::Update,
        routes::webhook::TelegramMessage,
        routes::webhook::TelegramUser,
        routes::webhook::TelegramChat,
        routes::webhook::PhotoSize,
        routes::webhook::FileRef,
        routes::webhook::TelegramDocument,
        routes::webhook::CallbackQuery,
    ))
)]
struct ApiDoc;

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Collaborators that failed the last probe
    pub failing: Vec<String>,
    pub checked_at: Option<DateTime<Utc>>,
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "healthmate_api=debug,healthmate_core=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = config::ServiceConfig::from_env().expect("Invalid configuration");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    sqlx::migrate!("../migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let io = Collaborators {
        store: Arc::new(store::PgStore::new(pool)),
        completion: Arc::new(completion::CompletionClient::new(
            &config.completion_api_base,
            &config.completion_api_key,
            &config.completion_model,
            &config.transcription_model,
        )),
        messenger: Arc::new(telegram::TelegramMessenger::new(
            &config.telegram_api_base,
            &config.bot_token,
        )),
        budgets: config.orchestrator.budgets,
    };
    let timezone = config.orchestrator.timezone;
    let dispatcher = Dispatcher::new(Arc::new(FlowContext::new(io, config.orchestrator.clone())));
    let health = HealthMonitor::default();

    // Recurring jobs
    let jobs = Jobs::new(dispatcher.clone(), health.clone());
    let mut scheduler = Scheduler::new();
    register_default_jobs(&mut scheduler, jobs.clone(), timezone)
        .expect("Invalid job schedule");
    let _job_handles = scheduler.spawn();
    tokio::spawn(async move {
        jobs.probe_health().await;
    });

    let app_state = state::AppState {
        dispatcher,
        health,
        webhook_secret: Arc::from(config.webhook_secret.as_str()),
    };

    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(routes::health::router())
        .merge(routes::webhook::router())
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%timezone, "Healthmate API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}
