//! Service configuration from environment variables (`.env` in development).

use chrono::Duration as ChronoDuration;
use healthmate_core::config::OrchestratorConfig;
use healthmate_core::scheduler::{SchedulerError, parse_timezone};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{var} has an invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error(transparent)]
    Timezone(#[from] SchedulerError),
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub database_url: String,
    pub port: u16,
    pub bot_token: String,
    pub webhook_secret: String,
    pub telegram_api_base: String,
    pub completion_api_key: String,
    pub completion_api_base: String,
    pub completion_model: String,
    pub transcription_model: String,
    pub orchestrator: OrchestratorConfig,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |var: &'static str| {
            lookup(var)
                .filter(|value| !value.trim().is_empty())
                .ok_or(ConfigError::Missing(var))
        };
        let optional = |var: &'static str, default: &str| {
            lookup(var)
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let mut orchestrator = OrchestratorConfig::default();
        if let Some(raw) = lookup("HEALTHMATE_TIMEZONE") {
            orchestrator.timezone = parse_timezone(&raw)?;
        }
        if let Some(ceiling) = parse_number::<usize>(&lookup, "HEALTHMATE_RATE_LIMIT")? {
            orchestrator.rate_limit_ceiling = ceiling;
        }
        if let Some(secs) = parse_number::<i64>(&lookup, "HEALTHMATE_RATE_WINDOW_SECS")? {
            orchestrator.rate_limit_window = ChronoDuration::seconds(secs);
        }
        if let Some(secs) = parse_number::<i64>(&lookup, "HEALTHMATE_TOKEN_TTL_SECS")? {
            orchestrator.confirmation_ttl = ChronoDuration::seconds(secs);
        }

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            port: parse_number(&lookup, "PORT")?.unwrap_or(3000),
            bot_token: required("TELEGRAM_BOT_TOKEN")?,
            webhook_secret: required("TELEGRAM_WEBHOOK_SECRET")?,
            telegram_api_base: optional("TELEGRAM_API_BASE", "https://api.telegram.org"),
            completion_api_key: required("COMPLETION_API_KEY")?,
            completion_api_base: optional("COMPLETION_API_BASE", "https://api.openai.com/v1"),
            completion_model: optional("COMPLETION_MODEL", "gpt-4o-mini"),
            transcription_model: optional("TRANSCRIPTION_MODEL", "whisper-1"),
            orchestrator,
        })
    }
}

/// Positive number from `var`, or `None` when unset.
fn parse_number<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    let invalid = |reason: String| ConfigError::Invalid {
        var,
        value: raw.clone(),
        reason,
    };
    let value: T = raw.trim().parse().map_err(|err: T::Err| invalid(err.to_string()))?;
    if value <= T::default() {
        return Err(invalid("must be positive".to_string()));
    }
    Ok(Some(value))
}
