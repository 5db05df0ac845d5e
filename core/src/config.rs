use chrono::Duration as ChronoDuration;
use chrono_tz::Tz;

use crate::confirmation::DEFAULT_TOKEN_TTL_SECS;
use crate::rate_limit::{DEFAULT_CEILING, DEFAULT_WINDOW_SECS};
use crate::resilience::CallBudgets;

/// Tunables of the orchestration layer. The service crate fills this from the
/// environment; tests use `Default`.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub rate_limit_ceiling: usize,
    pub rate_limit_window: ChronoDuration,
    pub confirmation_ttl: ChronoDuration,
    /// Timezone for "today", report dates and job triggers.
    pub timezone: Tz,
    pub budgets: CallBudgets,
    /// Quick-add buttons offered by the water menu, in ml.
    pub water_presets: Vec<u32>,
    pub completion_max_tokens: u32,
    pub plan_max_tokens: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            rate_limit_ceiling: DEFAULT_CEILING,
            rate_limit_window: ChronoDuration::seconds(DEFAULT_WINDOW_SECS),
            confirmation_ttl: ChronoDuration::seconds(DEFAULT_TOKEN_TTL_SECS),
            timezone: chrono_tz::UTC,
            budgets: CallBudgets::default(),
            water_presets: vec![200, 250, 500],
            completion_max_tokens: 800,
            plan_max_tokens: 3_000,
        }
    }
}
