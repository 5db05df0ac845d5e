use std::sync::Arc;

use healthmate_core::dispatcher::Dispatcher;
use healthmate_core::jobs::HealthMonitor;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub health: HealthMonitor,
    /// Expected value of the `X-Telegram-Bot-Api-Secret-Token` header.
    pub webhook_secret: Arc<str>,
}
