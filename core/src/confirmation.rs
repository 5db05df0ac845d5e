//! One-shot confirmation tokens for two-phase confirm/cancel actions.
//!
//! A token is attached to a pair of buttons (confirm/cancel) that share it; the
//! verb carried next to it in the callback payload decides what happens with the
//! payload. Consumption removes the entry, so a second tap on either button (or a
//! tap on a message edited in the meantime) resolves to [`ConfirmationError::NotFound`].

use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::Mutex;

use crate::UserId;
use crate::auth::generate_confirmation_token;

pub const DEFAULT_TOKEN_TTL_SECS: i64 = 30 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfirmationError {
    #[error("confirmation token not found or expired")]
    NotFound,
}

#[derive(Debug)]
struct PendingConfirmation<P> {
    payload: P,
    owner: UserId,
    created_at: DateTime<Utc>,
}

pub struct ConfirmationCache<P> {
    ttl: ChronoDuration,
    entries: Mutex<HashMap<String, PendingConfirmation<P>>>,
}

impl<P> ConfirmationCache<P> {
    pub fn new(ttl: ChronoDuration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn issue(&self, owner: UserId, payload: P) -> String {
        self.issue_at(owner, payload, Utc::now()).await
    }

    pub async fn issue_at(&self, owner: UserId, payload: P, now: DateTime<Utc>) -> String {
        let mut entries = self.entries.lock().await;
        let token = loop {
            let candidate = generate_confirmation_token();
            if !entries.contains_key(&candidate) {
                break candidate;
            }
        };
        entries.insert(
            token.clone(),
            PendingConfirmation {
                payload,
                owner,
                created_at: now,
            },
        );
        token
    }

    pub async fn consume(&self, owner: UserId, token: &str) -> Result<P, ConfirmationError> {
        self.consume_at(owner, token, Utc::now()).await
    }

    /// Remove and return the payload. A token owned by someone else is reported as
    /// missing and left in place for its owner.
    pub async fn consume_at(
        &self,
        owner: UserId,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<P, ConfirmationError> {
        let mut entries = self.entries.lock().await;
        match entries.get(token) {
            None => return Err(ConfirmationError::NotFound),
            Some(entry) if entry.owner != owner => {
                tracing::warn!(
                    user_id = owner,
                    token_owner = entry.owner,
                    "confirmation token presented by a different user"
                );
                return Err(ConfirmationError::NotFound);
            }
            Some(entry) if now - entry.created_at > self.ttl => {
                entries.remove(token);
                return Err(ConfirmationError::NotFound);
            }
            Some(_) => {}
        }
        entries
            .remove(token)
            .map(|entry| entry.payload)
            .ok_or(ConfirmationError::NotFound)
    }

    /// Evict expired tokens. Returns how many were removed.
    pub async fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        let ttl = self.ttl;
        entries.retain(|_, entry| now - entry.created_at <= ttl);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

impl<P> Default for ConfirmationCache<P> {
    fn default() -> Self {
        Self::new(ChronoDuration::seconds(DEFAULT_TOKEN_TTL_SECS))
    }
}
