//! Sliding-window admission control per chat user.
//!
//! Each user owns an ordered list of admission timestamps. Entries older than the
//! window are pruned before every check and by the periodic [`RateLimiter::sweep`],
//! so memory stays bounded by the number of recently active users.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::Mutex;

use crate::UserId;

pub const DEFAULT_CEILING: usize = 20;
pub const DEFAULT_WINDOW_SECS: i64 = 60;

#[derive(Debug, Default)]
struct RateWindow {
    admitted: VecDeque<DateTime<Utc>>,
    rejection_notified_at: Option<DateTime<Utc>>,
}

impl RateWindow {
    fn prune(&mut self, cutoff: DateTime<Utc>) {
        while let Some(oldest) = self.admitted.front() {
            if *oldest <= cutoff {
                self.admitted.pop_front();
            } else {
                break;
            }
        }
    }
}

pub struct RateLimiter {
    ceiling: usize,
    window: ChronoDuration,
    windows: Mutex<HashMap<UserId, RateWindow>>,
}

impl RateLimiter {
    pub fn new(ceiling: usize, window: ChronoDuration) -> Self {
        Self {
            ceiling,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub async fn admit(&self, user_id: UserId) -> bool {
        self.admit_at(user_id, Utc::now()).await
    }

    /// Admit or reject one event. A rejected event is not recorded, so a user
    /// hammering the bot does not extend their own lockout.
    pub async fn admit_at(&self, user_id: UserId, now: DateTime<Utc>) -> bool {
        let cutoff = now - self.window;
        let mut windows = self.windows.lock().await;
        let window = windows.entry(user_id).or_default();
        window.prune(cutoff);

        if window.admitted.len() >= self.ceiling {
            tracing::debug!(user_id, in_window = window.admitted.len(), "rate limit reached");
            return false;
        }
        window.admitted.push_back(now);
        true
    }

    /// Whether a rejected user should be told to slow down. At most one notice per
    /// window, otherwise the notices themselves become the flood.
    pub async fn take_rejection_notice(&self, user_id: UserId, now: DateTime<Utc>) -> bool {
        let mut windows = self.windows.lock().await;
        let Some(window) = windows.get_mut(&user_id) else {
            return false;
        };
        match window.rejection_notified_at {
            Some(at) if now - at < self.window => false,
            _ => {
                window.rejection_notified_at = Some(now);
                true
            }
        }
    }

    /// Drop users whose whole history aged out. Returns how many were removed.
    pub async fn sweep(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.window;
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, window| {
            window.prune(cutoff);
            !window.admitted.is_empty()
        });
        before - windows.len()
    }

    pub async fn tracked_users(&self) -> usize {
        self.windows.lock().await.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_CEILING, ChronoDuration::seconds(DEFAULT_WINDOW_SECS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(ceiling: usize) -> RateLimiter {
        RateLimiter::new(ceiling, ChronoDuration::seconds(60))
    }

    #[tokio::test]
    async fn unknown_user_is_admitted() {
        assert!(limiter(1).admit_at(7, Utc::now()).await);
    }

    #[tokio::test]
    async fn request_over_ceiling_is_rejected() {
        let limiter = limiter(3);
        let now = Utc::now();
        for offset in 0..3 {
            assert!(limiter.admit_at(1, now + ChronoDuration::seconds(offset)).await);
        }
        assert!(!limiter.admit_at(1, now + ChronoDuration::seconds(4)).await);
        // other users are unaffected
        assert!(limiter.admit_at(2, now + ChronoDuration::seconds(4)).await);
    }

    #[tokio::test]
    async fn admission_resumes_once_oldest_entry_leaves_window() {
        let limiter = limiter(2);
        let start = Utc::now();
        assert!(limiter.admit_at(1, start).await);
        assert!(limiter.admit_at(1, start + ChronoDuration::seconds(30)).await);
        assert!(!limiter.admit_at(1, start + ChronoDuration::seconds(59)).await);
        assert!(limiter.admit_at(1, start + ChronoDuration::seconds(61)).await);
        // the slot freed by `start` is used again; the one from +30s is still inside
        assert!(!limiter.admit_at(1, start + ChronoDuration::seconds(62)).await);
    }

    #[tokio::test]
    async fn rejections_are_not_recorded() {
        let limiter = limiter(1);
        let start = Utc::now();
        assert!(limiter.admit_at(1, start).await);
        for offset in 1..50 {
            assert!(!limiter.admit_at(1, start + ChronoDuration::seconds(offset)).await);
        }
        assert!(limiter.admit_at(1, start + ChronoDuration::seconds(61)).await);
    }

    #[tokio::test]
    async fn sweep_removes_only_idle_users() {
        let limiter = limiter(5);
        let start = Utc::now();
        limiter.admit_at(1, start).await;
        limiter.admit_at(2, start + ChronoDuration::seconds(50)).await;

        let removed = limiter.sweep(start + ChronoDuration::seconds(90)).await;
        assert_eq!(removed, 1);
        assert_eq!(limiter.tracked_users().await, 1);
    }

    #[tokio::test]
    async fn rejection_notice_once_per_window() {
        let limiter = limiter(1);
        let now = Utc::now();
        limiter.admit_at(1, now).await;
        assert!(limiter.take_rejection_notice(1, now).await);
        assert!(!limiter.take_rejection_notice(1, now + ChronoDuration::seconds(10)).await);
        assert!(limiter.take_rejection_notice(1, now + ChronoDuration::seconds(61)).await);
    }
}
