//! Per-client submission limiter.
//!
//! Every client identity owns a log of the instants at which its attempts
//! were admitted. A new attempt is admitted while fewer than
//! `max_submissions` of those instants fall inside the trailing window.
//! Expired instants are dropped lazily, on the next check for that identity.

use crate::config::RateLimitConfig;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

type SubmissionWindow = Vec<DateTime<Utc>>;

/// Sliding-window log limiter keyed by client identity.
///
/// The state lives in process memory only. A restart (or a serverless cold
/// start) forgets every window, which is accepted behavior for a best-effort
/// spam brake.
pub struct RateLimiter {
    config: RateLimitConfig,
    state: Mutex<LimiterState>,
}

#[derive(Default)]
struct LimiterState {
    windows: HashMap<String, SubmissionWindow>,
    last_prune: Option<DateTime<Utc>>,
}

impl LimiterState {
    /// Drops identities with no live entries, at most once per window.
    fn prune(&mut self, now: DateTime<Utc>, window: chrono::Duration, cap: usize) {
        if self.windows.len() <= cap {
            return;
        }
        if self.last_prune.is_some_and(|at| now - at < window) {
            return;
        }
        let before = self.windows.len();
        self.windows
            .retain(|_, entries| entries.iter().any(|ts| now - *ts < window));
        self.last_prune = Some(now);
        debug!(
            dropped = before - self.windows.len(),
            tracked = self.windows.len(),
            "Pruned limiter map"
        );
    }
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: Mutex::new(LimiterState::default()),
        }
    }

    /// Records an attempt for `identity` at `now` and reports whether it is
    /// admitted. Denied attempts are not recorded.
    ///
    /// All calls share one lock, so two concurrent attempts can never both
    /// observe the same count.
    pub async fn admit(&self, identity: &str, now: DateTime<Utc>) -> bool {
        let window = self.config.window();
        let mut state = self.state.lock().await;
        state.prune(now, window, self.config.max_identities);

        let entries = state.windows.entry(identity.to_string()).or_default();
        entries.retain(|ts| now - *ts < window);

        if entries.len() >= self.config.max_submissions {
            debug!(
                identity,
                recent = entries.len(),
                "Submission window full"
            );
            return false;
        }

        entries.push(now);
        true
    }

    /// Number of attempts for `identity` still inside the window at `now`.
    pub async fn recent(&self, identity: &str, now: DateTime<Utc>) -> usize {
        let window = self.config.window();
        self.state
            .lock()
            .await
            .windows
            .get(identity)
            .map(|entries| entries.iter().filter(|ts| now - **ts < window).count())
            .unwrap_or(0)
    }

    pub async fn tracked_identities(&self) -> usize {
        self.state.lock().await.windows.len()
    }
}
