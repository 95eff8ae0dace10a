//! # Rate Limiter Module
//!
//! Sliding-window limits per (user, action kind). Every configured window
//! for a kind is checked against the same timestamp list, so one recorded
//! action counts against all of them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::clock::{elapsed_between, Clock};
use crate::config::{RateLimitConfig, WindowLimit};
use crate::errors::{BotError, BotResult};
use crate::model::UserId;
use crate::persistence::RateLimitStore;

/// Kinds of actions that are rate limited separately
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    /// Paid face-swap job submission
    Swap,
    /// GIF search query
    Search,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Swap => "swap",
            ActionKind::Search => "search",
        }
    }
}

/// Outcome of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Denied { retry_after: Duration },
}

impl RateDecision {
    /// Wait time rounded up to whole minutes
    pub fn retry_after_minutes(&self) -> u64 {
        match self {
            RateDecision::Allowed => 0,
            RateDecision::Denied { retry_after } => {
                retry_after.as_nanos().div_ceil(60_000_000_000).max(1) as u64
            }
        }
    }

    /// Convert a denial into the error reported to the user
    pub fn into_result(self) -> BotResult<()> {
        match self {
            RateDecision::Allowed => Ok(()),
            denied => Err(BotError::RateLimited {
                retry_after_minutes: denied.retry_after_minutes(),
            }),
        }
    }
}

/// Evaluate windows against a timestamp list without mutating it
pub fn evaluate_windows(
    timestamps: &[DateTime<Utc>],
    windows: &[WindowLimit],
    now: DateTime<Utc>,
) -> RateDecision {
    let mut longest_wait: Option<Duration> = None;

    for limit in windows {
        let in_window: Vec<&DateTime<Utc>> = timestamps
            .iter()
            .filter(|&&t| elapsed_between(t, now) < limit.window)
            .collect();

        if in_window.len() < limit.limit {
            continue;
        }

        let Some(oldest) = in_window.iter().min() else {
            continue;
        };
        let age = elapsed_between(**oldest, now);
        let wait = limit.window.saturating_sub(age);
        longest_wait = Some(longest_wait.map_or(wait, |current| current.max(wait)));
    }

    match longest_wait {
        Some(retry_after) => RateDecision::Denied { retry_after },
        None => RateDecision::Allowed,
    }
}

/// Sliding window rate limiter over an injected store
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
    config: RateLimitConfig,
    key_locks: Mutex<HashMap<(UserId, ActionKind), Arc<Mutex<()>>>>,
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn RateLimitStore>,
        clock: Arc<dyn Clock>,
        config: RateLimitConfig,
    ) -> Self {
        Self {
            store,
            clock,
            config,
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    fn windows_for(&self, kind: ActionKind) -> &[WindowLimit] {
        match kind {
            ActionKind::Swap => &self.config.swap_windows,
            ActionKind::Search => &self.config.search_windows,
        }
    }

    async fn key_lock(&self, user_id: UserId, kind: ActionKind) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().await;
        // Only the map holds an idle key's lock
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry((user_id, kind))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Check whether the action is allowed right now. Does not record it.
    ///
    /// Storage failures are logged and returned as errors; callers treat
    /// them as a denial since this gates paid work.
    pub async fn check(&self, user_id: UserId, kind: ActionKind) -> BotResult<RateDecision> {
        let timestamps = self.store.load_window(user_id, kind).await.map_err(|e| {
            error!(user_id, kind = kind.as_str(), error = %e, "Rate limit store read failed");
            e
        })?;

        let decision = evaluate_windows(&timestamps, self.windows_for(kind), self.clock.now());
        debug!(user_id, kind = kind.as_str(), decision = ?decision, "Rate limit checked");
        Ok(decision)
    }

    /// Record an action: prune entries past retention and append now
    pub async fn record(&self, user_id: UserId, kind: ActionKind) -> BotResult<()> {
        let lock = self.key_lock(user_id, kind).await;
        let _guard = lock.lock().await;

        let now = self.clock.now();
        let mut timestamps = self.store.load_window(user_id, kind).await?;
        timestamps.retain(|&t| elapsed_between(t, now) < self.config.retention);
        timestamps.push(now);

        self.store
            .save_window(user_id, kind, &timestamps)
            .await
            .map_err(|e| {
                error!(user_id, kind = kind.as_str(), error = %e, "Rate limit store write failed");
                e
            })
    }

    /// Check, then record when allowed; denial comes back as `RateLimited`
    pub async fn check_and_record(&self, user_id: UserId, kind: ActionKind) -> BotResult<()> {
        let lock = self.key_lock(user_id, kind).await;
        let _guard = lock.lock().await;

        let now = self.clock.now();
        let mut timestamps = self.store.load_window(user_id, kind).await?;
        evaluate_windows(&timestamps, self.windows_for(kind), now).into_result()?;

        timestamps.retain(|&t| elapsed_between(t, now) < self.config.retention);
        timestamps.push(now);
        self.store.save_window(user_id, kind, &timestamps).await
    }
}
