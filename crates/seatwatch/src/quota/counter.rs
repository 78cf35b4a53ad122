use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, TimeZone, Utc};

use super::Feature;
use crate::storage::RepositoryError;

/// Counter identity: one fixed window per subject and feature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    pub subject: String,
    pub feature: Feature,
}

impl CounterKey {
    pub fn new(subject: impl Into<String>, feature: Feature) -> Self {
        Self {
            subject: subject.into(),
            feature,
        }
    }
}

/// Counter state after a check-and-increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    pub admitted: bool,
    pub count: u32,
    pub reset_at: DateTime<Utc>,
}

/// Fixed-window counter store.
///
/// Implementations must perform the window reset, the comparison against `limit`, and the
/// increment as one atomic step (a single upsert-and-compare in a document store). A separate
/// read followed by a write lets concurrent callers overshoot the limit.
pub trait UsageCounter: Send + Sync {
    fn check_and_increment(
        &self,
        key: &CounterKey,
        limit: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<WindowState, RepositoryError>;
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: DateTime<Utc>,
    count: u32,
}

/// Process-local counter. The mutex scope is the atomic unit.
#[derive(Default)]
pub struct InMemoryUsageCounter {
    windows: Mutex<HashMap<CounterKey, Window>>,
}

impl InMemoryUsageCounter {
    /// Drops windows that ended before `now`; returns how many were removed.
    pub fn sweep(&self, window: Duration, now: DateTime<Utc>) -> usize {
        let Ok(mut guard) = self.windows.lock() else {
            return 0;
        };
        let before = guard.len();
        guard.retain(|_, state| state.started_at + window > now);
        before - guard.len()
    }
}

impl UsageCounter for InMemoryUsageCounter {
    fn check_and_increment(
        &self,
        key: &CounterKey,
        limit: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<WindowState, RepositoryError> {
        let window_start = align_to_window(now, window);
        let mut guard = self
            .windows
            .lock()
            .map_err(|_| RepositoryError::Unavailable("usage counter poisoned".to_string()))?;

        let state = guard.entry(key.clone()).or_insert(Window {
            started_at: window_start,
            count: 0,
        });
        if state.started_at != window_start {
            *state = Window {
                started_at: window_start,
                count: 0,
            };
        }

        let admitted = state.count < limit;
        if admitted {
            state.count += 1;
        }

        Ok(WindowState {
            admitted,
            count: state.count,
            reset_at: window_start + window,
        })
    }
}

/// Start of the fixed window containing `now`, aligned to multiples of `window` since the epoch.
pub(crate) fn align_to_window(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    let width = window.num_seconds().max(1);
    let secs = now.timestamp();
    let start = secs - secs.rem_euclid(width);
    Utc.timestamp_opt(start, 0).single().unwrap_or(now)
}
