//! Persisted processing lock.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Cross-process half of the per-ramp mutual exclusion.
///
/// A lock held for longer than the configured TTL is considered expired and may
/// be force-cleared by the next executor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingLock {
    pub locked: bool,
    pub locked_at: Option<DateTime<Utc>>,
}

impl ProcessingLock {
    /// A lock taken at `now`.
    pub fn acquired_at(now: DateTime<Utc>) -> Self {
        Self {
            locked: true,
            locked_at: Some(now),
        }
    }

    /// An unlocked lock.
    pub fn released() -> Self {
        Self::default()
    }

    /// Returns true if the lock is held and has been held for longer than `ttl`.
    ///
    /// A held lock without a timestamp counts as expired.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        if !self.locked {
            return false;
        }
        match self.locked_at {
            Some(locked_at) => now - locked_at > ttl,
            None => true,
        }
    }
}
