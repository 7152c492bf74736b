//! Bounded error log attached to every ramp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::phase::RampPhase;

/// Maximum number of error log entries retained per ramp. Oldest entries are dropped first.
pub const MAX_ERROR_LOGS: usize = 100;

/// One failure recorded against a ramp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RampErrorLog {
    pub timestamp: DateTime<Utc>,
    pub phase: RampPhase,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default)]
    pub recoverable: bool,
}

impl RampErrorLog {
    /// Creates a non-recoverable entry stamped with the current time.
    pub fn new(phase: RampPhase, error: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            phase,
            error: error.into(),
            details: None,
            recoverable: false,
        }
    }

    pub fn recoverable(mut self, recoverable: bool) -> Self {
        self.recoverable = recoverable;
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Error log capped at [`MAX_ERROR_LOGS`] entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<RampErrorLog>", into = "Vec<RampErrorLog>")]
pub struct ErrorLogs(Vec<RampErrorLog>);

impl ErrorLogs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry, dropping the oldest entries beyond the cap.
    pub fn push(&mut self, entry: RampErrorLog) {
        self.0.push(entry);
        self.truncate_to_cap();
    }

    pub fn last(&self) -> Option<&RampErrorLog> {
        self.0.last()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RampErrorLog> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[RampErrorLog] {
        &self.0
    }

    fn truncate_to_cap(&mut self) {
        if self.0.len() > MAX_ERROR_LOGS {
            let excess = self.0.len() - MAX_ERROR_LOGS;
            self.0.drain(..excess);
        }
    }
}

impl From<Vec<RampErrorLog>> for ErrorLogs {
    fn from(entries: Vec<RampErrorLog>) -> Self {
        let mut logs = Self(entries);
        logs.truncate_to_cap();
        logs
    }
}

impl From<ErrorLogs> for Vec<RampErrorLog> {
    fn from(logs: ErrorLogs) -> Self {
        logs.0
    }
}
