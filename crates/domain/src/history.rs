//! Phase history entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::phase::RampPhase;

/// One entry of a ramp's append-only phase log.
///
/// The first entry for a phase is the authoritative time the ramp entered it;
/// payment windows are measured from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseHistoryEntry {
    pub phase: RampPhase,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl PhaseHistoryEntry {
    /// Creates an entry for entering `phase` now.
    pub fn new(phase: RampPhase, metadata: Option<serde_json::Value>) -> Self {
        Self::at(phase, Utc::now(), metadata)
    }

    pub fn at(
        phase: RampPhase,
        timestamp: DateTime<Utc>,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        Self {
            phase,
            timestamp,
            metadata,
        }
    }
}
