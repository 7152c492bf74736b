use chrono::{DateTime, Utc};
use domain::{
    PhaseHistoryEntry, PostCompleteState, PresignedTx, ProcessingLock, RampErrorLog, RampRecord,
    StateMetadata,
};

use crate::{RampStoreError, Result};

/// A partial update of a ramp record, applied atomically by the store.
///
/// A phase transition sets `currentPhase` and appends its history entry in the
/// same write, so the two can never diverge.
#[derive(Debug, Clone, Default)]
pub struct RampUpdate {
    pub transition: Option<PhaseHistoryEntry>,
    pub state: Option<StateMetadata>,
    pub error_log: Option<RampErrorLog>,
    pub processing_lock: Option<ProcessingLock>,
    pub presigned_txs: Option<Vec<PresignedTx>>,
    pub post_complete_state: Option<PostCompleteState>,
    /// If set, the update fails with `ConcurrencyConflict` unless the record is at this version.
    pub expected_version: Option<i64>,
}

impl RampUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the ramp to `entry.phase`, appending `entry` to its phase history.
    pub fn transition(mut self, entry: PhaseHistoryEntry) -> Self {
        self.transition = Some(entry);
        self
    }

    /// Merges `patch` into the state bag; keys not in `patch` are left untouched.
    pub fn merge_state(mut self, patch: StateMetadata) -> Self {
        match self.state.as_mut() {
            Some(state) => state.merge(patch),
            None => self.state = Some(patch),
        }
        self
    }

    /// Appends one entry to the capped error log.
    pub fn error_log(mut self, entry: RampErrorLog) -> Self {
        self.error_log = Some(entry);
        self
    }

    pub fn processing_lock(mut self, lock: ProcessingLock) -> Self {
        self.processing_lock = Some(lock);
        self
    }

    pub fn presigned_txs(mut self, txs: Vec<PresignedTx>) -> Self {
        self.presigned_txs = Some(txs);
        self
    }

    pub fn post_complete_state(mut self, state: PostCompleteState) -> Self {
        self.post_complete_state = Some(state);
        self
    }

    pub fn expect_version(mut self, version: i64) -> Self {
        self.expected_version = Some(version);
        self
    }

    /// Applies the update to `ramp` in place, bumping its version and update time.
    ///
    /// On error `ramp` may be partially modified; callers discard it.
    pub fn apply(self, ramp: &mut RampRecord, now: DateTime<Utc>) -> Result<()> {
        if let Some(expected) = self.expected_version
            && ramp.version != expected
        {
            return Err(RampStoreError::ConcurrencyConflict {
                ramp_id: ramp.id,
                expected,
                actual: ramp.version,
            });
        }

        if let Some(entry) = self.transition {
            ramp.apply_transition(entry)?;
        }
        if let Some(patch) = self.state {
            ramp.state.merge(patch);
        }
        if let Some(entry) = self.error_log {
            ramp.record_error(entry);
        }
        if let Some(lock) = self.processing_lock {
            ramp.processing_lock = lock;
        }
        if let Some(txs) = self.presigned_txs {
            ramp.presigned_txs = Some(txs);
        }
        if let Some(state) = self.post_complete_state {
            ramp.post_complete_state = state;
        }

        ramp.version += 1;
        ramp.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::QuoteId;
    use domain::{NewRamp, RampDirection, RampPhase};

    fn ramp() -> RampRecord {
        RampRecord::create(NewRamp::new(RampDirection::Buy, QuoteId::new()), Utc::now()).unwrap()
    }

    #[test]
    fn test_transition_sets_phase_and_history() {
        let mut ramp = ramp();
        RampUpdate::new()
            .transition(PhaseHistoryEntry::new(RampPhase::BrlaOnrampMint, None))
            .apply(&mut ramp, Utc::now())
            .unwrap();

        assert_eq!(ramp.current_phase, RampPhase::BrlaOnrampMint);
        assert_eq!(ramp.phase_history.len(), 2);
        assert_eq!(ramp.version, 2);
    }

    #[test]
    fn test_merge_state_accumulates_patches() {
        let mut first = StateMetadata::new();
        first.insert("a", 1).unwrap();
        let mut second = StateMetadata::new();
        second.insert("b", 2).unwrap();

        let mut ramp = ramp();
        ramp.state.insert("keep", "me").unwrap();
        RampUpdate::new()
            .merge_state(first)
            .merge_state(second)
            .apply(&mut ramp, Utc::now())
            .unwrap();

        assert_eq!(ramp.state.len(), 3);
        assert_eq!(ramp.state.get_str("keep"), Some("me"));
    }

    #[test]
    fn test_version_mismatch_is_conflict() {
        let mut ramp = ramp();
        let result = RampUpdate::new()
            .processing_lock(ProcessingLock::acquired_at(Utc::now()))
            .expect_version(7)
            .apply(&mut ramp, Utc::now());

        assert!(matches!(
            result,
            Err(RampStoreError::ConcurrencyConflict {
                expected: 7,
                actual: 1,
                ..
            })
        ));
    }

    #[test]
    fn test_terminal_transition_is_rejected() {
        let mut ramp = ramp();
        RampUpdate::new()
            .transition(PhaseHistoryEntry::new(RampPhase::Complete, None))
            .apply(&mut ramp, Utc::now())
            .unwrap();

        let result = RampUpdate::new()
            .transition(PhaseHistoryEntry::new(RampPhase::Initial, None))
            .apply(&mut ramp, Utc::now());
        assert!(matches!(result, Err(RampStoreError::Domain(_))));
    }
}
