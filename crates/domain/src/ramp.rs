//! The persisted ramp record.

use chrono::{DateTime, Utc};
use common::{QuoteId, RampId};
use serde::{Deserialize, Serialize};

use crate::direction::RampDirection;
use crate::error::{DomainError, Result};
use crate::error_log::{ErrorLogs, RampErrorLog};
use crate::history::PhaseHistoryEntry;
use crate::lock::ProcessingLock;
use crate::metadata::StateMetadata;
use crate::phase::RampPhase;
use crate::transaction::{PresignedTx, UnsignedTx};

/// Maximum number of unsigned or presigned transactions attached to one ramp.
pub const MAX_TRANSACTIONS: usize = 100;

/// A cleanup failure recorded after a ramp completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupError {
    pub name: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupState {
    pub cleanup_completed: bool,
    pub cleanup_at: Option<DateTime<Utc>>,
    pub errors: Option<Vec<CleanupError>>,
}

/// Bookkeeping for work done after a ramp reached `complete`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostCompleteState {
    pub cleanup: CleanupState,
}

/// The saga state of one ramp.
///
/// The record is never deleted; once terminal it is the permanent audit trail
/// of the conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RampRecord {
    pub id: RampId,
    #[serde(rename = "type")]
    pub direction: RampDirection,
    pub current_phase: RampPhase,
    pub unsigned_txs: Vec<UnsignedTx>,
    pub presigned_txs: Option<Vec<PresignedTx>>,
    pub from: String,
    pub to: String,
    pub state: StateMetadata,
    pub payment_method: String,
    pub quote_id: QuoteId,
    pub phase_history: Vec<PhaseHistoryEntry>,
    pub error_logs: ErrorLogs,
    pub processing_lock: ProcessingLock,
    pub post_complete_state: PostCompleteState,
    /// Incremented by the store on every update.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RampRecord {
    /// Materializes a new ramp from its creation attributes.
    ///
    /// The initial phase is recorded as the first phase history entry.
    pub fn create(new_ramp: NewRamp, now: DateTime<Utc>) -> Result<Self> {
        new_ramp.validate()?;

        Ok(Self {
            id: new_ramp.id.unwrap_or_default(),
            direction: new_ramp.direction,
            current_phase: new_ramp.initial_phase,
            unsigned_txs: new_ramp.unsigned_txs,
            presigned_txs: new_ramp.presigned_txs,
            from: new_ramp.from,
            to: new_ramp.to,
            state: new_ramp.state,
            payment_method: new_ramp.payment_method,
            quote_id: new_ramp.quote_id,
            phase_history: vec![PhaseHistoryEntry::at(new_ramp.initial_phase, now, None)],
            error_logs: ErrorLogs::new(),
            processing_lock: ProcessingLock::released(),
            post_complete_state: PostCompleteState::default(),
            version: 1,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_terminal(&self) -> bool {
        self.current_phase.is_terminal()
    }

    /// Returns true once presigned transaction material is attached, i.e. the saga has started.
    pub fn has_transaction_material(&self) -> bool {
        self.presigned_txs.as_ref().is_some_and(|txs| !txs.is_empty())
    }

    /// Looks up the presigned transaction tagged with `phase`. At most one is expected.
    pub fn presigned_tx(&self, phase: RampPhase) -> Option<&PresignedTx> {
        self.presigned_txs
            .as_deref()
            .and_then(|txs| txs.iter().find(|tx| tx.phase == phase))
    }

    pub fn unsigned_tx(&self, phase: RampPhase) -> Option<&UnsignedTx> {
        self.unsigned_txs.iter().find(|tx| tx.phase == phase)
    }

    /// Time the ramp first entered `phase`, according to its phase history.
    pub fn phase_entered_at(&self, phase: RampPhase) -> Option<DateTime<Utc>> {
        self.phase_history
            .iter()
            .find(|entry| entry.phase == phase)
            .map(|entry| entry.timestamp)
    }

    /// Moves the ramp to the phase of `entry` and appends the entry to the history.
    pub fn apply_transition(&mut self, entry: PhaseHistoryEntry) -> Result<()> {
        if self.is_terminal() {
            return Err(DomainError::TerminalPhase {
                phase: self.current_phase,
                next: entry.phase,
            });
        }
        self.current_phase = entry.phase;
        self.phase_history.push(entry);
        Ok(())
    }

    pub fn record_error(&mut self, entry: RampErrorLog) {
        self.error_logs.push(entry);
    }
}

/// Attributes supplied by the registration flow when a ramp is created.
#[derive(Debug, Clone)]
pub struct NewRamp {
    pub id: Option<RampId>,
    pub direction: RampDirection,
    pub initial_phase: RampPhase,
    pub unsigned_txs: Vec<UnsignedTx>,
    pub presigned_txs: Option<Vec<PresignedTx>>,
    pub from: String,
    pub to: String,
    pub state: StateMetadata,
    pub payment_method: String,
    pub quote_id: QuoteId,
}

impl NewRamp {
    /// Starts a ramp description in the `initial` phase with no transaction material.
    pub fn new(direction: RampDirection, quote_id: QuoteId) -> Self {
        Self {
            id: None,
            direction,
            initial_phase: RampPhase::Initial,
            unsigned_txs: Vec::new(),
            presigned_txs: None,
            from: String::new(),
            to: String::new(),
            state: StateMetadata::new(),
            payment_method: String::new(),
            quote_id,
        }
    }

    pub fn with_id(mut self, id: RampId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn initial_phase(mut self, phase: RampPhase) -> Self {
        self.initial_phase = phase;
        self
    }

    pub fn route(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.from = from.into();
        self.to = to.into();
        self
    }

    pub fn payment_method(mut self, payment_method: impl Into<String>) -> Self {
        self.payment_method = payment_method.into();
        self
    }

    pub fn unsigned_txs(mut self, txs: Vec<UnsignedTx>) -> Self {
        self.unsigned_txs = txs;
        self
    }

    pub fn presigned_txs(mut self, txs: Vec<PresignedTx>) -> Self {
        self.presigned_txs = Some(txs);
        self
    }

    pub fn state(mut self, state: StateMetadata) -> Self {
        self.state = state;
        self
    }

    fn validate(&self) -> Result<()> {
        let presigned = self.presigned_txs.as_ref().map_or(0, Vec::len);
        for count in [self.unsigned_txs.len(), presigned] {
            if count > MAX_TRANSACTIONS {
                return Err(DomainError::TooManyTransactions {
                    count,
                    max: MAX_TRANSACTIONS,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tx(phase: RampPhase, nonce: u64) -> PresignedTx {
        UnsignedTx::new(phase, "pendulum", "5Ephemeral", nonce, json!("0xdead"))
    }

    fn new_ramp() -> NewRamp {
        NewRamp::new(RampDirection::Sell, QuoteId::new())
            .route("polygon", "pix")
            .payment_method("pix")
    }

    #[test]
    fn test_create_records_initial_history() {
        let now = Utc::now();
        let ramp = RampRecord::create(new_ramp(), now).unwrap();

        assert_eq!(ramp.current_phase, RampPhase::Initial);
        assert_eq!(ramp.phase_history.len(), 1);
        assert_eq!(ramp.phase_history[0].phase, RampPhase::Initial);
        assert_eq!(ramp.phase_history[0].timestamp, now);
        assert_eq!(ramp.version, 1);
        assert!(!ramp.processing_lock.locked);
        assert!(ramp.error_logs.is_empty());
        assert!(!ramp.has_transaction_material());
    }

    #[test]
    fn test_create_uses_supplied_id_and_phase() {
        let id = RampId::new();
        let ramp = RampRecord::create(
            new_ramp().with_id(id).initial_phase(RampPhase::FundEphemeral),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(ramp.id, id);
        assert_eq!(ramp.phase_history[0].phase, RampPhase::FundEphemeral);
    }

    #[test]
    fn test_create_rejects_too_many_transactions() {
        let txs: Vec<_> = (0..=MAX_TRANSACTIONS as u64)
            .map(|n| tx(RampPhase::NablaSwap, n))
            .collect();
        let result = RampRecord::create(new_ramp().presigned_txs(txs), Utc::now());
        assert!(matches!(
            result,
            Err(DomainError::TooManyTransactions { count: 101, .. })
        ));
    }

    #[test]
    fn test_presigned_lookup_by_phase() {
        let ramp = RampRecord::create(
            new_ramp().presigned_txs(vec![
                tx(RampPhase::NablaApprove, 0),
                tx(RampPhase::NablaSwap, 1),
            ]),
            Utc::now(),
        )
        .unwrap();

        assert!(ramp.has_transaction_material());
        assert_eq!(ramp.presigned_tx(RampPhase::NablaSwap).unwrap().nonce, 1);
        assert!(ramp.presigned_tx(RampPhase::DistributeFees).is_none());
    }

    #[test]
    fn test_transition_appends_history() {
        let mut ramp = RampRecord::create(new_ramp(), Utc::now()).unwrap();
        ramp.apply_transition(PhaseHistoryEntry::new(RampPhase::FundEphemeral, None))
            .unwrap();

        assert_eq!(ramp.current_phase, RampPhase::FundEphemeral);
        assert_eq!(ramp.phase_history.len(), 2);
        assert_eq!(ramp.phase_history.last().unwrap().phase, ramp.current_phase);
        assert!(ramp.phase_entered_at(RampPhase::FundEphemeral).is_some());
    }

    #[test]
    fn test_terminal_phase_does_not_transition() {
        let mut ramp = RampRecord::create(new_ramp(), Utc::now()).unwrap();
        ramp.apply_transition(PhaseHistoryEntry::new(RampPhase::Failed, None))
            .unwrap();

        let result = ramp.apply_transition(PhaseHistoryEntry::new(RampPhase::NablaSwap, None));
        assert!(matches!(result, Err(DomainError::TerminalPhase { .. })));
        assert_eq!(ramp.current_phase, RampPhase::Failed);
        assert_eq!(ramp.phase_history.len(), 2);
    }

    #[test]
    fn test_serialized_shape() {
        let ramp = RampRecord::create(new_ramp(), Utc::now()).unwrap();
        let json = serde_json::to_value(&ramp).unwrap();
        assert_eq!(json["type"], "SELL");
        assert_eq!(json["currentPhase"], "initial");
        assert_eq!(json["processingLock"]["locked"], false);
        assert_eq!(json["postCompleteState"]["cleanup"]["cleanupCompleted"], false);

        let back: RampRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, ramp);
    }
}
