//! Ramp record model for the ramp saga engine.
//!
//! A ramp is one end-to-end fiat/chain conversion. Its persisted record holds:
//! - the phase currently due for execution, drawn from a fixed set of names
//! - transaction material prepared before the saga starts, tagged by phase
//! - an open key/value state bag that handlers accumulate results into
//! - an append-only phase history and a bounded error log
//! - the processing lock used to keep a single executor per ramp

pub mod direction;
pub mod error;
pub mod error_log;
pub mod history;
pub mod lock;
pub mod metadata;
pub mod phase;
pub mod ramp;
pub mod transaction;

pub use common::{QuoteId, RampId};
pub use direction::RampDirection;
pub use error::{DomainError, Result};
pub use error_log::{ErrorLogs, MAX_ERROR_LOGS, RampErrorLog};
pub use history::PhaseHistoryEntry;
pub use lock::ProcessingLock;
pub use metadata::StateMetadata;
pub use phase::RampPhase;
pub use ramp::{CleanupError, CleanupState, MAX_TRANSACTIONS, NewRamp, PostCompleteState, RampRecord};
pub use transaction::{PresignedTx, TxMeta, UnsignedTx};
