//! Domain error types.

use thiserror::Error;

use crate::phase::RampPhase;

/// Errors raised by the ramp record model.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A key a handler depends on is absent from the state bag.
    #[error("State metadata corrupted: missing '{key}'")]
    MissingState { key: String },

    /// A key is present in the state bag but holds an unusable value.
    #[error("State metadata corrupted: invalid '{key}': {reason}")]
    InvalidState { key: String, reason: String },

    /// Terminal phases never transition further.
    #[error("Ramp is in terminal phase {phase} and cannot transition to {next}")]
    TerminalPhase { phase: RampPhase, next: RampPhase },

    /// A phase name that is not part of the ramp phase graph.
    #[error("Unknown ramp phase: {0}")]
    UnknownPhase(String),

    /// Too much transaction material attached to a ramp.
    #[error("Too many transactions: {count} (at most {max} allowed)")]
    TooManyTransactions { count: usize, max: usize },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for domain results.
pub type Result<T> = std::result::Result<T, DomainError>;
