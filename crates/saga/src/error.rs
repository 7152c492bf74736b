//! Saga error types.
//!
//! [`PhaseError`] is the failure taxonomy handlers raise on purpose: a
//! recoverable error is retried in-process with backoff, an unrecoverable one
//! parks the ramp immediately. Every other error that escapes a handler is
//! treated as unrecoverable.

use std::time::Duration;

use common::RampId;
use domain::{DomainError, RampPhase};
use ramp_store::RampStoreError;
use thiserror::Error;

/// A failure deliberately raised by a phase handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhaseError {
    /// Transient condition: funds not yet arrived, RPC hiccup, tx not finalized.
    #[error("{message}")]
    Recoverable {
        message: String,
        /// Lower bound on the delay before the next attempt.
        min_wait: Option<Duration>,
    },

    /// Corrupt or missing state, invalid configuration, failed on-chain outcome.
    #[error("{message}")]
    Unrecoverable { message: String },
}

impl PhaseError {
    pub fn recoverable(message: impl Into<String>) -> Self {
        PhaseError::Recoverable {
            message: message.into(),
            min_wait: None,
        }
    }

    /// A recoverable error that should not be retried sooner than `min_wait`.
    pub fn recoverable_after(message: impl Into<String>, min_wait: Duration) -> Self {
        PhaseError::Recoverable {
            message: message.into(),
            min_wait: Some(min_wait),
        }
    }

    pub fn unrecoverable(message: impl Into<String>) -> Self {
        PhaseError::Unrecoverable {
            message: message.into(),
        }
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, PhaseError::Recoverable { .. })
    }

    pub fn min_wait(&self) -> Option<Duration> {
        match self {
            PhaseError::Recoverable { min_wait, .. } => *min_wait,
            PhaseError::Unrecoverable { .. } => None,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            PhaseError::Recoverable { message, .. } | PhaseError::Unrecoverable { message } => {
                message
            }
        }
    }
}

/// Errors returned by external collaborators (chain RPC, payment provider).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The call did not reach the remote side or got no answer; safe to retry.
    #[error("Network error: {0}")]
    Network(String),

    /// The remote side refused the request.
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// The referenced account, transaction or ticket does not exist.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<ServiceError> for PhaseError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Network(_) => PhaseError::recoverable(err.to_string()),
            ServiceError::Rejected(_) | ServiceError::NotFound(_) => {
                PhaseError::unrecoverable(err.to_string())
            }
        }
    }
}

/// Errors that can occur while driving a ramp saga.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A handler raised a classified phase error.
    #[error(transparent)]
    Phase(#[from] PhaseError),

    /// A handler was invoked for a ramp sitting in a different phase.
    #[error("Cannot execute phase {handler} for ramp in phase {current}")]
    PhaseMismatch {
        handler: RampPhase,
        current: RampPhase,
    },

    /// No handler is registered for a non-terminal phase.
    #[error("No handler registered for phase {0}")]
    NoHandler(RampPhase),

    /// The ramp does not exist.
    #[error("Ramp not found: {0}")]
    RampNotFound(RampId),

    /// A single invocation advanced through more phases than allowed.
    #[error("Ramp {ramp_id} exceeded {limit} phase transitions in one invocation")]
    TransitionLimit { ramp_id: RampId, limit: usize },

    /// Record store error.
    #[error("Ramp store error: {0}")]
    Store(#[from] RampStoreError),

    /// Domain error, typically a missing or malformed state key.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Collaborator error that the handler did not classify.
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),
}

impl SagaError {
    /// Only recoverable phase errors are retried.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SagaError::Phase(err) if err.is_recoverable())
    }

    /// Classifies the error: phase errors are kept, anything else becomes unrecoverable.
    pub fn into_phase_error(self) -> PhaseError {
        match self {
            SagaError::Phase(err) => err,
            other => PhaseError::unrecoverable(other.to_string()),
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_error_classification() {
        let err = PhaseError::recoverable("funds not arrived");
        assert!(err.is_recoverable());
        assert_eq!(err.min_wait(), None);
        assert_eq!(err.to_string(), "funds not arrived");

        let err = PhaseError::recoverable_after("rate limited", Duration::from_secs(30));
        assert_eq!(err.min_wait(), Some(Duration::from_secs(30)));

        let err = PhaseError::unrecoverable("missing address");
        assert!(!err.is_recoverable());
        assert_eq!(err.message(), "missing address");
    }

    #[test]
    fn test_service_error_classification() {
        assert!(PhaseError::from(ServiceError::Network("timeout".into())).is_recoverable());
        assert!(!PhaseError::from(ServiceError::Rejected("nonce too low".into())).is_recoverable());
        assert!(!PhaseError::from(ServiceError::NotFound("0xabc".into())).is_recoverable());
    }

    #[test]
    fn test_other_errors_become_unrecoverable() {
        let err = SagaError::Domain(DomainError::MissingState {
            key: "taxId".to_string(),
        });
        assert!(!err.is_recoverable());

        let phase_err = err.into_phase_error();
        assert!(!phase_err.is_recoverable());
        assert!(phase_err.message().contains("taxId"));
    }

    #[test]
    fn test_phase_errors_are_kept() {
        let err = SagaError::from(PhaseError::recoverable("retry me"));
        assert!(err.is_recoverable());
        assert_eq!(err.into_phase_error(), PhaseError::recoverable("retry me"));
    }

    #[test]
    fn test_unclassified_service_error_is_not_recoverable() {
        let err = SagaError::from(ServiceError::Network("reset".into()));
        assert!(!err.is_recoverable());
    }
}
