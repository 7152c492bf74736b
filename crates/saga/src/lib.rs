//! Ramp saga engine.
//!
//! Drives each ramp through its phase graph, one phase at a time:
//! 1. [`PhaseProcessor`] takes the per-ramp lock and runs the handler
//!    registered for the ramp's current phase
//! 2. A handler does the phase's work and transitions the ramp, or raises a
//!    [`PhaseError`]
//! 3. Recoverable errors are retried with exponential backoff; anything else
//!    parks the ramp where it is
//!
//! [`RampRecoveryWorker`] periodically hands ramps that stopped advancing
//! back to the processor.

pub mod error;
pub mod handler;
pub mod handlers;
pub mod polling;
pub mod processor;
pub mod recovery;
pub mod registry;
pub mod services;

pub use error::{PhaseError, Result, SagaError, ServiceError};
pub use handler::{PhaseContext, PhaseHandler};
pub use handlers::{
    FundEphemeralHandler, HandlerConfig, InitialPhaseHandler, NextPhase, PaymentMintHandler,
    SubmitPresignedHandler, SubsidizeHandler, SubsidyRecord, SubsidyTarget,
    register_default_handlers,
};
pub use polling::{PollError, wait_until};
pub use processor::{PhaseProcessor, ProcessOutcome, ProcessorConfig};
pub use recovery::{RampRecoveryWorker, RecoveryConfig, RecoveryReport};
pub use registry::HandlerRegistry;
pub use services::{
    ChainClient, InMemoryChainClient, InMemoryPaymentProvider, PaymentProvider, TxStatus,
};
