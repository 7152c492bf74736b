//! External collaborator traits and in-memory implementations for phase handlers.

pub mod chain;
pub mod payment;

pub use chain::{ChainClient, InMemoryChainClient, NATIVE_ASSET, TxStatus};
pub use payment::{InMemoryPaymentProvider, PaymentProvider, TransferTicket};
