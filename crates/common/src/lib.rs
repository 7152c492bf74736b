//! Shared identifier types for the ramp saga system.

pub mod types;

pub use types::{QuoteId, RampId};
