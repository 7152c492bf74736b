pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;
pub mod update;

pub use common::RampId;
pub use error::{RampStoreError, Result};
pub use memory::InMemoryRampStore;
pub use postgres::PostgresRampStore;
pub use query::StaleRampQuery;
pub use store::{RampStore, RampStoreExt};
pub use update::RampUpdate;
