use std::sync::Arc;

use async_trait::async_trait;
use domain::{NewRamp, RampErrorLog, RampRecord};

use crate::{RampId, RampStoreError, RampUpdate, Result, StaleRampQuery};

/// Core trait for ramp record stores.
///
/// A store persists one record per ramp with read-after-write consistency:
/// `update` returns the record exactly as it was written.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait RampStore: Send + Sync {
    /// Creates a ramp from its creation attributes.
    async fn create(&self, new_ramp: NewRamp) -> Result<RampRecord>;

    /// Retrieves a ramp by ID.
    ///
    /// Returns None if the ramp doesn't exist.
    async fn find_by_id(&self, id: RampId) -> Result<Option<RampRecord>>;

    /// Atomically applies a partial update and returns the post-write record.
    async fn update(&self, id: RampId, update: RampUpdate) -> Result<RampRecord>;

    /// Retrieves ramps matching a staleness query, least recently updated first.
    async fn find_stale(&self, query: StaleRampQuery) -> Result<Vec<RampRecord>>;
}

/// Extension trait providing convenience methods for ramp stores.
#[async_trait]
pub trait RampStoreExt: RampStore {
    /// Re-reads a ramp that is known to exist.
    async fn reload(&self, id: RampId) -> Result<RampRecord> {
        self.find_by_id(id)
            .await?
            .ok_or(RampStoreError::NotFound(id))
    }

    /// Appends an entry to the ramp's capped error log.
    async fn append_error_log(&self, id: RampId, entry: RampErrorLog) -> Result<RampRecord> {
        self.update(id, RampUpdate::new().error_log(entry)).await
    }
}

// Blanket implementation for all RampStore implementations
impl<T: RampStore + ?Sized> RampStoreExt for T {}

#[async_trait]
impl<T: RampStore + ?Sized> RampStore for Arc<T> {
    async fn create(&self, new_ramp: NewRamp) -> Result<RampRecord> {
        (**self).create(new_ramp).await
    }

    async fn find_by_id(&self, id: RampId) -> Result<Option<RampRecord>> {
        (**self).find_by_id(id).await
    }

    async fn update(&self, id: RampId, update: RampUpdate) -> Result<RampRecord> {
        (**self).update(id, update).await
    }

    async fn find_stale(&self, query: StaleRampQuery) -> Result<Vec<RampRecord>> {
        (**self).find_stale(query).await
    }
}
