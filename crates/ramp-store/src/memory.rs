use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{NewRamp, RampRecord};
use tokio::sync::RwLock;

use crate::{
    RampId, RampStoreError, RampUpdate, Result, StaleRampQuery,
    store::RampStore,
};

/// In-memory ramp store implementation for testing.
///
/// This implementation keeps all records in memory and provides
/// the same interface as the PostgreSQL implementation.
#[derive(Clone, Default)]
pub struct InMemoryRampStore {
    ramps: Arc<RwLock<HashMap<RampId, RampRecord>>>,
}

impl InMemoryRampStore {
    /// Creates a new empty in-memory ramp store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of ramps stored.
    pub async fn ramp_count(&self) -> usize {
        self.ramps.read().await.len()
    }

    /// Clears all ramps.
    pub async fn clear(&self) {
        self.ramps.write().await.clear();
    }

    /// Overrides a ramp's last-update time, e.g. to simulate a saga that stalled.
    pub async fn set_updated_at(&self, id: RampId, at: DateTime<Utc>) -> Result<()> {
        let mut ramps = self.ramps.write().await;
        let ramp = ramps.get_mut(&id).ok_or(RampStoreError::NotFound(id))?;
        ramp.updated_at = at;
        Ok(())
    }
}

#[async_trait]
impl RampStore for InMemoryRampStore {
    async fn create(&self, new_ramp: NewRamp) -> Result<RampRecord> {
        let ramp = RampRecord::create(new_ramp, Utc::now())?;

        let mut ramps = self.ramps.write().await;
        if ramps.contains_key(&ramp.id) {
            return Err(RampStoreError::AlreadyExists(ramp.id));
        }
        ramps.insert(ramp.id, ramp.clone());

        Ok(ramp)
    }

    async fn find_by_id(&self, id: RampId) -> Result<Option<RampRecord>> {
        Ok(self.ramps.read().await.get(&id).cloned())
    }

    async fn update(&self, id: RampId, update: RampUpdate) -> Result<RampRecord> {
        let mut ramps = self.ramps.write().await;
        let current = ramps.get(&id).ok_or(RampStoreError::NotFound(id))?;

        // Apply to a copy so a rejected update leaves the stored record untouched
        let mut updated = current.clone();
        update.apply(&mut updated, Utc::now())?;
        ramps.insert(id, updated.clone());

        Ok(updated)
    }

    async fn find_stale(&self, query: StaleRampQuery) -> Result<Vec<RampRecord>> {
        let ramps = self.ramps.read().await;
        let mut stale: Vec<_> = ramps
            .values()
            .filter(|ramp| {
                !ramp.is_terminal()
                    && ramp.updated_at < query.updated_before
                    && (!query.require_transaction_material || ramp.presigned_txs.is_some())
            })
            .cloned()
            .collect();

        stale.sort_by_key(|ramp| ramp.updated_at);
        if let Some(limit) = query.limit {
            stale.truncate(limit);
        }

        Ok(stale)
    }
}
