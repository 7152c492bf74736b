//! The phase handler contract.

use async_trait::async_trait;
use domain::{PhaseHistoryEntry, RampErrorLog, RampPhase, RampRecord, StateMetadata};
use ramp_store::{RampStore, RampStoreExt, RampUpdate};
use serde::Serialize;

use crate::error::{PhaseError, Result, SagaError};

/// Store access handed to a handler for the duration of one execution.
///
/// All record mutations a handler makes go through here, under the
/// orchestrator's processing lock.
#[derive(Clone, Copy)]
pub struct PhaseContext<'a> {
    store: &'a dyn RampStore,
}

impl<'a> PhaseContext<'a> {
    pub fn new(store: &'a dyn RampStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &'a dyn RampStore {
        self.store
    }

    /// Moves the ramp to `next`, appending the history entry in the same write.
    ///
    /// Returns the authoritative post-write record.
    pub async fn transition(
        &self,
        ramp: &RampRecord,
        next: RampPhase,
        metadata: Option<serde_json::Value>,
    ) -> Result<RampRecord> {
        tracing::info!(ramp_id = %ramp.id, from = %ramp.current_phase, to = %next, "Transitioning ramp");
        let updated = self
            .store
            .update(
                ramp.id,
                RampUpdate::new().transition(PhaseHistoryEntry::new(next, metadata)),
            )
            .await?;
        Ok(updated)
    }

    /// Merges `patch` into the ramp's state bag.
    pub async fn save_state(&self, ramp: &RampRecord, patch: StateMetadata) -> Result<RampRecord> {
        Ok(self
            .store
            .update(ramp.id, RampUpdate::new().merge_state(patch))
            .await?)
    }

    /// Records a single state key, e.g. a tx hash before waiting on its outcome.
    pub async fn set_state<T: Serialize + Send>(
        &self,
        ramp: &RampRecord,
        key: &str,
        value: T,
    ) -> Result<RampRecord> {
        let mut patch = StateMetadata::new();
        patch.insert(key, value)?;
        self.save_state(ramp, patch).await
    }

    pub async fn append_error_log(&self, ramp: &RampRecord, entry: RampErrorLog) -> Result<RampRecord> {
        Ok(self.store.append_error_log(ramp.id, entry).await?)
    }
}

/// A handler owning exactly one non-terminal phase.
///
/// Implementors provide [`execute_phase`](PhaseHandler::execute_phase); the
/// orchestrator calls [`execute`](PhaseHandler::execute), which checks the
/// phase, logs failures to the ramp's error log and classifies them.
///
/// `execute_phase` may run again after a crash or a retry, so it must
/// tolerate a previous partial run: record an action's result in the state
/// bag before waiting on its outcome, and check a recorded result before
/// repeating the action.
#[async_trait]
pub trait PhaseHandler: Send + Sync {
    /// The phase this handler owns.
    fn phase(&self) -> RampPhase;

    /// Performs the phase's domain work and returns the post-transition record.
    ///
    /// Returning the record still in the same phase means the phase did not
    /// advance; the orchestrator stops without error.
    async fn execute_phase(&self, ramp: &RampRecord, ctx: &PhaseContext<'_>) -> Result<RampRecord>;

    /// Runs the phase with the standard checks and error logging.
    async fn execute(
        &self,
        ramp: &RampRecord,
        ctx: &PhaseContext<'_>,
    ) -> std::result::Result<RampRecord, PhaseError> {
        let phase = self.phase();
        tracing::info!(ramp_id = %ramp.id, %phase, "Executing phase");

        let result = if ramp.current_phase != phase {
            Err(SagaError::PhaseMismatch {
                handler: phase,
                current: ramp.current_phase,
            })
        } else {
            self.execute_phase(ramp, ctx).await
        };

        let err = match result {
            Ok(updated) => {
                tracing::info!(ramp_id = %ramp.id, %phase, "Phase executed successfully");
                return Ok(updated);
            }
            Err(err) => err,
        };

        let details = match &err {
            SagaError::Phase(_) => None,
            other => Some(format!("{other:?}")),
        };
        let err = err.into_phase_error();
        tracing::error!(
            ramp_id = %ramp.id,
            %phase,
            recoverable = err.is_recoverable(),
            error = %err,
            "Error executing phase"
        );

        let mut entry = RampErrorLog::new(phase, err.to_string()).recoverable(err.is_recoverable());
        if let Some(details) = details {
            entry = entry.with_details(details);
        }
        if let Err(log_err) = ctx.append_error_log(ramp, entry).await {
            tracing::warn!(ramp_id = %ramp.id, error = %log_err, "Failed to append error log");
        }

        Err(err)
    }
}
