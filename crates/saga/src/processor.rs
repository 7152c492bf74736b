//! The saga orchestrator.
//!
//! [`PhaseProcessor::process_ramp`] takes the per-ramp lock and drives the
//! ramp through its handlers until it reaches a terminal phase, stops
//! advancing, runs out of retries or hits an unrecoverable error.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use chrono::Utc;
use common::RampId;
use domain::{ProcessingLock, RampErrorLog, RampPhase, RampRecord};
use ramp_store::{RampStore, RampStoreError, RampStoreExt, RampUpdate};
use tokio::sync::Mutex;

use crate::error::{Result, SagaError};
use crate::handler::PhaseContext;
use crate::registry::HandlerRegistry;

/// Retry, backoff and locking parameters of the orchestrator.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Retries granted to a phase raising recoverable errors, on top of the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on every further retry.
    pub base_backoff: Duration,
    /// A persisted lock held longer than this may be force-cleared.
    pub lock_ttl: chrono::Duration,
    /// Upper bound on phase transitions within one `process_ramp` call.
    pub max_transitions: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_retries: 8,
            base_backoff: Duration::from_secs(1),
            lock_ttl: chrono::Duration::minutes(15),
            max_transitions: 64,
        }
    }
}

/// How a `process_ramp` call ended, when it did not end in an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Another execution holds the lock; nothing was done.
    AlreadyProcessing,
    /// The ramp is in `complete`.
    Completed,
    /// The ramp is in `failed`.
    Failed,
    /// The handler returned without leaving `phase`.
    Stalled { phase: RampPhase },
}

impl ProcessOutcome {
    fn terminal(phase: RampPhase) -> Option<Self> {
        match phase {
            RampPhase::Complete => Some(ProcessOutcome::Completed),
            RampPhase::Failed => Some(ProcessOutcome::Failed),
            _ => None,
        }
    }
}

/// Drives ramps through their phase handlers.
///
/// At most one execution per ramp runs at a time: the in-memory `locked` set
/// guards this process, the persisted `processingLock` guards across
/// processes. Retry counters are process-local and reset on restart.
pub struct PhaseProcessor<S: RampStore> {
    store: S,
    registry: HandlerRegistry,
    config: ProcessorConfig,
    retries: Mutex<HashMap<RampId, u32>>,
    locked: Mutex<HashSet<RampId>>,
}

impl<S: RampStore> PhaseProcessor<S> {
    pub fn new(store: S, registry: HandlerRegistry) -> Self {
        Self::with_config(store, registry, ProcessorConfig::default())
    }

    pub fn with_config(store: S, registry: HandlerRegistry, config: ProcessorConfig) -> Self {
        Self {
            store,
            registry,
            config,
            retries: Mutex::new(HashMap::new()),
            locked: Mutex::new(HashSet::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Current retry count for a ramp, if it is mid-backoff.
    pub async fn retry_count(&self, ramp_id: RampId) -> Option<u32> {
        self.retries.lock().await.get(&ramp_id).copied()
    }

    /// Processes a ramp from its current phase.
    ///
    /// Returns `Err` when the saga was parked by an error; the error has
    /// already been written to the ramp's error log. The lock is released on
    /// every path.
    #[tracing::instrument(skip_all, fields(%ramp_id))]
    pub async fn process_ramp(&self, ramp_id: RampId) -> Result<ProcessOutcome> {
        let ramp = self.load(ramp_id).await?;

        // Terminal ramps are never locked or handed to a handler again
        if let Some(outcome) = ProcessOutcome::terminal(ramp.current_phase) {
            tracing::debug!(phase = %ramp.current_phase, "Ramp already terminal");
            return Ok(outcome);
        }

        let ramp = match self.acquire_lock(&ramp).await? {
            Some(locked) => locked,
            None => {
                tracing::info!("Skipping ramp, it is already being processed");
                metrics::counter!("ramp_lock_contention_total").increment(1);
                return Ok(ProcessOutcome::AlreadyProcessing);
            }
        };

        let result = self.process_phases(ramp).await;
        self.release_lock(ramp_id).await;

        if let Err(err) = &result {
            tracing::error!(error = %err, "Error processing ramp");
        }
        result
    }

    async fn load(&self, ramp_id: RampId) -> Result<RampRecord> {
        self.store
            .find_by_id(ramp_id)
            .await?
            .ok_or(SagaError::RampNotFound(ramp_id))
    }

    /// Takes both halves of the lock, or neither.
    ///
    /// The persisted lock is written against the version `ramp` was read at,
    /// so a concurrent acquirer in another process loses cleanly. An expired
    /// lock is taken over by that same guarded write; it is never cleared first.
    async fn acquire_lock(&self, ramp: &RampRecord) -> Result<Option<RampRecord>> {
        let now = Utc::now();
        {
            let mut locked = self.locked.lock().await;
            if locked.contains(&ramp.id) {
                return Ok(None);
            }
            if ramp.processing_lock.locked {
                if !ramp.processing_lock.is_expired(now, self.config.lock_ttl) {
                    return Ok(None);
                }
                tracing::info!("Lock has expired, taking it over");
            }
            locked.insert(ramp.id);
        }

        let update = RampUpdate::new()
            .processing_lock(ProcessingLock::acquired_at(now))
            .expect_version(ramp.version);

        match self.store.update(ramp.id, update).await {
            Ok(updated) => Ok(Some(updated)),
            Err(err) => {
                self.locked.lock().await.remove(&ramp.id);
                match err {
                    RampStoreError::ConcurrencyConflict { .. } => Ok(None),
                    other => Err(other.into()),
                }
            }
        }
    }

    async fn release_lock(&self, ramp_id: RampId) {
        self.locked.lock().await.remove(&ramp_id);

        let update = RampUpdate::new().processing_lock(ProcessingLock::released());
        if let Err(err) = self.store.update(ramp_id, update).await {
            tracing::error!(%ramp_id, error = %err, "Error releasing lock");
        }
    }

    /// Runs handlers until the ramp is terminal, stops advancing or fails.
    async fn process_phases(&self, mut ramp: RampRecord) -> Result<ProcessOutcome> {
        let ctx = PhaseContext::new(&self.store);
        let mut transitions = 0;

        loop {
            if let Some(outcome) = ProcessOutcome::terminal(ramp.current_phase) {
                self.clear_retries(ramp.id).await;
                match outcome {
                    ProcessOutcome::Completed => {
                        tracing::info!("Ramp completed successfully");
                        metrics::counter!("ramp_completed_total").increment(1);
                    }
                    _ => {
                        tracing::error!("Ramp failed unrecoverably, giving up");
                        metrics::counter!("ramp_failed_total").increment(1);
                    }
                }
                return Ok(outcome);
            }

            if transitions >= self.config.max_transitions {
                let err = SagaError::TransitionLimit {
                    ramp_id: ramp.id,
                    limit: self.config.max_transitions,
                };
                self.park(&ramp, &err).await;
                return Err(err);
            }

            let phase = ramp.current_phase;
            tracing::info!(%phase, "Processing phase");

            let Some(handler) = self.registry.resolve(phase) else {
                let err = SagaError::NoHandler(phase);
                tracing::warn!(%phase, "No handler found for phase");
                self.park(&ramp, &err).await;
                return Err(err);
            };

            metrics::counter!("ramp_phase_executions_total", "phase" => phase.as_str())
                .increment(1);
            let started = Instant::now();
            let result = handler.execute(&ramp, &ctx).await;
            metrics::histogram!("ramp_phase_duration_seconds", "phase" => phase.as_str())
                .record(started.elapsed().as_secs_f64());

            match result {
                Ok(updated) if updated.current_phase == phase => {
                    tracing::warn!(%phase, "Handler returned without changing phase");
                    self.clear_retries(ramp.id).await;
                    return Ok(ProcessOutcome::Stalled { phase });
                }
                Ok(updated) => {
                    tracing::info!(from = %phase, to = %updated.current_phase, "Phase changed");
                    self.clear_retries(ramp.id).await;
                    transitions += 1;
                    ramp = updated;
                }
                Err(err) => {
                    let recoverable = err.is_recoverable();
                    metrics::counter!(
                        "ramp_phase_failures_total",
                        "phase" => phase.as_str(),
                        "recoverable" => if recoverable { "true" } else { "false" }
                    )
                    .increment(1);

                    if !recoverable {
                        self.clear_retries(ramp.id).await;
                        return Err(err.into());
                    }

                    if let Some(attempt) = self.next_retry(ramp.id).await {
                        let delay = self.backoff(attempt, err.min_wait());
                        tracing::info!(
                            retry = attempt + 1,
                            max_retries = self.config.max_retries,
                            delay_ms = delay.as_millis() as u64,
                            "Scheduling retry"
                        );
                        metrics::counter!("ramp_phase_retries_total").increment(1);
                        tokio::time::sleep(delay).await;
                        ramp = match self.load(ramp.id).await {
                            Ok(reloaded) => reloaded,
                            Err(reload_err) => {
                                tracing::error!(error = %reload_err, "Failed to reload ramp before retry");
                                self.park(&ramp, &reload_err).await;
                                return Err(reload_err);
                            }
                        };
                        continue;
                    }

                    tracing::error!(max_retries = self.config.max_retries, "Max retries reached");
                    let entry = RampErrorLog::new(
                        phase,
                        format!("Max retries ({}) reached: {err}", self.config.max_retries),
                    )
                    .recoverable(true);
                    self.append_error_log(ramp.id, entry).await;
                    return Err(err.into());
                }
            }
        }
    }

    /// Bumps the ramp's retry counter and returns the attempt index, or
    /// `None` (dropping the counter) once the budget is spent.
    async fn next_retry(&self, ramp_id: RampId) -> Option<u32> {
        let mut retries = self.retries.lock().await;
        let current = retries.get(&ramp_id).copied().unwrap_or(0);
        if current < self.config.max_retries {
            retries.insert(ramp_id, current + 1);
            Some(current)
        } else {
            retries.remove(&ramp_id);
            None
        }
    }

    async fn clear_retries(&self, ramp_id: RampId) {
        self.retries.lock().await.remove(&ramp_id);
    }

    /// `base * 2^attempt`, raised to the error's minimum wait.
    fn backoff(&self, attempt: u32, min_wait: Option<Duration>) -> Duration {
        let exponential = self
            .config
            .base_backoff
            .saturating_mul(2u32.saturating_pow(attempt));
        min_wait.map_or(exponential, |min| exponential.max(min))
    }

    /// Logs an error that did not pass through a handler and leaves the ramp where it is.
    async fn park(&self, ramp: &RampRecord, err: &SagaError) {
        self.clear_retries(ramp.id).await;
        let entry = RampErrorLog::new(ramp.current_phase, err.to_string());
        self.append_error_log(ramp.id, entry).await;
    }

    async fn append_error_log(&self, ramp_id: RampId, entry: RampErrorLog) {
        if let Err(err) = self.store.append_error_log(ramp_id, entry).await {
            tracing::error!(%ramp_id, error = %err, "Failed to append error log");
        }
    }
}
