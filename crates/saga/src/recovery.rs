//! The recovery sweeper.
//!
//! Ramps parked after exhausting retries, or orphaned by a crash mid-phase,
//! stop being updated. The sweeper periodically finds non-terminal ramps with
//! transaction material that have been idle past a threshold and hands them
//! back to the orchestrator.

use std::sync::Arc;
use std::time::Duration;

use common::RampId;
use domain::RampErrorLog;
use futures_util::future::join_all;
use ramp_store::{RampStore, RampStoreExt, StaleRampQuery};
use tokio::sync::watch;

use crate::error::{Result, SagaError};
use crate::processor::{PhaseProcessor, ProcessOutcome};

#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Time between two sweeps.
    pub interval: Duration,
    /// A ramp idle for longer than this is considered stuck.
    pub stale_after: chrono::Duration,
    /// Sweep once immediately when `run` starts.
    pub run_on_start: bool,
    /// Maximum number of ramps picked up per sweep.
    pub limit: Option<usize>,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5 * 60),
            stale_after: chrono::Duration::minutes(10),
            run_on_start: true,
            limit: None,
        }
    }
}

/// Result of one sweep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecoveryReport {
    pub attempted: usize,
    pub succeeded: Vec<(RampId, ProcessOutcome)>,
    pub failed: Vec<(RampId, String)>,
}

/// Periodically resumes stale ramps.
pub struct RampRecoveryWorker<S: RampStore> {
    processor: Arc<PhaseProcessor<S>>,
    config: RecoveryConfig,
}

impl<S: RampStore> RampRecoveryWorker<S> {
    pub fn new(processor: Arc<PhaseProcessor<S>>) -> Self {
        Self::with_config(processor, RecoveryConfig::default())
    }

    pub fn with_config(processor: Arc<PhaseProcessor<S>>, config: RecoveryConfig) -> Self {
        Self { processor, config }
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    /// Runs a single sweep over every stale ramp, concurrently.
    ///
    /// A failing ramp gets a recovery error log entry and never aborts the
    /// sweep; only the stale-ramp query itself can fail.
    #[tracing::instrument(skip(self))]
    pub async fn recover(&self) -> Result<RecoveryReport> {
        metrics::counter!("ramp_recovery_runs_total").increment(1);

        let mut query = StaleRampQuery::older_than(self.config.stale_after);
        if let Some(limit) = self.config.limit {
            query = query.limit(limit);
        }
        let stale = self.processor.store().find_stale(query).await?;
        tracing::info!(count = stale.len(), "Found stale ramps to recover");

        let attempts = stale.iter().map(|ramp| async move {
            tracing::info!(ramp_id = %ramp.id, phase = %ramp.current_phase, "Recovering ramp");
            (ramp, self.processor.process_ramp(ramp.id).await)
        });
        let results = join_all(attempts).await;

        let mut report = RecoveryReport {
            attempted: results.len(),
            ..RecoveryReport::default()
        };
        for (ramp, result) in results {
            match result {
                Ok(outcome) => report.succeeded.push((ramp.id, outcome)),
                Err(err) => {
                    tracing::error!(ramp_id = %ramp.id, error = %err, "Error recovering ramp");
                    metrics::counter!("ramp_recovery_failures_total").increment(1);

                    if !logged_by_processor(&err) {
                        let entry =
                            RampErrorLog::new(ramp.current_phase, format!("Recovery failed: {err}"))
                                .recoverable(err.is_recoverable());
                        if let Err(log_err) =
                            self.processor.store().append_error_log(ramp.id, entry).await
                        {
                            tracing::warn!(ramp_id = %ramp.id, error = %log_err, "Failed to append error log");
                        }
                    }
                    report.failed.push((ramp.id, err.to_string()));
                }
            }
        }

        tracing::info!(
            attempted = report.attempted,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "Recovery sweep finished"
        );
        Ok(report)
    }

    /// Sweeps on every tick of the configured interval until `shutdown` turns `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            stale_after_secs = self.config.stale_after.num_seconds(),
            "Starting ramp recovery worker"
        );

        let start = if self.config.run_on_start {
            tokio::time::Instant::now()
        } else {
            tokio::time::Instant::now() + self.config.interval
        };
        let mut ticker = tokio::time::interval_at(start, self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Stopping ramp recovery worker");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.recover().await {
                        tracing::error!(error = %err, "Recovery sweep failed");
                    }
                }
            }
        }
    }
}

/// Handler failures and parked phases are already in the ramp's error log.
fn logged_by_processor(err: &SagaError) -> bool {
    matches!(
        err,
        SagaError::Phase(_) | SagaError::NoHandler(_) | SagaError::TransitionLimit { .. }
    )
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;
    use common::QuoteId;
    use domain::{NewRamp, RampDirection, RampPhase, RampRecord, UnsignedTx};
    use ramp_store::InMemoryRampStore;

    use super::*;
    use crate::error::PhaseError;
    use crate::handler::{PhaseContext, PhaseHandler};
    use crate::processor::ProcessorConfig;
    use crate::registry::HandlerRegistry;

    /// Advances every ramp except the one whose quote matches `poisoned`.
    struct Selective {
        poisoned: QuoteId,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl PhaseHandler for Selective {
        fn phase(&self) -> RampPhase {
            RampPhase::NablaSwap
        }

        async fn execute_phase(
            &self,
            ramp: &RampRecord,
            ctx: &PhaseContext<'_>,
        ) -> crate::error::Result<RampRecord> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if ramp.quote_id == self.poisoned {
                return Err(PhaseError::unrecoverable("swap reverted").into());
            }
            ctx.transition(ramp, RampPhase::DistributeFees, None).await
        }
    }

    struct Hold(RampPhase);

    #[async_trait]
    impl PhaseHandler for Hold {
        fn phase(&self) -> RampPhase {
            self.0
        }

        async fn execute_phase(
            &self,
            ramp: &RampRecord,
            _: &PhaseContext<'_>,
        ) -> crate::error::Result<RampRecord> {
            Ok(ramp.clone())
        }
    }

    fn material() -> Vec<UnsignedTx> {
        vec![UnsignedTx::new(
            RampPhase::NablaSwap,
            "pendulum",
            "5Eph",
            0,
            serde_json::json!("0x01"),
        )]
    }

    async fn stale_ramp(store: &InMemoryRampStore, quote_id: QuoteId) -> RampRecord {
        let ramp = store
            .create(
                NewRamp::new(RampDirection::Sell, quote_id)
                    .initial_phase(RampPhase::NablaSwap)
                    .presigned_txs(material()),
            )
            .await
            .unwrap();
        store
            .set_updated_at(ramp.id, Utc::now() - chrono::Duration::minutes(30))
            .await
            .unwrap();
        ramp
    }

    fn worker(
        store: InMemoryRampStore,
        poisoned: QuoteId,
        calls: Arc<AtomicUsize>,
    ) -> RampRecoveryWorker<InMemoryRampStore> {
        let mut registry = HandlerRegistry::new();
        registry
            .register(Selective { poisoned, calls })
            .register(Hold(RampPhase::DistributeFees));
        let processor = PhaseProcessor::with_config(store, registry, ProcessorConfig::default());
        RampRecoveryWorker::new(Arc::new(processor))
    }

    #[tokio::test]
    async fn test_one_failing_ramp_does_not_affect_others() {
        let store = InMemoryRampStore::new();
        let poisoned = QuoteId::new();
        let first = stale_ramp(&store, QuoteId::new()).await;
        let second = stale_ramp(&store, QuoteId::new()).await;
        let failing = stale_ramp(&store, poisoned).await;

        let calls = Arc::new(AtomicUsize::new(0));
        let worker = worker(store.clone(), poisoned, calls.clone());

        let report = worker.recover().await.unwrap();

        assert_eq!(report.attempted, 3);
        assert_eq!(report.succeeded.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, failing.id);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        for id in [first.id, second.id] {
            let ramp = store.reload(id).await.unwrap();
            assert_eq!(ramp.current_phase, RampPhase::DistributeFees);
        }

        let ramp = store.reload(failing.id).await.unwrap();
        assert_eq!(ramp.current_phase, RampPhase::NablaSwap);
        assert_eq!(ramp.error_logs.len(), 1);
        let last = ramp.error_logs.last().unwrap();
        assert!(last.error.contains("swap reverted"));
        assert!(!last.recoverable);
        assert!(!ramp.processing_lock.locked);
    }

    #[tokio::test]
    async fn test_repeated_sweeps_add_one_entry_per_attempt() {
        let store = InMemoryRampStore::new();
        let poisoned = QuoteId::new();
        let failing = stale_ramp(&store, poisoned).await;
        let worker = worker(store.clone(), poisoned, Arc::default());

        for _ in 0..3 {
            worker.recover().await.unwrap();
            store
                .set_updated_at(failing.id, Utc::now() - chrono::Duration::minutes(30))
                .await
                .unwrap();
        }

        let ramp = store.reload(failing.id).await.unwrap();
        assert_eq!(ramp.error_logs.len(), 3);
        assert!(
            ramp.error_logs
                .as_slice()
                .iter()
                .all(|entry| !entry.error.starts_with("Recovery failed:"))
        );
    }

    #[tokio::test]
    async fn test_fresh_and_unstarted_ramps_are_left_alone() {
        let store = InMemoryRampStore::new();
        store
            .create(NewRamp::new(RampDirection::Sell, QuoteId::new()).initial_phase(RampPhase::NablaSwap))
            .await
            .unwrap();
        let unstarted = store
            .create(NewRamp::new(RampDirection::Sell, QuoteId::new()).initial_phase(RampPhase::NablaSwap))
            .await
            .unwrap();
        store
            .set_updated_at(unstarted.id, Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap();
        store
            .create(
                NewRamp::new(RampDirection::Sell, QuoteId::new())
                    .initial_phase(RampPhase::NablaSwap)
                    .presigned_txs(material()),
            )
            .await
            .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let report = worker(store, QuoteId::new(), calls.clone())
            .recover()
            .await
            .unwrap();

        assert_eq!(report, RecoveryReport::default());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_limit_caps_a_sweep() {
        let store = InMemoryRampStore::new();
        for _ in 0..3 {
            stale_ramp(&store, QuoteId::new()).await;
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = HandlerRegistry::new();
        registry
            .register(Selective {
                poisoned: QuoteId::new(),
                calls: calls.clone(),
            })
            .register(Hold(RampPhase::DistributeFees));
        let processor = Arc::new(PhaseProcessor::new(store, registry));
        let worker = RampRecoveryWorker::with_config(
            processor,
            RecoveryConfig {
                limit: Some(2),
                ..RecoveryConfig::default()
            },
        );

        let report = worker.recover().await.unwrap();
        assert_eq!(report.attempted, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_sweeps_on_start_and_stops_on_shutdown() {
        let store = InMemoryRampStore::new();
        let ramp = stale_ramp(&store, QuoteId::new()).await;

        let calls = Arc::new(AtomicUsize::new(0));
        let worker = Arc::new(worker(store.clone(), QuoteId::new(), calls.clone()));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn({
            let worker = worker.clone();
            async move { worker.run(rx).await }
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let ramp = store.reload(ramp.id).await.unwrap();
        assert_eq!(ramp.current_phase, RampPhase::DistributeFees);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
