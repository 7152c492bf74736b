use std::sync::Arc;

use async_trait::async_trait;
use domain::{RampDirection, RampPhase, RampRecord};

use crate::error::{PhaseError, Result};
use crate::handler::{PhaseContext, PhaseHandler};
use crate::handlers::HandlerConfig;
use crate::polling::{PollError, wait_until};
use crate::services::{ChainClient, TxStatus};

/// Where a [`SubmitPresignedHandler`] goes once its transaction confirms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextPhase {
    Fixed(RampPhase),
    ByDirection { buy: RampPhase, sell: RampPhase },
}

impl NextPhase {
    pub fn resolve(&self, direction: RampDirection) -> RampPhase {
        match (self, direction) {
            (NextPhase::Fixed(phase), _) => *phase,
            (NextPhase::ByDirection { buy, .. }, RampDirection::Buy) => *buy,
            (NextPhase::ByDirection { sell, .. }, RampDirection::Sell) => *sell,
        }
    }
}

/// Submits the presigned transaction tagged with its phase and waits for it
/// to confirm.
///
/// The hash is stored under `{phase}Hash` before waiting; a re-run with a
/// recorded hash only waits again. A phase without a transaction is skipped.
pub struct SubmitPresignedHandler {
    phase: RampPhase,
    next: NextPhase,
    chain: Arc<dyn ChainClient>,
    config: HandlerConfig,
}

impl SubmitPresignedHandler {
    pub fn new(
        phase: RampPhase,
        next: NextPhase,
        chain: Arc<dyn ChainClient>,
        config: HandlerConfig,
    ) -> Self {
        Self {
            phase,
            next,
            chain,
            config,
        }
    }

    async fn wait_for_confirmation(&self, network: &str, hash: &str) -> Result<()> {
        let chain = self.chain.as_ref();
        let confirmed = wait_until(
            self.config.poll_interval,
            self.config.confirmation_timeout,
            move || async move {
                match chain.transaction_status(network, hash).await {
                    Ok(TxStatus::Confirmed) => Ok(true),
                    Ok(TxStatus::Pending) => Ok(false),
                    Ok(TxStatus::Failed) => Err(PhaseError::unrecoverable(format!(
                        "Transaction {hash} failed on {network}"
                    ))),
                    Err(err) => Err(PhaseError::from(err)),
                }
            },
        )
        .await;

        match confirmed {
            Ok(()) => Ok(()),
            Err(PollError::Timeout(after)) => Err(PhaseError::recoverable(format!(
                "Transaction {hash} not confirmed after {after:?}"
            ))
            .into()),
            Err(PollError::Check(err)) => Err(err.into()),
        }
    }
}

#[async_trait]
impl PhaseHandler for SubmitPresignedHandler {
    fn phase(&self) -> RampPhase {
        self.phase
    }

    async fn execute_phase(&self, ramp: &RampRecord, ctx: &PhaseContext<'_>) -> Result<RampRecord> {
        let next = self.next.resolve(ramp.direction);

        let Some(tx) = ramp.presigned_tx(self.phase) else {
            tracing::info!(ramp_id = %ramp.id, phase = %self.phase, "No transaction for phase, skipping");
            let metadata = serde_json::json!({ "skipped": true });
            return ctx.transition(ramp, next, Some(metadata)).await;
        };

        let hash_key = format!("{}Hash", self.phase);
        let (ramp, hash) = match ramp.state.get_str(&hash_key) {
            Some(hash) => {
                tracing::info!(ramp_id = %ramp.id, hash, "Transaction already submitted");
                (ramp.clone(), hash.to_string())
            }
            None => {
                let hash = self.chain.submit(tx).await.map_err(PhaseError::from)?;
                tracing::info!(ramp_id = %ramp.id, network = %tx.network, %hash, "Submitted transaction");
                (ctx.set_state(ramp, &hash_key, &hash).await?, hash)
            }
        };

        self.wait_for_confirmation(&tx.network, &hash).await?;

        let metadata = serde_json::json!({ "hash": hash });
        ctx.transition(&ramp, next, Some(metadata)).await
    }
}
