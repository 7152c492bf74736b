use std::sync::Arc;

use async_trait::async_trait;
use domain::{RampDirection, RampPhase, RampRecord};

use crate::error::{PhaseError, Result, SagaError, ServiceError};
use crate::handler::{PhaseContext, PhaseHandler};
use crate::handlers::{EVM_NETWORK, HandlerConfig, NextPhase, SUBSTRATE_NETWORK};
use crate::polling::{PollError, wait_until};
use crate::services::{ChainClient, NATIVE_ASSET, TxStatus};

/// Tops up the ramp's ephemeral accounts with native tokens for fees.
///
/// The substrate account is always funded; buy ramps also fund the EVM
/// account. An account already holding the funding amount is skipped, and a
/// recorded `{network}FundingHash` that has not failed is never re-sent.
pub struct FundEphemeralHandler {
    chain: Arc<dyn ChainClient>,
    config: HandlerConfig,
}

impl FundEphemeralHandler {
    pub fn new(chain: Arc<dyn ChainClient>, config: HandlerConfig) -> Self {
        Self { chain, config }
    }

    fn targets(ramp: &RampRecord) -> Vec<(&'static str, &'static str)> {
        let mut targets = vec![(SUBSTRATE_NETWORK, "substrateEphemeralAddress")];
        if ramp.direction == RampDirection::Buy {
            targets.push((EVM_NETWORK, "evmEphemeralAddress"));
        }
        targets
    }

    async fn is_funded(&self, network: &str, address: &str) -> std::result::Result<bool, ServiceError> {
        let balance = self.chain.balance(network, address, NATIVE_ASSET).await?;
        Ok(balance >= self.config.ephemeral_funding_amount)
    }

    /// Sends funds unless a previous run already did and the transfer has not failed.
    async fn ensure_funding_sent(
        &self,
        ramp: RampRecord,
        ctx: &PhaseContext<'_>,
        network: &str,
        address: &str,
    ) -> Result<RampRecord> {
        let hash_key = format!("{network}FundingHash");

        if let Some(hash) = ramp.state.get_str(&hash_key) {
            let status = self
                .chain
                .transaction_status(network, hash)
                .await
                .map_err(recoverable)?;
            if status != TxStatus::Failed {
                tracing::info!(ramp_id = %ramp.id, network, hash, "Funding already sent");
                return Ok(ramp);
            }
            tracing::warn!(ramp_id = %ramp.id, network, hash, "Previous funding failed, sending again");
        }

        let hash = self
            .chain
            .fund(network, address, self.config.ephemeral_funding_amount)
            .await
            .map_err(recoverable)?;
        tracing::info!(ramp_id = %ramp.id, network, %hash, "Funded ephemeral account");
        ctx.set_state(&ramp, &hash_key, &hash).await
    }
}

fn recoverable(err: ServiceError) -> SagaError {
    PhaseError::recoverable(err.to_string()).into()
}

#[async_trait]
impl PhaseHandler for FundEphemeralHandler {
    fn phase(&self) -> RampPhase {
        RampPhase::FundEphemeral
    }

    async fn execute_phase(&self, ramp: &RampRecord, ctx: &PhaseContext<'_>) -> Result<RampRecord> {
        let mut current = ramp.clone();

        for (network, key) in Self::targets(ramp) {
            let address = ramp.state.require_str(key)?;

            if self.is_funded(network, address).await.map_err(recoverable)? {
                tracing::info!(ramp_id = %ramp.id, network, "Ephemeral account already funded");
                continue;
            }

            current = self.ensure_funding_sent(current, ctx, network, address).await?;

            let funded = wait_until(
                self.config.poll_interval,
                self.config.confirmation_timeout,
                move || self.is_funded(network, address),
            )
            .await;
            match funded {
                Ok(()) => {}
                Err(PollError::Timeout(after)) => {
                    return Err(PhaseError::recoverable(format!(
                        "Ephemeral account on {network} not funded after {after:?}"
                    ))
                    .into());
                }
                Err(PollError::Check(err)) => return Err(recoverable(err)),
            }
        }

        let next = NextPhase::ByDirection {
            buy: RampPhase::SubsidizePreSwap,
            sell: RampPhase::DistributeFees,
        };
        ctx.transition(&current, next.resolve(ramp.direction), None).await
    }
}
