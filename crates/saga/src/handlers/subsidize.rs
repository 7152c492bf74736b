use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{RampPhase, RampRecord, StateMetadata};
use serde::{Deserialize, Serialize};

use crate::error::{PhaseError, Result, SagaError, ServiceError};
use crate::handler::{PhaseContext, PhaseHandler};
use crate::handlers::{EVM_NETWORK, HandlerConfig, NextPhase, SUBSTRATE_NETWORK};
use crate::polling::{PollError, wait_until};
use crate::services::{ChainClient, TxStatus};

/// The account a subsidy tops up and the state keys describing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubsidyTarget {
    pub network: &'static str,
    /// State key of the receiving ephemeral address.
    pub address_key: &'static str,
    /// State key of the asset to top up.
    pub asset_key: &'static str,
    /// State key of the raw amount the account must hold afterwards.
    pub expected_key: &'static str,
}

impl SubsidyTarget {
    /// Swap input on the substrate ephemeral account.
    pub const PRE_SWAP: Self = Self {
        network: SUBSTRATE_NETWORK,
        address_key: "substrateEphemeralAddress",
        asset_key: "nablaSwapInputAsset",
        expected_key: "nablaSwapInputAmountRaw",
    };

    /// Swap output on the substrate ephemeral account.
    pub const POST_SWAP: Self = Self {
        network: SUBSTRATE_NETWORK,
        address_key: "substrateEphemeralAddress",
        asset_key: "nablaSwapOutputAsset",
        expected_key: "nablaSwapOutputAmountRaw",
    };

    /// Final output on the EVM ephemeral account, before the destination transfer.
    pub const FINAL_SETTLEMENT: Self = Self {
        network: EVM_NETWORK,
        address_key: "evmEphemeralAddress",
        asset_key: "outputAsset",
        expected_key: "outputAmountRaw",
    };
}

/// A top-up paid from the funding account, stored under `{phase}Subsidy`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubsidyRecord {
    pub phase: RampPhase,
    pub token: String,
    /// Raw amount as a decimal string.
    pub amount: String,
    pub payer_account: String,
    pub transaction_hash: String,
    pub payment_date: DateTime<Utc>,
}

/// Covers the shortfall between an ephemeral account's balance and the
/// amount the quote expects it to hold.
///
/// Ramps without an expected amount in their state are skipped. The top-up
/// hash and subsidy record are saved before waiting for the balance; a re-run
/// with a recorded transfer that has not failed only waits again.
pub struct SubsidizeHandler {
    phase: RampPhase,
    next: NextPhase,
    target: SubsidyTarget,
    chain: Arc<dyn ChainClient>,
    config: HandlerConfig,
}

impl SubsidizeHandler {
    pub fn new(
        phase: RampPhase,
        next: NextPhase,
        target: SubsidyTarget,
        chain: Arc<dyn ChainClient>,
        config: HandlerConfig,
    ) -> Self {
        Self {
            phase,
            next,
            target,
            chain,
            config,
        }
    }

    fn hash_key(&self) -> String {
        format!("{}Hash", self.phase)
    }

    fn record_key(&self) -> String {
        format!("{}Subsidy", self.phase)
    }

    async fn balance(&self, address: &str, asset: &str) -> std::result::Result<u128, ServiceError> {
        self.chain.balance(self.target.network, address, asset).await
    }

    async fn has_reached(
        &self,
        address: &str,
        asset: &str,
        expected: u128,
    ) -> std::result::Result<bool, ServiceError> {
        Ok(self.balance(address, asset).await? >= expected)
    }

    /// True when an earlier run recorded a top-up that is pending or confirmed.
    async fn top_up_in_flight(&self, ramp: &RampRecord) -> Result<bool> {
        let Some(hash) = ramp.state.get_str(&self.hash_key()) else {
            return Ok(false);
        };
        let status = self
            .chain
            .transaction_status(self.target.network, hash)
            .await
            .map_err(recoverable)?;
        if status == TxStatus::Failed {
            tracing::warn!(ramp_id = %ramp.id, phase = %self.phase, hash, "Previous subsidy failed, sending again");
            return Ok(false);
        }
        tracing::info!(ramp_id = %ramp.id, phase = %self.phase, hash, "Subsidy already sent");
        Ok(true)
    }
}

fn recoverable(err: ServiceError) -> SagaError {
    PhaseError::recoverable(err.to_string()).into()
}

#[async_trait]
impl PhaseHandler for SubsidizeHandler {
    fn phase(&self) -> RampPhase {
        self.phase
    }

    async fn execute_phase(&self, ramp: &RampRecord, ctx: &PhaseContext<'_>) -> Result<RampRecord> {
        let next = self.next.resolve(ramp.direction);
        let network = self.target.network;

        if !ramp.state.contains_key(self.target.expected_key) {
            tracing::info!(ramp_id = %ramp.id, phase = %self.phase, "No expected amount, skipping subsidy");
            return ctx
                .transition(ramp, next, Some(serde_json::json!({ "skipped": true })))
                .await;
        }
        let expected = ramp.state.require_amount(self.target.expected_key)?;
        let address = ramp.state.require_str(self.target.address_key)?;
        let asset = ramp.state.require_str(self.target.asset_key)?;

        let mut current = ramp.clone();
        if !self.top_up_in_flight(ramp).await? {
            let balance = self.balance(address, asset).await.map_err(recoverable)?;
            if balance == 0 {
                return Err(PhaseError::recoverable(format!(
                    "{asset} has not arrived on {network} yet"
                ))
                .into());
            }

            let shortfall = expected.saturating_sub(balance);
            if shortfall == 0 {
                tracing::info!(ramp_id = %ramp.id, phase = %self.phase, balance, "Balance meets expected amount, no subsidy needed");
                return ctx.transition(ramp, next, None).await;
            }

            let hash = self
                .chain
                .transfer(network, &self.config.funding_account, address, asset, shortfall)
                .await
                .map_err(recoverable)?;
            tracing::info!(
                ramp_id = %ramp.id,
                phase = %self.phase,
                shortfall,
                expected,
                %hash,
                "Subsidized ephemeral account"
            );

            let record = SubsidyRecord {
                phase: self.phase,
                token: asset.to_string(),
                amount: shortfall.to_string(),
                payer_account: self.config.funding_account.clone(),
                transaction_hash: hash.clone(),
                payment_date: Utc::now(),
            };
            let mut patch = StateMetadata::new();
            patch.insert(self.hash_key(), &hash)?;
            patch.insert(self.record_key(), &record)?;
            current = ctx.save_state(ramp, patch).await?;
        }

        let reached = wait_until(
            self.config.poll_interval,
            self.config.balance_check_timeout,
            move || self.has_reached(address, asset, expected),
        )
        .await;
        match reached {
            Ok(()) => ctx.transition(&current, next, None).await,
            Err(PollError::Timeout(after)) => Err(PhaseError::recoverable(format!(
                "Subsidized balance on {network} not reached after {after:?}"
            ))
            .into()),
            Err(PollError::Check(err)) => Err(recoverable(err)),
        }
    }
}
