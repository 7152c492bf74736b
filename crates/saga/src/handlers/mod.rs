//! Concrete phase handlers and the default route wiring.
//!
//! Buy ramps run `initial → brlaOnrampMint → fundEphemeral → subsidizePreSwap →
//! nablaApprove → nablaSwap → distributeFees → subsidizePostSwap →
//! finalSettlementSubsidy → destinationTransfer → complete`.
//!
//! Sell ramps run `initial → fundEphemeral → distributeFees → subsidizePreSwap →
//! nablaApprove → nablaSwap → subsidizePostSwap → brlaPayoutOnMoonbeam → complete`.

mod fund_ephemeral;
mod initial;
mod payment_mint;
mod submit_presigned;
mod subsidize;

use std::sync::Arc;
use std::time::Duration;

use domain::RampPhase;

use crate::registry::HandlerRegistry;
use crate::services::{ChainClient, PaymentProvider};

pub use fund_ephemeral::FundEphemeralHandler;
pub use initial::InitialPhaseHandler;
pub use payment_mint::PaymentMintHandler;
pub use submit_presigned::{NextPhase, SubmitPresignedHandler};
pub use subsidize::{SubsidizeHandler, SubsidyRecord, SubsidyTarget};

/// Network hosting the EVM ephemeral account and the minted token.
pub const EVM_NETWORK: &str = "moonbeam";
/// Network hosting the substrate ephemeral account.
pub const SUBSTRATE_NETWORK: &str = "pendulum";

/// Timing and amount parameters shared by the concrete handlers.
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    /// Delay between two checks of an external condition.
    pub poll_interval: Duration,
    /// How long to wait for a submitted transaction to confirm.
    pub confirmation_timeout: Duration,
    /// Time the user has to pay, measured from entering `brlaOnrampMint`.
    pub payment_window: chrono::Duration,
    /// How long a single balance check polls before giving up for this attempt.
    pub balance_check_timeout: Duration,
    /// Native tokens sent to each ephemeral account, in raw units.
    pub ephemeral_funding_amount: u128,
    /// Asset the payment provider mints on the EVM network.
    pub mint_asset: String,
    /// Account paying subsidies on every network.
    pub funding_account: String,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            confirmation_timeout: Duration::from_secs(120),
            payment_window: chrono::Duration::minutes(30),
            balance_check_timeout: Duration::from_secs(5 * 60),
            ephemeral_funding_amount: 10_000_000_000_000,
            mint_asset: "BRLA".to_string(),
            funding_account: "funding".to_string(),
        }
    }
}

/// Registers the handlers for both default routes.
pub fn register_default_handlers(
    registry: &mut HandlerRegistry,
    chain: Arc<dyn ChainClient>,
    payment: Arc<dyn PaymentProvider>,
    config: HandlerConfig,
) {
    registry
        .register(InitialPhaseHandler)
        .register(PaymentMintHandler::new(chain.clone(), payment, config.clone()))
        .register(FundEphemeralHandler::new(chain.clone(), config.clone()));

    let submissions = [
        (RampPhase::NablaApprove, NextPhase::Fixed(RampPhase::NablaSwap)),
        (
            RampPhase::NablaSwap,
            NextPhase::ByDirection {
                buy: RampPhase::DistributeFees,
                sell: RampPhase::SubsidizePostSwap,
            },
        ),
        (
            RampPhase::DistributeFees,
            NextPhase::ByDirection {
                buy: RampPhase::SubsidizePostSwap,
                sell: RampPhase::SubsidizePreSwap,
            },
        ),
        (RampPhase::DestinationTransfer, NextPhase::Fixed(RampPhase::Complete)),
        (RampPhase::BrlaPayoutOnMoonbeam, NextPhase::Fixed(RampPhase::Complete)),
    ];
    for (phase, next) in submissions {
        registry.register(SubmitPresignedHandler::new(
            phase,
            next,
            chain.clone(),
            config.clone(),
        ));
    }

    let subsidies = [
        (
            RampPhase::SubsidizePreSwap,
            NextPhase::Fixed(RampPhase::NablaApprove),
            SubsidyTarget::PRE_SWAP,
        ),
        (
            RampPhase::SubsidizePostSwap,
            NextPhase::ByDirection {
                buy: RampPhase::FinalSettlementSubsidy,
                sell: RampPhase::BrlaPayoutOnMoonbeam,
            },
            SubsidyTarget::POST_SWAP,
        ),
        (
            RampPhase::FinalSettlementSubsidy,
            NextPhase::Fixed(RampPhase::DestinationTransfer),
            SubsidyTarget::FINAL_SETTLEMENT,
        ),
    ];
    for (phase, next, target) in subsidies {
        registry.register(SubsidizeHandler::new(
            phase,
            next,
            target,
            chain.clone(),
            config.clone(),
        ));
    }
}
