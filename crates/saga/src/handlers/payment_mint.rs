use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{RampPhase, RampRecord};

use crate::error::{PhaseError, Result};
use crate::handler::{PhaseContext, PhaseHandler};
use crate::handlers::{EVM_NETWORK, HandlerConfig};
use crate::polling::{PollError, wait_until};
use crate::services::{ChainClient, PaymentProvider};

const TICKET_KEY: &str = "brlaTransferTicketId";

/// Waits for the user's fiat payment to be minted on their sub-account,
/// moves it to the EVM ephemeral account and waits for it to arrive.
///
/// Reads `taxId`, `evmEphemeralAddress` and `mintAmountRaw` from the state
/// bag. The ticket id is recorded under `brlaTransferTicketId` so a retry
/// never requests a second transfer.
pub struct PaymentMintHandler {
    chain: Arc<dyn ChainClient>,
    payment: Arc<dyn PaymentProvider>,
    config: HandlerConfig,
}

impl PaymentMintHandler {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        payment: Arc<dyn PaymentProvider>,
        config: HandlerConfig,
    ) -> Self {
        Self {
            chain,
            payment,
            config,
        }
    }

    /// Fails the ramp once the payment window has elapsed, otherwise asks for a retry.
    async fn on_timeout(
        &self,
        ramp: &RampRecord,
        ctx: &PhaseContext<'_>,
        entered_at: DateTime<Utc>,
        waiting_for: &str,
    ) -> Result<RampRecord> {
        let elapsed = Utc::now() - entered_at;
        if elapsed > self.config.payment_window {
            tracing::warn!(
                ramp_id = %ramp.id,
                elapsed_secs = elapsed.num_seconds(),
                "Payment window elapsed, failing ramp"
            );
            let metadata = serde_json::json!({ "reason": format!("Payment timeout: {waiting_for}") });
            return ctx.transition(ramp, RampPhase::Failed, Some(metadata)).await;
        }

        Err(PhaseError::recoverable(format!("Still waiting for {waiting_for}")).into())
    }
}

#[async_trait]
impl PhaseHandler for PaymentMintHandler {
    fn phase(&self) -> RampPhase {
        RampPhase::BrlaOnrampMint
    }

    async fn execute_phase(&self, ramp: &RampRecord, ctx: &PhaseContext<'_>) -> Result<RampRecord> {
        let tax_id = ramp.state.require_str("taxId")?;
        let wallet = ramp.state.require_str("evmEphemeralAddress")?;
        let amount = ramp.state.require_amount("mintAmountRaw")?;
        let entered_at = ramp.phase_entered_at(RampPhase::BrlaOnrampMint).ok_or_else(|| {
            PhaseError::unrecoverable("No phase history entry for brlaOnrampMint")
        })?;

        let interval = self.config.poll_interval;
        let timeout = self.config.balance_check_timeout;

        let ramp = match ramp.state.get_str(TICKET_KEY) {
            Some(ticket) => {
                tracing::info!(ramp_id = %ramp.id, ticket, "Transfer ticket already created");
                ramp.clone()
            }
            None => {
                let payment = self.payment.as_ref();
                let paid = wait_until(interval, timeout, move || async move {
                    Ok::<_, PhaseError>(payment.account_balance(tax_id).await? >= amount)
                })
                .await;
                match paid {
                    Ok(()) => {}
                    Err(PollError::Timeout(_)) => {
                        return self.on_timeout(ramp, ctx, entered_at, "payment").await;
                    }
                    Err(PollError::Check(err)) => return Err(err.into()),
                }

                let ticket = self
                    .payment
                    .create_transfer_ticket(tax_id, amount, wallet)
                    .await
                    .map_err(PhaseError::from)?;
                tracing::info!(ramp_id = %ramp.id, %ticket, "Created transfer ticket");
                ctx.set_state(ramp, TICKET_KEY, &ticket).await?
            }
        };

        let chain = self.chain.as_ref();
        let asset = self.config.mint_asset.as_str();
        let arrived = wait_until(interval, timeout, move || async move {
            Ok::<_, PhaseError>(chain.balance(EVM_NETWORK, wallet, asset).await? >= amount)
        })
        .await;
        match arrived {
            Ok(()) => {}
            Err(PollError::Timeout(_)) => {
                return self
                    .on_timeout(&ramp, ctx, entered_at, "minted tokens on the ephemeral account")
                    .await;
            }
            Err(PollError::Check(err)) => return Err(err.into()),
        }

        ctx.transition(&ramp, RampPhase::FundEphemeral, None).await
    }
}
