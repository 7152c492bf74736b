use async_trait::async_trait;
use domain::{RampDirection, RampPhase, RampRecord};

use crate::error::{PhaseError, Result};
use crate::handler::{PhaseContext, PhaseHandler};

/// Starts the saga: checks that transaction material is attached and routes
/// by direction.
#[derive(Debug, Clone, Copy, Default)]
pub struct InitialPhaseHandler;

#[async_trait]
impl PhaseHandler for InitialPhaseHandler {
    fn phase(&self) -> RampPhase {
        RampPhase::Initial
    }

    async fn execute_phase(&self, ramp: &RampRecord, ctx: &PhaseContext<'_>) -> Result<RampRecord> {
        if !ramp.has_transaction_material() {
            return Err(PhaseError::unrecoverable("Ramp has no presigned transactions").into());
        }

        let next = match ramp.direction {
            RampDirection::Buy => RampPhase::BrlaOnrampMint,
            RampDirection::Sell => RampPhase::FundEphemeral,
        };
        ctx.transition(ramp, next, None).await
    }
}
