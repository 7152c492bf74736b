//! Ramp phase names.
//!
//! Phases form a fixed graph per ramp direction. Every non-terminal phase is
//! owned by exactly one phase handler; `complete` and `failed` are terminal
//! and never executed.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::DomainError;

macro_rules! ramp_phases {
    ($($(#[$doc:meta])* $variant:ident => $name:literal,)+) => {
        /// A named step in a ramp's execution graph.
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum RampPhase {
            $($(#[$doc])* $variant,)+
        }

        impl RampPhase {
            /// Every phase name, in declaration order.
            pub const ALL: &'static [RampPhase] = &[$(RampPhase::$variant,)+];

            /// Returns the persisted (camelCase) phase name.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(RampPhase::$variant => $name,)+
                }
            }
        }

        impl std::str::FromStr for RampPhase {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(RampPhase::$variant),)+
                    other => Err(DomainError::UnknownPhase(other.to_string())),
                }
            }
        }
    };
}

ramp_phases! {
    /// Entry phase of every ramp.
    #[default]
    Initial => "initial",
    MoneriumOnrampSelfTransfer => "moneriumOnrampSelfTransfer",
    MoneriumOnrampMint => "moneriumOnrampMint",
    SquidRouterPermitExecute => "squidrouterPermitExecute",
    StellarCreateAccount => "stellarCreateAccount",
    SquidRouterApprove => "squidRouterApprove",
    SquidRouterSwap => "squidRouterSwap",
    SquidRouterPay => "squidRouterPay",
    /// Top up the ramp's ephemeral accounts with native tokens for fees.
    FundEphemeral => "fundEphemeral",
    DestinationTransfer => "destinationTransfer",
    NablaApprove => "nablaApprove",
    NablaSwap => "nablaSwap",
    HydrationSwap => "hydrationSwap",
    HydrationToAssethubXcm => "hydrationToAssethubXcm",
    MoonbeamToPendulum => "moonbeamToPendulum",
    MoonbeamToPendulumXcm => "moonbeamToPendulumXcm",
    PendulumToMoonbeamXcm => "pendulumToMoonbeamXcm",
    PendulumToHydrationXcm => "pendulumToHydrationXcm",
    AssethubToPendulum => "assethubToPendulum",
    PendulumToAssethubXcm => "pendulumToAssethubXcm",
    SpacewalkRedeem => "spacewalkRedeem",
    StellarPayment => "stellarPayment",
    SubsidizePreSwap => "subsidizePreSwap",
    SubsidizePostSwap => "subsidizePostSwap",
    DistributeFees => "distributeFees",
    AlfredpayOnrampMint => "alfredpayOnrampMint",
    AlfredpayOfframpTransfer => "alfredpayOfframpTransfer",
    /// Wait for the user's fiat payment to be minted on the payment provider.
    BrlaOnrampMint => "brlaOnrampMint",
    BrlaPayoutOnMoonbeam => "brlaPayoutOnMoonbeam",
    FinalSettlementSubsidy => "finalSettlementSubsidy",
    BackupSquidRouterApprove => "backupSquidRouterApprove",
    BackupSquidRouterSwap => "backupSquidRouterSwap",
    BackupApprove => "backupApprove",
    TimedOut => "timedOut",
    /// Terminal: the ramp settled successfully.
    Complete => "complete",
    /// Terminal: the ramp was abandoned.
    Failed => "failed",
}

impl RampPhase {
    /// Returns true for `complete` and `failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RampPhase::Complete | RampPhase::Failed)
    }
}

impl std::fmt::Display for RampPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for RampPhase {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RampPhase {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}
