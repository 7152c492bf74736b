//! Ramp direction.

use serde::{Deserialize, Serialize};

/// Which way value moves through a ramp. Immutable for the life of a ramp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RampDirection {
    /// Fiat to chain (onramp).
    Buy,
    /// Chain to fiat (offramp).
    Sell,
}

impl RampDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            RampDirection::Buy => "BUY",
            RampDirection::Sell => "SELL",
        }
    }

    pub fn is_onramp(&self) -> bool {
        matches!(self, RampDirection::Buy)
    }
}

impl std::fmt::Display for RampDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RampDirection {
    type Err = crate::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(RampDirection::Buy),
            "SELL" => Ok(RampDirection::Sell),
            other => Err(crate::DomainError::InvalidState {
                key: "type".to_string(),
                reason: format!("unknown ramp direction '{other}'"),
            }),
        }
    }
}
