use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a ramp (one fiat/chain conversion saga).
///
/// Wraps a UUID to provide type safety and prevent mixing up
/// ramp IDs with quote IDs or other UUID-based identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RampId(Uuid);

impl RampId {
    /// Creates a new random ramp ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a ramp ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RampId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RampId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RampId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for RampId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<RampId> for Uuid {
    fn from(id: RampId) -> Self {
        id.0
    }
}

/// Reference to the external quote ticket that fixed a ramp's amounts and currencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuoteId(Uuid);

impl QuoteId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for QuoteId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for QuoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramp_id_new_creates_unique_ids() {
        let id1 = RampId::new();
        let id2 = RampId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn ramp_id_parses_from_display() {
        let id = RampId::new();
        let parsed: RampId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn ramp_id_rejects_garbage() {
        assert!("not-a-uuid".parse::<RampId>().is_err());
    }

    #[test]
    fn quote_id_serializes_as_plain_uuid() {
        let uuid = Uuid::new_v4();
        let id = QuoteId::from_uuid(uuid);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{uuid}\""));
    }
}
