//! The open key/value state bag carried by every ramp.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::error::{DomainError, Result};

/// Phase-agnostic results accumulated by handlers (addresses, amounts,
/// hashes, sub-identifiers).
///
/// There is no schema beyond what each handler checks for itself, so the typed
/// accessors turn absent or malformed keys into [`DomainError`]s.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateMetadata(Map<String, Value>);

impl StateMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads and deserializes `key`, returning `None` if it is absent or null.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone()).map(Some).map_err(|e| {
                DomainError::InvalidState {
                    key: key.to_string(),
                    reason: e.to_string(),
                }
            }),
        }
    }

    /// Like [`get`](Self::get) but an absent key is an error.
    pub fn require<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.get(key)?.ok_or_else(|| DomainError::MissingState {
            key: key.to_string(),
        })
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn require_str(&self, key: &str) -> Result<&str> {
        self.get_str(key).ok_or_else(|| DomainError::MissingState {
            key: key.to_string(),
        })
    }

    /// Reads a raw token amount stored as a decimal string (or a JSON integer).
    pub fn require_amount(&self, key: &str) -> Result<u128> {
        let invalid = |reason: String| DomainError::InvalidState {
            key: key.to_string(),
            reason,
        };
        match self.0.get(key) {
            None | Some(Value::Null) => Err(DomainError::MissingState {
                key: key.to_string(),
            }),
            Some(Value::String(s)) => s.parse().map_err(|e| invalid(format!("{e}"))),
            Some(Value::Number(n)) => n
                .as_u64()
                .map(u128::from)
                .ok_or_else(|| invalid(format!("{n} is not a raw amount"))),
            Some(other) => Err(invalid(format!("{other} is not a raw amount"))),
        }
    }

    pub fn insert<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> Result<()> {
        self.0.insert(key.into(), serde_json::to_value(value)?);
        Ok(())
    }

    /// Overwrites this bag's keys with every key of `other`.
    pub fn merge(&mut self, other: StateMetadata) {
        self.0.extend(other.0);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for StateMetadata {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bag(value: Value) -> StateMetadata {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_get_typed_values() {
        let state = bag(json!({ "address": "5Gx", "nonce": 7, "empty": null }));
        assert_eq!(state.get::<String>("address").unwrap().as_deref(), Some("5Gx"));
        assert_eq!(state.get::<u64>("nonce").unwrap(), Some(7));
        assert_eq!(state.get::<u64>("empty").unwrap(), None);
        assert_eq!(state.get::<u64>("absent").unwrap(), None);
    }

    #[test]
    fn test_get_wrong_type_is_invalid_state() {
        let state = bag(json!({ "nonce": "seven" }));
        assert!(matches!(
            state.get::<u64>("nonce"),
            Err(DomainError::InvalidState { key, .. }) if key == "nonce"
        ));
    }

    #[test]
    fn test_require_missing_key() {
        let state = StateMetadata::new();
        assert!(matches!(
            state.require_str("evmEphemeralAddress"),
            Err(DomainError::MissingState { key }) if key == "evmEphemeralAddress"
        ));
    }

    #[test]
    fn test_require_amount() {
        let state = bag(json!({
            "big": "340282366920938463463374607431768211455",
            "small": 42,
            "bad": "12abc",
        }));
        assert_eq!(state.require_amount("big").unwrap(), u128::MAX);
        assert_eq!(state.require_amount("small").unwrap(), 42);
        assert!(matches!(
            state.require_amount("bad"),
            Err(DomainError::InvalidState { .. })
        ));
        assert!(matches!(
            state.require_amount("none"),
            Err(DomainError::MissingState { .. })
        ));
    }

    #[test]
    fn test_insert_and_merge() {
        let mut state = bag(json!({ "a": 1, "b": 2 }));
        let mut patch = StateMetadata::new();
        patch.insert("b", "two").unwrap();
        patch.insert("c", true).unwrap();

        state.merge(patch);
        assert_eq!(state.len(), 3);
        assert_eq!(state.get_str("b"), Some("two"));
        assert_eq!(state.get::<bool>("c").unwrap(), Some(true));
    }
}
