//! Transaction material attached to a ramp before its saga starts.

use serde::{Deserialize, Serialize};

use crate::phase::RampPhase;

/// Extra data carried alongside a transaction blob.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_sequence_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_txs: Option<serde_json::Map<String, serde_json::Value>>,
}

/// A transaction prepared for a specific phase.
///
/// `tx_data` is opaque to the saga engine: an encoded extrinsic, an EVM
/// transaction object or signed typed data, depending on the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsignedTx {
    pub tx_data: serde_json::Value,
    pub phase: RampPhase,
    pub network: String,
    pub nonce: u64,
    pub signer: String,
    #[serde(default)]
    pub meta: TxMeta,
}

/// A transaction signed ahead of time by the client or an ephemeral key.
pub type PresignedTx = UnsignedTx;

impl UnsignedTx {
    pub fn new(
        phase: RampPhase,
        network: impl Into<String>,
        signer: impl Into<String>,
        nonce: u64,
        tx_data: serde_json::Value,
    ) -> Self {
        Self {
            tx_data,
            phase,
            network: network.into(),
            nonce,
            signer: signer.into(),
            meta: TxMeta::default(),
        }
    }

    /// Returns the transaction data when it is a plain encoded string.
    pub fn encoded(&self) -> Option<&str> {
        self.tx_data.as_str()
    }
}
