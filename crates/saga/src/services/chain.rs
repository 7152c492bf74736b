//! Chain client trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use domain::PresignedTx;

use crate::error::ServiceError;

/// Asset name used for a network's native token.
pub const NATIVE_ASSET: &str = "native";

/// On-chain status of a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
}

/// RPC access to the networks a ramp moves funds across.
///
/// Implementations are stateless request/response clients shared by all
/// ramps; every call may be retried.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Balance of `asset` held by `address` on `network`, in raw units.
    async fn balance(&self, network: &str, address: &str, asset: &str) -> Result<u128, ServiceError>;

    /// Broadcasts a presigned transaction and returns its hash.
    async fn submit(&self, tx: &PresignedTx) -> Result<String, ServiceError>;

    /// Looks up a previously submitted transaction.
    async fn transaction_status(&self, network: &str, hash: &str) -> Result<TxStatus, ServiceError>;

    /// Sends `amount` of the native token from the funding account to `address`.
    async fn fund(&self, network: &str, address: &str, amount: u128) -> Result<String, ServiceError>;

    /// Sends `amount` of `asset` from `from` to `to` and returns the transfer hash.
    async fn transfer(
        &self,
        network: &str,
        from: &str,
        to: &str,
        asset: &str,
        amount: u128,
    ) -> Result<String, ServiceError>;
}

type BalanceKey = (String, String, String);

#[derive(Debug, Default)]
struct InMemoryChainState {
    balances: HashMap<BalanceKey, u128>,
    transactions: HashMap<String, TxStatus>,
    submitted: Vec<PresignedTx>,
    fundings: Vec<(String, String, u128)>,
    transfers: Vec<(String, String, String, u128)>,
    next_id: u64,
    network_failures: u32,
    reject_submissions: bool,
    hold_confirmations: bool,
}

impl InMemoryChainState {
    fn next_hash(&mut self) -> String {
        self.next_id += 1;
        format!("0x{:064x}", self.next_id)
    }

    fn initial_status(&self) -> TxStatus {
        if self.hold_confirmations {
            TxStatus::Pending
        } else {
            TxStatus::Confirmed
        }
    }

    fn take_network_failure(&mut self) -> Result<(), ServiceError> {
        if self.network_failures > 0 {
            self.network_failures -= 1;
            return Err(ServiceError::Network("connection reset".to_string()));
        }
        Ok(())
    }
}

/// In-memory chain client for testing.
///
/// Submissions and fundings confirm immediately unless confirmations are held.
#[derive(Debug, Clone, Default)]
pub struct InMemoryChainClient {
    state: Arc<RwLock<InMemoryChainState>>,
}

fn key(network: &str, address: &str, asset: &str) -> BalanceKey {
    (network.to_string(), address.to_string(), asset.to_string())
}

impl InMemoryChainClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_balance(&self, network: &str, address: &str, asset: &str, amount: u128) {
        self.state
            .write()
            .unwrap()
            .balances
            .insert(key(network, address, asset), amount);
    }

    pub fn credit(&self, network: &str, address: &str, asset: &str, amount: u128) {
        *self
            .state
            .write()
            .unwrap()
            .balances
            .entry(key(network, address, asset))
            .or_default() += amount;
    }

    pub fn balance_of(&self, network: &str, address: &str, asset: &str) -> u128 {
        self.state
            .read()
            .unwrap()
            .balances
            .get(&key(network, address, asset))
            .copied()
            .unwrap_or(0)
    }

    /// Overrides the status of a known transaction.
    pub fn set_status(&self, hash: &str, status: TxStatus) {
        self.state
            .write()
            .unwrap()
            .transactions
            .insert(hash.to_string(), status);
    }

    /// Makes the next `count` submit, fund or transfer calls fail with a network error.
    pub fn fail_next(&self, count: u32) {
        self.state.write().unwrap().network_failures = count;
    }

    pub fn set_reject_submissions(&self, reject: bool) {
        self.state.write().unwrap().reject_submissions = reject;
    }

    /// Leaves new transactions pending until `set_status` confirms them.
    pub fn set_hold_confirmations(&self, hold: bool) {
        self.state.write().unwrap().hold_confirmations = hold;
    }

    pub fn submitted(&self) -> Vec<PresignedTx> {
        self.state.read().unwrap().submitted.clone()
    }

    pub fn submission_count(&self) -> usize {
        self.state.read().unwrap().submitted.len()
    }

    pub fn funding_count(&self) -> usize {
        self.state.read().unwrap().fundings.len()
    }

    pub fn transfer_count(&self) -> usize {
        self.state.read().unwrap().transfers.len()
    }
}

#[async_trait]
impl ChainClient for InMemoryChainClient {
    async fn balance(&self, network: &str, address: &str, asset: &str) -> Result<u128, ServiceError> {
        Ok(self.balance_of(network, address, asset))
    }

    async fn submit(&self, tx: &PresignedTx) -> Result<String, ServiceError> {
        let mut state = self.state.write().unwrap();
        state.take_network_failure()?;

        if state.reject_submissions {
            return Err(ServiceError::Rejected(format!(
                "transaction for {} rejected by {}",
                tx.phase, tx.network
            )));
        }

        let hash = state.next_hash();
        let status = state.initial_status();
        state.transactions.insert(hash.clone(), status);
        state.submitted.push(tx.clone());

        Ok(hash)
    }

    async fn transaction_status(&self, _network: &str, hash: &str) -> Result<TxStatus, ServiceError> {
        self.state
            .read()
            .unwrap()
            .transactions
            .get(hash)
            .copied()
            .ok_or_else(|| ServiceError::NotFound(format!("transaction {hash}")))
    }

    async fn fund(&self, network: &str, address: &str, amount: u128) -> Result<String, ServiceError> {
        let mut state = self.state.write().unwrap();
        state.take_network_failure()?;

        let hash = state.next_hash();
        let status = state.initial_status();
        state.transactions.insert(hash.clone(), status);
        state
            .fundings
            .push((network.to_string(), address.to_string(), amount));
        *state
            .balances
            .entry(key(network, address, NATIVE_ASSET))
            .or_default() += amount;

        Ok(hash)
    }

    async fn transfer(
        &self,
        network: &str,
        from: &str,
        to: &str,
        asset: &str,
        amount: u128,
    ) -> Result<String, ServiceError> {
        let mut state = self.state.write().unwrap();
        state.take_network_failure()?;

        let available = state
            .balances
            .get(&key(network, from, asset))
            .copied()
            .unwrap_or(0);
        if available < amount {
            return Err(ServiceError::Rejected(format!(
                "{from} holds {available} {asset} on {network}, needs {amount}"
            )));
        }

        let hash = state.next_hash();
        let status = state.initial_status();
        state.transactions.insert(hash.clone(), status);
        state.transfers.push((
            network.to_string(),
            to.to_string(),
            asset.to_string(),
            amount,
        ));
        state.balances.insert(key(network, from, asset), available - amount);
        *state.balances.entry(key(network, to, asset)).or_default() += amount;

        Ok(hash)
    }
}
