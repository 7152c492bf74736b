//! Payment provider trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::ServiceError;
use crate::services::chain::InMemoryChainClient;

/// A request to move minted funds from a sub-account to an on-chain wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTicket {
    pub id: String,
    pub tax_id: String,
    pub amount: u128,
    pub wallet: String,
}

/// The fiat payment provider holding the user's sub-account.
///
/// A fiat payment from the user shows up as a token balance on the
/// sub-account; a transfer ticket then moves it on-chain.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Token balance of the sub-account identified by `tax_id`, in raw units.
    async fn account_balance(&self, tax_id: &str) -> Result<u128, ServiceError>;

    /// Moves `amount` from the sub-account to `wallet`. Returns the ticket id.
    async fn create_transfer_ticket(
        &self,
        tax_id: &str,
        amount: u128,
        wallet: &str,
    ) -> Result<String, ServiceError>;
}

#[derive(Debug)]
struct Settlement {
    chain: InMemoryChainClient,
    network: String,
    asset: String,
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    accounts: HashMap<String, u128>,
    tickets: Vec<TransferTicket>,
    next_id: u32,
    fail_on_ticket: bool,
    settlement: Option<Settlement>,
}

/// In-memory payment provider for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentProvider {
    state: Arc<RwLock<InMemoryPaymentState>>,
}

impl InMemoryPaymentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a sub-account with a zero balance.
    pub fn open_account(&self, tax_id: &str) {
        self.state
            .write()
            .unwrap()
            .accounts
            .entry(tax_id.to_string())
            .or_default();
    }

    /// Simulates the user's fiat payment being minted to the sub-account.
    pub fn deposit(&self, tax_id: &str, amount: u128) {
        *self
            .state
            .write()
            .unwrap()
            .accounts
            .entry(tax_id.to_string())
            .or_default() += amount;
    }

    /// Credits ticket amounts to the wallet on `network` as soon as a ticket is created.
    pub fn settle_to(&self, chain: InMemoryChainClient, network: &str, asset: &str) {
        self.state.write().unwrap().settlement = Some(Settlement {
            chain,
            network: network.to_string(),
            asset: asset.to_string(),
        });
    }

    pub fn set_fail_on_ticket(&self, fail: bool) {
        self.state.write().unwrap().fail_on_ticket = fail;
    }

    pub fn tickets(&self) -> Vec<TransferTicket> {
        self.state.read().unwrap().tickets.clone()
    }
}

#[async_trait]
impl PaymentProvider for InMemoryPaymentProvider {
    async fn account_balance(&self, tax_id: &str) -> Result<u128, ServiceError> {
        self.state
            .read()
            .unwrap()
            .accounts
            .get(tax_id)
            .copied()
            .ok_or_else(|| ServiceError::NotFound(format!("sub-account for {tax_id}")))
    }

    async fn create_transfer_ticket(
        &self,
        tax_id: &str,
        amount: u128,
        wallet: &str,
    ) -> Result<String, ServiceError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_ticket {
            return Err(ServiceError::Network("provider unavailable".to_string()));
        }

        let balance = state
            .accounts
            .get_mut(tax_id)
            .ok_or_else(|| ServiceError::NotFound(format!("sub-account for {tax_id}")))?;
        if *balance < amount {
            return Err(ServiceError::Rejected(format!(
                "insufficient balance: {balance} < {amount}"
            )));
        }
        *balance -= amount;

        state.next_id += 1;
        let id = format!("TICKET-{:04}", state.next_id);
        state.tickets.push(TransferTicket {
            id: id.clone(),
            tax_id: tax_id.to_string(),
            amount,
            wallet: wallet.to_string(),
        });

        if let Some(settlement) = &state.settlement {
            settlement
                .chain
                .credit(&settlement.network, wallet, &settlement.asset, amount);
        }

        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::chain::ChainClient;

    #[tokio::test]
    async fn test_deposit_and_balance() {
        let provider = InMemoryPaymentProvider::new();
        provider.open_account("123");
        assert_eq!(provider.account_balance("123").await.unwrap(), 0);

        provider.deposit("123", 5_000);
        assert_eq!(provider.account_balance("123").await.unwrap(), 5_000);
    }

    #[tokio::test]
    async fn test_unknown_account() {
        let provider = InMemoryPaymentProvider::new();
        assert!(matches!(
            provider.account_balance("nope").await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_ticket_moves_funds_on_chain() {
        let chain = InMemoryChainClient::new();
        let provider = InMemoryPaymentProvider::new();
        provider.settle_to(chain.clone(), "moonbeam", "BRLA");
        provider.deposit("123", 5_000);

        let id = provider
            .create_transfer_ticket("123", 4_000, "0xeph")
            .await
            .unwrap();

        assert_eq!(id, "TICKET-0001");
        assert_eq!(provider.account_balance("123").await.unwrap(), 1_000);
        assert_eq!(chain.balance("moonbeam", "0xeph", "BRLA").await.unwrap(), 4_000);
        assert_eq!(provider.tickets().len(), 1);
    }

    #[tokio::test]
    async fn test_ticket_rejected_on_insufficient_balance() {
        let provider = InMemoryPaymentProvider::new();
        provider.deposit("123", 10);

        let result = provider.create_transfer_ticket("123", 11, "0xeph").await;
        assert!(matches!(result, Err(ServiceError::Rejected(_))));
        assert!(provider.tickets().is_empty());
    }
}
