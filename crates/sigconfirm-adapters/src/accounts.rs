use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use alloy::primitives::U256;
use sigconfirm_core::ports::{AccountPort, PendingTxPort};
use sigconfirm_core::{AccountId, NetworkId, PortError};

type AccountKey = (AccountId, NetworkId);

#[derive(Debug, Clone)]
struct AccountEntry {
    address: String,
    balance: Option<U256>,
}

/// Addresses and native balances of the wallet's accounts per network.
#[derive(Debug, Clone, Default)]
pub struct AccountDirectoryAdapter {
    accounts: Arc<Mutex<HashMap<AccountKey, AccountEntry>>>,
}

impl AccountDirectoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &self,
        account: &AccountId,
        network: &NetworkId,
        address: impl Into<String>,
        balance: Option<U256>,
    ) -> Result<(), PortError> {
        let mut g = self
            .accounts
            .lock()
            .map_err(|e| PortError::Transport(format!("account directory lock poisoned: {e}")))?;
        g.insert(
            (account.clone(), network.clone()),
            AccountEntry {
                address: address.into(),
                balance,
            },
        );
        Ok(())
    }

    pub fn set_balance(
        &self,
        account: &AccountId,
        network: &NetworkId,
        balance: Option<U256>,
    ) -> Result<(), PortError> {
        let mut g = self
            .accounts
            .lock()
            .map_err(|e| PortError::Transport(format!("account directory lock poisoned: {e}")))?;
        let entry = g
            .get_mut(&(account.clone(), network.clone()))
            .ok_or_else(|| PortError::NotFound(format!("account {account} on {network}")))?;
        entry.balance = balance;
        Ok(())
    }

    fn entry(&self, account: &AccountId, network: &NetworkId) -> Result<AccountEntry, PortError> {
        let g = self
            .accounts
            .lock()
            .map_err(|e| PortError::Transport(format!("account directory lock poisoned: {e}")))?;
        g.get(&(account.clone(), network.clone()))
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("account {account} on {network}")))
    }
}

impl AccountPort for AccountDirectoryAdapter {
    fn address(&self, account: &AccountId, network: &NetworkId) -> Result<String, PortError> {
        Ok(self.entry(account, network)?.address)
    }

    fn native_balance(&self, account: &AccountId, network: &NetworkId) -> Result<U256, PortError> {
        self.entry(account, network)?
            .balance
            .ok_or_else(|| PortError::Transport(format!("balance of {account} on {network} is unavailable")))
    }
}

#[derive(Debug, Clone, Default)]
struct NonceState {
    current: u64,
    pending: BTreeSet<u64>,
}

/// Chain nonce plus the nonces of locally broadcast, unmined transactions.
#[derive(Debug, Clone, Default)]
pub struct PendingNonceBook {
    nonces: Arc<Mutex<HashMap<AccountKey, NonceState>>>,
}

impl PendingNonceBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_current(
        &self,
        account: &AccountId,
        network: &NetworkId,
        current: u64,
    ) -> Result<(), PortError> {
        let mut g = self
            .nonces
            .lock()
            .map_err(|e| PortError::Transport(format!("nonce book lock poisoned: {e}")))?;
        let state = g.entry((account.clone(), network.clone())).or_default();
        state.current = current;
        state.pending.retain(|nonce| *nonce >= current);
        Ok(())
    }

    pub fn add_pending(
        &self,
        account: &AccountId,
        network: &NetworkId,
        nonce: u64,
    ) -> Result<(), PortError> {
        let mut g = self
            .nonces
            .lock()
            .map_err(|e| PortError::Transport(format!("nonce book lock poisoned: {e}")))?;
        let state = g.entry((account.clone(), network.clone())).or_default();
        if nonce < state.current {
            return Err(PortError::Validation(format!(
                "nonce {nonce} is already mined (current {})",
                state.current
            )));
        }
        state.pending.insert(nonce);
        Ok(())
    }

    pub fn remove_pending(
        &self,
        account: &AccountId,
        network: &NetworkId,
        nonce: u64,
    ) -> Result<bool, PortError> {
        let mut g = self
            .nonces
            .lock()
            .map_err(|e| PortError::Transport(format!("nonce book lock poisoned: {e}")))?;
        Ok(g
            .get_mut(&(account.clone(), network.clone()))
            .is_some_and(|state| state.pending.remove(&nonce)))
    }
}

impl PendingTxPort for PendingNonceBook {
    fn current_nonce(&self, account: &AccountId, network: &NetworkId) -> Result<u64, PortError> {
        let g = self
            .nonces
            .lock()
            .map_err(|e| PortError::Transport(format!("nonce book lock poisoned: {e}")))?;
        Ok(g
            .get(&(account.clone(), network.clone()))
            .map(|state| state.current)
            .unwrap_or(0))
    }

    fn pending_nonces(
        &self,
        account: &AccountId,
        network: &NetworkId,
    ) -> Result<Vec<u64>, PortError> {
        let g = self
            .nonces
            .lock()
            .map_err(|e| PortError::Transport(format!("nonce book lock poisoned: {e}")))?;
        Ok(g
            .get(&(account.clone(), network.clone()))
            .map(|state| state.pending.iter().copied().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mined_nonces_leave_the_pending_set() {
        let account = AccountId::new("acct-1");
        let network = NetworkId::new("evm--1");
        let book = PendingNonceBook::new();
        book.set_current(&account, &network, 5).expect("current");
        book.add_pending(&account, &network, 5).expect("pending");
        book.add_pending(&account, &network, 6).expect("pending");
        assert!(book.add_pending(&account, &network, 4).is_err());

        book.set_current(&account, &network, 6).expect("current");
        assert_eq!(book.pending_nonces(&account, &network).expect("pending"), vec![6]);
        assert!(book.remove_pending(&account, &network, 6).expect("remove"));
        assert!(book.pending_nonces(&account, &network).expect("pending").is_empty());
    }

    #[test]
    fn unknown_balance_is_an_error() {
        let account = AccountId::new("acct-1");
        let network = NetworkId::new("btc--0");
        let directory = AccountDirectoryAdapter::new();
        directory
            .insert(&account, &network, "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4", None)
            .expect("insert");
        assert!(directory.native_balance(&account, &network).is_err());
        directory
            .set_balance(&account, &network, Some(U256::from(1_000u64)))
            .expect("balance");
        assert_eq!(
            directory.native_balance(&account, &network).expect("balance"),
            U256::from(1_000u64)
        );
        assert!(matches!(
            directory.address(&AccountId::new("other"), &network),
            Err(PortError::NotFound(_))
        ));
    }
}
