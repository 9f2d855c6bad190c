use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sigconfirm_core::display::{NftStandard, TokenRef};
use sigconfirm_core::ports::{ContractMetadata, PricePort, TokenMetadataPort};
use sigconfirm_core::{NetworkId, PortError};

/// Hex addresses compare case-insensitively; base58 ones are case-sensitive.
fn contract_key(network: &NetworkId, contract: &str) -> (NetworkId, String) {
    let contract = contract.trim();
    let contract = if contract.starts_with("0x") {
        contract.to_ascii_lowercase()
    } else {
        contract.to_owned()
    };
    (network.clone(), contract)
}

/// In-memory token and NFT metadata, keyed by network and contract.
#[derive(Debug, Clone, Default)]
pub struct TokenDirectoryAdapter {
    entries: Arc<Mutex<HashMap<(NetworkId, String), ContractMetadata>>>,
}

impl TokenDirectoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_token(&self, network: &NetworkId, token: TokenRef) -> Result<(), PortError> {
        let address = token.address.clone().ok_or_else(|| {
            PortError::Validation("native assets are not stored in the directory".to_owned())
        })?;
        self.insert(network, &address, ContractMetadata::Token(token))
    }

    pub fn insert_nft(
        &self,
        network: &NetworkId,
        contract: &str,
        name: Option<String>,
        standard: NftStandard,
    ) -> Result<(), PortError> {
        self.insert(network, contract, ContractMetadata::Nft { name, standard })
    }

    fn insert(
        &self,
        network: &NetworkId,
        contract: &str,
        metadata: ContractMetadata,
    ) -> Result<(), PortError> {
        let mut g = self
            .entries
            .lock()
            .map_err(|e| PortError::Transport(format!("token directory lock poisoned: {e}")))?;
        g.insert(contract_key(network, contract), metadata);
        Ok(())
    }
}

impl TokenMetadataPort for TokenDirectoryAdapter {
    fn contract_metadata(
        &self,
        network: &NetworkId,
        contract: &str,
    ) -> Result<ContractMetadata, PortError> {
        let g = self
            .entries
            .lock()
            .map_err(|e| PortError::Transport(format!("token directory lock poisoned: {e}")))?;
        Ok(g
            .get(&contract_key(network, contract))
            .cloned()
            .unwrap_or(ContractMetadata::Unknown))
    }
}

/// USD prices, `None` key for a network's native asset.
#[derive(Debug, Clone, Default)]
pub struct PriceTableAdapter {
    prices: Arc<Mutex<HashMap<(NetworkId, Option<String>), f64>>>,
}

impl PriceTableAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(
        &self,
        network: &NetworkId,
        token: Option<&str>,
        usd: f64,
    ) -> Result<(), PortError> {
        if !usd.is_finite() || usd < 0.0 {
            return Err(PortError::Validation(format!("invalid price {usd}")));
        }
        let key = (
            network.clone(),
            token.map(|token| contract_key(network, token).1),
        );
        let mut g = self
            .prices
            .lock()
            .map_err(|e| PortError::Transport(format!("price table lock poisoned: {e}")))?;
        g.insert(key, usd);
        Ok(())
    }
}

impl PricePort for PriceTableAdapter {
    fn price_usd(
        &self,
        network: &NetworkId,
        token: Option<&str>,
    ) -> Result<Option<f64>, PortError> {
        let key = (
            network.clone(),
            token.map(|token| contract_key(network, token).1),
        );
        let g = self
            .prices
            .lock()
            .map_err(|e| PortError::Transport(format!("price table lock poisoned: {e}")))?;
        Ok(g.get(&key).copied())
    }
}
