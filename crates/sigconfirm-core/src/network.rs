use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::{ImplementationTag, MessageType, NetworkId, UnsignedMessage};
use crate::message;
use crate::ports::PortError;
use crate::verify::SignatureFormat;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeAsset {
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceModel {
    FeeOnly,
    BandwidthEnergy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainCapabilities {
    pub message_types: Vec<MessageType>,
    pub signature_formats: Vec<SignatureFormat>,
    pub resource_model: ResourceModel,
    pub nonce_editable: bool,
    pub approval_editable: bool,
}

impl ChainCapabilities {
    pub fn for_implementation(tag: ImplementationTag) -> Self {
        match tag {
            ImplementationTag::Evm => Self {
                message_types: vec![
                    MessageType::Sign,
                    MessageType::PersonalSign,
                    MessageType::TypedDataV1,
                    MessageType::TypedDataV3,
                    MessageType::TypedDataV4,
                ],
                signature_formats: vec![SignatureFormat::Eip191],
                resource_model: ResourceModel::FeeOnly,
                nonce_editable: true,
                approval_editable: true,
            },
            ImplementationTag::Btc => Self {
                message_types: vec![MessageType::PersonalSign],
                signature_formats: vec![SignatureFormat::Bip137, SignatureFormat::Bip322],
                resource_model: ResourceModel::FeeOnly,
                nonce_editable: false,
                approval_editable: false,
            },
            ImplementationTag::Sol => Self {
                message_types: vec![MessageType::PersonalSign],
                signature_formats: vec![SignatureFormat::Ed25519],
                resource_model: ResourceModel::FeeOnly,
                nonce_editable: false,
                approval_editable: true,
            },
            ImplementationTag::Tron => Self {
                message_types: vec![MessageType::PersonalSign],
                signature_formats: Vec::new(),
                resource_model: ResourceModel::BandwidthEnergy,
                nonce_editable: false,
                approval_editable: true,
            },
            ImplementationTag::Cosmos => Self {
                message_types: Vec::new(),
                signature_formats: Vec::new(),
                resource_model: ResourceModel::FeeOnly,
                nonce_editable: false,
                approval_editable: false,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub id: NetworkId,
    pub name: String,
    pub implementation: ImplementationTag,
    pub chain_id: Option<u64>,
    pub native: NativeAsset,
    pub capabilities: ChainCapabilities,
}

impl NetworkInfo {
    pub fn new(
        id: &str,
        name: &str,
        implementation: ImplementationTag,
        chain_id: Option<u64>,
        symbol: &str,
        decimals: u8,
    ) -> Self {
        Self {
            id: NetworkId::new(id),
            name: name.to_string(),
            implementation,
            chain_id,
            native: NativeAsset {
                symbol: symbol.to_string(),
                decimals,
            },
            capabilities: ChainCapabilities::for_implementation(implementation),
        }
    }
}

/// Lookup table from network id to implementation and capabilities.
#[derive(Debug, Clone, Default)]
pub struct NetworkRegistry {
    networks: HashMap<NetworkId, NetworkInfo>,
    defaults: HashMap<ImplementationTag, NetworkId>,
}

impl NetworkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for info in [
            NetworkInfo::new("evm--1", "Ethereum", ImplementationTag::Evm, Some(1), "ETH", 18),
            NetworkInfo::new("evm--56", "BNB Smart Chain", ImplementationTag::Evm, Some(56), "BNB", 18),
            NetworkInfo::new("btc--0", "Bitcoin", ImplementationTag::Btc, None, "BTC", 8),
            NetworkInfo::new("sol--101", "Solana", ImplementationTag::Sol, None, "SOL", 9),
            NetworkInfo::new(
                "tron--0x2b6653dc",
                "Tron",
                ImplementationTag::Tron,
                Some(0x2b66_53dc),
                "TRX",
                6,
            ),
            NetworkInfo::new(
                "cosmos--cosmoshub-4",
                "Cosmos Hub",
                ImplementationTag::Cosmos,
                None,
                "ATOM",
                6,
            ),
        ] {
            registry.insert(info);
        }
        registry
    }

    /// Adds or replaces a network. The first network of each implementation
    /// becomes that implementation's default.
    pub fn insert(&mut self, info: NetworkInfo) {
        self.defaults
            .entry(info.implementation)
            .or_insert_with(|| info.id.clone());
        self.networks.insert(info.id.clone(), info);
    }

    pub fn get(&self, id: &NetworkId) -> Result<&NetworkInfo, PortError> {
        self.networks
            .get(id)
            .ok_or_else(|| PortError::NotFound(format!("unknown network {id}")))
    }

    /// Networks sorted by id.
    pub fn networks(&self) -> Vec<&NetworkInfo> {
        let mut networks: Vec<&NetworkInfo> = self.networks.values().collect();
        networks.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        networks
    }

    pub fn classify(&self, id: &NetworkId) -> Result<ImplementationTag, PortError> {
        self.get(id).map(|info| info.implementation)
    }

    pub fn default_network(&self, tag: ImplementationTag) -> Option<&NetworkInfo> {
        self.defaults.get(&tag).and_then(|id| self.networks.get(id))
    }

    pub fn validate_message(
        &self,
        message: &UnsignedMessage,
        network_id: &NetworkId,
        allow_eth_sign: bool,
    ) -> Result<(), PortError> {
        let info = self.get(network_id)?;
        message::validate_message(message, info, allow_eth_sign)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_known_and_unknown_networks() {
        let registry = NetworkRegistry::with_defaults();
        assert_eq!(
            registry.classify(&NetworkId::new("evm--1")).expect("evm"),
            ImplementationTag::Evm
        );
        assert_eq!(
            registry
                .classify(&NetworkId::new("tron--0x2b6653dc"))
                .expect("tron"),
            ImplementationTag::Tron
        );
        let err = registry
            .classify(&NetworkId::new("evm--999999"))
            .expect_err("unknown");
        assert!(matches!(err, PortError::NotFound(_)));
    }

    #[test]
    fn first_inserted_network_is_default() {
        let registry = NetworkRegistry::with_defaults();
        let evm = registry
            .default_network(ImplementationTag::Evm)
            .expect("default evm");
        assert_eq!(evm.id.as_str(), "evm--1");
    }
}
