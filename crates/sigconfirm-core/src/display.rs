//! Canonical display model produced by the decode engine.

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

use crate::domain::{MessageType, NetworkId};

/// Value derived from live lookups (prices). Ignored by equality so that two
/// decodes of the same intents compare equal regardless of market moves.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Derived<T>(pub Option<T>);

impl<T> Derived<T> {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn get(&self) -> Option<&T> {
        self.0.as_ref()
    }
}

impl<T> PartialEq for Derived<T> {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl<T> Eq for Derived<T> {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertSource {
    Decode,
    HostSecurity,
    ChainCheck,
    Fee,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Alert {
    pub severity: AlertSeverity,
    pub source: AlertSource,
    pub message: String,
}

impl Alert {
    pub fn new(severity: AlertSeverity, source: AlertSource, message: impl Into<String>) -> Self {
        Self {
            severity,
            source,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRef {
    /// Contract or mint address; `None` for the native asset.
    pub address: Option<String>,
    pub symbol: String,
    pub decimals: Option<u8>,
    pub name: Option<String>,
    pub icon: Option<String>,
}

impl TokenRef {
    pub fn native(symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            address: None,
            symbol: symbol.into(),
            decimals: Some(decimals),
            name: None,
            icon: None,
        }
    }

    pub fn unknown(address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            symbol: "UNKNOWN".to_string(),
            decimals: None,
            name: None,
            icon: None,
        }
    }

    pub fn is_native(&self) -> bool {
        self.address.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NftStandard {
    Erc721,
    Erc1155,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NftRef {
    pub contract: String,
    pub token_id: U256,
    pub standard: NftStandard,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalComponent {
    pub label: String,
    pub token: TokenRef,
    pub spender: String,
    pub amount_raw: U256,
    pub amount_parsed: String,
    pub is_infinite_amount: bool,
    pub editable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtraInfo {
    Evm {
        chain_id: u64,
        nonce: Option<u64>,
        data_size: usize,
    },
    Btc {
        input_count: usize,
        output_count: usize,
        change_value: u64,
        vsize: u64,
    },
    Sol {
        fee_payer: String,
        recent_blockhash: String,
        instruction_count: usize,
    },
    Tron {
        contract_type: String,
        fee_limit: Option<u64>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplayComponent {
    Network {
        network_id: NetworkId,
        name: String,
    },
    Address {
        label: String,
        address: String,
    },
    Token {
        label: String,
        to: Option<String>,
        amount_raw: U256,
        amount_parsed: String,
        token: TokenRef,
        network_id: NetworkId,
        show_network: bool,
        fiat: Derived<String>,
    },
    TokenApproval(ApprovalComponent),
    Nft {
        label: String,
        to: String,
        nft: NftRef,
        amount: U256,
    },
    NftApproval {
        contract: String,
        operator: String,
        token_id: Option<U256>,
        approved: bool,
    },
    Assets {
        symbol: String,
        amount_parsed: String,
        icon: Option<String>,
        is_nft: bool,
        network_id: NetworkId,
    },
    ContractCall {
        to: Option<String>,
        selector: Option<String>,
    },
    Message {
        message_type: MessageType,
        content: String,
    },
    Raw {
        byte_len: usize,
    },
    ExtraInfo(ExtraInfo),
    Alert(Alert),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedEntry {
    pub intent_index: usize,
    pub components: Vec<DisplayComponent>,
    /// Native value leaving the account, in the smallest unit.
    pub native_amount: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedDisplayTree {
    pub title: String,
    pub header: Vec<DisplayComponent>,
    pub entries: Vec<DecodedEntry>,
    pub summary: Vec<DisplayComponent>,
}

impl DecodedDisplayTree {
    pub fn components(&self) -> impl Iterator<Item = &DisplayComponent> {
        self.header
            .iter()
            .chain(self.entries.iter().flat_map(|entry| entry.components.iter()))
            .chain(self.summary.iter())
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.components()
            .filter_map(|component| match component {
                DisplayComponent::Alert(alert) => Some(alert.clone()),
                _ => None,
            })
            .collect()
    }

    /// First token approval together with the index of the intent it decodes.
    pub fn first_approval(&self) -> Option<(usize, &ApprovalComponent)> {
        self.entries.iter().find_map(|entry| {
            entry.components.iter().find_map(|component| match component {
                DisplayComponent::TokenApproval(approval) => Some((entry.intent_index, approval)),
                _ => None,
            })
        })
    }

    pub fn native_total(&self) -> U256 {
        self.entries
            .iter()
            .fold(U256::ZERO, |acc, entry| acc.saturating_add(entry.native_amount))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_values_do_not_affect_equality() {
        let a = DisplayComponent::Token {
            label: "Send".into(),
            to: None,
            amount_raw: U256::from(1u64),
            amount_parsed: "1".into(),
            token: TokenRef::native("ETH", 18),
            network_id: NetworkId::new("evm--1"),
            show_network: false,
            fiat: Derived(Some("$1.00".into())),
        };
        let mut b = a.clone();
        if let DisplayComponent::Token { fiat, .. } = &mut b {
            *fiat = Derived(Some("$2.00".into()));
        }
        assert_eq!(a, b);
    }
}
