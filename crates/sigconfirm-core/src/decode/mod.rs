//! Canonical decode engine: unsigned intents to a [`DecodedDisplayTree`].
//!
//! Decoding never fails. Anything the engine cannot interpret becomes an
//! [`Alert`] component so the session stays usable and the caller may retry.

pub mod btc;
pub mod calldata;
pub mod evm;
pub mod sol;
pub mod tron;

use std::sync::Arc;

use alloy::primitives::U256;
use tracing::{error, warn};

use crate::display::{
    Alert, AlertSeverity, AlertSource, ApprovalComponent, DecodedDisplayTree, DecodedEntry,
    Derived, DisplayComponent, ExtraInfo, TokenRef,
};
use crate::domain::{AccountContext, EncodedTx, ImplementationTag, UnsignedIntent, UnsignedTransaction};
use crate::fee::{fiat_value, format_amount};
use crate::network::NetworkInfo;
use crate::ports::{ContractMetadata, PricePort, TokenMetadataPort};

pub const UNLIMITED_LABEL: &str = "Unlimited";

pub(crate) struct EntryDecode {
    pub components: Vec<DisplayComponent>,
    pub native_amount: U256,
}

pub struct DecodeEngine<'a, M, P> {
    metadata: &'a M,
    prices: &'a P,
}

impl<'a, M, P> DecodeEngine<'a, M, P>
where
    M: TokenMetadataPort,
    P: PricePort,
{
    pub fn new(metadata: &'a M, prices: &'a P) -> Self {
        Self { metadata, prices }
    }

    pub fn decode(
        &self,
        intents: &[Arc<UnsignedIntent>],
        network: &NetworkInfo,
        account: &AccountContext,
    ) -> DecodedDisplayTree {
        let mut header = vec![
            DisplayComponent::Network {
                network_id: network.id.clone(),
                name: network.name.clone(),
            },
            DisplayComponent::Address {
                label: "Account".to_string(),
                address: account.address.clone(),
            },
        ];
        if intents.is_empty() {
            header.push(DisplayComponent::Alert(Alert::new(
                AlertSeverity::Critical,
                AlertSource::Decode,
                "request contains nothing to sign",
            )));
        }

        let entries: Vec<DecodedEntry> = intents
            .iter()
            .enumerate()
            .map(|(index, intent)| self.decode_intent(index, intent, network))
            .collect();

        let transaction_count = intents
            .iter()
            .filter(|intent| intent.as_transaction().is_some())
            .count();
        let summary = if transaction_count > 1 {
            aggregate_assets(&entries, network)
        } else {
            Vec::new()
        };

        DecodedDisplayTree {
            title: derive_title(&entries),
            header,
            entries,
            summary,
        }
    }

    fn decode_intent(
        &self,
        index: usize,
        intent: &UnsignedIntent,
        network: &NetworkInfo,
    ) -> DecodedEntry {
        let tx = match intent {
            UnsignedIntent::Message(message) => {
                return DecodedEntry {
                    intent_index: index,
                    components: vec![DisplayComponent::Message {
                        message_type: message.message_type,
                        content: message.message.clone(),
                    }],
                    native_amount: U256::ZERO,
                }
            }
            UnsignedIntent::Transaction(tx) => tx,
        };

        if let Some(tag) = tx
            .encoded
            .implementation()
            .filter(|tag| *tag != network.implementation)
        {
            error!(
                network = %network.id,
                intent_index = index,
                intent_implementation = %tag,
                "intent does not match network implementation"
            );
            return DecodedEntry {
                intent_index: index,
                components: vec![DisplayComponent::Alert(Alert::new(
                    AlertSeverity::Critical,
                    AlertSource::Decode,
                    format!("{tag} transaction cannot be signed on {}", network.name),
                ))],
                native_amount: U256::ZERO,
            };
        }

        let mut decoded = match &tx.encoded {
            EncodedTx::Evm(evm) => evm::decode_evm(self, evm, network),
            EncodedTx::Btc(btc) => btc::decode_btc(self, btc, network),
            EncodedTx::Sol(sol) => sol::decode_sol(self, sol, network),
            EncodedTx::Tron(tron) => tron::decode_tron(self, tron, network),
            EncodedTx::Opaque { bytes } => EntryDecode {
                components: vec![DisplayComponent::Raw {
                    byte_len: bytes.len(),
                }],
                native_amount: U256::ZERO,
            },
        };
        if let Some(extra) = extra_info(network.implementation, tx) {
            decoded.components.push(DisplayComponent::ExtraInfo(extra));
        }

        DecodedEntry {
            intent_index: index,
            components: decoded.components,
            native_amount: decoded.native_amount,
        }
    }

    pub(crate) fn native_token(&self, network: &NetworkInfo) -> TokenRef {
        TokenRef::native(network.native.symbol.clone(), network.native.decimals)
    }

    /// Metadata lookup that degrades to `Unknown` plus an informational alert.
    pub(crate) fn lookup(
        &self,
        network: &NetworkInfo,
        contract: &str,
    ) -> (ContractMetadata, Option<Alert>) {
        match self.metadata.contract_metadata(&network.id, contract) {
            Ok(ContractMetadata::Unknown) => (
                ContractMetadata::Unknown,
                Some(Alert::new(
                    AlertSeverity::Info,
                    AlertSource::Decode,
                    format!("unrecognised contract {contract}"),
                )),
            ),
            Ok(metadata) => (metadata, None),
            Err(e) => {
                warn!(network = %network.id, contract, error = %e, "token metadata lookup failed");
                (
                    ContractMetadata::Unknown,
                    Some(Alert::new(
                        AlertSeverity::Info,
                        AlertSource::Decode,
                        format!("metadata for {contract} is unavailable"),
                    )),
                )
            }
        }
    }

    pub(crate) fn token_component(
        &self,
        label: &str,
        to: Option<String>,
        amount: U256,
        token: TokenRef,
        network: &NetworkInfo,
    ) -> DisplayComponent {
        let amount_parsed = parse_display_amount(amount, token.decimals);
        let fiat = token
            .decimals
            .and_then(|_| {
                self.prices
                    .price_usd(&network.id, token.address.as_deref())
                    .ok()
                    .flatten()
            })
            .and_then(|price| fiat_value(&amount_parsed, price))
            .map(|value| format!("${value:.2}"));

        DisplayComponent::Token {
            label: label.to_string(),
            to,
            amount_raw: amount,
            amount_parsed,
            token,
            network_id: network.id.clone(),
            show_network: false,
            fiat: Derived(fiat),
        }
    }

    pub(crate) fn approval_components(
        &self,
        token: TokenRef,
        spender: String,
        amount: U256,
        is_infinite_amount: bool,
        network: &NetworkInfo,
    ) -> Vec<DisplayComponent> {
        let amount_parsed = if is_infinite_amount {
            UNLIMITED_LABEL.to_string()
        } else {
            parse_display_amount(amount, token.decimals)
        };
        let editable = network.capabilities.approval_editable && token.decimals.is_some();
        let alert = is_infinite_amount.then(|| {
            DisplayComponent::Alert(Alert::new(
                AlertSeverity::Warning,
                AlertSource::ChainCheck,
                format!("unlimited {} allowance granted to {spender}", token.symbol),
            ))
        });
        let approval = DisplayComponent::TokenApproval(ApprovalComponent {
            label: "Approve".to_string(),
            token,
            spender,
            amount_raw: amount,
            amount_parsed,
            is_infinite_amount,
            editable,
        });
        std::iter::once(approval).chain(alert).collect()
    }
}

pub(crate) fn parse_display_amount(amount: U256, decimals: Option<u8>) -> String {
    decimals
        .and_then(|decimals| format_amount(amount, decimals).ok())
        .unwrap_or_else(|| amount.to_string())
}

/// Selects the single extra-info renderer for the network's implementation.
fn extra_info(tag: ImplementationTag, tx: &UnsignedTransaction) -> Option<ExtraInfo> {
    match (tag, &tx.encoded) {
        (ImplementationTag::Evm, EncodedTx::Evm(evm)) => Some(ExtraInfo::Evm {
            chain_id: evm.chain_id,
            nonce: tx.nonce,
            data_size: evm.data.len(),
        }),
        (ImplementationTag::Btc, EncodedTx::Btc(btc)) => Some(btc::extra_info(btc)),
        (ImplementationTag::Sol, EncodedTx::Sol(sol)) => Some(ExtraInfo::Sol {
            fee_payer: sol.fee_payer.clone(),
            recent_blockhash: sol.recent_blockhash.clone(),
            instruction_count: sol.instructions.len(),
        }),
        (ImplementationTag::Tron, EncodedTx::Tron(tron)) => Some(tron::extra_info(tron)),
        _ => None,
    }
}

fn derive_title(entries: &[DecodedEntry]) -> String {
    let first_action = entries
        .iter()
        .flat_map(|entry| entry.components.iter())
        .find_map(|component| match component {
            DisplayComponent::Token { .. } | DisplayComponent::Nft { .. } => Some("Send"),
            DisplayComponent::TokenApproval(_) | DisplayComponent::NftApproval { .. } => {
                Some("Approve")
            }
            DisplayComponent::Message { .. } => Some("Sign message"),
            DisplayComponent::ContractCall { .. } | DisplayComponent::Raw { .. } => {
                Some("Contract interaction")
            }
            _ => None,
        });
    first_action.unwrap_or("Contract interaction").to_string()
}

struct AssetTotal {
    key: Option<String>,
    symbol: String,
    decimals: Option<u8>,
    icon: Option<String>,
    is_nft: bool,
    amount: U256,
}

fn aggregate_assets(entries: &[DecodedEntry], network: &NetworkInfo) -> Vec<DisplayComponent> {
    let mut totals: Vec<AssetTotal> = Vec::new();
    let mut add = |key: Option<String>,
                   symbol: &str,
                   decimals: Option<u8>,
                   icon: Option<String>,
                   is_nft: bool,
                   amount: U256| {
        match totals
            .iter_mut()
            .find(|total| total.key == key && total.is_nft == is_nft)
        {
            Some(total) => total.amount = total.amount.saturating_add(amount),
            None => totals.push(AssetTotal {
                key,
                symbol: symbol.to_string(),
                decimals,
                icon,
                is_nft,
                amount,
            }),
        }
    };

    for component in entries.iter().flat_map(|entry| entry.components.iter()) {
        match component {
            DisplayComponent::Token {
                token, amount_raw, ..
            } => add(
                token.address.clone(),
                &token.symbol,
                token.decimals,
                token.icon.clone(),
                false,
                *amount_raw,
            ),
            DisplayComponent::Nft { nft, amount, .. } => add(
                Some(nft.contract.clone()),
                nft.name.as_deref().unwrap_or(&nft.contract),
                Some(0),
                None,
                true,
                *amount,
            ),
            _ => {}
        }
    }

    totals
        .into_iter()
        .map(|total| DisplayComponent::Assets {
            symbol: total.symbol,
            amount_parsed: parse_display_amount(total.amount, total.decimals),
            icon: total.icon,
            is_nft: total.is_nft,
            network_id: network.id.clone(),
        })
        .collect()
}
