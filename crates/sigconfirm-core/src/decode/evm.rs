use alloy::primitives::{Address, U256};

use super::calldata::{self, CallAction};
use super::{DecodeEngine, EntryDecode};
use crate::display::{
    Alert, AlertSeverity, AlertSource, DisplayComponent, NftRef, NftStandard, TokenRef,
};
use crate::domain::EvmTx;
use crate::network::NetworkInfo;
use crate::ports::{ContractMetadata, PricePort, TokenMetadataPort};

pub(crate) fn decode_evm<M, P>(
    engine: &DecodeEngine<'_, M, P>,
    tx: &EvmTx,
    network: &NetworkInfo,
) -> EntryDecode
where
    M: TokenMetadataPort,
    P: PricePort,
{
    let mut components = Vec::new();
    if network.chain_id != Some(tx.chain_id) {
        components.push(DisplayComponent::Alert(Alert::new(
            AlertSeverity::Critical,
            AlertSource::ChainCheck,
            format!(
                "transaction chain id {} does not match {}",
                tx.chain_id, network.name
            ),
        )));
    }

    let Some(to) = tx.to else {
        components.push(DisplayComponent::ContractCall {
            to: None,
            selector: None,
        });
        return EntryDecode {
            components,
            native_amount: tx.value,
        };
    };

    let to_display = to.to_checksum(None);
    if !tx.value.is_zero() || tx.data.is_empty() {
        components.push(engine.token_component(
            "Send",
            Some(to_display.clone()),
            tx.value,
            engine.native_token(network),
            network,
        ));
    }
    if !tx.data.is_empty() {
        components.extend(decode_call(
            engine,
            &to_display,
            calldata::parse_call(&tx.data),
            network,
            |address| address.to_checksum(None),
        ));
    }

    EntryDecode {
        components,
        native_amount: tx.value,
    }
}

/// Renders a recognised call against `contract`. `format_address` renders
/// 20-byte arguments in the network's address format.
pub(crate) fn decode_call<M, P, F>(
    engine: &DecodeEngine<'_, M, P>,
    contract: &str,
    action: CallAction,
    network: &NetworkInfo,
    format_address: F,
) -> Vec<DisplayComponent>
where
    M: TokenMetadataPort,
    P: PricePort,
    F: Fn(&Address) -> String,
{
    if let CallAction::Unknown { selector } = action {
        return vec![DisplayComponent::ContractCall {
            to: Some(contract.to_string()),
            selector: selector.map(calldata::selector_hex),
        }];
    }

    let (metadata, lookup_alert) = engine.lookup(network, contract);
    let mut components = Vec::new();

    let nft = |token_id: U256, standard: NftStandard| NftRef {
        contract: contract.to_string(),
        token_id,
        standard,
        name: match &metadata {
            ContractMetadata::Nft { name, .. } => name.clone(),
            _ => None,
        },
    };
    let token = || match &metadata {
        ContractMetadata::Token(token) => token.clone(),
        _ => TokenRef::unknown(contract),
    };

    match &action {
        CallAction::Transfer { to, amount } => {
            components.push(engine.token_component(
                "Send",
                Some(format_address(to)),
                *amount,
                token(),
                network,
            ));
        }
        CallAction::Approve { spender, amount } => match &metadata {
            ContractMetadata::Nft { .. } => components.push(DisplayComponent::NftApproval {
                contract: contract.to_string(),
                operator: format_address(spender),
                token_id: Some(*amount),
                approved: true,
            }),
            _ => components.extend(engine.approval_components(
                token(),
                format_address(spender),
                *amount,
                *amount == U256::MAX,
                network,
            )),
        },
        CallAction::TransferFrom { to, amount, .. } => match &metadata {
            ContractMetadata::Nft { standard, .. } => components.push(DisplayComponent::Nft {
                label: "Send".to_string(),
                to: format_address(to),
                nft: nft(*amount, *standard),
                amount: U256::from(1u64),
            }),
            _ => components.push(engine.token_component(
                "Send",
                Some(format_address(to)),
                *amount,
                token(),
                network,
            )),
        },
        CallAction::NftSafeTransfer { to, token_id, .. } => {
            components.push(DisplayComponent::Nft {
                label: "Send".to_string(),
                to: format_address(to),
                nft: nft(*token_id, NftStandard::Erc721),
                amount: U256::from(1u64),
            });
        }
        CallAction::MultiTokenTransfer { to, id, amount, .. } => {
            components.push(DisplayComponent::Nft {
                label: "Send".to_string(),
                to: format_address(to),
                nft: nft(*id, NftStandard::Erc1155),
                amount: *amount,
            });
        }
        CallAction::SetApprovalForAll { operator, approved } => {
            let operator = format_address(operator);
            let alert = approved.then(|| {
                Alert::new(
                    AlertSeverity::Warning,
                    AlertSource::ChainCheck,
                    format!("{operator} may transfer every NFT of {contract}"),
                )
            });
            components.push(DisplayComponent::NftApproval {
                contract: contract.to_string(),
                operator,
                token_id: None,
                approved: *approved,
            });
            components.extend(alert.map(DisplayComponent::Alert));
        }
        CallAction::Unknown { .. } => {}
    }

    components.extend(lookup_alert.map(DisplayComponent::Alert));
    components
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, Bytes};
    use std::sync::Arc;

    use crate::domain::{
        AccountContext, AccountId, EncodedTx, NetworkId, UnsignedIntent, UnsignedTransaction,
    };
    use crate::network::NetworkRegistry;
    use crate::ports::PortError;

    const USDC: Address = address!("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");
    const SPENDER: Address = address!("1111111111111111111111111111111111111111");

    struct Metadata;

    impl TokenMetadataPort for Metadata {
        fn contract_metadata(
            &self,
            _network: &NetworkId,
            contract: &str,
        ) -> Result<ContractMetadata, PortError> {
            if contract.eq_ignore_ascii_case(&USDC.to_checksum(None)) {
                Ok(ContractMetadata::Token(TokenRef {
                    address: Some(contract.to_string()),
                    symbol: "USDC".into(),
                    decimals: Some(6),
                    name: Some("USD Coin".into()),
                    icon: None,
                }))
            } else {
                Ok(ContractMetadata::Nft {
                    name: Some("Punks".into()),
                    standard: NftStandard::Erc721,
                })
            }
        }
    }

    struct Prices;

    impl PricePort for Prices {
        fn price_usd(
            &self,
            _network: &NetworkId,
            _token: Option<&str>,
        ) -> Result<Option<f64>, PortError> {
            Ok(Some(1.0))
        }
    }

    fn decode(data: Vec<u8>, to: Address) -> Vec<DisplayComponent> {
        let registry = NetworkRegistry::with_defaults();
        let network = registry.get(&NetworkId::new("evm--1")).expect("network");
        let intent = Arc::new(UnsignedIntent::Transaction(UnsignedTransaction::new(
            EncodedTx::Evm(EvmTx {
                from: Address::ZERO,
                to: Some(to),
                value: U256::ZERO,
                data: Bytes::from(data),
                chain_id: 1,
            }),
        )));
        let account = AccountContext {
            id: AccountId::new("acc-1"),
            address: Address::ZERO.to_checksum(None),
        };
        let tree = DecodeEngine::new(&Metadata, &Prices).decode(&[intent], network, &account);
        tree.entries[0].components.clone()
    }

    #[test]
    fn unlimited_erc20_approval_raises_warning() {
        let components = decode(calldata::encode_approve(SPENDER, U256::MAX), USDC);
        let DisplayComponent::TokenApproval(approval) = &components[0] else {
            panic!("expected approval, got {components:?}");
        };
        assert!(approval.is_infinite_amount);
        assert!(approval.editable);
        assert_eq!(approval.token.symbol, "USDC");
        assert!(components.iter().any(|c| matches!(
            c,
            DisplayComponent::Alert(Alert {
                severity: AlertSeverity::Warning,
                ..
            })
        )));
    }

    #[test]
    fn transfer_from_on_nft_contract_is_nft_send() {
        let nft_contract = address!("b47e3cd837ddf8e4c57f05d70ab865de6e193bbb");
        let data = calldata::encode_transfer_from(Address::ZERO, SPENDER, U256::from(42u64));
        let components = decode(data, nft_contract);
        assert!(matches!(
            &components[0],
            DisplayComponent::Nft { nft, .. } if nft.token_id == U256::from(42u64)
        ));
    }

    #[test]
    fn unknown_selector_renders_contract_call() {
        let components = decode(vec![0xde, 0xad, 0xbe, 0xef, 0x00], USDC);
        assert_eq!(
            components[0],
            DisplayComponent::ContractCall {
                to: Some(USDC.to_checksum(None)),
                selector: Some("0xdeadbeef".into())
            }
        );
    }
}
