use alloy::primitives::{Address, U256};

use super::calldata;
use super::evm::decode_call;
use super::{DecodeEngine, EntryDecode};
use crate::display::ExtraInfo;
use crate::domain::{TronContract, TronTx};
use crate::network::NetworkInfo;
use crate::ports::{PricePort, TokenMetadataPort};

const TRON_ADDRESS_PREFIX: u8 = 0x41;

/// Base58check form (`T...`) of a 20-byte account.
pub fn tron_address(address: &Address) -> String {
    let mut payload = Vec::with_capacity(21);
    payload.push(TRON_ADDRESS_PREFIX);
    payload.extend_from_slice(address.as_slice());
    bs58::encode(payload).with_check().into_string()
}

pub(crate) fn decode_tron<M, P>(
    engine: &DecodeEngine<'_, M, P>,
    tx: &TronTx,
    network: &NetworkInfo,
) -> EntryDecode
where
    M: TokenMetadataPort,
    P: PricePort,
{
    match &tx.contract {
        TronContract::Transfer { to_address, amount } => EntryDecode {
            components: vec![engine.token_component(
                "Send",
                Some(to_address.clone()),
                U256::from(*amount),
                engine.native_token(network),
                network,
            )],
            native_amount: U256::from(*amount),
        },
        TronContract::TriggerSmartContract {
            contract_address,
            call_value,
            data,
        } => {
            let mut components = Vec::new();
            if *call_value > 0 {
                components.push(engine.token_component(
                    "Send",
                    Some(contract_address.clone()),
                    U256::from(*call_value),
                    engine.native_token(network),
                    network,
                ));
            }
            components.extend(decode_call(
                engine,
                contract_address,
                calldata::parse_call(data),
                network,
                tron_address,
            ));
            EntryDecode {
                components,
                native_amount: U256::from(*call_value),
            }
        }
    }
}

pub(crate) fn extra_info(tx: &TronTx) -> ExtraInfo {
    let contract_type = match tx.contract {
        TronContract::Transfer { .. } => "TransferContract",
        TronContract::TriggerSmartContract { .. } => "TriggerSmartContract",
    };
    ExtraInfo::Tron {
        contract_type: contract_type.to_string(),
        fee_limit: tx.fee_limit,
    }
}
