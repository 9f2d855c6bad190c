use alloy::primitives::U256;

use super::{DecodeEngine, EntryDecode};
use crate::display::{Alert, AlertSeverity, AlertSource, DisplayComponent, TokenRef};
use crate::domain::{SolInstruction, SolTx};
use crate::network::NetworkInfo;
use crate::ports::{ContractMetadata, PricePort, TokenMetadataPort};

pub const SYSTEM_PROGRAM: &str = "11111111111111111111111111111111";
pub const SPL_TOKEN_PROGRAM: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

const SYSTEM_TRANSFER: u32 = 2;
const SPL_TRANSFER: u8 = 3;
pub(crate) const SPL_APPROVE: u8 = 4;
const SPL_TRANSFER_CHECKED: u8 = 12;
pub(crate) const SPL_APPROVE_CHECKED: u8 = 13;

fn read_u64(data: &[u8], offset: usize) -> Option<u64> {
    data.get(offset..offset + 8)
        .and_then(|bytes| <[u8; 8]>::try_from(bytes).ok())
        .map(u64::from_le_bytes)
}

pub(crate) fn decode_sol<M, P>(
    engine: &DecodeEngine<'_, M, P>,
    tx: &SolTx,
    network: &NetworkInfo,
) -> EntryDecode
where
    M: TokenMetadataPort,
    P: PricePort,
{
    let mut components = Vec::new();
    let mut native_amount = U256::ZERO;

    for instruction in &tx.instructions {
        let decoded = match instruction.program_id.as_str() {
            SYSTEM_PROGRAM => decode_system(engine, instruction, network, &mut native_amount),
            SPL_TOKEN_PROGRAM => decode_spl(engine, instruction, network),
            _ => Some(vec![contract_call(instruction)]),
        };
        match decoded {
            Some(decoded) => components.extend(decoded),
            None => {
                components.push(contract_call(instruction));
                components.push(DisplayComponent::Alert(Alert::new(
                    AlertSeverity::Warning,
                    AlertSource::Decode,
                    format!("malformed {} instruction", instruction.program_id),
                )));
            }
        }
    }

    EntryDecode {
        components,
        native_amount,
    }
}

fn contract_call(instruction: &SolInstruction) -> DisplayComponent {
    DisplayComponent::ContractCall {
        to: Some(instruction.program_id.clone()),
        selector: instruction.data.first().map(|tag| format!("0x{tag:02x}")),
    }
}

fn decode_system<M, P>(
    engine: &DecodeEngine<'_, M, P>,
    instruction: &SolInstruction,
    network: &NetworkInfo,
    native_amount: &mut U256,
) -> Option<Vec<DisplayComponent>>
where
    M: TokenMetadataPort,
    P: PricePort,
{
    let tag = instruction
        .data
        .get(..4)
        .and_then(|bytes| <[u8; 4]>::try_from(bytes).ok())
        .map(u32::from_le_bytes)?;
    if tag != SYSTEM_TRANSFER {
        return Some(vec![contract_call(instruction)]);
    }
    let lamports = read_u64(&instruction.data, 4)?;
    let to = instruction.accounts.get(1)?;
    *native_amount = native_amount.saturating_add(U256::from(lamports));
    Some(vec![engine.token_component(
        "Send",
        Some(to.clone()),
        U256::from(lamports),
        engine.native_token(network),
        network,
    )])
}

fn decode_spl<M, P>(
    engine: &DecodeEngine<'_, M, P>,
    instruction: &SolInstruction,
    network: &NetworkInfo,
) -> Option<Vec<DisplayComponent>>
where
    M: TokenMetadataPort,
    P: PricePort,
{
    let data = &instruction.data;
    let accounts = &instruction.accounts;
    let components = match *data.first()? {
        SPL_TRANSFER => {
            let amount = read_u64(data, 1)?;
            let source = accounts.first()?;
            let destination = accounts.get(1)?;
            vec![engine.token_component(
                "Send",
                Some(destination.clone()),
                U256::from(amount),
                TokenRef::unknown(source.clone()),
                network,
            )]
        }
        SPL_TRANSFER_CHECKED => {
            let amount = read_u64(data, 1)?;
            let decimals = *data.get(9)?;
            let mint = accounts.get(1)?;
            let destination = accounts.get(2)?;
            let (token, alert) = mint_token(engine, network, mint, decimals);
            let mut components = vec![engine.token_component(
                "Send",
                Some(destination.clone()),
                U256::from(amount),
                token,
                network,
            )];
            components.extend(alert.map(DisplayComponent::Alert));
            components
        }
        SPL_APPROVE => {
            let amount = read_u64(data, 1)?;
            let source = accounts.first()?;
            let delegate = accounts.get(1)?;
            engine.approval_components(
                TokenRef::unknown(source.clone()),
                delegate.clone(),
                U256::from(amount),
                amount == u64::MAX,
                network,
            )
        }
        SPL_APPROVE_CHECKED => {
            let amount = read_u64(data, 1)?;
            let decimals = *data.get(9)?;
            let mint = accounts.get(1)?;
            let delegate = accounts.get(2)?;
            let (token, alert) = mint_token(engine, network, mint, decimals);
            let mut components = engine.approval_components(
                token,
                delegate.clone(),
                U256::from(amount),
                amount == u64::MAX,
                network,
            );
            components.extend(alert.map(DisplayComponent::Alert));
            components
        }
        _ => vec![contract_call(instruction)],
    };
    Some(components)
}

/// Instruction-declared decimals win over metadata.
fn mint_token<M, P>(
    engine: &DecodeEngine<'_, M, P>,
    network: &NetworkInfo,
    mint: &str,
    decimals: u8,
) -> (TokenRef, Option<Alert>)
where
    M: TokenMetadataPort,
    P: PricePort,
{
    let (metadata, alert) = engine.lookup(network, mint);
    let mut token = match metadata {
        ContractMetadata::Token(token) => token,
        _ => TokenRef::unknown(mint),
    };
    token.decimals = Some(decimals);
    (token, alert)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_u64_little_endian() {
        let mut data = vec![2, 0, 0, 0];
        data.extend_from_slice(&1_500_000_000u64.to_le_bytes());
        assert_eq!(read_u64(&data, 4), Some(1_500_000_000));
        assert_eq!(read_u64(&data, 5), None);
    }
}
