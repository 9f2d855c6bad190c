use alloy::primitives::Address;
use bech32::{FromBase32, Variant};
use sigconfirm_core::ports::AddressValidatorPort;
use sigconfirm_core::{ImplementationTag, PortError};

pub(crate) const BTC_P2PKH_VERSION: u8 = 0x00;
pub(crate) const BTC_P2SH_VERSION: u8 = 0x05;
pub(crate) const BTC_HRP: &str = "bc";
const TRON_ADDRESS_PREFIX: u8 = 0x41;
const COSMOS_HRP: &str = "cosmos";

/// Offline address checks used for chain detection.
#[derive(Debug, Clone, Default)]
pub struct LocalAddressValidator;

impl AddressValidatorPort for LocalAddressValidator {
    fn is_valid(
        &self,
        implementation: ImplementationTag,
        address: &str,
    ) -> Result<bool, PortError> {
        let address = address.trim();
        Ok(match implementation {
            ImplementationTag::Evm => is_evm_address(address),
            ImplementationTag::Btc => is_btc_address(address),
            ImplementationTag::Sol => is_sol_address(address),
            ImplementationTag::Tron => is_tron_address(address),
            ImplementationTag::Cosmos => is_cosmos_address(address),
        })
    }
}

/// Mixed-case input must carry a valid EIP-55 checksum.
fn is_evm_address(address: &str) -> bool {
    let Some(hex) = address.strip_prefix("0x") else {
        return false;
    };
    if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return false;
    }
    let has_lower = hex.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = hex.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper {
        return Address::parse_checksummed(address, None).is_ok();
    }
    true
}

fn is_btc_address(address: &str) -> bool {
    if let Some(payload) = decode_base58check(address) {
        return payload.len() == 21
            && matches!(payload[0], BTC_P2PKH_VERSION | BTC_P2SH_VERSION);
    }
    decode_segwit(address).is_some()
}

fn is_sol_address(address: &str) -> bool {
    matches!(bs58::decode(address).into_vec(), Ok(bytes) if bytes.len() == 32)
}

fn is_tron_address(address: &str) -> bool {
    matches!(
        decode_base58check(address),
        Some(payload) if payload.len() == 21 && payload[0] == TRON_ADDRESS_PREFIX
    )
}

fn is_cosmos_address(address: &str) -> bool {
    let Ok((hrp, data, variant)) = bech32::decode(address) else {
        return false;
    };
    if hrp != COSMOS_HRP || variant != Variant::Bech32 {
        return false;
    }
    matches!(Vec::<u8>::from_base32(&data), Ok(bytes) if bytes.len() == 20 || bytes.len() == 32)
}

/// Version byte followed by the payload.
pub(crate) fn decode_base58check(address: &str) -> Option<Vec<u8>> {
    bs58::decode(address).with_check(None).into_vec().ok()
}

/// Witness version and program of a mainnet segwit address. Version 0 must be
/// bech32 and later versions bech32m (BIP-350).
pub(crate) fn decode_segwit(address: &str) -> Option<(u8, Vec<u8>)> {
    let (hrp, data, variant) = bech32::decode(address).ok()?;
    if hrp != BTC_HRP {
        return None;
    }
    let (version, program) = data.split_first()?;
    let version = version.to_u8();
    let program = Vec::<u8>::from_base32(program).ok()?;
    let variant_ok = match version {
        0 => variant == Variant::Bech32,
        1..=16 => variant == Variant::Bech32m,
        _ => false,
    };
    let length_ok = match version {
        0 => program.len() == 20 || program.len() == 32,
        _ => (2..=40).contains(&program.len()),
    };
    (variant_ok && length_ok).then_some((version, program))
}
