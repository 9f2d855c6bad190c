use alloy::primitives::{eip191_hash_message, keccak256, Address};
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use sigconfirm_core::PortError;

use super::decode_hex;

/// Address that produced a 65-byte `r || s || v` personal-sign signature,
/// `None` when no key recovers. `v` may be 27/28 or 0/1.
pub fn recover_eip191_address(
    message: &[u8],
    signature: &str,
) -> Result<Option<Address>, PortError> {
    let bytes = decode_hex(signature.trim(), "signature")?;
    if bytes.len() != 65 {
        return Err(PortError::Validation(format!(
            "signature must be 65 bytes, got {}",
            bytes.len()
        )));
    }
    let v = match bytes[64] {
        v @ 27..=28 => v - 27,
        v @ 0..=1 => v,
        other => {
            return Err(PortError::Validation(format!(
                "invalid recovery byte {other}"
            )))
        }
    };
    let mut signature = Signature::from_slice(&bytes[..64])
        .map_err(|e| PortError::Validation(format!("invalid signature: {e}")))?;
    let mut recovery_id = RecoveryId::from_byte(v)
        .ok_or_else(|| PortError::Validation(format!("invalid recovery id {v}")))?;
    if let Some(normalized) = signature.normalize_s() {
        signature = normalized;
        recovery_id = RecoveryId::new(!recovery_id.is_y_odd(), recovery_id.is_x_reduced());
    }

    let hash = eip191_hash_message(message);
    Ok(
        VerifyingKey::recover_from_prehash(hash.as_slice(), &signature, recovery_id)
            .ok()
            .map(|key| address_of(&key)),
    )
}

pub(crate) fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let digest = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&digest[12..])
}

pub(super) fn verify_eip191(
    address: &str,
    message: &[u8],
    signature: &str,
) -> Result<bool, PortError> {
    let expected: Address = address
        .parse()
        .map_err(|e| PortError::Validation(format!("invalid address {address}: {e}")))?;
    Ok(recover_eip191_address(message, signature)? == Some(expected))
}
