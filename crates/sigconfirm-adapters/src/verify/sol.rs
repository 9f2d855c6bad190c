use ed25519_dalek::{Signature, VerifyingKey};
use sigconfirm_core::PortError;

use super::decode_hex;

/// Signature may be base58 (wallet default) or `0x` hex.
pub(super) fn verify_ed25519(
    address: &str,
    message: &[u8],
    signature: &str,
) -> Result<bool, PortError> {
    let key: [u8; 32] = bs58::decode(address)
        .into_vec()
        .map_err(|e| PortError::Validation(format!("invalid address {address}: {e}")))?
        .try_into()
        .map_err(|_| PortError::Validation("address must decode to 32 bytes".to_owned()))?;
    let key = VerifyingKey::from_bytes(&key)
        .map_err(|e| PortError::Validation(format!("invalid public key: {e}")))?;

    let signature = signature.trim();
    let raw = if signature.starts_with("0x") {
        decode_hex(signature, "signature")?
    } else {
        bs58::decode(signature)
            .into_vec()
            .map_err(|e| PortError::Validation(format!("invalid signature encoding: {e}")))?
    };
    let raw: [u8; 64] = raw
        .try_into()
        .map_err(|_| PortError::Validation("signature must be 64 bytes".to_owned()))?;
    let signature = Signature::from_bytes(&raw);
    Ok(key.verify_strict(message, &signature).is_ok())
}
