//! Signature checks behind the verification twin flow. Malformed input is a
//! validation error; a well-formed signature that does not match is
//! `Ok(false)`.

mod btc;
mod evm;
mod sol;

use sigconfirm_core::ports::MessageVerifierPort;
use sigconfirm_core::{ImplementationTag, PortError, SignatureFormat};

pub use btc::{bip137_message_hash, bip322_message_hash, p2wpkh_address};
pub use evm::recover_eip191_address;

#[derive(Debug, Clone, Default)]
pub struct SignatureVerifier;

impl MessageVerifierPort for SignatureVerifier {
    fn verify(
        &self,
        implementation: ImplementationTag,
        address: &str,
        message: &[u8],
        signature: &str,
        format: SignatureFormat,
    ) -> Result<bool, PortError> {
        match (implementation, format) {
            (ImplementationTag::Evm, SignatureFormat::Eip191) => {
                evm::verify_eip191(address, message, signature)
            }
            (ImplementationTag::Btc, SignatureFormat::Bip137) => {
                btc::verify_bip137(address, message, signature)
            }
            (ImplementationTag::Btc, SignatureFormat::Bip322) => {
                btc::verify_bip322(address, message, signature)
            }
            (ImplementationTag::Sol, SignatureFormat::Ed25519) => {
                sol::verify_ed25519(address, message, signature)
            }
            (tag, format) => Err(PortError::Validation(format!(
                "{format:?} signatures are not supported for {tag}"
            ))),
        }
    }
}

pub(crate) fn decode_hex(value: &str, what: &str) -> Result<Vec<u8>, PortError> {
    let value = value.strip_prefix("0x").unwrap_or(value);
    alloy::primitives::hex::decode(value)
        .map_err(|e| PortError::Validation(format!("{what} is not valid hex: {e}")))
}
