//! Read-only counterpart of the confirmation flow: check a signature against
//! a message and an address, detecting the address's chain family.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{ImplementationTag, NetworkId};
use crate::network::NetworkRegistry;
use crate::ports::{AddressValidatorPort, MessageVerifierPort, PortError};

/// Tie-break order for addresses that validate under several families.
pub const DETECTION_ORDER: [ImplementationTag; 3] = [
    ImplementationTag::Btc,
    ImplementationTag::Evm,
    ImplementationTag::Sol,
];

pub const MIN_DETECTABLE_ADDRESS_LEN: usize = 8;
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureFormat {
    /// Legacy "Bitcoin Signed Message" compact signature.
    Bip137,
    /// Generic signed message format (simple variant).
    Bip322,
    Eip191,
    Ed25519,
}

impl SignatureFormat {
    pub fn parse(value: &str) -> Result<Self, PortError> {
        match value.to_ascii_lowercase().as_str() {
            "bip137" | "standard" => Ok(SignatureFormat::Bip137),
            "bip322" => Ok(SignatureFormat::Bip322),
            "eip191" => Ok(SignatureFormat::Eip191),
            "ed25519" => Ok(SignatureFormat::Ed25519),
            other => Err(PortError::Validation(format!(
                "unknown signature format {other}"
            ))),
        }
    }
}

pub fn is_taproot_address(address: &str) -> bool {
    let lower = address.to_ascii_lowercase();
    lower.starts_with("bc1p") || lower.starts_with("tb1p")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatOptions {
    pub available: Vec<SignatureFormat>,
    pub suggested: Option<SignatureFormat>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyRequest {
    pub address: String,
    pub message: String,
    pub signature: String,
    pub format: Option<SignatureFormat>,
    /// Message is hex and is verified as the decoded bytes.
    pub hex_format: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyOutcome {
    pub network_id: NetworkId,
    pub format: SignatureFormat,
    pub valid: bool,
}

pub struct MessageVerification<V, M>
where
    V: AddressValidatorPort,
    M: MessageVerifierPort,
{
    pub registry: NetworkRegistry,
    pub validator: V,
    pub verifier: M,
    pub max_message_len: usize,
}

impl<V, M> MessageVerification<V, M>
where
    V: AddressValidatorPort,
    M: MessageVerifierPort,
{
    pub fn new(registry: NetworkRegistry, validator: V, verifier: M) -> Self {
        Self {
            registry,
            validator,
            verifier,
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
        }
    }

    pub fn with_max_message_len(mut self, max_message_len: usize) -> Self {
        self.max_message_len = max_message_len;
        self
    }

    /// First family in [`DETECTION_ORDER`] whose validator accepts the
    /// address. Validator errors count as "not this family".
    pub fn detect_network(&self, address: &str) -> Option<NetworkId> {
        let address = address.trim();
        if address.len() < MIN_DETECTABLE_ADDRESS_LEN {
            return None;
        }
        DETECTION_ORDER.into_iter().find_map(|tag| {
            match self.validator.is_valid(tag, address) {
                Ok(true) => self
                    .registry
                    .default_network(tag)
                    .map(|info| info.id.clone()),
                Ok(false) => None,
                Err(e) => {
                    debug!(implementation = %tag, error = %e, "address validator failed");
                    None
                }
            }
        })
    }

    pub fn format_options(&self, network_id: &NetworkId, address: &str) -> FormatOptions {
        let Ok(info) = self.registry.get(network_id) else {
            return FormatOptions {
                available: Vec::new(),
                suggested: None,
            };
        };
        let taproot = info.implementation == ImplementationTag::Btc && is_taproot_address(address);
        let available: Vec<SignatureFormat> = info
            .capabilities
            .signature_formats
            .iter()
            .copied()
            .filter(|format| !(taproot && *format == SignatureFormat::Bip137))
            .collect();
        let suggested = match info.implementation {
            ImplementationTag::Btc if taproot => Some(SignatureFormat::Bip322),
            ImplementationTag::Btc => Some(SignatureFormat::Bip137),
            _ => available.first().copied(),
        };
        FormatOptions {
            available,
            suggested,
        }
    }

    pub fn verify(&self, request: &VerifyRequest) -> Result<VerifyOutcome, PortError> {
        let network_id = self.detect_network(&request.address).ok_or_else(|| {
            PortError::Validation(format!(
                "could not detect a network for address {}",
                request.address
            ))
        })?;
        let info = self.registry.get(&network_id)?;
        let tag = info.implementation;

        let message = self.message_bytes(request)?;
        let format = self.resolve_format(&network_id, tag, request)?;

        let valid = self.verifier.verify(
            tag,
            request.address.trim(),
            &message,
            request.signature.trim(),
            format,
        )?;
        debug!(network = %network_id, ?format, valid, "signature verified");
        Ok(VerifyOutcome {
            network_id,
            format,
            valid,
        })
    }

    fn message_bytes(&self, request: &VerifyRequest) -> Result<Vec<u8>, PortError> {
        if request.message.chars().count() > self.max_message_len {
            return Err(PortError::Validation(format!(
                "message exceeds {} characters",
                self.max_message_len
            )));
        }
        if request.hex_format {
            let hex = request.message.trim();
            let hex = hex.strip_prefix("0x").unwrap_or(hex);
            return alloy::primitives::hex::decode(hex)
                .map_err(|e| PortError::Validation(format!("message is not valid hex: {e}")));
        }
        Ok(request.message.as_bytes().to_vec())
    }

    fn resolve_format(
        &self,
        network_id: &NetworkId,
        tag: ImplementationTag,
        request: &VerifyRequest,
    ) -> Result<SignatureFormat, PortError> {
        let options = self.format_options(network_id, request.address.trim());
        let format = match (tag, request.format) {
            (ImplementationTag::Btc, None) => {
                return Err(PortError::Validation(
                    "bitcoin signatures need an explicit format".to_string(),
                ))
            }
            (_, Some(format)) => format,
            (_, None) => options.suggested.ok_or_else(|| {
                PortError::Validation(format!("{tag} signatures cannot be verified"))
            })?,
        };
        if !options.available.contains(&format) {
            return Err(PortError::Validation(format!(
                "{format:?} is not available for this address"
            )));
        }
        Ok(format)
    }
}
