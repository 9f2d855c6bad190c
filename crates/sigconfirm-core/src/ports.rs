use std::sync::Arc;

use alloy::primitives::U256;
use thiserror::Error;

use crate::display::{NftStandard, TokenRef};
use crate::domain::{
    AccountId, HostSecurityLevel, ImplementationTag, NetworkId, SignedPayload, SourceInfo,
    UnsignedIntent,
};
use crate::fee::FeeEstimate;
use crate::network::NetworkInfo;
use crate::verify::SignatureFormat;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    #[error("port not implemented: {0}")]
    NotImplemented(&'static str),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("policy error: {0}")]
    Policy(String),
    #[error("user rejected the request")]
    UserRejected,
    #[error("sign error: {0}")]
    Sign(String),
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// How a failure is surfaced to the user and to the outstanding caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Shown inline and retryable; never settles the pending approval.
    RecoverableLocal,
    /// Blocks confirm; never reaches the signer.
    Validation,
    /// Signing failed; the session stays open for retry.
    Settlement,
    /// Programming error; logged and neutralised.
    Protocol,
}

impl PortError {
    pub fn class(&self) -> ErrorClass {
        match self {
            PortError::NotImplemented(_) | PortError::Transport(_) => ErrorClass::RecoverableLocal,
            PortError::Validation(_) | PortError::NotFound(_) | PortError::Policy(_) => {
                ErrorClass::Validation
            }
            PortError::Sign(_) | PortError::UserRejected => ErrorClass::Settlement,
            PortError::Conflict(_) | PortError::Protocol(_) => ErrorClass::Protocol,
        }
    }

    /// EIP-1193 / JSON-RPC code reported back to the provider caller.
    pub fn provider_code(&self) -> i64 {
        match self {
            PortError::UserRejected => 4001,
            PortError::Policy(_) => 4100,
            PortError::Validation(_) => -32602,
            _ => -32603,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractMetadata {
    Token(TokenRef),
    Nft {
        name: Option<String>,
        standard: NftStandard,
    },
    Unknown,
}

pub trait AccountPort {
    fn address(&self, account: &AccountId, network: &NetworkId) -> Result<String, PortError>;
    fn native_balance(&self, account: &AccountId, network: &NetworkId)
        -> Result<U256, PortError>;
}

pub trait TokenMetadataPort {
    fn contract_metadata(
        &self,
        network: &NetworkId,
        contract: &str,
    ) -> Result<ContractMetadata, PortError>;
}

pub trait PricePort {
    /// USD price of one whole unit; `token == None` is the native asset.
    fn price_usd(&self, network: &NetworkId, token: Option<&str>)
        -> Result<Option<f64>, PortError>;
}

pub trait FeeEstimatorPort {
    fn estimate(
        &self,
        network: &NetworkInfo,
        intents: &[Arc<UnsignedIntent>],
    ) -> Result<FeeEstimate, PortError>;
}

pub trait SignerPort {
    fn sign(
        &self,
        intent: &UnsignedIntent,
        network: &NetworkId,
        account: &AccountId,
    ) -> Result<SignedPayload, PortError>;
}

pub trait HostSecurityPort {
    fn classify_host(&self, origin: &str) -> Result<HostSecurityLevel, PortError>;

    fn classify(&self, source: &SourceInfo) -> Result<HostSecurityLevel, PortError> {
        match (&source.origin, source.internal) {
            (_, true) => Ok(HostSecurityLevel::Trusted),
            (Some(origin), false) => self.classify_host(origin),
            (None, false) => Ok(HostSecurityLevel::Unknown),
        }
    }
}

pub trait PendingTxPort {
    /// Next nonce according to the chain.
    fn current_nonce(&self, account: &AccountId, network: &NetworkId) -> Result<u64, PortError>;
    /// Nonces of locally submitted transactions not yet mined.
    fn pending_nonces(
        &self,
        account: &AccountId,
        network: &NetworkId,
    ) -> Result<Vec<u64>, PortError>;
}

pub trait AddressValidatorPort {
    fn is_valid(&self, implementation: ImplementationTag, address: &str)
        -> Result<bool, PortError>;
}

pub trait MessageVerifierPort {
    fn verify(
        &self,
        implementation: ImplementationTag,
        address: &str,
        message: &[u8],
        signature: &str,
        format: SignatureFormat,
    ) -> Result<bool, PortError>;
}

pub trait ClockPort {
    fn now_ms(&self) -> Result<u64, PortError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_codes_follow_eip1193() {
        assert_eq!(PortError::UserRejected.provider_code(), 4001);
        assert_eq!(PortError::Policy("eth_sign".into()).provider_code(), 4100);
        assert_eq!(PortError::Validation("bad".into()).provider_code(), -32602);
        assert_eq!(PortError::Sign("device".into()).provider_code(), -32603);
    }

    #[test]
    fn error_classes_cover_taxonomy() {
        assert_eq!(
            PortError::Transport("timeout".into()).class(),
            ErrorClass::RecoverableLocal
        );
        assert_eq!(PortError::Validation("x".into()).class(), ErrorClass::Validation);
        assert_eq!(PortError::Sign("x".into()).class(), ErrorClass::Settlement);
        assert_eq!(PortError::Protocol("x".into()).class(), ErrorClass::Protocol);
    }
}
