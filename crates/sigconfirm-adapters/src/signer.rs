use std::sync::{Arc, Mutex};

use alloy::primitives::{keccak256, Bytes};
use sigconfirm_core::ports::SignerPort;
use sigconfirm_core::{AccountId, NetworkId, PortError, SignedPayload, UnsignedIntent};
use tracing::debug;

#[derive(Debug, Default)]
struct SignerState {
    signed: Vec<UnsignedIntent>,
    fail_next: Option<String>,
}

/// Signs with a keccak-derived placeholder signature and records every intent
/// it was asked to sign.
#[derive(Debug, Clone, Default)]
pub struct DeterministicSignerAdapter {
    state: Arc<Mutex<SignerState>>,
}

impl DeterministicSignerAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intents signed so far, in order.
    pub fn signed(&self) -> Result<Vec<UnsignedIntent>, PortError> {
        let g = self
            .state
            .lock()
            .map_err(|e| PortError::Transport(format!("signer lock poisoned: {e}")))?;
        Ok(g.signed.clone())
    }

    /// Makes the next `sign` call fail with `PortError::Sign(reason)`.
    pub fn debug_fail_next_sign(&self, reason: impl Into<String>) -> Result<(), PortError> {
        let mut g = self
            .state
            .lock()
            .map_err(|e| PortError::Transport(format!("signer lock poisoned: {e}")))?;
        g.fail_next = Some(reason.into());
        Ok(())
    }

    fn deterministic_signature(payload: &[u8], network: &NetworkId, account: &AccountId) -> Bytes {
        let mut seed = Vec::new();
        seed.extend_from_slice(network.as_str().as_bytes());
        seed.extend_from_slice(account.to_string().as_bytes());
        seed.extend_from_slice(payload);
        let hash = keccak256(seed);
        let mut sig = Vec::with_capacity(65);
        sig.extend_from_slice(hash.as_slice());
        sig.extend_from_slice(hash.as_slice());
        sig.push(27);
        Bytes::from(sig)
    }
}

impl SignerPort for DeterministicSignerAdapter {
    fn sign(
        &self,
        intent: &UnsignedIntent,
        network: &NetworkId,
        account: &AccountId,
    ) -> Result<SignedPayload, PortError> {
        let mut g = self
            .state
            .lock()
            .map_err(|e| PortError::Transport(format!("signer lock poisoned: {e}")))?;
        if let Some(reason) = g.fail_next.take() {
            return Err(PortError::Sign(reason));
        }

        let raw = serde_json::to_vec(intent)
            .map_err(|e| PortError::Protocol(format!("intent serialization failed: {e}")))?;
        let signature = Self::deterministic_signature(&raw, network, account);
        let tx_hash = intent.as_transaction().map(|_| keccak256(&raw));
        g.signed.push(intent.clone());
        debug!(network = %network, revision = intent.revision(), "intent signed");

        Ok(SignedPayload {
            intent_revision: intent.revision(),
            raw: Bytes::from(raw),
            signature,
            tx_hash,
        })
    }
}
