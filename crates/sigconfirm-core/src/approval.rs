//! Allowance editing for token approvals.

use alloy::primitives::utils::parse_units;
use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

use crate::decode::calldata::{self, CallAction};
use crate::decode::sol::{SPL_APPROVE, SPL_APPROVE_CHECKED, SPL_TOKEN_PROGRAM};
use crate::domain::{EncodedTx, TronContract, UnsignedIntent, UnsignedTransaction};
use crate::ports::PortError;

/// Sentinel granted by an "unlimited" approval.
pub const UNLIMITED_ALLOWANCE: U256 = U256::MAX;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalEditState {
    original_allowance: String,
    original_is_unlimited: bool,
    current_allowance: String,
    current_is_unlimited: bool,
}

impl ApprovalEditState {
    /// Records the decoded on-chain allowance. Only the first non-empty value
    /// sticks; later calls return `false` and change nothing.
    pub fn capture_original(&mut self, allowance: &str, is_unlimited: bool) -> bool {
        if !self.original_allowance.is_empty() {
            return false;
        }
        self.original_allowance = allowance.to_string();
        self.original_is_unlimited = is_unlimited;
        if self.current_allowance.is_empty() {
            self.current_allowance = allowance.to_string();
            self.current_is_unlimited = is_unlimited;
        }
        true
    }

    pub fn set_current(&mut self, allowance: &str, is_unlimited: bool) {
        self.current_allowance = allowance.to_string();
        self.current_is_unlimited = is_unlimited;
    }

    pub fn original_allowance(&self) -> &str {
        &self.original_allowance
    }

    pub fn original_is_unlimited(&self) -> bool {
        self.original_is_unlimited
    }

    pub fn current_allowance(&self) -> &str {
        &self.current_allowance
    }

    pub fn current_is_unlimited(&self) -> bool {
        self.current_is_unlimited
    }

    pub fn is_edited(&self) -> bool {
        self.original_allowance != self.current_allowance
            || self.original_is_unlimited != self.current_is_unlimited
    }
}

/// Parses a human allowance into base units. Unknown decimals and inputs more
/// precise than the token allows are rejected rather than truncated.
pub fn parse_allowance(input: &str, decimals: Option<u8>) -> Result<U256, PortError> {
    let decimals = decimals.ok_or_else(|| {
        PortError::Validation("token decimals unknown; allowance cannot be edited".to_string())
    })?;
    let input = input.trim();
    if input.is_empty() {
        return Err(PortError::Validation("allowance is empty".to_string()));
    }
    let (whole, fraction) = input.split_once('.').unwrap_or((input, ""));
    let digits_only = |part: &str| part.chars().all(|c| c.is_ascii_digit());
    if whole.is_empty() || !digits_only(whole) || !digits_only(fraction) {
        return Err(PortError::Validation(format!("invalid allowance {input}")));
    }
    if fraction.len() > usize::from(decimals) {
        return Err(PortError::Validation(format!(
            "allowance {input} has more than {decimals} decimal places"
        )));
    }
    let parsed = parse_units(input, decimals)
        .map_err(|e| PortError::Validation(format!("invalid allowance {input}: {e}")))?;
    Ok(parsed.into())
}

/// Builds a new intent granting `amount`; `intent` itself is left untouched.
pub fn apply_allowance(intent: &UnsignedIntent, amount: U256) -> Result<UnsignedIntent, PortError> {
    let tx = intent
        .as_transaction()
        .ok_or_else(|| PortError::Validation("messages carry no allowance".to_string()))?;

    let encoded = match &tx.encoded {
        EncodedTx::Evm(evm) => {
            let mut evm = evm.clone();
            evm.data = reencode_approve(&evm.data, amount)?.into();
            EncodedTx::Evm(evm)
        }
        EncodedTx::Tron(tron) => {
            let mut tron = tron.clone();
            match &mut tron.contract {
                TronContract::TriggerSmartContract { data, .. } => {
                    *data = reencode_approve(data, amount)?.into();
                }
                TronContract::Transfer { .. } => {
                    return Err(PortError::Validation(
                        "TRX transfers carry no allowance".to_string(),
                    ))
                }
            }
            EncodedTx::Tron(tron)
        }
        EncodedTx::Sol(sol) => {
            let amount = if amount == UNLIMITED_ALLOWANCE {
                u64::MAX
            } else {
                u64::try_from(amount).map_err(|_| {
                    PortError::Validation("SPL allowance exceeds u64".to_string())
                })?
            };
            let mut sol = sol.clone();
            let instruction = sol
                .instructions
                .iter_mut()
                .find(|ix| {
                    ix.program_id == SPL_TOKEN_PROGRAM
                        && matches!(ix.data.first(), Some(&SPL_APPROVE | &SPL_APPROVE_CHECKED))
                        && ix.data.len() >= 9
                })
                .ok_or_else(|| PortError::NotFound("no SPL approve instruction".to_string()))?;
            instruction.data[1..9].copy_from_slice(&amount.to_le_bytes());
            EncodedTx::Sol(sol)
        }
        EncodedTx::Btc(_) | EncodedTx::Opaque { .. } => {
            return Err(PortError::Validation(
                "transaction carries no editable allowance".to_string(),
            ))
        }
    };

    Ok(UnsignedIntent::Transaction(UnsignedTransaction {
        encoded,
        nonce: tx.nonce,
        fee: tx.fee.clone(),
        revision: tx.revision + 1,
    }))
}

fn reencode_approve(data: &[u8], amount: U256) -> Result<Vec<u8>, PortError> {
    match calldata::parse_call(data) {
        CallAction::Approve { spender, .. } => Ok(calldata::encode_approve(spender, amount)),
        _ => Err(PortError::NotFound("calldata is not an approve call".to_string())),
    }
}
