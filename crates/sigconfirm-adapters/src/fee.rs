use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::U256;
use serde_json::{json, Value};
use sigconfirm_core::domain::{EncodedTx, EvmTx, TronContract};
use sigconfirm_core::ports::FeeEstimatorPort;
use sigconfirm_core::{
    FeeEstimate, FeeInfoUnit, FeePreset, ImplementationTag, NetworkInfo, PortError, UnsignedIntent,
};
use tracing::{debug, warn};

use crate::config::AdapterConfig;

const BPS_DENOMINATOR: u64 = 10_000;
const EVM_TRANSFER_GAS: u64 = 21_000;
const EVM_CALL_OVERHEAD_GAS: u64 = 45_000;
const SOL_COMPUTE_UNITS_PER_INSTRUCTION: u64 = 200_000;
const SOL_MAX_COMPUTE_UNITS: u64 = 1_400_000;
const SOL_LAMPORTS_PER_SIGNATURE: u64 = 5_000;
const TRON_TRANSFER_BANDWIDTH: u64 = 268;
const TRON_TRIGGER_BANDWIDTH: u64 = 345;
const TRON_TRIGGER_ENERGY: u64 = 65_000;

/// Chain prices the deterministic estimator quotes from.
#[derive(Debug, Clone)]
pub struct DeterministicFees {
    pub evm_base_fee_wei: u128,
    pub evm_priority_fee_wei: u128,
    pub btc_sat_per_vbyte: u64,
    pub sol_micro_lamports_per_cu: u64,
    pub tron_bandwidth_available: u64,
    pub tron_energy_available: u64,
    pub tron_bandwidth_price: u64,
    pub tron_energy_price: u64,
}

impl Default for DeterministicFees {
    fn default() -> Self {
        Self {
            evm_base_fee_wei: 20_000_000_000,
            evm_priority_fee_wei: 1_500_000_000,
            btc_sat_per_vbyte: 10,
            sol_micro_lamports_per_cu: 1_000,
            tron_bandwidth_available: 600,
            tron_energy_available: 0,
            tron_bandwidth_price: 1_000,
            tron_energy_price: 420,
        }
    }
}

enum FeeMode {
    Deterministic,
    Rpc(RpcRuntime),
}

struct RpcRuntime {
    url: String,
    client: reqwest::blocking::Client,
}

/// EVM prices for one estimate, before preset multipliers.
struct EvmQuote {
    base: U256,
    priority: Option<U256>,
}

pub struct FeeEstimatorAdapter {
    mode: FeeMode,
    multipliers_bps: Vec<u32>,
    fees: DeterministicFees,
}

impl Default for FeeEstimatorAdapter {
    fn default() -> Self {
        Self::with_config(&AdapterConfig::from_env())
    }
}

impl FeeEstimatorAdapter {
    pub fn with_config(config: &AdapterConfig) -> Self {
        let mode = match &config.fee_rpc_url {
            Some(url) => {
                let timeout = Duration::from_millis(config.fee_rpc_timeout_ms);
                match reqwest::blocking::Client::builder().timeout(timeout).build() {
                    Ok(client) => FeeMode::Rpc(RpcRuntime {
                        url: url.clone(),
                        client,
                    }),
                    Err(e) => {
                        warn!(error = %e, "fee rpc client init failed, using deterministic fees");
                        FeeMode::Deterministic
                    }
                }
            }
            None => FeeMode::Deterministic,
        };
        Self {
            mode,
            multipliers_bps: config.fee_preset_multipliers_bps.clone(),
            fees: DeterministicFees::default(),
        }
    }

    pub fn deterministic(multipliers_bps: Vec<u32>) -> Self {
        Self {
            mode: FeeMode::Deterministic,
            multipliers_bps,
            fees: DeterministicFees::default(),
        }
    }

    pub fn with_fees(mut self, fees: DeterministicFees) -> Self {
        self.fees = fees;
        self
    }

    pub fn is_rpc(&self) -> bool {
        matches!(self.mode, FeeMode::Rpc(_))
    }

    fn rpc_call(&self, method: &str, params: Value) -> Result<Value, PortError> {
        let rpc = match &self.mode {
            FeeMode::Rpc(rpc) => rpc,
            FeeMode::Deterministic => {
                return Err(PortError::NotImplemented("fee rpc runtime not enabled"))
            }
        };
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response = rpc
            .client
            .post(&rpc.url)
            .json(&payload)
            .send()
            .map_err(|e| PortError::Transport(format!("fee rpc request failed: {e}")))?;
        let status = response.status();
        let body: Value = response
            .json()
            .map_err(|e| PortError::Transport(format!("fee rpc json decode failed: {e}")))?;
        if !status.is_success() {
            return Err(PortError::Transport(format!(
                "fee rpc status {status}: {body}"
            )));
        }
        if let Some(err) = body.get("error") {
            return Err(PortError::Transport(format!(
                "fee rpc {method} returned error: {err}"
            )));
        }
        body.get("result")
            .cloned()
            .ok_or_else(|| PortError::Transport(format!("fee rpc {method} missing result")))
    }

    fn rpc_quantity(&self, method: &str, params: Value) -> Result<U256, PortError> {
        let result = self.rpc_call(method, params)?;
        let raw = result.as_str().ok_or_else(|| {
            PortError::Transport(format!("fee rpc {method} result must be a hex string"))
        })?;
        parse_quantity(raw)
            .ok_or_else(|| PortError::Transport(format!("fee rpc {method} returned {raw}")))
    }

    fn evm_quote(&self) -> Result<EvmQuote, PortError> {
        if !self.is_rpc() {
            return Ok(EvmQuote {
                base: U256::from(self.fees.evm_base_fee_wei),
                priority: Some(U256::from(self.fees.evm_priority_fee_wei)),
            });
        }
        let base = self.rpc_quantity("eth_gasPrice", json!([]))?;
        // Legacy nodes do not serve a priority fee; quote legacy gas then.
        let priority = match self.rpc_quantity("eth_maxPriorityFeePerGas", json!([])) {
            Ok(priority) => Some(priority),
            Err(e) => {
                debug!(error = %e, "priority fee unavailable, quoting legacy gas");
                None
            }
        };
        Ok(EvmQuote { base, priority })
    }

    fn evm_gas_limit(&self, tx: &EvmTx) -> Result<u64, PortError> {
        if !self.is_rpc() {
            return Ok(intrinsic_gas(tx));
        }
        let mut call = json!({
            "from": tx.from.to_string(),
            "value": format!("{:#x}", tx.value),
            "data": tx.data.to_string(),
        });
        if let Some(to) = tx.to {
            call["to"] = json!(to.to_string());
        }
        let gas = self.rpc_quantity("eth_estimateGas", json!([call]))?;
        u64::try_from(gas).map_err(|_| PortError::Transport(format!("gas estimate {gas} overflows")))
    }

    fn scale(price: U256, bps: u32) -> U256 {
        price.saturating_mul(U256::from(bps)) / U256::from(BPS_DENOMINATOR)
    }

    fn scale_u64(price: u64, bps: u32) -> u64 {
        (u128::from(price) * u128::from(bps) / u128::from(BPS_DENOMINATOR))
            .try_into()
            .unwrap_or(u64::MAX)
    }

    /// Units for one intent, one per multiplier.
    fn quote_intent(
        &self,
        network: &NetworkInfo,
        intent: &UnsignedIntent,
        evm_quote: Option<&EvmQuote>,
    ) -> Result<Vec<FeeInfoUnit>, PortError> {
        let tx = intent.as_transaction().ok_or_else(|| {
            PortError::Validation("messages do not carry a network fee".to_owned())
        })?;
        let units = match (&tx.encoded, evm_quote) {
            (EncodedTx::Evm(evm), Some(quote)) => {
                let gas_limit = self.evm_gas_limit(evm)?;
                self.multipliers_bps
                    .iter()
                    .map(|bps| match quote.priority {
                        Some(priority) => {
                            let priority = Self::scale(priority, *bps);
                            FeeInfoUnit::Eip1559 {
                                gas_limit,
                                max_fee_per_gas: Self::scale(quote.base, *bps)
                                    .saturating_add(priority),
                                max_priority_fee_per_gas: priority,
                            }
                        }
                        None => FeeInfoUnit::Gas {
                            gas_limit,
                            gas_price: Self::scale(quote.base, *bps),
                        },
                    })
                    .collect()
            }
            (EncodedTx::Btc(btc), _) => {
                let vsize = btc.vsize_estimate();
                self.multipliers_bps
                    .iter()
                    .map(|bps| FeeInfoUnit::FeeRate {
                        vsize,
                        sat_per_vbyte: Self::scale_u64(self.fees.btc_sat_per_vbyte, *bps).max(1),
                    })
                    .collect()
            }
            (EncodedTx::Sol(sol), _) => {
                let compute_units = (sol.instructions.len() as u64)
                    .saturating_mul(SOL_COMPUTE_UNITS_PER_INSTRUCTION)
                    .clamp(SOL_COMPUTE_UNITS_PER_INSTRUCTION, SOL_MAX_COMPUTE_UNITS);
                self.multipliers_bps
                    .iter()
                    .map(|bps| FeeInfoUnit::ComputeUnit {
                        compute_units,
                        micro_lamports_per_cu: Self::scale_u64(
                            self.fees.sol_micro_lamports_per_cu,
                            *bps,
                        ),
                        base_fee: SOL_LAMPORTS_PER_SIGNATURE,
                    })
                    .collect()
            }
            // Resource fees are fixed by the chain, so there is nothing to scale.
            (EncodedTx::Tron(tron), _) => {
                let (bandwidth_required, energy_required) = match &tron.contract {
                    TronContract::Transfer { .. } => (TRON_TRANSFER_BANDWIDTH, 0),
                    TronContract::TriggerSmartContract { data, .. } => (
                        TRON_TRIGGER_BANDWIDTH + data.len() as u64,
                        TRON_TRIGGER_ENERGY,
                    ),
                };
                vec![FeeInfoUnit::Resource {
                    bandwidth_required,
                    bandwidth_available: self.fees.tron_bandwidth_available,
                    energy_required,
                    energy_available: self.fees.tron_energy_available,
                    bandwidth_price: self.fees.tron_bandwidth_price,
                    energy_price: self.fees.tron_energy_price,
                }]
            }
            (EncodedTx::Evm(_), None) => {
                return Err(PortError::Protocol(format!(
                    "evm transaction on {} network",
                    network.implementation
                )))
            }
            (EncodedTx::Opaque { .. }, _) => {
                return Err(PortError::NotImplemented(
                    "fee estimation for opaque payloads",
                ))
            }
        };
        Ok(units)
    }
}

impl FeeEstimatorPort for FeeEstimatorAdapter {
    fn estimate(
        &self,
        network: &NetworkInfo,
        intents: &[Arc<UnsignedIntent>],
    ) -> Result<FeeEstimate, PortError> {
        if self.multipliers_bps.is_empty() {
            return Err(PortError::Validation(
                "no fee presets configured".to_owned(),
            ));
        }
        let evm_quote = match network.implementation {
            ImplementationTag::Evm => Some(self.evm_quote()?),
            _ => None,
        };
        let per_intent = intents
            .iter()
            .map(|intent| self.quote_intent(network, intent, evm_quote.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        let preset_count = per_intent.iter().map(Vec::len).min().unwrap_or(0);
        let labels = preset_labels(preset_count);
        let presets = labels
            .into_iter()
            .enumerate()
            .map(|(index, label)| FeePreset {
                label,
                per_intent: per_intent.iter().map(|units| units[index].clone()).collect(),
            })
            .collect::<Vec<_>>();
        debug!(
            network = %network.id,
            intents = intents.len(),
            presets = presets.len(),
            "fee estimate ready"
        );
        Ok(FeeEstimate { presets })
    }
}

fn preset_labels(count: usize) -> Vec<String> {
    match count {
        1 => vec!["Standard".to_owned()],
        3 => ["Slow", "Normal", "Fast"].map(str::to_owned).to_vec(),
        n => (1..=n).map(|i| format!("Preset {i}")).collect(),
    }
}

/// 21000 plus calldata cost, plus call overhead whenever data is present.
fn intrinsic_gas(tx: &EvmTx) -> u64 {
    if tx.data.is_empty() {
        return EVM_TRANSFER_GAS;
    }
    let calldata: u64 = tx
        .data
        .iter()
        .map(|byte| if *byte == 0 { 4 } else { 16 })
        .sum();
    EVM_TRANSFER_GAS + calldata + EVM_CALL_OVERHEAD_GAS
}

fn parse_quantity(raw: &str) -> Option<U256> {
    let hex = raw.strip_prefix("0x")?;
    if hex.is_empty() {
        return None;
    }
    U256::from_str_radix(hex, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantity_requires_hex_prefix() {
        assert_eq!(parse_quantity("0x3b9aca00"), Some(U256::from(1_000_000_000u64)));
        assert_eq!(parse_quantity("1000"), None);
        assert_eq!(parse_quantity("0x"), None);
    }

    #[test]
    fn three_presets_are_named_by_speed() {
        assert_eq!(preset_labels(3), vec!["Slow", "Normal", "Fast"]);
        assert_eq!(preset_labels(2), vec!["Preset 1", "Preset 2"]);
    }

    #[test]
    fn scaling_uses_basis_points() {
        assert_eq!(FeeEstimatorAdapter::scale(U256::from(200u64), 12_500), U256::from(250u64));
        assert_eq!(FeeEstimatorAdapter::scale_u64(10, 9_000), 9);
    }
}
