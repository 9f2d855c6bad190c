use alloy::primitives::utils::format_units;
use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

use crate::display::Derived;
use crate::network::NativeAsset;
use crate::ports::PortError;

const MICRO_LAMPORTS_PER_LAMPORT: u64 = 1_000_000;
const DISPLAY_FRACTION_DIGITS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeType {
    Standard,
    Custom,
}

/// Per-intent fee parameters in the chain's own units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeInfoUnit {
    Gas {
        gas_limit: u64,
        gas_price: U256,
    },
    Eip1559 {
        gas_limit: u64,
        max_fee_per_gas: U256,
        max_priority_fee_per_gas: U256,
    },
    FeeRate {
        vsize: u64,
        sat_per_vbyte: u64,
    },
    ComputeUnit {
        compute_units: u64,
        micro_lamports_per_cu: u64,
        base_fee: u64,
    },
    Resource {
        bandwidth_required: u64,
        bandwidth_available: u64,
        energy_required: u64,
        energy_available: u64,
        bandwidth_price: u64,
        energy_price: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirement {
    pub required_bandwidth: u64,
    pub required_energy: u64,
    pub bandwidth_shortfall: u64,
    pub energy_shortfall: u64,
}

impl FeeInfoUnit {
    /// Worst-case amount burned from the native balance, in the smallest unit.
    pub fn total_native(&self) -> U256 {
        match self {
            FeeInfoUnit::Gas {
                gas_limit,
                gas_price,
            } => gas_price.saturating_mul(U256::from(*gas_limit)),
            FeeInfoUnit::Eip1559 {
                gas_limit,
                max_fee_per_gas,
                ..
            } => max_fee_per_gas.saturating_mul(U256::from(*gas_limit)),
            FeeInfoUnit::FeeRate {
                vsize,
                sat_per_vbyte,
            } => U256::from(*vsize).saturating_mul(U256::from(*sat_per_vbyte)),
            FeeInfoUnit::ComputeUnit {
                compute_units,
                micro_lamports_per_cu,
                base_fee,
            } => {
                let micro = U256::from(*compute_units)
                    .saturating_mul(U256::from(*micro_lamports_per_cu));
                let divisor = U256::from(MICRO_LAMPORTS_PER_LAMPORT);
                let priority = micro.saturating_add(divisor - U256::from(1u64)) / divisor;
                U256::from(*base_fee).saturating_add(priority)
            }
            FeeInfoUnit::Resource {
                bandwidth_price,
                energy_price,
                ..
            } => {
                let resources = self.resources().unwrap_or(ResourceRequirement {
                    required_bandwidth: 0,
                    required_energy: 0,
                    bandwidth_shortfall: 0,
                    energy_shortfall: 0,
                });
                U256::from(resources.bandwidth_shortfall)
                    .saturating_mul(U256::from(*bandwidth_price))
                    .saturating_add(
                        U256::from(resources.energy_shortfall)
                            .saturating_mul(U256::from(*energy_price)),
                    )
            }
        }
    }

    pub fn resources(&self) -> Option<ResourceRequirement> {
        match self {
            FeeInfoUnit::Resource {
                bandwidth_required,
                bandwidth_available,
                energy_required,
                energy_available,
                ..
            } => Some(ResourceRequirement {
                required_bandwidth: *bandwidth_required,
                required_energy: *energy_required,
                bandwidth_shortfall: bandwidth_required.saturating_sub(*bandwidth_available),
                energy_shortfall: energy_required.saturating_sub(*energy_available),
            }),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            FeeInfoUnit::Gas { .. } => "gas",
            FeeInfoUnit::Eip1559 { .. } => "eip1559",
            FeeInfoUnit::FeeRate { .. } => "feeRate",
            FeeInfoUnit::ComputeUnit { .. } => "computeUnit",
            FeeInfoUnit::Resource { .. } => "resource",
        }
    }

    /// Applies the prices of `custom` to the limits of `self`.
    pub fn reprice(&self, custom: &FeeInfoUnit) -> Result<FeeInfoUnit, PortError> {
        match (self, custom) {
            (FeeInfoUnit::Gas { gas_limit, .. }, FeeInfoUnit::Gas { gas_price, .. }) => {
                Ok(FeeInfoUnit::Gas {
                    gas_limit: *gas_limit,
                    gas_price: *gas_price,
                })
            }
            (
                FeeInfoUnit::Eip1559 { gas_limit, .. },
                FeeInfoUnit::Eip1559 {
                    max_fee_per_gas,
                    max_priority_fee_per_gas,
                    ..
                },
            ) => {
                if max_priority_fee_per_gas > max_fee_per_gas {
                    return Err(PortError::Validation(
                        "max priority fee exceeds max fee".to_string(),
                    ));
                }
                Ok(FeeInfoUnit::Eip1559 {
                    gas_limit: *gas_limit,
                    max_fee_per_gas: *max_fee_per_gas,
                    max_priority_fee_per_gas: *max_priority_fee_per_gas,
                })
            }
            (FeeInfoUnit::FeeRate { vsize, .. }, FeeInfoUnit::FeeRate { sat_per_vbyte, .. }) => {
                if *sat_per_vbyte == 0 {
                    return Err(PortError::Validation("fee rate must be positive".to_string()));
                }
                Ok(FeeInfoUnit::FeeRate {
                    vsize: *vsize,
                    sat_per_vbyte: *sat_per_vbyte,
                })
            }
            (
                FeeInfoUnit::ComputeUnit {
                    compute_units,
                    base_fee,
                    ..
                },
                FeeInfoUnit::ComputeUnit {
                    micro_lamports_per_cu,
                    ..
                },
            ) => Ok(FeeInfoUnit::ComputeUnit {
                compute_units: *compute_units,
                micro_lamports_per_cu: *micro_lamports_per_cu,
                base_fee: *base_fee,
            }),
            (FeeInfoUnit::Resource { .. }, _) => Err(PortError::Validation(
                "resource fees are not user adjustable".to_string(),
            )),
            (estimated, custom) => Err(PortError::Validation(format!(
                "custom fee kind {} does not match estimated kind {}",
                custom.kind(),
                estimated.kind()
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeePreset {
    pub label: String,
    /// One unit per intent, in intent order.
    pub per_intent: Vec<FeeInfoUnit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeEstimate {
    pub presets: Vec<FeePreset>,
}

impl FeeEstimate {
    pub fn is_single_preset(&self) -> bool {
        self.presets.len() == 1
    }

    /// Middle preset ("normal") when three or more are offered.
    pub fn default_preset_index(&self) -> usize {
        if self.presets.len() >= 3 {
            1
        } else {
            0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SendFeeStatus {
    Idle,
    Estimating,
    Ready,
    Error(String),
}

/// Selected fee with every aggregate computed from the same inputs.
///
/// Fields are private: the only way to obtain a selection is [`FeeSelection::compute`],
/// which derives all totals in one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSelection {
    fee_type: FeeType,
    preset_index: Option<usize>,
    custom_fee: Option<FeeInfoUnit>,
    fee_infos: Vec<FeeInfoUnit>,
    total: U256,
    total_native: String,
    total_fiat: Derived<String>,
    total_native_for_display: String,
    total_fiat_for_display: Derived<String>,
    resources: Option<ResourceRequirement>,
}

impl FeeSelection {
    pub fn compute(
        fee_type: FeeType,
        preset_index: Option<usize>,
        custom_fee: Option<FeeInfoUnit>,
        fee_infos: Vec<FeeInfoUnit>,
        native: &NativeAsset,
        native_price_usd: Option<f64>,
    ) -> Result<Self, PortError> {
        let total = fee_infos
            .iter()
            .fold(U256::ZERO, |acc, info| acc.saturating_add(info.total_native()));
        let total_native = format_amount(total, native.decimals)?;
        let total_native_for_display = format!(
            "{} {}",
            truncate_fraction(&total_native, DISPLAY_FRACTION_DIGITS),
            native.symbol
        );
        let fiat = native_price_usd.and_then(|price| fiat_value(&total_native, price));
        let total_fiat = Derived(fiat.map(|value| value.to_string()));
        let total_fiat_for_display = Derived(fiat.map(|value| format!("${value:.2}")));

        let resources = fee_infos
            .iter()
            .filter_map(FeeInfoUnit::resources)
            .reduce(|acc, next| ResourceRequirement {
                required_bandwidth: acc.required_bandwidth + next.required_bandwidth,
                required_energy: acc.required_energy + next.required_energy,
                bandwidth_shortfall: acc.bandwidth_shortfall + next.bandwidth_shortfall,
                energy_shortfall: acc.energy_shortfall + next.energy_shortfall,
            });

        Ok(Self {
            fee_type,
            preset_index,
            custom_fee,
            fee_infos,
            total,
            total_native,
            total_fiat,
            total_native_for_display,
            total_fiat_for_display,
            resources,
        })
    }

    pub fn fee_type(&self) -> FeeType {
        self.fee_type
    }

    pub fn preset_index(&self) -> Option<usize> {
        self.preset_index
    }

    pub fn custom_fee(&self) -> Option<&FeeInfoUnit> {
        self.custom_fee.as_ref()
    }

    pub fn fee_infos(&self) -> &[FeeInfoUnit] {
        &self.fee_infos
    }

    pub fn total(&self) -> U256 {
        self.total
    }

    pub fn total_native(&self) -> &str {
        &self.total_native
    }

    pub fn total_fiat(&self) -> Option<&str> {
        self.total_fiat.get().map(String::as_str)
    }

    pub fn total_native_for_display(&self) -> &str {
        &self.total_native_for_display
    }

    pub fn total_fiat_for_display(&self) -> Option<&str> {
        self.total_fiat_for_display.get().map(String::as_str)
    }

    /// Bandwidth/energy panel for resource-billed chains; not part of `total`.
    pub fn resources(&self) -> Option<ResourceRequirement> {
        self.resources
    }
}

/// Formats an integral amount into human units without trailing zeros.
pub fn format_amount(raw: U256, decimals: u8) -> Result<String, PortError> {
    let formatted = format_units(raw, decimals)
        .map_err(|e| PortError::Validation(format!("format amount: {e}")))?;
    if !formatted.contains('.') {
        return Ok(formatted);
    }
    Ok(formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string())
}

fn truncate_fraction(amount: &str, digits: usize) -> String {
    match amount.split_once('.') {
        Some((whole, fraction)) if fraction.len() > digits => {
            let kept = fraction[..digits].trim_end_matches('0');
            if kept.is_empty() {
                whole.to_string()
            } else {
                format!("{whole}.{kept}")
            }
        }
        _ => amount.to_string(),
    }
}

pub(crate) fn fiat_value(amount: &str, price_usd: f64) -> Option<f64> {
    amount
        .parse::<f64>()
        .ok()
        .map(|units| units * price_usd)
        .filter(|value| value.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eth() -> NativeAsset {
        NativeAsset {
            symbol: "ETH".to_string(),
            decimals: 18,
        }
    }

    #[test]
    fn total_is_sum_of_fee_infos() {
        let infos = vec![
            FeeInfoUnit::Gas {
                gas_limit: 21_000,
                gas_price: U256::from(10_000_000_000u64),
            },
            FeeInfoUnit::Eip1559 {
                gas_limit: 60_000,
                max_fee_per_gas: U256::from(20_000_000_000u64),
                max_priority_fee_per_gas: U256::from(1_000_000_000u64),
            },
        ];
        let selection =
            FeeSelection::compute(FeeType::Standard, Some(0), None, infos.clone(), &eth(), Some(2000.0))
                .expect("selection");
        let expected = infos
            .iter()
            .fold(U256::ZERO, |acc, info| acc + info.total_native());
        assert_eq!(selection.total(), expected);
        assert_eq!(selection.total_native(), "0.00141");
        assert_eq!(selection.total_native_for_display(), "0.00141 ETH");
        assert_eq!(selection.total_fiat_for_display(), Some("$2.82"));
    }

    #[test]
    fn resource_fee_counts_only_shortfall() {
        let unit = FeeInfoUnit::Resource {
            bandwidth_required: 345,
            bandwidth_available: 600,
            energy_required: 65_000,
            energy_available: 15_000,
            bandwidth_price: 1_000,
            energy_price: 420,
        };
        assert_eq!(unit.total_native(), U256::from(50_000u64 * 420));
        let resources = unit.resources().expect("resources");
        assert_eq!(resources.bandwidth_shortfall, 0);
        assert_eq!(resources.energy_shortfall, 50_000);
    }

    #[test]
    fn compute_unit_rounds_priority_up() {
        let unit = FeeInfoUnit::ComputeUnit {
            compute_units: 200_000,
            micro_lamports_per_cu: 3,
            base_fee: 5_000,
        };
        assert_eq!(unit.total_native(), U256::from(5_001u64));
    }

    #[test]
    fn reprice_keeps_limits_and_rejects_kind_mismatch() {
        let estimated = FeeInfoUnit::Gas {
            gas_limit: 50_000,
            gas_price: U256::from(5u64),
        };
        let repriced = estimated
            .reprice(&FeeInfoUnit::Gas {
                gas_limit: 1,
                gas_price: U256::from(9u64),
            })
            .expect("reprice");
        assert_eq!(
            repriced,
            FeeInfoUnit::Gas {
                gas_limit: 50_000,
                gas_price: U256::from(9u64)
            }
        );

        let err = estimated
            .reprice(&FeeInfoUnit::FeeRate {
                vsize: 1,
                sat_per_vbyte: 3,
            })
            .expect_err("mismatch");
        assert!(matches!(err, PortError::Validation(_)));
    }

    #[test]
    fn format_amount_trims_zeros() {
        assert_eq!(
            format_amount(U256::from(1_500_000u64), 6).expect("format"),
            "1.5"
        );
        assert_eq!(format_amount(U256::from(100u64), 0).expect("format"), "100");
        assert_eq!(format_amount(U256::ZERO, 18).expect("format"), "0");
    }
}
