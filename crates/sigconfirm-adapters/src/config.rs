use sigconfirm_core::verify::DEFAULT_MAX_MESSAGE_LEN;
use sigconfirm_core::PipelineSettings;
use tracing::warn;

const ENV_PREFIX: &str = "SIGCONFIRM_";

#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub allow_eth_sign: bool,
    /// JSON-RPC endpoint for EVM fee estimation. `None` keeps the
    /// deterministic estimator.
    pub fee_rpc_url: Option<String>,
    pub fee_rpc_timeout_ms: u64,
    /// Multipliers applied to the base price, one preset each, in basis points.
    pub fee_preset_multipliers_bps: Vec<u32>,
    pub trusted_hosts: Vec<String>,
    pub blocked_hosts: Vec<String>,
    pub max_verify_message_len: usize,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            allow_eth_sign: false,
            fee_rpc_url: None,
            fee_rpc_timeout_ms: 10_000,
            fee_preset_multipliers_bps: vec![9_000, 10_000, 12_500],
            trusted_hosts: Vec::new(),
            blocked_hosts: Vec::new(),
            max_verify_message_len: DEFAULT_MAX_MESSAGE_LEN,
        }
    }
}

impl AdapterConfig {
    /// Overlays `SIGCONFIRM_*` variables on the defaults. Unparseable values
    /// are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(raw) = lookup("ALLOW_ETH_SIGN") {
            match parse_bool(&raw) {
                Some(value) => config.allow_eth_sign = value,
                None => warn!(value = %raw, "ignoring invalid SIGCONFIRM_ALLOW_ETH_SIGN"),
            }
        }
        if let Some(url) = lookup("FEE_RPC_URL").filter(|url| !url.trim().is_empty()) {
            config.fee_rpc_url = Some(url.trim().to_owned());
        }
        if let Some(raw) = lookup("FEE_RPC_TIMEOUT_MS") {
            match raw.trim().parse() {
                Ok(value) => config.fee_rpc_timeout_ms = value,
                Err(e) => warn!(value = %raw, error = %e, "ignoring invalid SIGCONFIRM_FEE_RPC_TIMEOUT_MS"),
            }
        }
        if let Some(raw) = lookup("FEE_PRESET_MULTIPLIERS_BPS") {
            let parsed: Result<Vec<u32>, _> =
                split_list(&raw).iter().map(|item| item.parse::<u32>()).collect();
            match parsed {
                Ok(values) if !values.is_empty() && values.iter().all(|bps| *bps > 0) => {
                    config.fee_preset_multipliers_bps = values
                }
                _ => warn!(value = %raw, "ignoring invalid SIGCONFIRM_FEE_PRESET_MULTIPLIERS_BPS"),
            }
        }
        if let Some(raw) = lookup("TRUSTED_HOSTS") {
            config.trusted_hosts = split_list(&raw);
        }
        if let Some(raw) = lookup("BLOCKED_HOSTS") {
            config.blocked_hosts = split_list(&raw);
        }
        if let Some(raw) = lookup("MAX_VERIFY_MESSAGE_LEN") {
            match raw.trim().parse() {
                Ok(value) => config.max_verify_message_len = value,
                Err(e) => warn!(value = %raw, error = %e, "ignoring invalid SIGCONFIRM_MAX_VERIFY_MESSAGE_LEN"),
            }
        }
        config
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            allow_eth_sign: self.allow_eth_sign,
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim().to_ascii_lowercase())
        .filter(|item| !item.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_overrides_defaults() {
        let config = AdapterConfig::from_lookup(|key| match key {
            "ALLOW_ETH_SIGN" => Some("true".to_owned()),
            "FEE_PRESET_MULTIPLIERS_BPS" => Some("10000, 15000".to_owned()),
            "TRUSTED_HOSTS" => Some("App.Uniswap.org, ,safe.global".to_owned()),
            "MAX_VERIFY_MESSAGE_LEN" => Some("64".to_owned()),
            _ => None,
        });
        assert!(config.pipeline_settings().allow_eth_sign);
        assert_eq!(config.fee_preset_multipliers_bps, vec![10_000, 15_000]);
        assert_eq!(config.trusted_hosts, vec!["app.uniswap.org", "safe.global"]);
        assert_eq!(config.max_verify_message_len, 64);
        assert!(config.fee_rpc_url.is_none());
    }

    #[test]
    fn invalid_values_keep_defaults() {
        let config = AdapterConfig::from_lookup(|key| match key {
            "ALLOW_ETH_SIGN" => Some("maybe".to_owned()),
            "FEE_PRESET_MULTIPLIERS_BPS" => Some("0,abc".to_owned()),
            "FEE_RPC_TIMEOUT_MS" => Some("-5".to_owned()),
            _ => None,
        });
        let defaults = AdapterConfig::default();
        assert!(!config.allow_eth_sign);
        assert_eq!(config.fee_preset_multipliers_bps, defaults.fee_preset_multipliers_bps);
        assert_eq!(config.fee_rpc_timeout_ms, defaults.fee_rpc_timeout_ms);
    }
}
