use sigconfirm_core::ports::HostSecurityPort;
use sigconfirm_core::{HostSecurityLevel, PortError};

use crate::config::AdapterConfig;

/// Classifies dApp origins against configured allow and block lists. A list
/// entry matches the host itself and any subdomain.
#[derive(Debug, Clone, Default)]
pub struct HostListAdapter {
    trusted: Vec<String>,
    blocked: Vec<String>,
}

impl HostListAdapter {
    pub fn new(trusted: Vec<String>, blocked: Vec<String>) -> Self {
        let normalize = |hosts: Vec<String>| -> Vec<String> {
            hosts
                .into_iter()
                .filter_map(|host| host_of(&host))
                .collect()
        };
        Self {
            trusted: normalize(trusted),
            blocked: normalize(blocked),
        }
    }

    pub fn with_config(config: &AdapterConfig) -> Self {
        Self::new(config.trusted_hosts.clone(), config.blocked_hosts.clone())
    }
}

fn host_of(origin: &str) -> Option<String> {
    let origin = origin.trim().to_ascii_lowercase();
    let rest = origin
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(origin.as_str());
    let authority = rest.split(['/', '?', '#']).next()?;
    let host = authority.rsplit_once('@').map(|(_, h)| h).unwrap_or(authority);
    let host = host.split(':').next()?.trim_end_matches('.');
    (!host.is_empty()).then(|| host.to_owned())
}

fn matches_any(host: &str, list: &[String]) -> bool {
    list.iter()
        .any(|entry| host == entry || host.ends_with(&format!(".{entry}")))
}

fn is_local(host: &str) -> bool {
    host == "localhost" || host == "127.0.0.1" || host.ends_with(".localhost")
}

impl HostSecurityPort for HostListAdapter {
    fn classify_host(&self, origin: &str) -> Result<HostSecurityLevel, PortError> {
        let host = host_of(origin)
            .ok_or_else(|| PortError::Validation(format!("origin has no host: {origin}")))?;
        if matches_any(&host, &self.blocked) {
            return Ok(HostSecurityLevel::Malicious);
        }
        if matches_any(&host, &self.trusted) {
            return Ok(HostSecurityLevel::Trusted);
        }
        if origin.trim().to_ascii_lowercase().starts_with("http://") && !is_local(&host) {
            return Ok(HostSecurityLevel::Risky);
        }
        Ok(HostSecurityLevel::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigconfirm_core::SourceInfo;

    fn adapter() -> HostListAdapter {
        HostListAdapter::new(
            vec!["app.uniswap.org".to_owned()],
            vec!["https://evil.example".to_owned()],
        )
    }

    #[test]
    fn lists_match_subdomains() {
        let hosts = adapter();
        assert_eq!(
            hosts.classify_host("https://app.uniswap.org/#/swap").expect("classify"),
            HostSecurityLevel::Trusted
        );
        assert_eq!(
            hosts.classify_host("https://claim.evil.example:8443").expect("classify"),
            HostSecurityLevel::Malicious
        );
        assert_eq!(
            hosts.classify_host("https://notuniswap.org").expect("classify"),
            HostSecurityLevel::Unknown
        );
    }

    #[test]
    fn plain_http_is_risky_except_localhost() {
        let hosts = adapter();
        assert_eq!(
            hosts.classify_host("http://dapp.example").expect("classify"),
            HostSecurityLevel::Risky
        );
        assert_eq!(
            hosts.classify_host("http://localhost:3000").expect("classify"),
            HostSecurityLevel::Unknown
        );
    }

    #[test]
    fn internal_sources_are_trusted() {
        assert_eq!(
            adapter().classify(&SourceInfo::internal()).expect("classify"),
            HostSecurityLevel::Trusted
        );
        assert!(adapter().classify(&SourceInfo::dapp("https://")).is_err());
    }
}
