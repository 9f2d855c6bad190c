use serde::{Deserialize, Serialize};

use crate::display::Alert;
use crate::domain::HostSecurityLevel;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskGate {
    alerts: Vec<Alert>,
    host_security_level: HostSecurityLevel,
    acknowledged: bool,
}

impl RiskGate {
    pub fn new(host_security_level: HostSecurityLevel) -> Self {
        Self {
            alerts: Vec::new(),
            host_security_level,
            acknowledged: false,
        }
    }

    pub fn alerts(&self) -> &[Alert] {
        &self.alerts
    }

    pub fn host_security_level(&self) -> HostSecurityLevel {
        self.host_security_level
    }

    pub fn acknowledged(&self) -> bool {
        self.acknowledged
    }

    /// Replaces the alert set. Returns `true` when the set changed, in which
    /// case any earlier acknowledgement is dropped.
    pub fn set_alerts(&mut self, alerts: Vec<Alert>) -> bool {
        if self.alerts == alerts {
            return false;
        }
        self.alerts = alerts;
        self.acknowledged = false;
        true
    }

    pub fn set_host_security_level(&mut self, level: HostSecurityLevel) -> bool {
        if self.host_security_level == level {
            return false;
        }
        self.host_security_level = level;
        self.acknowledged = false;
        true
    }

    pub fn acknowledge(&mut self, acknowledged: bool) {
        self.acknowledged = acknowledged;
    }

    pub fn requires_acknowledgement(&self) -> bool {
        !self.alerts.is_empty() || self.host_security_level != HostSecurityLevel::Trusted
    }

    pub fn can_confirm(&self) -> bool {
        self.acknowledged || !self.requires_acknowledgement()
    }
}
