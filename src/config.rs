use crate::error::{CecError, Result};
use crate::types::{Capabilities, CecPowerStatus, CEC_MAX_LOG_ADDRS};

/**
 * Fixed properties of an adapter, given by its driver.
 * ```
 * # use cec_core::{AdapterConfig, Capabilities};
 * let cfg = AdapterConfig::new("hdmi0")
 *     .with_capabilities(Capabilities::TRANSMIT | Capabilities::RECEIVE | Capabilities::LOG_ADDRS)
 *     .with_available_log_addrs(2);
 * assert!(cfg.validate().is_ok());
 * ```
 */
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AdapterConfig {
    /// Used in log records and worker thread names.
    pub name: String,
    pub capabilities: Capabilities,
    /// How many logical addresses the hardware can acknowledge at once.
    pub available_log_addrs: u8,
    /// Sink (e.g. a TV input) or source role. Decides which side of
    /// ARC and CDC hotplug the core plays.
    pub is_sink: bool,
    /// Reported in answer to Give Device Power Status.
    pub power_status: CecPowerStatus,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            name: "cec".to_string(),
            capabilities: Capabilities::STATE
                | Capabilities::PHYS_ADDR
                | Capabilities::LOG_ADDRS
                | Capabilities::TRANSMIT
                | Capabilities::RECEIVE
                | Capabilities::VENDOR_ID
                | Capabilities::PASSTHROUGH,
            available_log_addrs: 1,
            is_sink: false,
            power_status: CecPowerStatus::On,
        }
    }
}

impl AdapterConfig {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }
    pub fn with_available_log_addrs(mut self, n: u8) -> Self {
        self.available_log_addrs = n;
        self
    }
    pub fn with_sink(mut self, is_sink: bool) -> Self {
        self.is_sink = is_sink;
        self
    }
    pub fn with_power_status(mut self, status: CecPowerStatus) -> Self {
        self.power_status = status;
        self
    }
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(CecError::InvalidArgument("adapter name is empty"));
        }
        if self.available_log_addrs == 0 || self.available_log_addrs as usize > CEC_MAX_LOG_ADDRS {
            return Err(CecError::InvalidArgument("available_log_addrs must be 1..=4"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_address_count() {
        assert!(AdapterConfig::default().with_available_log_addrs(0).validate().is_err());
        assert!(AdapterConfig::default().with_available_log_addrs(5).validate().is_err());
        assert!(AdapterConfig::default().with_available_log_addrs(4).validate().is_ok());
        assert!(AdapterConfig::new("").validate().is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn config_from_json() {
        let cfg = AdapterConfig::new("hdmi1")
            .with_capabilities(Capabilities::TRANSMIT | Capabilities::ARC)
            .with_sink(true)
            .with_power_status(CecPowerStatus::Standby);
        let json = serde_json::to_string(&cfg).unwrap();
        assert_eq!(serde_json::from_str::<AdapterConfig>(&json).unwrap(), cfg);

        // missing fields take the defaults
        let cfg: AdapterConfig = serde_json::from_str(r#"{"name":"tv","is_sink":true}"#).unwrap();
        assert_eq!(cfg, AdapterConfig::new("tv").with_sink(true));
    }
}
