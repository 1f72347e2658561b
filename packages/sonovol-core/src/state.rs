//! Engine configuration.
//!
//! [`Config`] carries every tunable the engine uses. Values that are fixed by
//! the protocols themselves live in [`protocol_constants`](crate::protocol_constants).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol_constants::{
    EVENT_CHANNEL_CAPACITY, GENA_RENEWAL_FRACTION, GENA_SUBSCRIPTION_TIMEOUT_SECS,
    SOAP_TIMEOUT_SECS,
};

/// Configuration for volume handling in the command router.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct VolumeConfig {
    /// Step applied by `volume_up` / `volume_down`.
    pub step: u8,

    /// Window in which a burst of volume changes is coalesced (milliseconds).
    pub debounce_ms: u64,
}

impl VolumeConfig {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.step == 0 || self.step > 100 {
            return Err("volume.step must be within 1..=100".to_string());
        }
        Ok(())
    }

    /// Debounce window as a [`Duration`].
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            step: 5,
            debounce_ms: 150,
        }
    }
}

/// Configuration for the Sonovol engine.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    // Callback listener
    /// Port for the GENA callback listener (0 = auto-allocate).
    pub callback_port: u16,

    /// IP address advertised to speakers in CALLBACK headers.
    /// Auto-detected when unset.
    pub advertise_ip: Option<String>,

    // Discovery
    /// Number of M-SEARCH packets to send during discovery.
    pub ssdp_send_count: u64,

    /// Delay between M-SEARCH packets (milliseconds).
    pub ssdp_retry_delay_ms: u64,

    /// Total discovery listen window (milliseconds).
    pub discovery_timeout_ms: u64,

    /// Timeout for fetching a device descriptor (milliseconds).
    pub description_timeout_ms: u64,

    /// Interval for refreshing the topology (seconds).
    pub topology_refresh_interval: u64,

    // Control / eventing
    /// Timeout for SOAP requests (seconds).
    pub soap_timeout_secs: u64,

    /// Subscription duration requested in SUBSCRIBE (seconds).
    pub gena_timeout_secs: u64,

    /// Fraction of the granted duration after which a subscription is renewed.
    pub gena_renewal_fraction: f64,

    /// Volume behaviour.
    pub volume: VolumeConfig,

    /// Capacity of the event broadcast channel.
    pub event_channel_capacity: usize,
}

impl Config {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.ssdp_send_count == 0 {
            return Err("ssdp_send_count must be >= 1".to_string());
        }
        if self.discovery_timeout_ms == 0 {
            return Err("discovery_timeout_ms must be > 0".to_string());
        }
        if self.topology_refresh_interval == 0 {
            return Err("topology_refresh_interval must be > 0".to_string());
        }
        if !(self.gena_renewal_fraction > 0.0 && self.gena_renewal_fraction < 1.0) {
            return Err("gena_renewal_fraction must be within (0, 1)".to_string());
        }
        if self.gena_timeout_secs == 0 {
            return Err("gena_timeout_secs must be > 0".to_string());
        }
        if self.event_channel_capacity == 0 {
            return Err(
                "event_channel_capacity must be >= 1 (broadcast::channel panics on 0)".to_string(),
            );
        }
        self.volume.validate()
    }

    #[must_use]
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    #[must_use]
    pub fn description_timeout(&self) -> Duration {
        Duration::from_millis(self.description_timeout_ms)
    }

    #[must_use]
    pub fn soap_timeout(&self) -> Duration {
        Duration::from_secs(self.soap_timeout_secs)
    }

    #[must_use]
    pub fn topology_refresh(&self) -> Duration {
        Duration::from_secs(self.topology_refresh_interval)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            callback_port: 0,
            advertise_ip: None,
            ssdp_send_count: 3,
            ssdp_retry_delay_ms: 500,
            discovery_timeout_ms: 5000,
            description_timeout_ms: 3000,
            topology_refresh_interval: 30,
            soap_timeout_secs: SOAP_TIMEOUT_SECS,
            gena_timeout_secs: GENA_SUBSCRIPTION_TIMEOUT_SECS,
            gena_renewal_fraction: GENA_RENEWAL_FRACTION,
            volume: VolumeConfig::default(),
            event_channel_capacity: EVENT_CHANNEL_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn renewal_fraction_outside_unit_interval_is_rejected() {
        let config = Config {
            gena_renewal_fraction: 1.0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_volume_step_is_rejected() {
        let mut config = Config::default();
        config.volume.step = 0;
        assert_eq!(
            config.validate().unwrap_err(),
            "volume.step must be within 1..=100"
        );
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: Config = serde_json::from_str(r#"{"callback_port": 3400}"#).unwrap();
        assert_eq!(config.callback_port, 3400);
        assert_eq!(config.ssdp_send_count, 3);
        assert_eq!(config.volume.step, 5);
    }
}
