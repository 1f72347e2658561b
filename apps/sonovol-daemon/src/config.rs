//! Daemon configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::net::IpAddr;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Daemon configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Port for the event callback listener (0 = any free port).
    /// Override: `SONOVOL_CALLBACK_PORT`
    pub callback_port: u16,

    /// IP address to advertise to the speakers in subscription callbacks.
    /// If not specified, auto-detection will be attempted.
    /// Override: `SONOVOL_ADVERTISE_IP`
    pub advertise_ip: Option<IpAddr>,

    /// Interval in seconds between topology refresh checks.
    /// Override: `SONOVOL_TOPOLOGY_REFRESH_INTERVAL`
    pub topology_refresh_interval: u64,

    /// SSDP listen window in milliseconds.
    pub discovery_timeout_ms: u64,

    /// Number of M-SEARCH packets per discovery pass.
    pub ssdp_send_count: u64,

    /// Step for volume up/down.
    pub volume_step: u8,

    /// Window for coalescing volume bursts, in milliseconds.
    pub volume_debounce_ms: u64,

    /// Device (id or room name) selected at startup.
    /// Override: `SONOVOL_DEVICE`
    pub device: Option<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        let core = sonovol_core::Config::default();
        Self {
            callback_port: 0,
            advertise_ip: None,
            topology_refresh_interval: core.topology_refresh_interval,
            discovery_timeout_ms: core.discovery_timeout_ms,
            ssdp_send_count: core.ssdp_send_count,
            volume_step: core.volume.step,
            volume_debounce_ms: core.volume.debounce_ms,
            device: None,
        }
    }
}

impl DaemonConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies `SONOVOL_*` overrides read through `lookup`.
    ///
    /// Unparseable values are ignored with a warning.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("SONOVOL_CALLBACK_PORT") {
            match val.parse() {
                Ok(port) => self.callback_port = port,
                Err(_) => log::warn!("Ignoring invalid SONOVOL_CALLBACK_PORT: {}", val),
            }
        }

        if let Some(val) = lookup("SONOVOL_ADVERTISE_IP") {
            match val.parse() {
                Ok(ip) => self.advertise_ip = Some(ip),
                Err(_) => log::warn!("Ignoring invalid SONOVOL_ADVERTISE_IP: {}", val),
            }
        }

        if let Some(val) = lookup("SONOVOL_TOPOLOGY_REFRESH_INTERVAL") {
            match val.parse() {
                Ok(interval) => self.topology_refresh_interval = interval,
                Err(_) => log::warn!(
                    "Ignoring invalid SONOVOL_TOPOLOGY_REFRESH_INTERVAL: {}",
                    val
                ),
            }
        }

        if let Some(val) = lookup("SONOVOL_DEVICE") {
            if !val.trim().is_empty() {
                self.device = Some(val.trim().to_string());
            }
        }

        // Note: SONOVOL_LOG_LEVEL is handled by clap via #[arg(env = ...)] in main.rs
    }

    /// Converts to sonovol-core's Config type.
    pub fn to_core_config(&self) -> sonovol_core::Config {
        let defaults = sonovol_core::Config::default();
        sonovol_core::Config {
            callback_port: self.callback_port,
            advertise_ip: self.advertise_ip.map(|ip| ip.to_string()),
            topology_refresh_interval: self.topology_refresh_interval,
            discovery_timeout_ms: self.discovery_timeout_ms,
            ssdp_send_count: self.ssdp_send_count,
            volume: sonovol_core::VolumeConfig {
                step: self.volume_step,
                debounce_ms: self.volume_debounce_ms,
            },
            ..defaults
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn missing_file_means_defaults() {
        let config = DaemonConfig::load(None).expect("config");
        assert_eq!(config.volume_step, 5);
        assert_eq!(config.volume_debounce_ms, 150);
    }

    #[test]
    fn loads_partial_yaml() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "callback_port: 3400\nadvertise_ip: 192.168.1.5\nvolume_step: 2\ndevice: Kitchen"
        )
        .expect("write");

        let config = DaemonConfig::load(Some(file.path())).expect("config");
        assert_eq!(config.callback_port, 3400);
        assert_eq!(config.advertise_ip, Some("192.168.1.5".parse().expect("ip")));
        assert_eq!(config.volume_step, 2);
        assert_eq!(config.device.as_deref(), Some("Kitchen"));
        assert_eq!(config.topology_refresh_interval, 30);
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "callback_port: [not, a, port]").expect("write");
        assert!(DaemonConfig::load(Some(file.path())).is_err());
    }

    #[test]
    fn overrides_replace_file_values() {
        let env: HashMap<&str, &str> = [
            ("SONOVOL_CALLBACK_PORT", "3500"),
            ("SONOVOL_ADVERTISE_IP", "10.0.0.7"),
            ("SONOVOL_TOPOLOGY_REFRESH_INTERVAL", "not-a-number"),
            ("SONOVOL_DEVICE", " Bath "),
        ]
        .into_iter()
        .collect();

        let mut config = DaemonConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.callback_port, 3500);
        assert_eq!(config.advertise_ip, Some("10.0.0.7".parse().expect("ip")));
        assert_eq!(config.topology_refresh_interval, 30);
        assert_eq!(config.device.as_deref(), Some("Bath"));
    }

    #[test]
    fn core_config_carries_values() {
        let config = DaemonConfig {
            advertise_ip: Some("192.168.1.5".parse().expect("ip")),
            volume_step: 10,
            ..DaemonConfig::default()
        };
        let core = config.to_core_config();
        assert_eq!(core.advertise_ip.as_deref(), Some("192.168.1.5"));
        assert_eq!(core.volume.step, 10);
        assert!(core.validate().is_ok());
    }
}
