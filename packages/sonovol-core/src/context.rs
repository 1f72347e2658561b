//! Where the speakers can reach us.
//!
//! Devices deliver event notifications to a callback URL made of an address
//! on our side and the port the listener bound. The port is unknown until
//! the listener is up and the address can change under a long-running
//! process (DHCP renewal, interface switch), so both are shared cells.

use std::net::IpAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Notify;

use crate::protocol_constants::GENA_CALLBACK_PATH;

/// Listener port and advertised address, shared across services.
#[derive(Clone)]
pub struct NetworkContext {
    /// 0 until the listener has bound.
    port: Arc<RwLock<u16>>,
    /// Woken once the port is published.
    pub port_notify: Arc<Notify>,
    local_ip: Arc<RwLock<String>>,
    /// `None` when the address was configured explicitly.
    ip_detector: Option<Arc<dyn IpDetector>>,
}

impl NetworkContext {
    fn with(local_ip: String, ip_detector: Option<Arc<dyn IpDetector>>) -> Self {
        Self {
            port: Arc::new(RwLock::new(0)),
            port_notify: Arc::new(Notify::new()),
            local_ip: Arc::new(RwLock::new(local_ip)),
            ip_detector,
        }
    }

    /// Uses a fixed advertise address; it is never re-detected.
    #[must_use]
    pub fn explicit(advertise_ip: IpAddr) -> Self {
        Self::with(advertise_ip.to_string(), None)
    }

    /// Detects the address now and again on every [`refresh_local_ip`](Self::refresh_local_ip).
    ///
    /// # Errors
    /// The detector's error when no usable interface is found.
    pub fn auto_detect(ip_detector: Arc<dyn IpDetector>) -> Result<Self, NetworkError> {
        let local_ip = ip_detector.detect()?;
        Ok(Self::with(local_ip, Some(ip_detector)))
    }

    /// Re-detects the address and stores it if it moved. Returns `true` on
    /// change; explicit contexts never change.
    pub fn refresh_local_ip(&self) -> bool {
        let Some(detector) = &self.ip_detector else {
            return false;
        };
        let ip = match detector.detect() {
            Ok(ip) => ip,
            Err(e) => {
                log::debug!("[Network] Address detection failed: {}", e);
                return false;
            }
        };
        if *self.local_ip.read() == ip {
            return false;
        }
        log::info!("[Network] Local address changed to {}", ip);
        *self.local_ip.write() = ip;
        true
    }

    #[must_use]
    pub fn get_port(&self) -> u16 {
        *self.port.read()
    }

    #[must_use]
    pub fn get_local_ip(&self) -> String {
        self.local_ip.read().clone()
    }

    /// Publishes the bound port and wakes anyone waiting for it.
    pub fn set_port(&self, port: u16) {
        *self.port.write() = port;
        self.port_notify.notify_waiters();
    }

    /// Callback URL handed to devices in `SUBSCRIBE`.
    #[must_use]
    pub fn gena_callback_url(&self) -> String {
        format!(
            "http://{}:{}{}",
            self.get_local_ip(),
            self.get_port(),
            GENA_CALLBACK_PATH
        )
    }
}

/// Detects the local IP address.
pub trait IpDetector: Send + Sync {
    fn detect(&self) -> Result<String, NetworkError>;
}

/// Asks the OS for the address of the default-route interface.
#[derive(Debug, Clone, Default)]
pub struct LocalIpDetector;

impl LocalIpDetector {
    #[must_use]
    pub fn arc() -> Arc<dyn IpDetector> {
        Arc::new(Self)
    }
}

impl IpDetector for LocalIpDetector {
    fn detect(&self) -> Result<String, NetworkError> {
        local_ip_address::local_ip()
            .map(|ip| ip.to_string())
            .map_err(|e| NetworkError::Detection(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("Failed to detect local IP: {0}")]
    Detection(String),

    #[error("Invalid advertise address {0}")]
    InvalidAddress(String),
}
