//! Centralized error types for the sonovol core library.
//!
//! Each layer defines its own `thiserror` enum next to the code that raises
//! it. This module adds the command-level error, the [`CoreError`] umbrella
//! and the [`ErrorCode`] trait that gives every error a stable machine code.

use thiserror::Error;

use crate::context::NetworkError;
use crate::sonos::discovery::DiscoveryError;
use crate::sonos::gena_client::GenaError;
use crate::sonos::soap::SoapError;
use crate::sonos::zone_groups::TopologyError;

/// Trait for error types that provide machine-readable error codes.
pub trait ErrorCode {
    /// Returns a machine-readable error code.
    fn code(&self) -> &'static str;
}

impl ErrorCode for DiscoveryError {
    fn code(&self) -> &'static str {
        match self {
            Self::SocketBind(_) => "socket_bind_failed",
            Self::NoInterfaces => "no_network_interfaces",
        }
    }
}

impl ErrorCode for SoapError {
    fn code(&self) -> &'static str {
        match self {
            Self::Http(_) => "http_request_failed",
            Self::Timeout(_) => "request_timeout",
            Self::HttpStatus(_, _) => "http_error_status",
            Self::Fault(_) => "soap_fault",
            Self::Parse(_) => "soap_parse_error",
        }
    }
}

impl ErrorCode for GenaError {
    fn code(&self) -> &'static str {
        match self {
            Self::Http(_) => "http_request_failed",
            Self::Timeout(_) => "request_timeout",
            Self::SubscriptionFailed(_) => "gena_subscription_failed",
            Self::RenewalFailed(_) => "gena_renewal_failed",
            Self::MissingSid => "gena_missing_sid",
            Self::InvalidMethod(_) => "gena_invalid_method",
        }
    }
}

impl ErrorCode for TopologyError {
    fn code(&self) -> &'static str {
        match self {
            Self::Unreachable(_) => "topology_unreachable",
            Self::Malformed(_) => "topology_malformed",
            Self::Inconsistent(_) => "topology_inconsistent",
            Self::Soap(e) => e.code(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command errors
// ─────────────────────────────────────────────────────────────────────────────

/// Errors from the command router.
#[derive(Debug, Error)]
pub enum CommandError {
    /// A per-device command was issued with nothing selected.
    #[error("no device selected")]
    NoDeviceSelected,

    /// The id or name matches no device in the current snapshot.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// Two or more groups are playing sources of equal priority.
    #[error("cannot choose a coordinator between {}", candidates.join(", "))]
    AmbiguousCoordinator { candidates: Vec<String> },

    /// The requested grouping makes no sense (self-join, satellite target).
    #[error("invalid grouping: {0}")]
    InvalidGrouping(String),

    #[error(transparent)]
    Soap(#[from] SoapError),

    #[error(transparent)]
    Topology(#[from] TopologyError),
}

/// Convenient Result alias for router operations.
pub type CommandResult<T> = Result<T, CommandError>;

impl ErrorCode for CommandError {
    fn code(&self) -> &'static str {
        match self {
            Self::NoDeviceSelected => "no_device_selected",
            Self::DeviceNotFound(_) => "device_not_found",
            Self::AmbiguousCoordinator { .. } => "ambiguous_coordinator",
            Self::InvalidGrouping(_) => "invalid_grouping",
            Self::Soap(e) => e.code(),
            Self::Topology(e) => e.code(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Umbrella
// ─────────────────────────────────────────────────────────────────────────────

/// The four failures a user gets to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserFacing {
    NoDevicesFound,
    SpeakerUnreachable,
    AmbiguousGrouping,
    NetworkUnavailable,
}

impl UserFacing {
    #[must_use]
    pub fn message(&self) -> &'static str {
        match self {
            Self::NoDevicesFound => "no devices found",
            Self::SpeakerUnreachable => "speaker unreachable",
            Self::AmbiguousGrouping => "ambiguous grouping — pick a source",
            Self::NetworkUnavailable => "permission/network unavailable",
        }
    }
}

/// Application-wide error type.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("no devices found")]
    NoDevicesFound,

    #[error("topology: {0}")]
    Topology(#[from] TopologyError),

    #[error("command: {0}")]
    Command(#[from] CommandError),

    #[error("subscription: {0}")]
    Gena(#[from] GenaError),

    #[error("network: {0}")]
    Network(#[from] NetworkError),

    /// The notification listener could not bind.
    #[error("listener: {0}")]
    Listener(#[source] std::io::Error),

    #[error("configuration: {0}")]
    Configuration(String),
}

/// Convenient Result alias for engine-level operations.
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Which of the user-visible failures this error is.
    #[must_use]
    pub fn user_facing(&self) -> UserFacing {
        match self {
            Self::NoDevicesFound => UserFacing::NoDevicesFound,
            Self::Command(CommandError::NoDeviceSelected | CommandError::DeviceNotFound(_)) => {
                UserFacing::NoDevicesFound
            }
            Self::Command(CommandError::AmbiguousCoordinator { .. }) => {
                UserFacing::AmbiguousGrouping
            }
            Self::Command(_) | Self::Topology(_) | Self::Gena(_) => UserFacing::SpeakerUnreachable,
            Self::Discovery(_)
            | Self::Network(_)
            | Self::Listener(_)
            | Self::Configuration(_) => UserFacing::NetworkUnavailable,
        }
    }

    /// Short message suitable for a notification or status line.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        self.user_facing().message()
    }
}

impl ErrorCode for CoreError {
    fn code(&self) -> &'static str {
        match self {
            Self::Discovery(e) => e.code(),
            Self::NoDevicesFound => "no_devices_found",
            Self::Topology(e) => e.code(),
            Self::Command(e) => e.code(),
            Self::Gena(e) => e.code(),
            Self::Network(_) => "network_error",
            Self::Listener(_) => "listener_bind_failed",
            Self::Configuration(_) => "configuration_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ambiguous_coordinator_maps_to_pick_a_source() {
        let err = CoreError::from(CommandError::AmbiguousCoordinator {
            candidates: vec!["Kitchen".into(), "Office".into()],
        });
        assert_eq!(err.user_facing(), UserFacing::AmbiguousGrouping);
        assert_eq!(err.code(), "ambiguous_coordinator");
        assert!(err.to_string().contains("Kitchen, Office"));
    }

    #[test]
    fn transport_failures_read_as_unreachable() {
        let err = CoreError::from(CommandError::Soap(SoapError::Timeout("10.0.0.2".into())));
        assert_eq!(err.user_message(), "speaker unreachable");
        assert_eq!(err.code(), "request_timeout");

        let err = CoreError::from(TopologyError::Unreachable("none answered".into()));
        assert_eq!(err.user_facing(), UserFacing::SpeakerUnreachable);
    }

    #[test]
    fn permission_problems_read_as_network_unavailable() {
        let io = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        let err = CoreError::from(DiscoveryError::SocketBind(io));
        assert_eq!(err.user_message(), "permission/network unavailable");
    }

    #[test]
    fn empty_network_reads_as_no_devices() {
        assert_eq!(CoreError::NoDevicesFound.user_message(), "no devices found");
        assert_eq!(
            CoreError::from(CommandError::NoDeviceSelected).user_facing(),
            UserFacing::NoDevicesFound
        );
    }
}
