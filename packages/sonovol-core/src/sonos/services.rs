//! UPnP service definitions.
//!
//! Single source of truth for the service URNs, control paths and event
//! paths shared by SOAP commands and GENA subscriptions.

use serde::Serialize;

/// UPnP services used for control and event subscriptions.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SonosService {
    /// Transport control (play, pause, next, previous, transport URI).
    AVTransport,
    /// Group volume and mute, answered by the group coordinator.
    GroupRenderingControl,
    /// Per-speaker volume and mute.
    RenderingControl,
    /// Group-state document and its change notifications.
    ZoneGroupTopology,
}

impl SonosService {
    /// Services subscribed on every known device.
    pub const PER_DEVICE: [SonosService; 3] = [
        SonosService::AVTransport,
        SonosService::RenderingControl,
        SonosService::GroupRenderingControl,
    ];

    /// Device-relative path shared by the control and event endpoints.
    fn base_path(&self) -> &'static str {
        match self {
            Self::AVTransport => "/MediaRenderer/AVTransport",
            Self::GroupRenderingControl => "/MediaRenderer/GroupRenderingControl",
            Self::RenderingControl => "/MediaRenderer/RenderingControl",
            Self::ZoneGroupTopology => "/ZoneGroupTopology",
        }
    }

    #[must_use]
    pub fn urn(&self) -> &'static str {
        macro_rules! upnp_urn {
            ($name:literal) => {
                concat!("urn:schemas-upnp-org:service:", $name, ":1")
            };
        }
        match self {
            Self::AVTransport => upnp_urn!("AVTransport"),
            Self::GroupRenderingControl => upnp_urn!("GroupRenderingControl"),
            Self::RenderingControl => upnp_urn!("RenderingControl"),
            Self::ZoneGroupTopology => upnp_urn!("ZoneGroupTopology"),
        }
    }

    /// SOAP endpoint, relative to `http://<ip>:1400`.
    #[must_use]
    pub fn control_path(&self) -> String {
        format!("{}/Control", self.base_path())
    }

    /// GENA endpoint, relative to `http://<ip>:1400`.
    #[must_use]
    pub fn event_path(&self) -> String {
        format!("{}/Event", self.base_path())
    }

    /// Short name used in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::AVTransport => "AVTransport",
            Self::GroupRenderingControl => "GroupRenderingControl",
            Self::RenderingControl => "RenderingControl",
            Self::ZoneGroupTopology => "ZoneGroupTopology",
        }
    }
}

impl std::fmt::Display for SonosService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_device_services_exclude_topology() {
        assert!(!SonosService::PER_DEVICE.contains(&SonosService::ZoneGroupTopology));
    }

    #[test]
    fn endpoints_and_urns() {
        let service = SonosService::GroupRenderingControl;
        assert_eq!(
            service.control_path(),
            "/MediaRenderer/GroupRenderingControl/Control"
        );
        assert_eq!(
            service.event_path(),
            "/MediaRenderer/GroupRenderingControl/Event"
        );
        assert_eq!(
            service.urn(),
            "urn:schemas-upnp-org:service:GroupRenderingControl:1"
        );
        assert_eq!(
            SonosService::ZoneGroupTopology.event_path(),
            "/ZoneGroupTopology/Event"
        );
    }
}
