//! Device descriptor fetching.
//!
//! The descriptor at an SSDP `LOCATION` names the room and carries the UDN
//! whose last `:`-separated segment is the device identity.

use std::time::Duration;

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use reqwest::Client;

use crate::sonos::xml::decode_entities;
use crate::utils::identity_token;

/// Fields read from a device descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescription {
    /// Identity token derived from `UDN`.
    pub id: String,
    pub room_name: Option<String>,
    pub friendly_name: Option<String>,
    pub model_name: Option<String>,
}

impl DeviceDescription {
    /// Room name if present, otherwise the friendly name.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.room_name
            .as_deref()
            .or(self.friendly_name.as_deref())
    }
}

/// Fetches and parses a descriptor, giving up after `timeout`.
///
/// Failures are logged at debug level and reported as `None`; callers fall
/// back to SSDP data.
pub async fn fetch_device_description(
    client: &Client,
    url: &str,
    timeout: Duration,
) -> Option<DeviceDescription> {
    let response = match client.get(url).timeout(timeout).send().await {
        Ok(r) if r.status().is_success() => r,
        Ok(r) => {
            log::debug!("[Discovery] Descriptor {} returned {}", url, r.status());
            return None;
        }
        Err(e) => {
            log::debug!("[Discovery] Descriptor fetch {} failed: {}", url, e);
            return None;
        }
    };
    let body = response.text().await.ok()?;
    parse_device_description(&body)
}

/// Parses descriptor XML. Only the first (root) device's fields are used;
/// embedded sub-devices repeat UDN and friendlyName.
pub fn parse_device_description(xml: &str) -> Option<DeviceDescription> {
    let mut reader = Reader::from_str(xml);

    let mut udn = None;
    let mut room_name = None;
    let mut friendly_name = None;
    let mut model_name = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let slot = match e.local_name().as_ref() {
                    b"UDN" => &mut udn,
                    b"roomName" => &mut room_name,
                    b"friendlyName" => &mut friendly_name,
                    b"modelName" => &mut model_name,
                    b"deviceList" => break,
                    _ => continue,
                };
                let end = e.to_end().into_owned();
                if slot.is_none() {
                    *slot = reader
                        .read_text(end.name())
                        .ok()
                        .map(|t| decode_entities(t.trim()))
                        .filter(|t| !t.is_empty());
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                log::trace!("[Discovery] Error parsing device description: {}", e);
                break;
            }
            _ => {}
        }
    }

    let id = identity_token(&udn?);
    if id.is_empty() {
        return None;
    }
    Some(DeviceDescription {
        id,
        room_name,
        friendly_name,
        model_name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTION: &str = r#"<?xml version="1.0" encoding="utf-8" ?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <specVersion><major>1</major><minor>0</minor></specVersion>
  <device>
    <deviceType>urn:schemas-upnp-org:device:ZonePlayer:1</deviceType>
    <friendlyName>192.168.1.10 - Sonos One - RINCON_ABC12345678901400</friendlyName>
    <manufacturer>Sonos, Inc.</manufacturer>
    <modelName>Sonos One</modelName>
    <UDN>uuid:RINCON_ABC12345678901400</UDN>
    <roomName>Kitchen &amp; Dining</roomName>
    <deviceList>
      <device>
        <friendlyName>Media Renderer</friendlyName>
        <UDN>uuid:RINCON_ABC12345678901400_MR</UDN>
      </device>
    </deviceList>
  </device>
</root>"#;

    #[test]
    fn parses_root_device_fields() {
        let desc = parse_device_description(DESCRIPTION).expect("description");
        assert_eq!(desc.id, "RINCON_ABC12345678901400");
        assert_eq!(desc.room_name.as_deref(), Some("Kitchen & Dining"));
        assert_eq!(desc.model_name.as_deref(), Some("Sonos One"));
        assert_eq!(desc.display_name(), Some("Kitchen & Dining"));
    }

    #[test]
    fn falls_back_to_friendly_name() {
        let xml = "<root><device><friendlyName>Office</friendlyName><UDN>uuid:RINCON_1</UDN></device></root>";
        let desc = parse_device_description(xml).expect("description");
        assert_eq!(desc.display_name(), Some("Office"));
    }

    #[test]
    fn missing_udn_is_rejected() {
        assert!(parse_device_description("<root><device><roomName>X</roomName></device></root>").is_none());
    }
}
