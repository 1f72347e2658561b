//! SSDP multicast search for zone players.
//!
//! One socket per usable IPv4 interface sends the M-SEARCH and receives the
//! unicast replies. Sends are repeated with fixed spacing; replies are
//! forwarded as they arrive until a single deadline set by the caller.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use local_ip_address::list_afinet_netifas;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};

use super::types::{is_virtual_interface, DiscoveryError, DiscoveryResult, SsdpResponse};
use crate::protocol_constants::{
    SSDP_MULTICAST_ADDR, SSDP_PORT, SSDP_RECV_BUFFER_SIZE, SSDP_SEARCH_TARGET,
};
use crate::utils::identity_token;

/// Configuration for one SSDP search.
#[derive(Debug, Clone)]
pub struct SsdpConfig {
    /// Number of M-SEARCH packets to send per interface.
    pub send_count: u64,
    /// Delay between sends.
    pub send_spacing: Duration,
    /// Total listen window, measured from the first send.
    pub window: Duration,
    /// MX value (max response delay in seconds).
    pub mx: u64,
}

impl Default for SsdpConfig {
    fn default() -> Self {
        Self {
            send_count: 3,
            send_spacing: Duration::from_millis(500),
            window: Duration::from_secs(5),
            mx: 1,
        }
    }
}

/// Builds the M-SEARCH request.
fn build_msearch_message(mx: u64) -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: {}:{}\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: {}\r\n\
         ST: {}\r\n\r\n",
        SSDP_MULTICAST_ADDR, SSDP_PORT, mx, SSDP_SEARCH_TARGET
    )
}

/// Returns the value of an HTTP-style header (case-insensitive name).
fn header_value<'a>(response: &'a str, name: &str) -> Option<&'a str> {
    response.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.trim().eq_ignore_ascii_case(name) {
            Some(value.trim())
        } else {
            None
        }
    })
}

/// Parses a reply datagram.
///
/// Returns `None` for anything that is not a zone player: replies must
/// carry a `LOCATION` or a `RINCON_` identity in their `USN`.
fn parse_ssdp_response(response: &str, src_ip: &str) -> Option<SsdpResponse> {
    let first_line = response.lines().next()?;
    if !first_line.to_ascii_uppercase().starts_with("HTTP/1.1 200") {
        return None;
    }

    let usn_id = header_value(response, "USN")
        .map(identity_token)
        .filter(|id| id.starts_with("RINCON_"));
    let location = header_value(response, "LOCATION").map(str::to_string);

    let is_zone_player = usn_id.is_some()
        || header_value(response, "ST").is_some_and(|st| st == SSDP_SEARCH_TARGET);
    if !is_zone_player || (location.is_none() && usn_id.is_none()) {
        return None;
    }

    Some(SsdpResponse {
        ip: src_ip.to_string(),
        location,
        usn_id,
    })
}

/// Usable IPv4 interface addresses, skipping loopback and virtual adapters.
fn get_interfaces() -> Vec<(String, Ipv4Addr)> {
    list_afinet_netifas()
        .unwrap_or_else(|e| {
            log::warn!("[SSDP] Failed to list network interfaces: {}", e);
            Vec::new()
        })
        .into_iter()
        .filter_map(|(name, addr)| match addr {
            IpAddr::V4(ipv4) if !ipv4.is_loopback() && !is_virtual_interface(&name) => {
                Some((name, ipv4))
            }
            _ => None,
        })
        .collect()
}

/// Creates a non-blocking UDP socket bound to one interface.
fn create_socket(iface_ip: Ipv4Addr) -> DiscoveryResult<UdpSocket> {
    let bind_addr = SocketAddr::new(IpAddr::V4(iface_ip), 0);

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(DiscoveryError::SocketBind)?;

    if let Err(e) = socket.set_reuse_address(true) {
        log::warn!("[SSDP] Failed to set SO_REUSEADDR on {}: {}", iface_ip, e);
    }

    // UPnP recommends a multicast TTL of 4
    if let Err(e) = socket.set_multicast_ttl_v4(4) {
        log::warn!("[SSDP] Failed to set multicast TTL on {}: {}", iface_ip, e);
    }
    if let Err(e) = socket.set_multicast_if_v4(&iface_ip) {
        log::debug!("[SSDP] Failed to pin multicast interface {}: {}", iface_ip, e);
    }

    socket
        .set_nonblocking(true)
        .map_err(DiscoveryError::SocketBind)?;
    socket
        .bind(&bind_addr.into())
        .map_err(DiscoveryError::SocketBind)?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket).map_err(DiscoveryError::SocketBind)
}

/// Sends M-SEARCH on every interface and forwards replies to `replies` as
/// they arrive, until `deadline`. Returns the number of replies heard.
///
/// The same device may be forwarded several times (once per send, once per
/// interface).
///
/// # Errors
/// Fails only when no socket could be opened at all. A window that hears
/// nothing yields `Ok(0)`.
pub async fn search(
    config: &SsdpConfig,
    deadline: Instant,
    replies: mpsc::UnboundedSender<SsdpResponse>,
) -> DiscoveryResult<usize> {
    let interfaces = get_interfaces();
    if interfaces.is_empty() {
        return Err(DiscoveryError::NoInterfaces);
    }

    let mut sockets: Vec<(String, Arc<UdpSocket>)> = Vec::new();
    let mut last_error = None;
    for (name, ip) in interfaces {
        match create_socket(ip) {
            Ok(socket) => sockets.push((name, Arc::new(socket))),
            Err(e) => {
                log::warn!("[SSDP] Failed to create socket for {} ({}): {}", name, ip, e);
                last_error = Some(e);
            }
        }
    }
    if sockets.is_empty() {
        return Err(last_error.unwrap_or(DiscoveryError::NoInterfaces));
    }

    log::debug!(
        "[SSDP] Searching on {} interface(s) ({} sends, {}ms spacing, {}ms window)",
        sockets.len(),
        config.send_count,
        config.send_spacing.as_millis(),
        config.window.as_millis()
    );

    let target = format!("{}:{}", SSDP_MULTICAST_ADDR, SSDP_PORT);
    let msg = build_msearch_message(config.mx);

    let send_futures = sockets.iter().map(|(name, socket)| {
        let socket = Arc::clone(socket);
        let target = target.clone();
        let msg = msg.clone();
        let name = name.clone();
        let send_count = config.send_count;
        let spacing = config.send_spacing;
        async move {
            for i in 0..send_count {
                if i > 0 {
                    tokio::time::sleep(spacing).await;
                }
                if let Err(e) = socket.send_to(msg.as_bytes(), &target).await {
                    log::warn!(
                        "[SSDP] Failed to send M-SEARCH on {} (attempt {}): {}",
                        name,
                        i + 1,
                        e
                    );
                }
            }
        }
    });

    let recv_futures = sockets.iter().map(|(name, socket)| {
        let socket = Arc::clone(socket);
        let name = name.clone();
        let replies = replies.clone();
        async move {
            let mut heard = 0usize;
            let mut buf = [0u8; SSDP_RECV_BUFFER_SIZE];
            loop {
                match timeout_at(deadline, socket.recv_from(&mut buf)).await {
                    Ok(Ok((amt, src))) => {
                        let response = String::from_utf8_lossy(&buf[..amt]);
                        if let Some(parsed) = parse_ssdp_response(&response, &src.ip().to_string())
                        {
                            log::trace!("[SSDP] Reply from {} via {}", parsed.ip, name);
                            heard += 1;
                            if replies.send(parsed).is_err() {
                                break;
                            }
                        }
                    }
                    Ok(Err(e)) => {
                        log::warn!("[SSDP] Socket recv error on {}: {}", name, e);
                    }
                    Err(_) => break,
                }
            }
            heard
        }
    });

    let (_, received) = tokio::join!(
        futures::future::join_all(send_futures),
        futures::future::join_all(recv_futures)
    );

    let heard: usize = received.into_iter().sum();
    log::debug!("[SSDP] Window closed with {} reply(ies)", heard);
    Ok(heard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msearch_message_targets_zone_players() {
        let msg = build_msearch_message(1);
        assert!(msg.starts_with("M-SEARCH * HTTP/1.1\r\n"));
        assert!(msg.contains("HOST: 239.255.255.250:1900\r\n"));
        assert!(msg.contains("MAN: \"ssdp:discover\"\r\n"));
        assert!(msg.contains("ST: urn:schemas-upnp-org:device:ZonePlayer:1\r\n"));
        assert!(msg.ends_with("\r\n\r\n"));
    }

    #[test]
    fn parses_zone_player_reply() {
        let response = "HTTP/1.1 200 OK\r\n\
CACHE-CONTROL: max-age = 1800\r\n\
LOCATION: http://192.168.1.10:1400/xml/device_description.xml\r\n\
SERVER: Linux UPnP/1.0 Sonos/63.2-88230 (ZPS9)\r\n\
ST: urn:schemas-upnp-org:device:ZonePlayer:1\r\n\
USN: uuid:RINCON_ABC12345678901400::urn:schemas-upnp-org:device:ZonePlayer:1\r\n\r\n";
        let parsed = parse_ssdp_response(response, "192.168.1.10").expect("zone player");
        assert_eq!(parsed.ip, "192.168.1.10");
        assert_eq!(
            parsed.location.as_deref(),
            Some("http://192.168.1.10:1400/xml/device_description.xml")
        );
        assert_eq!(parsed.usn_id.as_deref(), Some("RINCON_ABC12345678901400"));
    }

    #[test]
    fn header_names_are_case_insensitive() {
        let response = "HTTP/1.1 200 OK\r\nlocation: http://10.0.0.3:1400/xml/device_description.xml\r\nusn: uuid:RINCON_XYZ1400\r\n\r\n";
        let parsed = parse_ssdp_response(response, "10.0.0.3").expect("zone player");
        assert_eq!(parsed.usn_id.as_deref(), Some("RINCON_XYZ1400"));
    }

    #[test]
    fn ignores_other_devices_and_requests() {
        let router = "HTTP/1.1 200 OK\r\nLOCATION: http://192.168.1.1:80/desc.xml\r\nST: upnp:rootdevice\r\nUSN: uuid:some-router\r\n\r\n";
        assert!(parse_ssdp_response(router, "192.168.1.1").is_none());

        let notify = "NOTIFY * HTTP/1.1\r\nUSN: uuid:RINCON_ABC1400\r\n\r\n";
        assert!(parse_ssdp_response(notify, "192.168.1.10").is_none());
    }
}
