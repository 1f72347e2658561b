//! Low-level SOAP transport for the speakers' control protocol.
//!
//! Builds the request envelope, posts it to the service's control path on
//! port 1400, and turns transport failures, SOAP faults and non-2xx statuses
//! into [`SoapError`]. Typed commands live in `volume`, `playback` and
//! `grouping`; this module knows nothing about topology.

use std::time::Duration;

use reqwest::Client;
use thiserror::Error;

use super::services::SonosService;
use super::xml::{escape_xml, extract_xml_text};
use crate::protocol_constants::{DEVICE_HTTP_PORT, SOAP_TIMEOUT_SECS};

// ─────────────────────────────────────────────────────────────────────────────
// Error Types
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can occur during SOAP operations with a speaker.
#[derive(Debug, Error)]
pub enum SoapError {
    /// HTTP request to the speaker failed (connection refused, DNS, reset).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The request did not complete within its deadline.
    #[error("request to {0} timed out")]
    Timeout(String),

    /// Speaker returned a non-success HTTP status without a SOAP fault.
    #[error("HTTP error {0}: {1}")]
    HttpStatus(u16, String),

    /// Speaker returned a SOAP fault response.
    #[error("SOAP fault: {0}")]
    Fault(String),

    /// Response arrived but did not contain the expected data.
    #[error("Failed to parse SOAP response: {0}")]
    Parse(String),
}

/// Convenient Result alias for SOAP operations.
pub type SoapResult<T> = Result<T, SoapError>;

impl SoapError {
    /// Returns true if this error is transient and the operation should be retried.
    ///
    /// Transient UPnP fault codes:
    /// - 701: Transition not available (device changing states)
    /// - 714: Illegal seek target (previous source still loading)
    /// - 716: Resource not found (device busy initializing)
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            SoapError::Fault(msg) => {
                msg.contains("701")
                    || msg.contains("714")
                    || msg.contains("716")
                    || msg.to_lowercase().contains("transition")
            }
            SoapError::Timeout(_) => true,
            SoapError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// True for failures at the network layer (as opposed to a device that
    /// answered with something we could not use).
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, SoapError::Http(_) | SoapError::Timeout(_))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SOAP Request/Response
// ─────────────────────────────────────────────────────────────────────────────

/// Builds the control URL for a speaker.
#[must_use]
pub fn device_url(ip: &str, path: &str) -> String {
    format!("http://{}:{}{}", ip, DEVICE_HTTP_PORT, path)
}

/// Builds the SOAP envelope for an action.
///
/// The envelope is a single line: some device firmwares reject XML with
/// whitespace before the root element.
#[must_use]
pub fn build_envelope(service_urn: &str, action: &str, args: &[(&str, &str)]) -> String {
    let mut body = format!(
        r#"<?xml version="1.0" encoding="utf-8"?><s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/"><s:Body><u:{} xmlns:u="{}">"#,
        action, service_urn
    );

    for (k, v) in args {
        body.push_str(&format!("<{k}>{}</{k}>", escape_xml(v)));
    }

    body.push_str(&format!(r#"</u:{}></s:Body></s:Envelope>"#, action));
    body
}

/// Sends a SOAP request to a speaker.
///
/// # Arguments
/// * `client` - The HTTP client to use for the request
/// * `ip` - Address of the speaker
/// * `service` - Service that owns the action
/// * `action` - The SOAP action name (e.g., "Play", "GetVolume")
/// * `args` - Key-value pairs for action arguments (order is preserved)
/// * `timeout` - Deadline for the whole request; `None` defers to the
///   client's own timeout
///
/// # Errors
/// Returns `SoapError::Timeout` when the deadline passes, `SoapError::Fault`
/// when the device answers with a fault, `SoapError::HttpStatus` for other
/// non-2xx responses.
pub async fn send_soap_request(
    client: &Client,
    ip: &str,
    service: SonosService,
    action: &str,
    args: &[(&str, &str)],
    timeout: Option<Duration>,
) -> SoapResult<String> {
    let url = device_url(ip, &service.control_path());
    let body = build_envelope(service.urn(), action, args);

    log::debug!("[SOAP] {} -> {} (body: {} bytes)", action, url, body.len());

    let start = std::time::Instant::now();
    let mut request = client
        .post(&url)
        .header("Content-Type", "text/xml; charset=\"utf-8\"")
        .header("SOAPAction", format!("\"{}#{}\"", service.urn(), action))
        .body(body);
    if let Some(timeout) = timeout {
        request = request.timeout(timeout);
    }
    let res = request.send().await;

    let res = match res {
        Ok(r) => r,
        Err(e) if e.is_timeout() => {
            log::warn!("[SOAP] {} to {} timed out after {:?}", action, ip, start.elapsed());
            return Err(SoapError::Timeout(format!("{} {}", ip, action)));
        }
        Err(e) => return Err(SoapError::Http(e)),
    };

    let status = res.status();
    let response_text = res.text().await?;

    log::debug!(
        "[SOAP] {} completed in {:?}: {}",
        action,
        start.elapsed(),
        status
    );

    // SOAP faults usually arrive with a 500 status, so check them first
    if response_text.contains("<s:Fault>") || response_text.contains("<soap:Fault>") {
        let fault_msg = extract_fault(&response_text);
        log::warn!("[SOAP] {} on {} faulted: {}", action, ip, fault_msg);
        return Err(SoapError::Fault(fault_msg));
    }

    if !status.is_success() {
        return Err(SoapError::HttpStatus(status.as_u16(), response_text));
    }

    Ok(response_text)
}

/// Extracts a readable fault description, including the UPnP error code.
fn extract_fault(xml: &str) -> String {
    let fault = extract_xml_text(xml, "faultstring");
    let code = extract_xml_text(xml, "errorCode");
    match (fault, code) {
        (Some(f), Some(c)) => format!("{} ({})", f, c),
        (Some(f), None) => f,
        (None, Some(c)) => format!("UPnPError {}", c),
        (None, None) => "Unknown SOAP fault".to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SOAP Request Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for constructing and sending SOAP requests to a speaker.
///
/// # Example
/// ```ignore
/// let response = SoapRequestBuilder::new(&client, "192.168.1.100")
///     .service(SonosService::AVTransport)
///     .action("Play")
///     .instance_id()
///     .arg("Speed", "1")
///     .send()
///     .await?;
/// ```
pub struct SoapRequestBuilder<'a> {
    client: &'a Client,
    ip: &'a str,
    service: Option<SonosService>,
    action: Option<&'a str>,
    args: Vec<(&'a str, String)>,
    timeout: Option<Duration>,
}

impl<'a> SoapRequestBuilder<'a> {
    /// Creates a new SOAP request builder.
    ///
    /// Without [`timeout`](Self::timeout) the client's own timeout applies;
    /// clients built by [`soap_client`] carry one.
    #[must_use]
    pub fn new(client: &'a Client, ip: &'a str) -> Self {
        Self {
            client,
            ip,
            service: None,
            action: None,
            args: Vec::new(),
            timeout: None,
        }
    }

    #[must_use]
    pub fn service(mut self, service: SonosService) -> Self {
        self.service = Some(service);
        self
    }

    #[must_use]
    pub fn action(mut self, action: &'a str) -> Self {
        self.action = Some(action);
        self
    }

    /// Adds an argument to the SOAP request.
    ///
    /// Arguments are included in the SOAP body in the order they are added.
    #[must_use]
    pub fn arg(mut self, key: &'a str, value: impl Into<String>) -> Self {
        self.args.push((key, value.into()));
        self
    }

    /// Adds the standard InstanceID="0" argument used by most actions.
    #[must_use]
    pub fn instance_id(self) -> Self {
        self.arg("InstanceID", "0")
    }

    /// Adds `Channel=Master`, used by the per-speaker rendering actions.
    #[must_use]
    pub fn master_channel(self) -> Self {
        self.arg("Channel", "Master")
    }

    /// Overrides the request deadline.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sends the SOAP request and returns the response body.
    ///
    /// # Errors
    /// Returns `SoapError` if the service or action is not set, or if the
    /// request fails.
    pub async fn send(self) -> SoapResult<String> {
        let service = self
            .service
            .ok_or_else(|| SoapError::Parse("SoapRequestBuilder: service not set".into()))?;
        let action = self
            .action
            .ok_or_else(|| SoapError::Parse("SoapRequestBuilder: action not set".into()))?;

        let args: Vec<(&str, &str)> = self.args.iter().map(|(k, v)| (*k, v.as_str())).collect();

        send_soap_request(self.client, self.ip, service, action, &args, self.timeout).await
    }

    /// Returns the request parts without sending (for testing).
    #[cfg(test)]
    pub fn into_parts(self) -> Option<(SonosService, &'a str, Vec<(&'a str, String)>)> {
        let service = self.service?;
        let action = self.action?;
        Some((service, action, self.args))
    }
}

/// Builds an HTTP client whose requests time out after `timeout`.
///
/// # Errors
/// Fails only if the TLS backend cannot be initialised.
pub fn soap_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(SOAP_TIMEOUT_SECS)))
        .build()
}

/// Extracts a required field from a SOAP response.
pub(crate) fn require_field(response: &str, field: &str) -> SoapResult<String> {
    extract_xml_text(response, field)
        .ok_or_else(|| SoapError::Parse(format!("missing <{}> in response", field)))
}

/// Parses a `"0"`/`"1"` boolean field from a SOAP response.
pub(crate) fn parse_bool_field(response: &str, field: &str) -> SoapResult<bool> {
    match require_field(response, field)?.trim() {
        "1" => Ok(true),
        "0" => Ok(false),
        other => Err(SoapError::Parse(format!("invalid {} value: {}", field, other))),
    }
}

/// Parses a volume field from a SOAP response, clamped to 0-100.
pub(crate) fn parse_volume_field(response: &str, field: &str) -> SoapResult<u8> {
    let raw = require_field(response, field)?;
    raw.trim()
        .parse::<u16>()
        .map(|v| v.min(100) as u8)
        .map_err(|_| SoapError::Parse(format!("invalid {} value: {}", field, raw)))
}

/// Encodes a boolean the way the control protocol expects it.
#[must_use]
pub(crate) fn bool_arg(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> Client {
        Client::new()
    }

    #[test]
    fn builder_captures_args_in_order() {
        let client = test_client();
        let parts = SoapRequestBuilder::new(&client, "192.168.1.100")
            .service(SonosService::RenderingControl)
            .action("SetVolume")
            .instance_id()
            .master_channel()
            .arg("DesiredVolume", "75")
            .into_parts();

        let (service, action, args) = parts.expect("should have parts");
        assert_eq!(service, SonosService::RenderingControl);
        assert_eq!(action, "SetVolume");
        assert_eq!(args.len(), 3);
        assert_eq!(args[0], ("InstanceID", "0".to_string()));
        assert_eq!(args[1], ("Channel", "Master".to_string()));
        assert_eq!(args[2], ("DesiredVolume", "75".to_string()));
    }

    #[test]
    fn into_parts_returns_none_without_action() {
        let client = test_client();
        let parts = SoapRequestBuilder::new(&client, "192.168.1.100")
            .service(SonosService::RenderingControl)
            .into_parts();

        assert!(parts.is_none());
    }

    #[test]
    fn envelope_is_single_line_and_escapes_args() {
        let body = build_envelope(
            SonosService::AVTransport.urn(),
            "SetAVTransportURI",
            &[("InstanceID", "0"), ("CurrentURI", "x-rincon:RINCON_1&<x>")],
        );
        assert!(!body.contains('\n'));
        assert!(body.starts_with(r#"<?xml version="1.0" encoding="utf-8"?><s:Envelope"#));
        assert!(body.contains(
            r#"<u:SetAVTransportURI xmlns:u="urn:schemas-upnp-org:service:AVTransport:1">"#
        ));
        assert!(body.contains("<CurrentURI>x-rincon:RINCON_1&amp;&lt;x&gt;</CurrentURI>"));
        assert!(body.ends_with("</u:SetAVTransportURI></s:Body></s:Envelope>"));
    }

    #[test]
    fn fault_includes_upnp_error_code() {
        let xml = r#"<s:Envelope><s:Body><s:Fault><faultcode>s:Client</faultcode><faultstring>UPnPError</faultstring><detail><UPnPError><errorCode>701</errorCode></UPnPError></detail></s:Fault></s:Body></s:Envelope>"#;
        let fault = extract_fault(xml);
        assert_eq!(fault, "UPnPError (701)");
        assert!(SoapError::Fault(fault).is_transient());
    }

    #[test]
    fn parses_scalar_fields() {
        let xml = "<r><CurrentVolume>130</CurrentVolume><CurrentMute>1</CurrentMute></r>";
        assert_eq!(parse_volume_field(xml, "CurrentVolume").unwrap(), 100);
        assert!(parse_bool_field(xml, "CurrentMute").unwrap());
        assert!(matches!(
            parse_bool_field(xml, "GroupMute"),
            Err(SoapError::Parse(_))
        ));
    }

    #[test]
    fn device_url_uses_control_port() {
        assert_eq!(
            device_url("10.0.0.2", &SonosService::RenderingControl.control_path()),
            "http://10.0.0.2:1400/MediaRenderer/RenderingControl/Control"
        );
    }
}
