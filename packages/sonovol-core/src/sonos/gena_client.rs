//! GENA HTTP client for subscription operations.
//!
//! Handles only the HTTP side of UPnP eventing: `SUBSCRIBE`, renewal and
//! `UNSUBSCRIBE`. Subscription state lives in
//! [`GenaSubscriptionStore`](super::gena_store::GenaSubscriptionStore).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use thiserror::Error;

use super::services::SonosService;
use super::soap::device_url;
use crate::protocol_constants::{GENA_DEFAULT_GRANTED_SECS, GENA_REQUEST_TIMEOUT_SECS};

/// Errors from GENA subscription requests.
#[derive(Debug, Error)]
pub enum GenaError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("GENA request to {0} timed out")]
    Timeout(String),

    #[error("subscription rejected with status {0}")]
    SubscriptionFailed(u16),

    #[error("renewal rejected with status {0}")]
    RenewalFailed(u16),

    #[error("response carried no SID header")]
    MissingSid,

    #[error("invalid HTTP method {0}")]
    InvalidMethod(&'static str),
}

/// Convenient Result alias for GENA operations.
pub type GenaResult<T> = Result<T, GenaError>;

/// Response from a successful `SUBSCRIBE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeResponse {
    /// Subscription id assigned by the device.
    pub sid: String,
    /// Duration the device actually granted.
    pub granted: Duration,
}

/// The subscription requests the manager needs.
///
/// [`GenaClient`] is the HTTP implementation; tests substitute their own.
#[async_trait]
pub trait GenaTransport: Send + Sync {
    async fn subscribe(
        &self,
        ip: &str,
        service: SonosService,
        callback_url: &str,
        requested: Duration,
    ) -> GenaResult<SubscribeResponse>;

    /// Renews `sid`, returning the newly granted duration.
    async fn renew(
        &self,
        ip: &str,
        service: SonosService,
        sid: &str,
        requested: Duration,
    ) -> GenaResult<Duration>;

    /// Cancels `sid`. Returns whether the device acknowledged.
    async fn unsubscribe(&self, ip: &str, service: SonosService, sid: &str) -> bool;
}

/// Parses a `TIMEOUT: Second-N` header.
///
/// Missing, malformed and `infinite` values fall back to the default granted
/// duration so that renewal is still scheduled.
#[must_use]
pub fn parse_timeout_header(value: Option<&str>) -> Duration {
    value
        .map(str::trim)
        .and_then(|v| {
            v.strip_prefix("Second-")
                .or_else(|| v.strip_prefix("second-"))
        })
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(GENA_DEFAULT_GRANTED_SECS))
}

/// HTTP client for GENA operations.
pub struct GenaClient {
    client: Client,
    request_timeout: Duration,
}

impl GenaClient {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            request_timeout: Duration::from_secs(GENA_REQUEST_TIMEOUT_SECS),
        }
    }

    /// Overrides the per-request deadline.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn method(name: &'static str) -> GenaResult<Method> {
        Method::from_bytes(name.as_bytes()).map_err(|_| GenaError::InvalidMethod(name))
    }

    fn timeout_header(requested: Duration) -> String {
        format!("Second-{}", requested.as_secs().max(1))
    }

    fn map_send_error(url: &str, e: reqwest::Error) -> GenaError {
        if e.is_timeout() {
            GenaError::Timeout(url.to_string())
        } else {
            GenaError::Http(e)
        }
    }

    fn granted(response: &reqwest::Response) -> Duration {
        parse_timeout_header(
            response
                .headers()
                .get("TIMEOUT")
                .and_then(|v| v.to_str().ok()),
        )
    }
}

#[async_trait]
impl GenaTransport for GenaClient {
    async fn subscribe(
        &self,
        ip: &str,
        service: SonosService,
        callback_url: &str,
        requested: Duration,
    ) -> GenaResult<SubscribeResponse> {
        let url = device_url(ip, &service.event_path());

        let response = self
            .client
            .request(Self::method("SUBSCRIBE")?, &url)
            .header("CALLBACK", format!("<{}>", callback_url))
            .header("NT", "upnp:event")
            .header("TIMEOUT", Self::timeout_header(requested))
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| Self::map_send_error(&url, e))?;

        if !response.status().is_success() {
            return Err(GenaError::SubscriptionFailed(response.status().as_u16()));
        }

        let sid = response
            .headers()
            .get("SID")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(GenaError::MissingSid)?;

        Ok(SubscribeResponse {
            sid,
            granted: Self::granted(&response),
        })
    }

    async fn renew(
        &self,
        ip: &str,
        service: SonosService,
        sid: &str,
        requested: Duration,
    ) -> GenaResult<Duration> {
        let url = device_url(ip, &service.event_path());

        let response = self
            .client
            .request(Self::method("SUBSCRIBE")?, &url)
            .header("SID", sid)
            .header("TIMEOUT", Self::timeout_header(requested))
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| Self::map_send_error(&url, e))?;

        if !response.status().is_success() {
            return Err(GenaError::RenewalFailed(response.status().as_u16()));
        }

        Ok(Self::granted(&response))
    }

    async fn unsubscribe(&self, ip: &str, service: SonosService, sid: &str) -> bool {
        let url = device_url(ip, &service.event_path());
        let Ok(method) = Self::method("UNSUBSCRIBE") else {
            return false;
        };

        match self
            .client
            .request(method, &url)
            .header("SID", sid)
            .timeout(self.request_timeout)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                log::debug!("[GENA] UNSUBSCRIBE {} on {} failed: {}", sid, url, e);
                false
            }
        }
    }
}
