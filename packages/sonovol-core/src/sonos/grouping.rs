//! Group membership commands.
//!
//! Joining points a device's transport at the target coordinator using the
//! `x-rincon:` scheme; leaving makes the device coordinator of a new
//! standalone group. Neither retries: the router decides that.

use reqwest::Client;

use crate::sonos::playback::set_av_transport_uri;
use crate::sonos::services::SonosService;
use crate::sonos::soap::{SoapRequestBuilder, SoapResult};

/// Transport URI that makes a device follow `coordinator_id`.
#[must_use]
pub fn group_uri(coordinator_id: &str) -> String {
    format!("x-rincon:{}", coordinator_id)
}

/// Joins the device at `ip` to the group coordinated by `coordinator_id`.
///
/// # Arguments
/// * `client` - The HTTP client to use for the request
/// * `ip` - Address of the joining device (becomes a member)
/// * `coordinator_id` - Identity of the coordinator (`RINCON_...`)
pub async fn join_group(client: &Client, ip: &str, coordinator_id: &str) -> SoapResult<()> {
    let uri = group_uri(coordinator_id);
    log::info!("[Sonos] Joining {} to coordinator {} ({})", ip, coordinator_id, uri);

    set_av_transport_uri(client, ip, &uri, "").await?;

    log::debug!("[Sonos] Join group succeeded for {}", ip);
    Ok(())
}

/// Makes a device leave its current group and become standalone.
///
/// Idempotent: a standalone device stays standalone.
pub async fn leave_group(client: &Client, ip: &str) -> SoapResult<()> {
    log::info!("[Sonos] Speaker {} leaving group (becoming standalone)", ip);

    SoapRequestBuilder::new(client, ip)
        .service(SonosService::AVTransport)
        .action("BecomeCoordinatorOfStandaloneGroup")
        .instance_id()
        .send()
        .await?;

    log::debug!("[Sonos] Leave group succeeded for {}", ip);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_uri_uses_rincon_scheme() {
        assert_eq!(group_uri("RINCON_000E58A0123401400"), "x-rincon:RINCON_000E58A0123401400");
    }
}
