//! Device discovery.
//!
//! [`discover`] runs one SSDP search window and fetches each replying
//! device's descriptor while the window is still open. It returns when the
//! window closes with the devices deduplicated by identity and sorted by
//! name. A device whose descriptor was not fetched by then is still
//! returned, named after its host.

pub mod description;
pub mod ssdp;
pub mod types;

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use reqwest::Client;
use tokio::sync::mpsc;
use tokio::time::Instant;

pub use description::{fetch_device_description, parse_device_description, DeviceDescription};
pub use ssdp::SsdpConfig;
pub use types::{DiscoveredDevice, DiscoveryError, DiscoveryResult, SsdpResponse};

use crate::protocol_constants::{DEVICE_DESCRIPTION_PATH, DEVICE_HTTP_PORT};
use crate::state::Config;

/// Everything one discovery pass needs.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub ssdp: SsdpConfig,
    /// Deadline for each descriptor fetch; the search window still bounds
    /// the whole pass.
    pub description_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            ssdp: SsdpConfig::default(),
            description_timeout: Duration::from_secs(3),
        }
    }
}

impl From<&Config> for DiscoveryConfig {
    fn from(config: &Config) -> Self {
        Self {
            ssdp: SsdpConfig {
                send_count: config.ssdp_send_count,
                send_spacing: Duration::from_millis(config.ssdp_retry_delay_ms),
                window: config.discovery_timeout(),
                ..SsdpConfig::default()
            },
            description_timeout: config.description_timeout(),
        }
    }
}

/// Discovers zone players on the local network.
///
/// Returns at the end of the search window at the latest.
///
/// # Errors
/// Returns [`DiscoveryError`] only when no socket could be opened. An empty
/// network yields `Ok(vec![])`.
pub async fn discover(client: &Client, config: &DiscoveryConfig) -> DiscoveryResult<Vec<DiscoveredDevice>> {
    let deadline = Instant::now() + config.ssdp.window;
    let (tx, rx) = mpsc::unbounded_channel();
    let timeout = config.description_timeout;

    let (searched, described) = tokio::join!(
        ssdp::search(&config.ssdp, deadline, tx),
        describe_until(rx, deadline, move |url| async move {
            fetch_device_description(client, &url, timeout).await
        })
    );
    searched?;

    let devices = merge_descriptions(described);
    log::info!("[Discovery] Found {} device(s)", devices.len());
    Ok(devices)
}

/// Fetches a descriptor for every distinct reply as soon as it arrives.
///
/// Stops at `deadline`, or earlier once the reply channel is closed and
/// every fetch has settled. Replies whose fetch is still running at the
/// deadline are returned without a descriptor.
async fn describe_until<F, Fut>(
    mut replies: mpsc::UnboundedReceiver<SsdpResponse>,
    deadline: Instant,
    fetch: F,
) -> Vec<(SsdpResponse, Option<DeviceDescription>)>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Option<DeviceDescription>>,
{
    let mut seen = HashSet::new();
    let mut heard: Vec<(SsdpResponse, Option<DeviceDescription>)> = Vec::new();
    let mut fetches = FuturesUnordered::new();
    let mut replies_open = true;

    let expired = tokio::time::sleep_until(deadline);
    tokio::pin!(expired);

    loop {
        tokio::select! {
            _ = &mut expired => {
                log::debug!(
                    "[Discovery] Window closed with {} descriptor fetch(es) pending",
                    fetches.len()
                );
                break;
            }
            reply = replies.recv(), if replies_open => match reply {
                Some(response) => {
                    // Repeated replies from one source (one per send per
                    // interface) share a single fetch.
                    if !seen.insert((response.ip.clone(), response.location.clone())) {
                        continue;
                    }
                    let url = response
                        .location
                        .clone()
                        .unwrap_or_else(|| default_description_url(&response.ip));
                    let index = heard.len();
                    heard.push((response, None));
                    let fetched = fetch(url);
                    fetches.push(async move { (index, fetched.await) });
                }
                None => replies_open = false,
            },
            Some((index, description)) = fetches.next(), if !fetches.is_empty() => {
                heard[index].1 = description;
            }
        }
        if !replies_open && fetches.is_empty() {
            break;
        }
    }
    heard
}

/// Descriptor URL used when a reply carried no `LOCATION`.
fn default_description_url(ip: &str) -> String {
    format!("http://{}:{}{}", ip, DEVICE_HTTP_PORT, DEVICE_DESCRIPTION_PATH)
}

/// Combines replies with their descriptors, deduplicating by identity token
/// (not by address) and sorting by name.
fn merge_descriptions(
    described: Vec<(SsdpResponse, Option<DeviceDescription>)>,
) -> Vec<DiscoveredDevice> {
    let mut seen = HashSet::new();
    let mut devices: Vec<DiscoveredDevice> = described
        .into_iter()
        .filter_map(|(response, description)| {
            let device = match description {
                Some(desc) => DiscoveredDevice {
                    name: desc
                        .display_name()
                        .map(str::to_string)
                        .unwrap_or_else(|| response.ip.clone()),
                    id: desc.id,
                    ip: response.ip,
                    model_name: desc.model_name,
                    described: true,
                },
                None => {
                    let Some(id) = response.usn_id else {
                        log::debug!(
                            "[Discovery] Dropping {}: no descriptor and no USN identity",
                            response.ip
                        );
                        return None;
                    };
                    DiscoveredDevice {
                        id,
                        name: response.ip.clone(),
                        ip: response.ip,
                        model_name: None,
                        described: false,
                    }
                }
            };
            Some(device)
        })
        .filter(|d| seen.insert(d.id.clone()))
        .collect();

    devices.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    devices
}
