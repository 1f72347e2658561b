//! Canonical topology snapshot and its resolution.
//!
//! [`TopologyStore`] owns the one snapshot everybody reads. Readers take an
//! `Arc` clone and keep a consistent view for as long as they like; writers
//! swap in a whole new snapshot.

use std::sync::Arc;

use futures::future::join_all;
use parking_lot::RwLock;

use crate::sonos::traits::SonosTopology;
use crate::sonos::types::TopologySnapshot;
use crate::sonos::zone_groups::{
    build_snapshot, member_count, TopologyError, TopologyResult, ZoneGroupEntry,
};

/// Holds the current snapshot.
#[derive(Default)]
pub struct TopologyStore {
    current: RwLock<Arc<TopologySnapshot>>,
}

impl TopologyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot. Cheap; never blocks on writers for long.
    #[must_use]
    pub fn snapshot(&self) -> Arc<TopologySnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Replaces the snapshot. Returns `true` if devices or groups changed.
    pub fn replace(&self, snapshot: TopologySnapshot) -> bool {
        let mut current = self.current.write();
        let changed = current.devices != snapshot.devices
            || current.groups != snapshot.groups
            || current.satellites != snapshot.satellites;
        *current = Arc::new(snapshot);
        changed
    }

    /// Builds and installs a snapshot from parsed groups.
    ///
    /// # Errors
    /// Inconsistent documents are rejected and the previous snapshot stays.
    pub fn apply_groups(&self, groups: &[ZoneGroupEntry]) -> TopologyResult<bool> {
        let snapshot = build_snapshot(groups)?;
        Ok(self.replace(snapshot))
    }

    /// Addresses worth querying for a fresh topology: coordinators first,
    /// then every other known device.
    #[must_use]
    pub fn candidate_ips(&self) -> Vec<String> {
        let snapshot = self.snapshot();
        let mut ips: Vec<String> = snapshot
            .devices
            .iter()
            .filter(|d| d.is_coordinator())
            .map(|d| d.ip.clone())
            .collect();
        for device in &snapshot.devices {
            if !ips.contains(&device.ip) {
                ips.push(device.ip.clone());
            }
        }
        ips
    }
}

/// Queries every candidate and builds a snapshot from the most complete
/// answer.
///
/// Devices can briefly disagree while a grouping change propagates; the
/// response listing the most members wins.
///
/// # Errors
/// - [`TopologyError::Unreachable`] when no candidate answered at all.
/// - A parse or consistency error when the devices answered but nothing
///   usable came back.
pub async fn resolve_topology<T>(sonos: &T, candidates: &[String]) -> TopologyResult<TopologySnapshot>
where
    T: SonosTopology + ?Sized,
{
    if candidates.is_empty() {
        return Err(TopologyError::Unreachable("no candidate devices".into()));
    }

    let results = join_all(candidates.iter().map(|ip| async move {
        (ip.as_str(), sonos.get_zone_groups(ip).await)
    }))
    .await;

    let mut best: Option<(&str, Vec<ZoneGroupEntry>)> = None;
    let mut transport_failures = Vec::new();
    let mut parse_failure: Option<TopologyError> = None;

    for (ip, result) in results {
        match result {
            Ok(groups) => {
                let better = best
                    .as_ref()
                    .map_or(true, |(_, b)| member_count(&groups) > member_count(b));
                if better {
                    best = Some((ip, groups));
                }
            }
            Err(TopologyError::Soap(e)) => {
                log::debug!("[Topology] {} did not answer: {}", ip, e);
                transport_failures.push(format!("{}: {}", ip, e));
            }
            Err(e) => {
                log::warn!("[Topology] {} returned an unusable document: {}", ip, e);
                parse_failure.get_or_insert(e);
            }
        }
    }

    match (best, parse_failure) {
        (Some((ip, groups)), _) => {
            log::debug!(
                "[Topology] Using answer from {} ({} group(s), {} member(s))",
                ip,
                groups.len(),
                member_count(&groups)
            );
            build_snapshot(&groups)
        }
        (None, Some(e)) => Err(e),
        (None, None) => Err(TopologyError::Unreachable(transport_failures.join("; "))),
    }
}
