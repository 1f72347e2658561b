//! GENA subscription state.
//!
//! One record per (device, service). Each record walks
//! `Unsubscribed -> Subscribing -> Active -> Renewing -> Active | Expired`;
//! the store enforces the legal transitions and keeps a SID index so inbound
//! notifications can be matched to their record.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use super::services::SonosService;

/// Lifecycle state of one subscription record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SubscriptionState {
    Unsubscribed,
    Subscribing,
    Active,
    Renewing,
    Expired,
}

impl SubscriptionState {
    /// True while the record holds (or is acquiring) a live SID.
    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Subscribing | Self::Active | Self::Renewing)
    }
}

/// Key for looking up subscriptions by device and service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionKey {
    pub device_id: String,
    pub service: SonosService,
}

impl SubscriptionKey {
    pub fn new(device_id: &str, service: SonosService) -> Self {
        Self {
            device_id: device_id.to_string(),
            service,
        }
    }
}

impl std::fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.device_id, self.service)
    }
}

/// One subscription record.
#[derive(Debug)]
struct SubscriptionRecord {
    ip: String,
    state: SubscriptionState,
    sid: Option<String>,
    granted: Option<Duration>,
    expires_at: Option<Instant>,
    renew_at: Option<Instant>,
    last_seq: Option<u32>,
    renewal_task: Option<AbortHandle>,
}

impl SubscriptionRecord {
    fn new(ip: &str) -> Self {
        Self {
            ip: ip.to_string(),
            state: SubscriptionState::Unsubscribed,
            sid: None,
            granted: None,
            expires_at: None,
            renew_at: None,
            last_seq: None,
            renewal_task: None,
        }
    }

    fn cancel_renewal(&mut self) {
        if let Some(handle) = self.renewal_task.take() {
            handle.abort();
        }
    }
}

/// Read-only view of a record.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionInfo {
    pub key: SubscriptionKey,
    pub ip: String,
    pub state: SubscriptionState,
    pub sid: Option<String>,
    pub granted: Option<Duration>,
    pub expires_at: Option<Instant>,
    pub renew_at: Option<Instant>,
}

/// Outcome of matching an inbound `SEQ` against the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqCheck {
    /// First event of a subscription (`SEQ: 0`).
    Initial,
    /// Next expected sequence number.
    InOrder,
    /// Sequence jumped; some events were missed.
    Gap { expected: u32, got: u32 },
}

/// Thread-safe store for subscription records.
pub struct GenaSubscriptionStore {
    records: RwLock<HashMap<SubscriptionKey, SubscriptionRecord>>,
    /// SID -> key
    by_sid: RwLock<HashMap<String, SubscriptionKey>>,
    renewal_fraction: f64,
}

impl GenaSubscriptionStore {
    /// Creates a store that schedules renewal at `renewal_fraction` of each
    /// granted duration. Values outside `(0, 0.8]` are clamped into range.
    pub fn new(renewal_fraction: f64) -> Self {
        let renewal_fraction = if renewal_fraction.is_finite() && renewal_fraction > 0.0 {
            renewal_fraction.min(0.8)
        } else {
            0.8
        };
        Self {
            records: RwLock::new(HashMap::new()),
            by_sid: RwLock::new(HashMap::new()),
            renewal_fraction,
        }
    }

    /// Delay from grant to renewal.
    #[must_use]
    pub fn renewal_delay(&self, granted: Duration) -> Duration {
        granted.mul_f64(self.renewal_fraction)
    }

    /// Moves a record into `Subscribing`, creating it if needed.
    ///
    /// Returns `false` if the record is already live, so concurrent callers
    /// never issue duplicate `SUBSCRIBE`s.
    pub fn begin_subscribe(&self, key: &SubscriptionKey, ip: &str) -> bool {
        let mut records = self.records.write();
        let record = records
            .entry(key.clone())
            .or_insert_with(|| SubscriptionRecord::new(ip));
        if record.state.is_live() {
            return false;
        }
        record.ip = ip.to_string();
        record.state = SubscriptionState::Subscribing;
        true
    }

    /// Records a granted subscription. Returns the renewal delay.
    ///
    /// Returns `None` (and records nothing) if the record was removed or left
    /// `Subscribing` while the request was in flight.
    pub fn activate(&self, key: &SubscriptionKey, sid: &str, granted: Duration) -> Option<Duration> {
        let delay = self.renewal_delay(granted);
        let now = Instant::now();
        {
            let mut records = self.records.write();
            let record = records.get_mut(key)?;
            if record.state != SubscriptionState::Subscribing {
                return None;
            }
            record.state = SubscriptionState::Active;
            record.sid = Some(sid.to_string());
            record.granted = Some(granted);
            record.expires_at = Some(now + granted);
            record.renew_at = Some(now + delay);
            record.last_seq = None;
        }
        self.by_sid.write().insert(sid.to_string(), key.clone());
        Some(delay)
    }

    /// A `SUBSCRIBE` failed: back to `Unsubscribed`.
    pub fn fail_subscribe(&self, key: &SubscriptionKey) {
        if let Some(record) = self.records.write().get_mut(key) {
            if record.state == SubscriptionState::Subscribing {
                record.state = SubscriptionState::Unsubscribed;
            }
        }
    }

    /// Moves an `Active` record into `Renewing`, returning its address and SID.
    pub fn begin_renew(&self, key: &SubscriptionKey) -> Option<(String, String)> {
        let mut records = self.records.write();
        let record = records.get_mut(key)?;
        if record.state != SubscriptionState::Active {
            return None;
        }
        let sid = record.sid.clone()?;
        record.state = SubscriptionState::Renewing;
        Some((record.ip.clone(), sid))
    }

    /// A renewal succeeded: back to `Active` with fresh deadlines. Returns the
    /// next renewal delay.
    pub fn renewed(&self, key: &SubscriptionKey, granted: Duration) -> Option<Duration> {
        let delay = self.renewal_delay(granted);
        let now = Instant::now();
        let mut records = self.records.write();
        let record = records.get_mut(key)?;
        if record.state != SubscriptionState::Renewing {
            return None;
        }
        record.state = SubscriptionState::Active;
        record.granted = Some(granted);
        record.expires_at = Some(now + granted);
        record.renew_at = Some(now + delay);
        Some(delay)
    }

    /// A renewal failed: the SID is dead. Returns the address for reporting.
    pub fn expire(&self, key: &SubscriptionKey) -> Option<String> {
        let sid = {
            let mut records = self.records.write();
            let record = records.get_mut(key)?;
            record.state = SubscriptionState::Expired;
            record.renew_at = None;
            record.renewal_task = None;
            record.sid.take()
        };
        if let Some(sid) = sid {
            self.by_sid.write().remove(&sid);
        }
        self.records.read().get(key).map(|r| r.ip.clone())
    }

    /// Attaches the renewal timer to a record, aborting any previous one.
    ///
    /// If the record is gone the handle is aborted immediately.
    pub fn set_renewal_task(&self, key: &SubscriptionKey, handle: AbortHandle) {
        let mut records = self.records.write();
        match records.get_mut(key) {
            Some(record) => {
                record.cancel_renewal();
                record.renewal_task = Some(handle);
            }
            None => handle.abort(),
        }
    }

    /// Removes a record, cancelling its timer. Returns `(ip, sid)` when it
    /// held a SID worth unsubscribing.
    pub fn remove(&self, key: &SubscriptionKey) -> Option<(String, Option<String>)> {
        let mut record = self.records.write().remove(key)?;
        record.cancel_renewal();
        if let Some(sid) = &record.sid {
            self.by_sid.write().remove(sid);
        }
        Some((record.ip, record.sid))
    }

    /// Looks up the record owning `sid`.
    #[must_use]
    pub fn key_for_sid(&self, sid: &str) -> Option<SubscriptionKey> {
        self.by_sid.read().get(sid).cloned()
    }

    /// Records `seq` for the subscription owning `sid`.
    pub fn check_seq(&self, key: &SubscriptionKey, seq: u32) -> SeqCheck {
        let mut records = self.records.write();
        let Some(record) = records.get_mut(key) else {
            return SeqCheck::Initial;
        };
        let previous = record.last_seq.replace(seq);
        match previous {
            _ if seq == 0 => SeqCheck::Initial,
            None => SeqCheck::InOrder,
            Some(prev) if prev.wrapping_add(1) == seq => SeqCheck::InOrder,
            Some(prev) => SeqCheck::Gap {
                expected: prev.wrapping_add(1),
                got: seq,
            },
        }
    }

    #[must_use]
    pub fn state(&self, key: &SubscriptionKey) -> SubscriptionState {
        self.records
            .read()
            .get(key)
            .map(|r| r.state)
            .unwrap_or(SubscriptionState::Unsubscribed)
    }

    #[must_use]
    pub fn get(&self, key: &SubscriptionKey) -> Option<SubscriptionInfo> {
        self.records.read().get(key).map(|r| SubscriptionInfo {
            key: key.clone(),
            ip: r.ip.clone(),
            state: r.state,
            sid: r.sid.clone(),
            granted: r.granted,
            expires_at: r.expires_at,
            renew_at: r.renew_at,
        })
    }

    /// Updates the address of every record for `device_id`.
    pub fn update_ip(&self, device_id: &str, ip: &str) {
        for (key, record) in self.records.write().iter_mut() {
            if key.device_id == device_id && record.ip != ip {
                log::debug!("[GENA] {} moved {} -> {}", key, record.ip, ip);
                record.ip = ip.to_string();
            }
        }
    }

    /// All keys, sorted for stable iteration.
    #[must_use]
    pub fn keys(&self) -> Vec<SubscriptionKey> {
        let mut keys: Vec<SubscriptionKey> = self.records.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Keys whose record is live for `service`.
    #[must_use]
    pub fn live_keys_for(&self, service: SonosService) -> Vec<SubscriptionKey> {
        self.records
            .read()
            .iter()
            .filter(|(k, r)| k.service == service && r.state.is_live())
            .map(|(k, _)| k.clone())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl Default for GenaSubscriptionStore {
    fn default() -> Self {
        Self::new(crate::protocol_constants::GENA_RENEWAL_FRACTION)
    }
}
