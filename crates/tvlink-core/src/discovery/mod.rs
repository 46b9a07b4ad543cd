//! Discovered devices.
//!
//! Browsing for TVs happens outside the core. A browser reports what it finds
//! through [`DiscoverySink`]; [`DeviceTable`] is the sink the rest of tvlink
//! reads from. The session manager only ever uses the address.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{PoisonError, RwLock};
use std::time::Instant;

use tokio::sync::broadcast;

/// Service types Android TVs advertise, most specific first.
pub const SERVICE_TYPES: &[&str] = &[
    "_androidtvremote2._tcp.local.",
    "_androidtvremote._tcp.local.",
    "_googlecast._tcp.local.",
];

/// A TV reported by a discovery browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredTv {
    /// Device address
    pub address: IpAddr,
    /// Friendly name
    pub name: String,
    /// Model, "Unknown Model" when not advertised
    pub model: String,
    /// Manufacturer, "Unknown" when not advertised
    pub manufacturer: String,
}

impl DiscoveredTv {
    /// A record with only an address and name.
    #[must_use]
    pub fn new(address: IpAddr, name: impl Into<String>) -> Self {
        Self {
            address,
            name: name.into(),
            model: "Unknown Model".to_string(),
            manufacturer: "Unknown".to_string(),
        }
    }
}

/// Change in the set of known devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    /// A device appeared or its metadata changed
    Found(DiscoveredTv),
    /// A device went away
    Lost(IpAddr),
}

/// Receives devices from a discovery browser.
pub trait DiscoverySink: Send + Sync {
    /// A device appeared or was seen again.
    fn device_found(&self, device: DiscoveredTv);

    /// A device stopped advertising.
    fn device_lost(&self, address: IpAddr);
}

#[derive(Debug, Clone)]
struct Entry {
    device: DiscoveredTv,
    last_seen: Instant,
}

/// Latest metadata per address.
#[derive(Debug)]
pub struct DeviceTable {
    devices: RwLock<HashMap<IpAddr, Entry>>,
    events: broadcast::Sender<DiscoveryEvent>,
}

impl Default for DeviceTable {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            devices: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Receive changes from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.events.subscribe()
    }

    /// Known devices, sorted by name.
    #[must_use]
    pub fn list(&self) -> Vec<DiscoveredTv> {
        let mut devices: Vec<_> = self
            .devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|e| e.device.clone())
            .collect();
        devices.sort_by(|a, b| a.name.cmp(&b.name).then(a.address.cmp(&b.address)));
        devices
    }

    /// Metadata for `address`.
    #[must_use]
    pub fn get(&self, address: IpAddr) -> Option<DiscoveredTv> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&address)
            .map(|e| e.device.clone())
    }

    /// When `address` was last reported.
    #[must_use]
    pub fn last_seen(&self, address: IpAddr) -> Option<Instant> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&address)
            .map(|e| e.last_seen)
    }
}

impl DiscoverySink for DeviceTable {
    fn device_found(&self, device: DiscoveredTv) {
        let changed = {
            let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
            let previous = devices.insert(
                device.address,
                Entry {
                    device: device.clone(),
                    last_seen: Instant::now(),
                },
            );
            previous.map_or(true, |p| p.device != device)
        };

        if changed {
            tracing::info!(
                "Discovered {} ({} {}) at {}",
                device.name,
                device.manufacturer,
                device.model,
                device.address
            );
            let _ = self.events.send(DiscoveryEvent::Found(device));
        }
    }

    fn device_lost(&self, address: IpAddr) {
        let removed = self
            .devices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&address);

        if removed.is_some() {
            tracing::info!("Lost device at {}", address);
            let _ = self.events.send(DiscoveryEvent::Lost(address));
        }
    }
}
