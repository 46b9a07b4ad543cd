//! Paired-device registry.
//!
//! Tracks which TV addresses have completed a full pairing code exchange with
//! this client. The set is persisted in the `[devices]` section of the
//! configuration file so it survives restarts.
//!
//! ## Invariants
//!
//! - An address is added only after the TV acknowledged the pairing secret.
//! - Absence means "treat as unpaired", even if an earlier session happened to
//!   connect without a confirmed handshake.
//! - Stored as a sequence but with set semantics: no duplicates.

use std::net::IpAddr;
use std::sync::Arc;

use crate::config::ConfigStore;
use crate::error::Result;

/// Registry of paired device addresses, backed by the configuration store.
#[derive(Debug, Clone)]
pub struct PairedRegistry {
    store: Arc<ConfigStore>,
}

impl PairedRegistry {
    /// Create a registry on top of a configuration store.
    #[must_use]
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self { store }
    }

    /// Check if a device is known to be paired.
    #[must_use]
    pub fn is_paired(&self, address: IpAddr) -> bool {
        self.store.read(|c| c.devices.paired.contains(&address))
    }

    /// Mark a device as paired.
    ///
    /// Returns `true` if the address was newly added.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be saved.
    pub fn mark_paired(&self, address: IpAddr) -> Result<bool> {
        self.store.update(|c| {
            if c.devices.paired.contains(&address) {
                false
            } else {
                c.devices.paired.push(address);
                true
            }
        })
    }

    /// Remove a device from the registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be saved.
    pub fn remove(&self, address: IpAddr) -> Result<bool> {
        self.store.update(|c| {
            let len_before = c.devices.paired.len();
            c.devices.paired.retain(|a| *a != address);
            c.devices.paired.len() < len_before
        })
    }

    /// List all paired devices.
    #[must_use]
    pub fn list(&self) -> Vec<IpAddr> {
        self.store.read(|c| c.devices.paired.clone())
    }

    /// Clear all paired devices.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be saved.
    pub fn clear(&self) -> Result<()> {
        self.store.update(|c| c.devices.paired.clear())
    }

    /// Address of the last device that reached readiness.
    #[must_use]
    pub fn last_connected(&self) -> Option<IpAddr> {
        self.store.read(|c| c.devices.last_connected)
    }

    /// Remember the last device that reached readiness.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be saved.
    pub fn set_last_connected(&self, address: IpAddr) -> Result<()> {
        self.store
            .update(|c| c.devices.last_connected = Some(address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry_at(dir: &TempDir) -> PairedRegistry {
        let path = dir.path().join("config.toml");
        PairedRegistry::new(Arc::new(ConfigStore::load_from(path).unwrap()))
    }

    #[test]
    fn test_registry_save_and_load() {
        let tmp_dir = TempDir::new().unwrap();
        let address: IpAddr = "192.168.1.50".parse().unwrap();

        let registry = registry_at(&tmp_dir);
        assert!(!registry.is_paired(address));
        assert!(registry.mark_paired(address).unwrap());

        let reloaded = registry_at(&tmp_dir);
        assert!(reloaded.is_paired(address));
    }

    #[test]
    fn test_mark_paired_is_idempotent() {
        let tmp_dir = TempDir::new().unwrap();
        let registry = registry_at(&tmp_dir);
        let address: IpAddr = "10.0.0.3".parse().unwrap();

        assert!(registry.mark_paired(address).unwrap());
        assert!(!registry.mark_paired(address).unwrap());
        assert_eq!(registry.list(), vec![address]);
    }

    #[test]
    fn test_remove_and_clear() {
        let tmp_dir = TempDir::new().unwrap();
        let registry = registry_at(&tmp_dir);
        let a: IpAddr = "10.0.0.3".parse().unwrap();
        let b: IpAddr = "10.0.0.4".parse().unwrap();

        registry.mark_paired(a).unwrap();
        registry.mark_paired(b).unwrap();

        assert!(registry.remove(a).unwrap());
        assert!(!registry.remove(a).unwrap());
        assert_eq!(registry.list(), vec![b]);

        registry.clear().unwrap();
        assert!(registry.list().is_empty());
    }

    #[test]
    fn test_last_connected_roundtrip() {
        let tmp_dir = TempDir::new().unwrap();
        let registry = registry_at(&tmp_dir);
        let address: IpAddr = "192.168.1.77".parse().unwrap();

        assert!(registry.last_connected().is_none());
        registry.set_last_connected(address).unwrap();
        assert_eq!(registry_at(&tmp_dir).last_connected(), Some(address));
    }
}
