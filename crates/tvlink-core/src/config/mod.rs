//! Configuration management for tvlink.
//!
//! This module handles loading, saving, and sharing tvlink configuration.
//!
//! ## Configuration File Locations
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.config/tvlink/config.toml` |
//! | macOS | `~/Library/Application Support/com.tvlink.tvlink/config.toml` |
//! | Windows | `%APPDATA%\tvlink\tvlink\config\config.toml` |
//!
//! Every section is `#[serde(default)]`, so a partial or older file is merged
//! over the defaults: keys added in newer versions get their default value and
//! keys already present keep the user's value.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tvlink_core::config::ConfigStore;
//!
//! let store = Arc::new(ConfigStore::load()?);
//! println!("Remote port: {}", store.snapshot().remote.port);
//! ```

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main configuration struct for tvlink.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,
    /// Remote protocol settings
    pub remote: RemoteConfig,
    /// Persisted device state
    pub devices: DevicesConfig,
    /// Debug-bridge settings
    pub debug_bridge: DebugBridgeConfig,
    /// Screen mirroring settings
    pub mirroring: MirroringConfig,
}

/// General configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Name this client announces to the TV
    pub client_name: String,
    /// Directory holding the client certificate and key (None = default)
    pub keys_dir: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            client_name: hostname::get().map_or_else(
                |_| crate::DEFAULT_CLIENT_NAME.to_string(),
                |h| format!("{} ({})", crate::DEFAULT_CLIENT_NAME, h.to_string_lossy()),
            ),
            keys_dir: None,
        }
    }
}

/// Remote protocol configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Remote control port
    pub port: u16,
    /// Pairing handshake port
    pub pairing_port: u16,
    /// Port probe timeout
    #[serde(with = "humantime_serde")]
    pub probe_timeout: Duration,
    /// Bound on a single TLS connect
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Handshake attempts per connect
    pub connect_attempts: u32,
    /// Delay between handshake attempts
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,
    /// Wait for the TV's availability signal
    #[serde(with = "humantime_serde")]
    pub ready_timeout: Duration,
    /// Delay between automatic reconnect attempts after a drop
    #[serde(with = "humantime_serde")]
    pub reconnect_delay: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            port: crate::DEFAULT_REMOTE_PORT,
            pairing_port: crate::DEFAULT_PAIRING_PORT,
            probe_timeout: Duration::from_millis(crate::DEFAULT_PROBE_TIMEOUT_MS),
            connect_timeout: Duration::from_secs(10),
            connect_attempts: crate::DEFAULT_CONNECT_ATTEMPTS,
            retry_delay: Duration::from_millis(crate::DEFAULT_RETRY_DELAY_MS),
            ready_timeout: Duration::from_millis(crate::DEFAULT_READY_TIMEOUT_MS),
            reconnect_delay: Duration::from_secs(2),
        }
    }
}

/// Persisted device state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DevicesConfig {
    /// Address of the last device that reached readiness
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_connected: Option<IpAddr>,
    /// Addresses that completed a pairing code exchange
    pub paired: Vec<IpAddr>,
}

/// Debug-bridge configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugBridgeConfig {
    /// Path to the `adb` binary
    pub path: PathBuf,
    /// Network debugging port on the TV
    pub port: u16,
    /// Timeout for one-shot commands
    #[serde(with = "humantime_serde")]
    pub command_timeout: Duration,
}

impl Default for DebugBridgeConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("adb"),
            port: 5555,
            command_timeout: Duration::from_secs(10),
        }
    }
}

/// Screen mirroring configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MirroringConfig {
    /// Path to the `scrcpy` binary
    pub path: PathBuf,
    /// Maximum video dimension
    pub max_size: u32,
    /// Video bit rate
    pub bitrate: u32,
    /// Frame rate cap
    pub max_fps: u32,
    /// Keep the device awake while mirroring
    pub stay_awake: bool,
    /// Forward audio
    pub audio: bool,
}

impl Default for MirroringConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("scrcpy"),
            max_size: 1024,
            bitrate: 8_000_000,
            max_fps: 30,
            stay_awake: true,
            audio: true,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// If the configuration file doesn't exist, returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific path, merged over the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("Failed to read config: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))
    }

    /// Save configuration to a specific path.
    ///
    /// Creates the parent directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::ConfigError(format!("Failed to create config directory: {e}"))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| Error::ConfigError(format!("Failed to write config: {e}")))
    }

    /// Get the default configuration directory path.
    #[must_use]
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "tvlink", "tvlink")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the full path to the configuration file.
    #[must_use]
    pub fn config_path() -> PathBuf {
        Self::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }

    /// Directory holding the client certificate and key.
    #[must_use]
    pub fn keys_dir(&self) -> PathBuf {
        self.general.keys_dir.clone().unwrap_or_else(|| {
            Self::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("keys")
        })
    }
}

/// Shared, explicitly constructed configuration handle.
///
/// Built once at process start and handed to every component that needs
/// settings or persisted state. Writes go straight to disk (last writer wins).
#[derive(Debug)]
pub struct ConfigStore {
    /// Backing file (None for in-memory stores)
    path: Option<PathBuf>,
    config: RwLock<Config>,
}

impl ConfigStore {
    /// Load the store from the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(Config::config_path())
    }

    /// Load the store from a specific path.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn load_from(path: PathBuf) -> Result<Self> {
        let config = Config::load_from(&path)?;
        Ok(Self {
            path: Some(path),
            config: RwLock::new(config),
        })
    }

    /// Create a store that never touches the filesystem.
    #[must_use]
    pub fn in_memory(config: Config) -> Self {
        Self {
            path: None,
            config: RwLock::new(config),
        }
    }

    /// Clone of the current configuration.
    #[must_use]
    pub fn snapshot(&self) -> Config {
        self.config
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Read a value without cloning the whole configuration.
    pub fn read<T>(&self, f: impl FnOnce(&Config) -> T) -> T {
        let guard = self
            .config
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&guard)
    }

    /// Mutate the configuration and persist it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written. The in-memory change is kept.
    pub fn update<T>(&self, f: impl FnOnce(&mut Config) -> T) -> Result<T> {
        let (value, snapshot) = {
            let mut guard = self
                .config
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let value = f(&mut guard);
            (value, guard.clone())
        };
        self.persist(&snapshot)?;
        Ok(value)
    }

    /// Persist the current configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self) -> Result<()> {
        self.persist(&self.snapshot())
    }

    /// Backing file path, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn persist(&self, config: &Config) -> Result<()> {
        match &self.path {
            Some(path) => config.save_to(path),
            None => Ok(()),
        }
    }
}

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.strip_suffix("ms")
            .map(|millis| {
                millis
                    .parse()
                    .map(Duration::from_millis)
                    .map_err(serde::de::Error::custom)
            })
            .or_else(|| {
                s.strip_suffix('s').map(|secs| {
                    secs.parse()
                        .map(Duration::from_secs)
                        .map_err(serde::de::Error::custom)
                })
            })
            .or_else(|| {
                s.strip_suffix('m').map(|mins| {
                    mins.parse::<u64>()
                        .map(|m| Duration::from_secs(m * 60))
                        .map_err(serde::de::Error::custom)
                })
            })
            .unwrap_or_else(|| Err(serde::de::Error::custom("invalid duration format")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();

        assert_eq!(config.remote.port, 6466);
        assert_eq!(config.remote.pairing_port, 6467);
        assert_eq!(config.remote.probe_timeout, Duration::from_secs(3));
        assert_eq!(config.remote.ready_timeout, Duration::from_secs(5));
        assert_eq!(config.remote.connect_attempts, 2);
        assert!(config.devices.paired.is_empty());
        assert!(config.devices.last_connected.is_none());
    }

    #[test]
    fn test_config_deserialization_partial_merges_defaults() {
        let partial_toml = r#"
[devices]
paired = ["192.168.1.50"]

[remote]
ready_timeout = "250ms"
"#;

        let config: Config = toml::from_str(partial_toml).expect("parse partial config");

        assert_eq!(config.devices.paired, vec!["192.168.1.50".parse::<IpAddr>().unwrap()]);
        assert_eq!(config.remote.ready_timeout, Duration::from_millis(250));
        assert_eq!(config.remote.port, 6466);
        assert_eq!(config.mirroring.max_fps, 30);
        assert_eq!(config.debug_bridge.port, 5555);
    }

    #[test]
    fn test_humantime_duration_serialization() {
        let mut config = Config::default();
        config.remote.retry_delay = Duration::from_millis(1500);
        let toml_str = toml::to_string_pretty(&config).expect("serialize");

        assert!(toml_str.contains("probe_timeout = \"3s\""));
        assert!(toml_str.contains("retry_delay = \"1500ms\""));
    }

    #[test]
    fn test_store_update_persists() {
        let tmp_dir = TempDir::new().unwrap();
        let path = tmp_dir.path().join("nested").join("config.toml");

        let store = ConfigStore::load_from(path.clone()).unwrap();
        store
            .update(|c| c.devices.last_connected = Some("10.0.0.7".parse().unwrap()))
            .unwrap();

        let reloaded = ConfigStore::load_from(path).unwrap();
        assert_eq!(
            reloaded.snapshot().devices.last_connected,
            Some("10.0.0.7".parse().unwrap())
        );
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let tmp_dir = TempDir::new().unwrap();
        let path = tmp_dir.path().join("config.toml");
        std::fs::write(&path, "remote = [not toml").unwrap();

        let result = ConfigStore::load_from(path);
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_keys_dir_override() {
        let mut config = Config::default();
        config.general.keys_dir = Some(PathBuf::from("/tmp/tvlink-keys"));
        assert_eq!(config.keys_dir(), PathBuf::from("/tmp/tvlink-keys"));
    }

    #[test]
    fn test_in_memory_store_never_writes() {
        let store = ConfigStore::in_memory(Config::default());
        store.update(|c| c.remote.port = 7000).unwrap();
        assert!(store.path().is_none());
        assert_eq!(store.read(|c| c.remote.port), 7000);
    }
}
