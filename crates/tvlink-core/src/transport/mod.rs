//! Transport seam between the session manager and the wire.
//!
//! The session manager talks to a TV only through [`RemoteTransport`]. Inbound
//! traffic is observed through [`TransportObserver`]s the transport owns: the
//! transport applies its own handling of each message first (protocol replies,
//! edit counters, availability), then invokes every observer in subscription
//! order.
//!
//! Send operations never suspend: they enqueue onto the transport's outbound
//! queue and return.

mod tls;

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::code::PairingCode;
use crate::config::Config;
use crate::crypto::ClientCertificate;
use crate::error::Result;
use crate::protocol::{ImeEdit, KeyCode, KeyDirection, RemoteMessage};

pub use tls::{TlsTransport, TlsTransportFactory};

/// Hooks invoked by a transport.
pub trait TransportObserver: Send + Sync {
    /// Called for every inbound message after the transport handled it.
    fn on_message(&self, _message: &RemoteMessage) {}

    /// Called when the TV's availability changes.
    fn on_availability(&self, _available: bool) {}

    /// Called when an open remote channel ends (`false`) and when it is
    /// re-established by the reconnect loop (`true`), whether or not the TV
    /// had signalled availability. The channel opened by
    /// [`RemoteTransport::connect`] is reported by its return value instead.
    fn on_link(&self, _up: bool) {}
}

/// An authenticated connection to one TV.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Open the remote channel.
    async fn connect(&self) -> Result<()>;

    /// Close every channel. No observer is notified.
    fn disconnect(&self);

    /// Begin pairing; the TV shows a code.
    async fn start_pairing(&self) -> Result<()>;

    /// Submit the code shown on the TV.
    async fn finish_pairing(&self, code: &PairingCode) -> Result<()>;

    /// Queue a key press.
    fn send_key(&self, key: KeyCode, direction: KeyDirection) -> Result<()>;

    /// Queue text for the focused field using the transport's own counters.
    fn send_text(&self, text: &str) -> Result<()>;

    /// Queue a prepared IME edit.
    fn send_ime_edit(&self, edit: ImeEdit) -> Result<()>;

    /// Queue an app link launch.
    fn launch_app(&self, link: &str) -> Result<()>;

    /// Reconnect automatically after the connection drops, until `disconnect`.
    fn keep_reconnecting(&self);

    /// Register an observer.
    fn subscribe(&self, observer: Arc<dyn TransportObserver>);
}

/// Settings a transport is built with.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Name announced to the TV
    pub client_name: String,
    /// Remote channel port
    pub port: u16,
    /// Pairing channel port
    pub pairing_port: u16,
    /// Bound on TCP connect plus TLS handshake, and on pairing replies
    pub connect_timeout: Duration,
    /// Delay between automatic reconnect attempts
    pub reconnect_delay: Duration,
}

impl TransportOptions {
    /// Options from the loaded configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            client_name: config.general.client_name.clone(),
            port: config.remote.port,
            pairing_port: config.remote.pairing_port,
            connect_timeout: config.remote.connect_timeout,
            reconnect_delay: config.remote.reconnect_delay,
        }
    }
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Builds transports. Called once per connect attempt.
pub trait TransportFactory: Send + Sync {
    /// Create an unconnected transport for `address`.
    fn create(
        &self,
        address: IpAddr,
        certificate: &ClientCertificate,
        options: &TransportOptions,
    ) -> Result<Arc<dyn RemoteTransport>>;
}
