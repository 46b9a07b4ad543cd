//! Common test utilities for `tvlink` integration tests.
//!
//! Provides a scripted in-memory transport so session behavior can be tested
//! without a TV.

#![allow(dead_code)]

use std::net::IpAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpListener;

use tvlink_core::code::PairingCode;
use tvlink_core::config::{Config, ConfigStore};
use tvlink_core::crypto::ClientCertificate;
use tvlink_core::protocol::{ImeEdit, KeyCode, KeyDirection, RemoteMessage};
use tvlink_core::transport::{
    RemoteTransport, TransportFactory, TransportObserver, TransportOptions,
};
use tvlink_core::{Error, Result};

/// Create a temporary directory for test files.
pub fn create_temp_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

/// Bind a loopback listener standing in for the TV's remote port.
pub async fn open_port() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    (listener, port)
}

/// A loopback port nothing listens on.
pub async fn closed_port() -> u16 {
    let (listener, port) = open_port().await;
    drop(listener);
    port
}

/// Loopback device address.
pub fn localhost() -> IpAddr {
    "127.0.0.1".parse().expect("address")
}

/// Configuration with short timeouts, keys under `keys_dir` and the remote
/// port set to `port`.
pub fn test_config(keys_dir: &Path, port: u16) -> Config {
    let mut config = Config::default();
    config.general.client_name = "tvlink-test".to_string();
    config.general.keys_dir = Some(keys_dir.to_path_buf());
    config.remote.port = port;
    config.remote.probe_timeout = Duration::from_millis(500);
    config.remote.connect_timeout = Duration::from_secs(2);
    config.remote.connect_attempts = 2;
    config.remote.retry_delay = Duration::from_millis(20);
    config.remote.ready_timeout = Duration::from_millis(200);
    config
}

/// In-memory store for `config`.
pub fn store(config: Config) -> Arc<ConfigStore> {
    Arc::new(ConfigStore::in_memory(config))
}

/// Everything the fake transports were asked to do, shared by all of them.
#[derive(Default)]
pub struct Recorder {
    /// Transports built so far
    pub created: AtomicUsize,
    /// Connect calls still to fail
    pub fail_connects: AtomicUsize,
    /// Signal availability as soon as a connect succeeds
    pub auto_available: AtomicBool,
    /// Time each connect call takes
    pub connect_delay: Mutex<Duration>,
    /// Code `finish_pairing` accepts (any when unset)
    pub accepted_code: Mutex<Option<String>>,
    pub keys: Mutex<Vec<(KeyCode, KeyDirection)>>,
    pub texts: Mutex<Vec<String>>,
    pub edits: Mutex<Vec<ImeEdit>>,
    pub links: Mutex<Vec<String>>,
    pub pairing_codes: Mutex<Vec<String>>,
    pub keep_reconnecting: AtomicBool,
    transports: Mutex<Vec<Arc<FakeTransport>>>,
}

impl Recorder {
    /// Recorder whose transports report availability on connect.
    pub fn new() -> Arc<Self> {
        let recorder = Self::default();
        recorder.auto_available.store(true, Ordering::SeqCst);
        Arc::new(recorder)
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn keys(&self) -> Vec<(KeyCode, KeyDirection)> {
        self.keys.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }

    pub fn edits(&self) -> Vec<ImeEdit> {
        self.edits.lock().unwrap().clone()
    }

    pub fn links(&self) -> Vec<String> {
        self.links.lock().unwrap().clone()
    }

    /// Most recently built transport.
    pub fn latest(&self) -> Arc<FakeTransport> {
        self.transports
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no transport built")
    }

    /// Deliver `message` from the TV on the latest transport.
    pub fn deliver(&self, message: &RemoteMessage) {
        self.latest().deliver(message);
    }

    /// Change the TV's availability on the latest transport.
    pub fn set_available(&self, available: bool) {
        self.latest().set_available(available);
    }

    /// Drop or re-establish the latest transport's channel.
    pub fn set_link(&self, up: bool) {
        self.latest().set_link(up);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock().unwrap() = delay;
    }
}

/// Scripted transport.
pub struct FakeTransport {
    pub address: IpAddr,
    recorder: Arc<Recorder>,
    observers: Mutex<Vec<Arc<dyn TransportObserver>>>,
    connected: AtomicBool,
    pairing: AtomicBool,
    pub disconnected: AtomicBool,
}

impl FakeTransport {
    fn observers(&self) -> Vec<Arc<dyn TransportObserver>> {
        self.observers.lock().unwrap().clone()
    }

    pub fn deliver(&self, message: &RemoteMessage) {
        for observer in self.observers() {
            observer.on_message(message);
        }
    }

    pub fn set_available(&self, available: bool) {
        for observer in self.observers() {
            observer.on_availability(available);
        }
    }

    pub fn set_link(&self, up: bool) {
        self.connected.store(up, Ordering::SeqCst);
        for observer in self.observers() {
            observer.on_link(up);
        }
    }

    fn require_connected(&self) -> Result<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }
}

#[async_trait]
impl RemoteTransport for FakeTransport {
    async fn connect(&self) -> Result<()> {
        let delay = *self.recorder.connect_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let fail = self
            .recorder
            .fail_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(Error::HandshakeFailed {
                address: self.address,
                reason: "scripted failure".to_string(),
            });
        }

        self.connected.store(true, Ordering::SeqCst);
        if self.recorder.auto_available.load(Ordering::SeqCst) {
            self.set_available(true);
        }
        Ok(())
    }

    fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.disconnected.store(true, Ordering::SeqCst);
    }

    async fn start_pairing(&self) -> Result<()> {
        self.pairing.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn finish_pairing(&self, code: &PairingCode) -> Result<()> {
        if !self.pairing.load(Ordering::SeqCst) {
            return Err(Error::PairingNotStarted);
        }
        self.recorder
            .pairing_codes
            .lock()
            .unwrap()
            .push(code.as_str().to_string());

        let accepted = self.recorder.accepted_code.lock().unwrap().clone();
        match accepted {
            Some(expected) if expected != code.as_str() => {
                Err(Error::PairingRejected("secret mismatch".to_string()))
            }
            _ => {
                self.pairing.store(false, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    fn send_key(&self, key: KeyCode, direction: KeyDirection) -> Result<()> {
        self.require_connected()?;
        self.recorder.keys.lock().unwrap().push((key, direction));
        Ok(())
    }

    fn send_text(&self, text: &str) -> Result<()> {
        self.require_connected()?;
        self.recorder.texts.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn send_ime_edit(&self, edit: ImeEdit) -> Result<()> {
        self.require_connected()?;
        self.recorder.edits.lock().unwrap().push(edit);
        Ok(())
    }

    fn launch_app(&self, link: &str) -> Result<()> {
        self.require_connected()?;
        self.recorder.links.lock().unwrap().push(link.to_string());
        Ok(())
    }

    fn keep_reconnecting(&self) {
        self.recorder.keep_reconnecting.store(true, Ordering::SeqCst);
    }

    fn subscribe(&self, observer: Arc<dyn TransportObserver>) {
        self.observers.lock().unwrap().push(observer);
    }
}

/// Factory handing out [`FakeTransport`]s.
pub struct FakeFactory {
    pub recorder: Arc<Recorder>,
}

impl FakeFactory {
    pub fn new(recorder: &Arc<Recorder>) -> Arc<Self> {
        Arc::new(Self {
            recorder: Arc::clone(recorder),
        })
    }
}

impl TransportFactory for FakeFactory {
    fn create(
        &self,
        address: IpAddr,
        _certificate: &ClientCertificate,
        _options: &TransportOptions,
    ) -> Result<Arc<dyn RemoteTransport>> {
        self.recorder.created.fetch_add(1, Ordering::SeqCst);
        let transport = Arc::new(FakeTransport {
            address,
            recorder: Arc::clone(&self.recorder),
            observers: Mutex::new(Vec::new()),
            connected: AtomicBool::new(false),
            pairing: AtomicBool::new(false),
            disconnected: AtomicBool::new(false),
        });
        self.recorder
            .transports
            .lock()
            .unwrap()
            .push(Arc::clone(&transport));
        Ok(transport)
    }
}

/// Collected event callbacks.
#[derive(Default)]
pub struct EventLog {
    pub connected: AtomicUsize,
    pub disconnected: AtomicUsize,
    pub errors: Mutex<Vec<String>>,
    pub texts: Mutex<Vec<String>>,
}

impl EventLog {
    /// Subscribe a log to every event of `events`.
    pub fn attach(events: &tvlink_core::events::EventBridge) -> Arc<Self> {
        let log = Arc::new(Self::default());

        let l = Arc::clone(&log);
        events.on_connected(move || {
            l.connected.fetch_add(1, Ordering::SeqCst);
        });
        let l = Arc::clone(&log);
        events.on_disconnected(move || {
            l.disconnected.fetch_add(1, Ordering::SeqCst);
        });
        let l = Arc::clone(&log);
        events.on_error(move |message| l.errors.lock().unwrap().push(message.to_string()));
        let l = Arc::clone(&log);
        events.on_text_changed(move |text| l.texts.lock().unwrap().push(text.to_string()));

        log
    }

    pub fn connected(&self) -> usize {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn disconnected(&self) -> usize {
        self.disconnected.load(Ordering::SeqCst)
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}
