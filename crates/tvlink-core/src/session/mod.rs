//! Session manager: the connection and pairing state machine.
//!
//! ```text
//!              ┌──────────────────────── failure / disconnect ───────────────┐
//!              ▼                                                              │
//!  Disconnected ──▶ Probing ──▶ Connecting ──▶ AwaitingHandshake ──▶ Ready ──┘
//!                                  ▲   │                               │
//!                                  │   └────────▶ Pairing ◀────────────┘
//!                                  └───────────────┘ (code accepted)
//! ```
//!
//! One [`SessionManager`] owns at most one session at a time. Connect,
//! disconnect and pairing hold the lifecycle lock so only one such sequence
//! runs at once; commands (`send_key`, `send_text`, ...) do not take it and are
//! dropped, with a log line, when no session is connected.
//!
//! A connect is *optimistic*: as soon as the transport is up the session counts
//! as connected and `connected` fires, before the TV signals availability. Some
//! TVs take many seconds to do so, or never do.

mod scheduler;

pub use scheduler::{SessionScheduler, SessionTask};

use std::fmt;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::{watch, Mutex};

use crate::adb::DebugBridge;
use crate::code::PairingCode;
use crate::config::ConfigStore;
use crate::connection;
use crate::crypto::ClientCertificate;
use crate::error::{Error, Result};
use crate::events::EventBridge;
use crate::ime::{ImeSync, TextChange};
use crate::protocol::{KeyCode, KeyDirection, RemoteMessage};
use crate::registry::PairedRegistry;
use crate::transport::{
    RemoteTransport, TlsTransportFactory, TransportFactory, TransportObserver, TransportOptions,
};

/// Lifecycle state of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No session
    #[default]
    Disconnected,
    /// Checking that the remote port accepts connections
    Probing,
    /// Opening the transport
    Connecting,
    /// Transport up, waiting for the TV to signal availability
    AwaitingHandshake,
    /// TV available (or assumed available after the wait)
    Ready,
    /// Pairing code exchange in progress
    Pairing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Probing => "probing",
            Self::Connecting => "connecting",
            Self::AwaitingHandshake => "awaiting handshake",
            Self::Ready => "ready",
            Self::Pairing => "pairing",
        })
    }
}

/// Channel used for key and bulk text commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputRoute {
    /// The remote protocol transport
    #[default]
    Remote,
    /// The attached debug bridge
    DebugBridge,
}

#[derive(Clone)]
struct ActiveSession {
    address: IpAddr,
    transport: Arc<dyn RemoteTransport>,
    connected: Arc<AtomicBool>,
    /// Set once readiness was awaited and auto-reconnect enabled
    armed: Arc<AtomicBool>,
    ready: watch::Receiver<bool>,
}

type SharedState = Arc<RwLock<SessionState>>;

fn set_state(state: &SharedState, next: SessionState) {
    let mut current = state.write().unwrap_or_else(PoisonError::into_inner);
    if *current != next {
        tracing::debug!("session: {} -> {}", *current, next);
        *current = next;
    }
}

/// Hooks wired into every transport the manager builds.
struct SessionObserver {
    events: Arc<EventBridge>,
    ime: Arc<ImeSync>,
    connected: Arc<AtomicBool>,
    ready: watch::Sender<bool>,
    state: SharedState,
}

impl TransportObserver for SessionObserver {
    fn on_message(&self, message: &RemoteMessage) {
        if let Some(text) = self.ime.observe(message) {
            self.ime.applying_remote(|| self.events.text_changed(&text));
        }
    }

    fn on_availability(&self, available: bool) {
        if available {
            self.ready.send_replace(true);
        }

        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            match (*state, available) {
                (SessionState::AwaitingHandshake | SessionState::Connecting, true) => {
                    *state = SessionState::Ready;
                }
                (SessionState::Ready, false) => *state = SessionState::Connecting,
                _ => {}
            }
        }

        self.set_connected(available);
    }

    fn on_link(&self, up: bool) {
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            match (*state, up) {
                (SessionState::Connecting, true) => *state = SessionState::AwaitingHandshake,
                (SessionState::AwaitingHandshake | SessionState::Ready, false) => {
                    *state = SessionState::Connecting;
                }
                _ => {}
            }
        }

        self.set_connected(up);
    }
}

impl SessionObserver {
    /// Edge-triggered: events fire only when the flag changes.
    fn set_connected(&self, connected: bool) {
        if self.connected.swap(connected, Ordering::SeqCst) == connected {
            return;
        }
        if connected {
            self.events.connected();
        } else {
            tracing::info!("Connection dropped");
            self.ime.reset();
            self.events.disconnected();
        }
    }
}

/// Owns the lifecycle of one logical connection to one TV.
pub struct SessionManager {
    config: Arc<ConfigStore>,
    factory: Arc<dyn TransportFactory>,
    events: Arc<EventBridge>,
    ime: Arc<ImeSync>,
    registry: PairedRegistry,
    lifecycle: Mutex<()>,
    active: RwLock<Option<ActiveSession>>,
    state: SharedState,
    route: RwLock<InputRoute>,
    debug_bridge: RwLock<Option<Arc<dyn DebugBridge>>>,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &self.state())
            .field("address", &self.address())
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Create a manager using the TLS transport.
    #[must_use]
    pub fn new(config: Arc<ConfigStore>) -> Self {
        Self::with_factory(config, Arc::new(TlsTransportFactory))
    }

    /// Create a manager building transports with `factory`.
    #[must_use]
    pub fn with_factory(config: Arc<ConfigStore>, factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            registry: PairedRegistry::new(Arc::clone(&config)),
            config,
            factory,
            events: Arc::new(EventBridge::new()),
            ime: Arc::new(ImeSync::new()),
            lifecycle: Mutex::new(()),
            active: RwLock::new(None),
            state: Arc::new(RwLock::new(SessionState::Disconnected)),
            route: RwLock::new(InputRoute::Remote),
            debug_bridge: RwLock::new(None),
        }
    }

    /// Event subscriptions. Stable across reconnects.
    #[must_use]
    pub fn events(&self) -> &EventBridge {
        &self.events
    }

    /// The paired-device registry.
    #[must_use]
    pub fn registry(&self) -> &PairedRegistry {
        &self.registry
    }

    /// Text synchronization state.
    #[must_use]
    pub fn ime(&self) -> &ImeSync {
        &self.ime
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Address of the current session, connected or not.
    #[must_use]
    pub fn address(&self) -> Option<IpAddr> {
        self.session().map(|s| s.address)
    }

    /// Whether a session is connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected_session().is_some()
    }

    /// Whether `address` completed pairing.
    #[must_use]
    pub fn is_paired(&self, address: IpAddr) -> bool {
        self.registry.is_paired(address)
    }

    /// Address of the last device that reached readiness.
    #[must_use]
    pub fn last_connected(&self) -> Option<IpAddr> {
        self.registry.last_connected()
    }

    fn session(&self) -> Option<ActiveSession> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn connected_session(&self) -> Option<ActiveSession> {
        self.session()
            .filter(|s| s.connected.load(Ordering::SeqCst))
    }

    fn connected_to(&self, address: IpAddr) -> Option<ActiveSession> {
        self.connected_session().filter(|s| s.address == address)
    }

    /// Whether `connect(address, wait_for_ready)` has nothing left to do.
    fn is_settled(&self, address: IpAddr, wait_for_ready: bool) -> bool {
        self.connected_to(address)
            .is_some_and(|s| !wait_for_ready || s.armed.load(Ordering::SeqCst))
    }

    fn set_state(&self, next: SessionState) {
        set_state(&self.state, next);
    }

    fn report(&self, error: &Error) {
        let message = match error {
            Error::PortUnreachable { address, port } => format!(
                "Port {port} is closed on {address}. Is the TV on and on the same network?"
            ),
            other => other.to_string(),
        };
        tracing::error!("{}", message);
        self.events.error(&message);
    }

    /// Connect to `address`.
    ///
    /// Returns `true` once the transport is up, whether or not the TV has
    /// confirmed availability. A no-op returning `true` when already connected
    /// to `address`; a session opened without waiting only runs the readiness
    /// wait.
    ///
    /// With `wait_for_ready`, the remote port is probed first and a closed port
    /// fails the call; after connecting, the call waits (bounded) for the TV's
    /// availability signal, then enables automatic reconnect and remembers the
    /// address. Without it a closed port is only logged, since the caller may
    /// be about to pair on the other port.
    ///
    /// Failures are reported through the `error` event.
    pub async fn connect(&self, address: IpAddr, wait_for_ready: bool) -> bool {
        if self.is_settled(address, wait_for_ready) {
            return true;
        }

        let _guard = self.lifecycle.lock().await;
        if self.is_settled(address, wait_for_ready) {
            return true;
        }

        let result = match self.connected_to(address) {
            Some(session) => self.await_ready(&session).await,
            None => self.connect_locked(address, wait_for_ready).await,
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                self.set_state(SessionState::Disconnected);
                self.report(&e);
                false
            }
        }
    }

    async fn connect_locked(&self, address: IpAddr, wait_for_ready: bool) -> Result<()> {
        let config = self.config.snapshot();
        let remote = &config.remote;

        self.teardown_locked();

        self.set_state(SessionState::Probing);
        tracing::info!("Checking port {} on {}", remote.port, address);
        if !connection::probe(address, remote.port, remote.probe_timeout).await {
            let err = Error::PortUnreachable {
                address,
                port: remote.port,
            };
            if wait_for_ready {
                return Err(err);
            }
            tracing::warn!("{}, continuing anyway", err);
        }

        self.set_state(SessionState::Connecting);
        let certificate =
            ClientCertificate::load_or_generate(&config.keys_dir(), &config.general.client_name)?;
        let options = TransportOptions::from_config(&config);
        let attempts = remote.connect_attempts.max(1);

        let mut attempt = 1;
        loop {
            let connected = Arc::new(AtomicBool::new(false));
            let (ready_tx, ready_rx) = watch::channel(false);

            // Always a fresh transport: a half-finished handshake cannot be resumed.
            let transport = self.factory.create(address, &certificate, &options)?;
            transport.subscribe(Arc::new(SessionObserver {
                events: Arc::clone(&self.events),
                ime: Arc::clone(&self.ime),
                connected: Arc::clone(&connected),
                ready: ready_tx,
                state: Arc::clone(&self.state),
            }));
            let session = ActiveSession {
                address,
                transport: Arc::clone(&transport),
                connected,
                armed: Arc::new(AtomicBool::new(false)),
                ready: ready_rx,
            };
            self.install(session.clone());

            tracing::info!("Connection attempt {}/{} to {}", attempt, attempts, address);
            let handshake = tokio::time::timeout(remote.connect_timeout, transport.connect());
            let outcome = match handshake.await {
                Ok(result) => result,
                Err(_) => Err(Error::HandshakeFailed {
                    address,
                    reason: format!("no answer within {:?}", remote.connect_timeout),
                }),
            };

            match outcome {
                Ok(()) => {
                    self.announce(&session);
                    if !wait_for_ready {
                        tracing::info!("Transport to {} established (fast mode)", address);
                        return Ok(());
                    }
                    return self.await_ready(&session).await;
                }
                Err(e) if attempt < attempts => {
                    tracing::warn!("Connect failed on attempt {}: {}", attempt, e);
                    transport.disconnect();
                    tokio::time::sleep(remote.retry_delay).await;
                    attempt += 1;
                }
                // The last transport stays installed so pairing can still start.
                Err(e) => {
                    tracing::warn!("Connect failed on attempt {}: {}", attempt, e);
                    return Err(e);
                }
            }
        }
    }

    /// Optimistic connect: the session counts as connected from here on.
    fn announce(&self, session: &ActiveSession) {
        self.ime.reset();
        self.set_state(SessionState::AwaitingHandshake);
        if *session.ready.borrow() {
            self.set_state(SessionState::Ready);
        }
        if !session.connected.swap(true, Ordering::SeqCst) {
            self.events.connected();
        }
    }

    async fn await_ready(&self, session: &ActiveSession) -> Result<()> {
        let address = session.address;
        let ready_timeout = self.config.read(|c| c.remote.ready_timeout);
        let mut ready = session.ready.clone();

        tracing::info!("Waiting for {} to signal availability", address);
        match tokio::time::timeout(ready_timeout, ready.wait_for(|available| *available)).await {
            Ok(Ok(_)) => tracing::info!("{} is ready", address),
            _ => tracing::warn!(
                "{} did not signal availability within {:?}, proceeding anyway",
                address,
                ready_timeout
            ),
        }

        session.transport.keep_reconnecting();
        session.armed.store(true, Ordering::SeqCst);
        self.set_state(SessionState::Ready);
        if let Err(e) = self.registry.set_last_connected(address) {
            tracing::warn!("Could not remember last device: {}", e);
        }
        Ok(())
    }

    fn install(&self, session: ActiveSession) {
        let previous = self
            .active
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(session);
        if let Some(previous) = previous {
            previous.transport.disconnect();
        }
    }

    /// Drop the current session. Caller holds the lifecycle lock.
    fn teardown_locked(&self) {
        let previous = self
            .active
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(session) = previous {
            tracing::info!("Disconnecting from {}", session.address);
            session.transport.disconnect();
            if session.connected.swap(false, Ordering::SeqCst) {
                self.events.disconnected();
            }
        }
        self.set_state(SessionState::Disconnected);
    }

    /// Close the session. Safe to call when nothing is connected.
    pub async fn disconnect(&self) {
        let _guard = self.lifecycle.lock().await;
        self.teardown_locked();
    }

    /// Connect to the last device that reached readiness, if any.
    pub async fn auto_connect(&self) -> bool {
        match self.last_connected() {
            Some(address) => self.connect(address, true).await,
            None => false,
        }
    }

    /// Ask the TV to show a pairing code.
    ///
    /// Needs a client from an earlier `connect`, typically with
    /// `wait_for_ready = false`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoClient`] (logged only) without a client; other
    /// failures are also reported through the `error` event.
    pub async fn start_pairing(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        let Some(session) = self.session() else {
            tracing::warn!("start_pairing: no client initialized");
            return Err(Error::NoClient);
        };

        self.set_state(SessionState::Pairing);
        tracing::info!("Starting pairing with {}", session.address);
        session.transport.start_pairing().await.inspect_err(|e| {
            self.report(e);
        })
    }

    /// Submit the code shown on the TV.
    ///
    /// On success the address is recorded as paired and the session is rebuilt
    /// so the TV sees the now-trusted certificate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoClient`] (logged only) without a client. A malformed
    /// or rejected code is reported through the `error` event and returned; the
    /// user can enter it again.
    pub async fn finish_pairing(&self, code: &str) -> Result<()> {
        let address = {
            let _guard = self.lifecycle.lock().await;
            let Some(session) = self.session() else {
                tracing::warn!("finish_pairing: no client initialized");
                return Err(Error::NoClient);
            };

            let code = PairingCode::parse(code).inspect_err(|e| self.report(e))?;
            session
                .transport
                .finish_pairing(&code)
                .await
                .inspect_err(|e| self.report(e))?;

            match self.registry.mark_paired(session.address) {
                Ok(_) => tracing::info!("Paired with {}", session.address),
                Err(e) => tracing::warn!("Paired, but could not save registry: {}", e),
            }

            self.teardown_locked();
            session.address
        };

        self.connect(address, false).await;
        Ok(())
    }

    /// Disconnect, delete the client certificate and forget every paired
    /// device.
    ///
    /// # Errors
    ///
    /// Returns an error if the key files or the registry cannot be updated.
    pub async fn reset_pairing(&self) -> Result<()> {
        self.disconnect().await;

        let keys_dir = self.config.read(crate::config::Config::keys_dir);
        ClientCertificate::delete(&keys_dir)?;
        self.registry.clear()?;

        tracing::info!("Keys reset, every TV must be paired again");
        Ok(())
    }

    /// Select the channel used by `send_key` and `send_text`.
    pub fn set_input_route(&self, route: InputRoute) {
        *self.route.write().unwrap_or_else(PoisonError::into_inner) = route;
        tracing::debug!("Input route: {:?}", route);
    }

    /// Attach a debug bridge for [`InputRoute::DebugBridge`].
    pub fn attach_debug_bridge(&self, bridge: Arc<dyn DebugBridge>) {
        *self
            .debug_bridge
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(bridge);
    }

    /// The bridge to use, when the caller selected it.
    fn bridge_route(&self) -> Option<Arc<dyn DebugBridge>> {
        if *self.route.read().unwrap_or_else(PoisonError::into_inner) != InputRoute::DebugBridge {
            return None;
        }
        let bridge = self
            .debug_bridge
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if bridge.is_none() {
            tracing::warn!("Debug-bridge route selected but no bridge attached");
        }
        bridge
    }

    fn spawn_bridge_command<F>(&self, what: String, command: F)
    where
        F: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = command.await {
                        tracing::warn!("{}", Error::CommandFailed(format!("{what}: {e}")));
                    }
                });
            }
            Err(_) => tracing::warn!("{}: no runtime for debug-bridge command", what),
        }
    }

    fn command_session(&self, what: &str) -> Option<ActiveSession> {
        let session = self.connected_session();
        if session.is_none() {
            tracing::debug!("{}: not connected, dropped", what);
        }
        session
    }

    fn swallow(what: &str, result: Result<()>) {
        if let Err(e) = result {
            tracing::warn!("{}", Error::CommandFailed(format!("{what}: {e}")));
        }
    }

    /// Press a key. Dropped when not connected; failures are logged.
    pub fn send_key(&self, key: KeyCode, direction: KeyDirection) {
        if let Some(bridge) = self.bridge_route() {
            self.spawn_bridge_command(format!("send_key {key}"), async move {
                bridge.send_key(key).await
            });
            return;
        }

        let Some(session) = self.command_session("send_key") else {
            return;
        };
        tracing::debug!("send_key {} {}", key, direction);
        Self::swallow("send_key", session.transport.send_key(key, direction));
    }

    /// Send text with the transport's own bulk text command.
    pub fn send_text(&self, text: &str) {
        if let Some(bridge) = self.bridge_route() {
            let text = text.to_string();
            self.spawn_bridge_command("send_text".to_string(), async move {
                bridge.send_text(&text).await
            });
            return;
        }

        let Some(session) = self.command_session("send_text") else {
            return;
        };
        Self::swallow("send_text", session.transport.send_text(text));
    }

    /// Replace the TV field's whole content with `text`.
    ///
    /// Use for programmatic text. The edit selects the field as last known and
    /// carries the TV's latest edit counters.
    pub fn set_text(&self, text: &str) {
        let Some(session) = self.command_session("set_text") else {
            return;
        };
        if let Some(edit) = self.ime.compose_replacement(text) {
            Self::swallow("set_text", session.transport.send_ime_edit(edit));
        }
    }

    /// Sync a locally typed change to the TV field.
    ///
    /// Sends only the difference: one delete key per removed character, then
    /// the new suffix. The first update after a (re)connect is a full
    /// replacement.
    pub fn update_text(&self, text: &str) {
        let Some(session) = self.command_session("update_text") else {
            return;
        };
        let transport = &session.transport;

        match self.ime.compose_update(text) {
            Some(TextChange::Replace(edit)) => {
                Self::swallow("update_text", transport.send_ime_edit(edit));
            }
            Some(TextChange::Delta { delete, insert }) => {
                for _ in 0..delete {
                    Self::swallow(
                        "update_text",
                        transport.send_key(KeyCode::DEL, KeyDirection::Short),
                    );
                }
                if !insert.is_empty() {
                    Self::swallow("update_text", transport.send_text(&insert));
                }
            }
            None => {}
        }
    }

    /// Open an app link on the TV. Dropped when not connected.
    pub fn launch_app(&self, link: &str) {
        let Some(session) = self.command_session("launch_app") else {
            return;
        };
        tracing::info!("Launching {}", link);
        Self::swallow("launch_app", session.transport.launch_app(link));
    }
}
