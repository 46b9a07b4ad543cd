//! TLS transport speaking the Android TV remote protocol.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;

use super::{RemoteTransport, TransportFactory, TransportObserver, TransportOptions};
use crate::code::PairingCode;
use crate::crypto::{self, ClientCertificate, TlsConfig};
use crate::error::{Error, Result};
use crate::protocol::pairing::{ENCODING_HEXADECIMAL, ROLE_INPUT, SYMBOL_LENGTH};
use crate::protocol::remote::{CLIENT_ACTIVE_CODE, CLIENT_CONFIGURE_CODE};
use crate::protocol::{
    self, DeviceInfo, ImeEdit, KeyCode, KeyDirection, PairingMessage, PairingPayload,
    PairingStatus, RemoteMessage,
};

type ClientTlsStream = tokio_rustls::client::TlsStream<TcpStream>;

/// Service name sent in the pairing request.
const PAIRING_SERVICE_NAME: &str = "atvremote";

/// Builds [`TlsTransport`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct TlsTransportFactory;

impl TransportFactory for TlsTransportFactory {
    fn create(
        &self,
        address: IpAddr,
        certificate: &ClientCertificate,
        options: &TransportOptions,
    ) -> Result<Arc<dyn RemoteTransport>> {
        Ok(Arc::new(TlsTransport::new(
            address,
            certificate.clone(),
            options.clone(),
        )?))
    }
}

/// Transport over TLS: remote channel on one port, pairing on another.
///
/// A transport is single use. Once [`RemoteTransport::disconnect`] ran it stays
/// closed; the session manager builds a new one for the next attempt.
pub struct TlsTransport {
    inner: Arc<Inner>,
}

struct Inner {
    address: IpAddr,
    options: TransportOptions,
    certificate: ClientCertificate,
    connector: TlsConnector,
    observers: RwLock<Vec<Arc<dyn TransportObserver>>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<RemoteMessage>>>,
    available: AtomicBool,
    reconnect: AtomicBool,
    cancel: CancellationToken,
    /// (ime_counter, field_counter) as last reported by the TV
    counters: Mutex<(i32, i32)>,
    pairing: tokio::sync::Mutex<Option<PairingChannel>>,
}

struct PairingChannel {
    stream: ClientTlsStream,
    server_cert: Vec<u8>,
}

impl TlsTransport {
    /// Create an unconnected transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS configuration cannot be built.
    pub fn new(
        address: IpAddr,
        certificate: ClientCertificate,
        options: TransportOptions,
    ) -> Result<Self> {
        let connector = TlsConnector::from(TlsConfig::client(&certificate)?.client_config());
        Ok(Self {
            inner: Arc::new(Inner {
                address,
                options,
                certificate,
                connector,
                observers: RwLock::new(Vec::new()),
                outbound: Mutex::new(None),
                available: AtomicBool::new(false),
                reconnect: AtomicBool::new(false),
                cancel: CancellationToken::new(),
                counters: Mutex::new((0, 0)),
                pairing: tokio::sync::Mutex::new(None),
            }),
        })
    }

    /// Whether the TV has signalled availability on the current connection.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.inner.available.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for TlsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsTransport")
            .field("address", &self.inner.address)
            .field("available", &self.is_available())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RemoteTransport for TlsTransport {
    async fn connect(&self) -> Result<()> {
        if self.inner.cancel.is_cancelled() {
            return Err(Error::Internal("transport already closed".to_string()));
        }

        let stream = self.inner.open(self.inner.options.port).await?;
        let rx = self.inner.install_outbound();
        tracing::debug!("Remote channel open to {}", self.inner.address);

        tokio::spawn(supervise(Arc::clone(&self.inner), stream, rx));
        Ok(())
    }

    fn disconnect(&self) {
        self.inner.cancel.cancel();
        self.inner.reconnect.store(false, Ordering::SeqCst);
        self.inner.available.store(false, Ordering::SeqCst);
        self.inner.lock_outbound().take();
        if let Ok(mut pairing) = self.inner.pairing.try_lock() {
            pairing.take();
        }
        tracing::debug!("Transport to {} closed", self.inner.address);
    }

    async fn start_pairing(&self) -> Result<()> {
        let inner = &self.inner;
        let mut stream = inner.open(inner.options.pairing_port).await?;

        let server_cert = stream
            .get_ref()
            .1
            .peer_certificates()
            .and_then(|certs| certs.first())
            .map(|cert| cert.as_ref().to_vec())
            .ok_or_else(|| Error::TlsError("TV presented no certificate".to_string()))?;

        inner
            .pairing_exchange(
                &mut stream,
                PairingPayload::Request {
                    service_name: PAIRING_SERVICE_NAME.to_string(),
                    client_name: inner.options.client_name.clone(),
                },
            )
            .await?;
        inner
            .pairing_exchange(
                &mut stream,
                PairingPayload::Option {
                    encoding: ENCODING_HEXADECIMAL,
                    symbol_length: SYMBOL_LENGTH,
                    preferred_role: ROLE_INPUT,
                },
            )
            .await?;
        inner
            .pairing_exchange(
                &mut stream,
                PairingPayload::Configuration {
                    encoding: ENCODING_HEXADECIMAL,
                    symbol_length: SYMBOL_LENGTH,
                    client_role: ROLE_INPUT,
                },
            )
            .await?;

        tracing::info!("Pairing started with {}, code shown on TV", inner.address);
        *inner.pairing.lock().await = Some(PairingChannel {
            stream,
            server_cert,
        });
        Ok(())
    }

    async fn finish_pairing(&self, code: &PairingCode) -> Result<()> {
        let inner = &self.inner;
        let mut guard = inner.pairing.lock().await;
        let channel = guard.as_ref().ok_or(Error::PairingNotStarted)?;

        // A mistyped code is caught locally and the channel stays open for a retry.
        let secret = crypto::pairing_secret(
            inner.certificate.cert_der().as_ref(),
            &channel.server_cert,
            code,
        )?;

        let mut channel = guard.take().ok_or(Error::PairingNotStarted)?;
        drop(guard);

        inner
            .pairing_exchange(&mut channel.stream, PairingPayload::Secret(secret.to_vec()))
            .await?;

        tracing::info!("Pairing with {} complete", inner.address);
        Ok(())
    }

    fn send_key(&self, key: KeyCode, direction: KeyDirection) -> Result<()> {
        self.inner.send(RemoteMessage::KeyInject {
            key_code: key,
            direction,
        })
    }

    fn send_text(&self, text: &str) -> Result<()> {
        let (ime_counter, field_counter) = *self.inner.lock_counters();
        let cursor = i32::try_from(text.chars().count())
            .unwrap_or(i32::MAX)
            .saturating_sub(1);
        self.inner.send(RemoteMessage::ImeBatchEdit(ImeEdit::replace(
            ime_counter,
            field_counter,
            cursor,
            cursor,
            text,
        )))
    }

    fn send_ime_edit(&self, edit: ImeEdit) -> Result<()> {
        self.inner.send(RemoteMessage::ImeBatchEdit(edit))
    }

    fn launch_app(&self, link: &str) -> Result<()> {
        self.inner.send(RemoteMessage::AppLinkLaunch {
            app_link: link.to_string(),
        })
    }

    fn keep_reconnecting(&self) {
        self.inner.reconnect.store(true, Ordering::SeqCst);
    }

    fn subscribe(&self, observer: Arc<dyn TransportObserver>) {
        self.inner
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }
}

impl Inner {
    async fn open(&self, port: u16) -> Result<ClientTlsStream> {
        let target = SocketAddr::new(self.address, port);
        let handshake = async {
            let stream = TcpStream::connect(target).await?;
            let tls = self
                .connector
                .connect(ServerName::from(self.address), stream)
                .await?;
            Ok::<_, std::io::Error>(tls)
        };

        match tokio::time::timeout(self.options.connect_timeout, handshake).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(Error::HandshakeFailed {
                address: self.address,
                reason: format!("port {port}: {e}"),
            }),
            Err(_) => Err(Error::HandshakeFailed {
                address: self.address,
                reason: format!(
                    "port {port}: timed out after {:?}",
                    self.options.connect_timeout
                ),
            }),
        }
    }

    async fn pairing_exchange(
        &self,
        stream: &mut ClientTlsStream,
        payload: PairingPayload,
    ) -> Result<PairingMessage> {
        let request = PairingMessage::ok(payload);
        protocol::write_frame(stream, &request.encode()).await?;

        let frame = protocol::read_frame_with_timeout(stream, self.options.connect_timeout).await?;
        let reply = PairingMessage::decode(&frame)?;

        match reply.status {
            PairingStatus::Ok => Ok(reply),
            PairingStatus::BadSecret => Err(Error::PairingRejected(
                "the TV did not accept the code".to_string(),
            )),
            status => Err(Error::PairingRejected(format!(
                "the TV answered with status {}",
                status.code()
            ))),
        }
    }

    fn lock_outbound(
        &self,
    ) -> std::sync::MutexGuard<'_, Option<mpsc::UnboundedSender<RemoteMessage>>> {
        self.outbound.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_counters(&self) -> std::sync::MutexGuard<'_, (i32, i32)> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn install_outbound(&self) -> mpsc::UnboundedReceiver<RemoteMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.lock_outbound() = Some(tx);
        rx
    }

    fn send(&self, message: RemoteMessage) -> Result<()> {
        let outbound = self.lock_outbound();
        let tx = outbound.as_ref().ok_or(Error::NotConnected)?;
        tx.send(message)
            .map_err(|e| Error::CommandFailed(format!("{} not queued: channel closed", e.0.kind())))
    }

    fn observers(&self) -> Vec<Arc<dyn TransportObserver>> {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_link(&self, up: bool) {
        tracing::debug!("{} link {}", self.address, if up { "up" } else { "down" });
        for observer in self.observers() {
            observer.on_link(up);
        }
    }

    fn set_available(&self, available: bool) {
        if self.available.swap(available, Ordering::SeqCst) == available {
            return;
        }
        tracing::debug!("{} available: {}", self.address, available);
        for observer in self.observers() {
            observer.on_availability(available);
        }
    }

    /// Protocol handling that must happen before observers see the message.
    fn handle(&self, message: &RemoteMessage) {
        let reply = match message {
            RemoteMessage::Configure { .. } => Some(RemoteMessage::Configure {
                code1: CLIENT_CONFIGURE_CODE,
                device_info: Some(DeviceInfo::client(&self.options.client_name)),
            }),
            RemoteMessage::SetActive { .. } => Some(RemoteMessage::SetActive {
                active: CLIENT_ACTIVE_CODE,
            }),
            RemoteMessage::PingRequest { val1 } => {
                Some(RemoteMessage::PingResponse { val1: *val1 })
            }
            RemoteMessage::ImeBatchEdit(edit) => {
                *self.lock_counters() = (edit.ime_counter, edit.field_counter);
                None
            }
            RemoteMessage::ImeKeyInject {
                field: Some(field), ..
            }
            | RemoteMessage::ImeShowRequest { field: Some(field) } => {
                self.lock_counters().1 = field.field_counter;
                None
            }
            RemoteMessage::Error { .. } => {
                tracing::warn!("{} reported an error for the last message", self.address);
                None
            }
            RemoteMessage::Start { started } => {
                let state = if *started { "on" } else { "off" };
                tracing::debug!("{} power state: {}", self.address, state);
                None
            }
            _ => None,
        };

        if let Some(reply) = reply {
            if let Err(e) = self.send(reply) {
                tracing::debug!("Protocol reply to {} dropped: {}", self.address, e);
            }
        }

        if matches!(message, RemoteMessage::SetActive { .. }) {
            self.set_available(true);
        }
    }

    fn dispatch(&self, message: &RemoteMessage) {
        self.handle(message);
        for observer in self.observers() {
            observer.on_message(message);
        }
    }
}

/// Runs connections until the transport is closed, reconnecting after drops
/// while reconnecting is enabled.
async fn supervise(
    inner: Arc<Inner>,
    mut stream: ClientTlsStream,
    mut rx: mpsc::UnboundedReceiver<RemoteMessage>,
) {
    loop {
        let outcome = run_connection(&inner, stream, rx).await;
        if inner.cancel.is_cancelled() {
            return;
        }

        match outcome {
            Ok(()) => tracing::info!("{} closed the connection", inner.address),
            Err(e) => tracing::warn!("{}: {}", Error::TransportDropped(inner.address), e),
        }
        inner.lock_outbound().take();
        inner.set_link(false);
        inner.set_available(false);

        if !inner.reconnect.load(Ordering::SeqCst) {
            return;
        }

        loop {
            tokio::select! {
                () = inner.cancel.cancelled() => return,
                () = tokio::time::sleep(inner.options.reconnect_delay) => {}
            }

            match inner.open(inner.options.port).await {
                Ok(new_stream) => {
                    tracing::info!("Reconnected to {}", inner.address);
                    stream = new_stream;
                    rx = inner.install_outbound();
                    inner.set_link(true);
                    break;
                }
                Err(e) => tracing::debug!("Reconnect to {} failed: {}", inner.address, e),
            }
        }
    }
}

async fn run_connection(
    inner: &Arc<Inner>,
    stream: ClientTlsStream,
    mut rx: mpsc::UnboundedReceiver<RemoteMessage>,
) -> Result<()> {
    let (mut reader, mut writer) = tokio::io::split(stream);

    let writer_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            protocol::write_frame(&mut writer, &message.encode()).await?;
        }
        Ok::<_, Error>(())
    });

    let result = loop {
        let frame = tokio::select! {
            () = inner.cancel.cancelled() => break Ok(()),
            frame = protocol::read_frame(&mut reader) => frame,
        };

        match frame {
            Ok(payload) => match RemoteMessage::decode(&payload) {
                Ok(message) => {
                    tracing::trace!("<- {} {}", inner.address, message.kind());
                    inner.dispatch(&message);
                }
                Err(e) => tracing::debug!("Undecodable message from {}: {}", inner.address, e),
            },
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break Ok(()),
            Err(e) => break Err(e),
        }
    };

    writer_task.abort();
    result
}
