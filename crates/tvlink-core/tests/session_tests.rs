//! Integration tests for the session manager.

mod common;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use common::{
    closed_port, create_temp_dir, localhost, open_port, store, test_config, EventLog, FakeFactory,
    Recorder,
};
use tvlink_core::adb::DebugBridge;
use tvlink_core::crypto::{CERT_FILE, KEY_FILE};
use tvlink_core::protocol::{ImeEdit, KeyCode, KeyDirection, RemoteMessage};
use tvlink_core::session::{InputRoute, SessionManager, SessionState};
use tvlink_core::{Error, Result};

struct Harness {
    manager: SessionManager,
    recorder: Arc<Recorder>,
    events: Arc<EventLog>,
    _keys: tempfile::TempDir,
    _listener: Option<tokio::net::TcpListener>,
}

async fn harness() -> Harness {
    let (listener, port) = open_port().await;
    let keys = create_temp_dir();
    let recorder = Recorder::new();
    let manager = SessionManager::with_factory(
        store(test_config(keys.path(), port)),
        FakeFactory::new(&recorder),
    );
    let events = EventLog::attach(manager.events());

    Harness {
        manager,
        recorder,
        events,
        _keys: keys,
        _listener: Some(listener),
    }
}

async fn harness_on_closed_port() -> Harness {
    let port = closed_port().await;
    let keys = create_temp_dir();
    let recorder = Recorder::new();
    let manager = SessionManager::with_factory(
        store(test_config(keys.path(), port)),
        FakeFactory::new(&recorder),
    );
    let events = EventLog::attach(manager.events());

    Harness {
        manager,
        recorder,
        events,
        _keys: keys,
        _listener: None,
    }
}

fn tv_field(text: &str, ime_counter: i32, field_counter: i32) -> RemoteMessage {
    RemoteMessage::ImeBatchEdit(ImeEdit::replace(ime_counter, field_counter, 0, 0, text))
}

#[tokio::test]
async fn test_connect_is_idempotent() {
    let h = harness().await;

    assert!(h.manager.connect(localhost(), true).await);
    assert!(h.manager.connect(localhost(), true).await);

    assert_eq!(h.recorder.created(), 1);
    assert_eq!(h.events.connected(), 1);
    assert_eq!(h.manager.state(), SessionState::Ready);
    assert_eq!(h.manager.address(), Some(localhost()));
}

#[tokio::test]
async fn test_ready_connect_remembers_device() {
    let h = harness().await;

    assert!(h.manager.connect(localhost(), true).await);
    assert!(h.recorder.keep_reconnecting.load(Ordering::SeqCst));
    assert_eq!(h.manager.last_connected(), Some(localhost()));
}

#[tokio::test]
async fn test_closed_port_reports_error() {
    let h = harness_on_closed_port().await;

    assert!(!h.manager.connect(localhost(), true).await);

    let errors = h.events.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("is closed on 127.0.0.1"));
    assert!(errors[0].contains("Is the TV on and on the same network?"));
    assert_eq!(h.recorder.created(), 0);
    assert_eq!(h.events.connected(), 0);
    assert_eq!(h.manager.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_fast_connect_ignores_closed_port() {
    let h = harness_on_closed_port().await;

    assert!(h.manager.connect(localhost(), false).await);
    assert!(h.events.errors().is_empty());
    assert!(!h.recorder.keep_reconnecting.load(Ordering::SeqCst));
    assert_eq!(h.manager.last_connected(), None);
}

#[tokio::test]
async fn test_connect_retries_with_fresh_transport() {
    let h = harness().await;
    h.recorder.fail_connects.store(1, Ordering::SeqCst);

    assert!(h.manager.connect(localhost(), true).await);
    assert_eq!(h.recorder.created(), 2);
    assert!(h.events.errors().is_empty());
}

#[tokio::test]
async fn test_failed_connect_keeps_client_for_pairing() {
    let h = harness().await;
    h.recorder.fail_connects.store(10, Ordering::SeqCst);

    assert!(!h.manager.connect(localhost(), true).await);
    assert_eq!(h.recorder.created(), 2);
    assert_eq!(h.events.errors().len(), 1);
    assert!(!h.manager.is_connected());

    h.manager.start_pairing().await.expect("client kept");
    assert_eq!(h.manager.state(), SessionState::Pairing);
}

#[tokio::test]
async fn test_unavailable_tv_connects_optimistically() {
    let h = harness().await;
    h.recorder.auto_available.store(false, Ordering::SeqCst);

    assert!(h.manager.connect(localhost(), true).await);
    assert!(h.manager.is_connected());
    assert_eq!(h.events.connected(), 1);
    assert!(h.recorder.keep_reconnecting.load(Ordering::SeqCst));

    // A late availability signal does not fire a second connected event.
    h.recorder.set_available(true);
    assert_eq!(h.events.connected(), 1);
}

#[tokio::test]
async fn test_pairing_without_client() {
    let h = harness().await;

    assert!(matches!(h.manager.start_pairing().await, Err(Error::NoClient)));
    assert!(matches!(
        h.manager.finish_pairing("A1B2C3").await,
        Err(Error::NoClient)
    ));
    assert!(h.events.errors().is_empty());
}

#[tokio::test]
async fn test_pairing_end_to_end() {
    let h = harness().await;
    *h.recorder.accepted_code.lock().unwrap() = Some("A1B2C3".to_string());

    assert!(h.manager.connect(localhost(), false).await);
    assert!(!h.manager.is_paired(localhost()));
    h.manager.start_pairing().await.unwrap();

    let err = h.manager.finish_pairing("000000").await.unwrap_err();
    assert!(matches!(err, Error::PairingRejected(_)));
    assert_eq!(h.events.errors().len(), 1);
    assert!(!h.manager.is_paired(localhost()));

    // Same channel, second try.
    h.manager.finish_pairing("a1b2c3").await.unwrap();
    assert!(h.manager.is_paired(localhost()));
    assert_eq!(h.recorder.created(), 2);
    assert!(h.manager.is_connected());

    // Already connected after the pairing reconnect.
    assert!(h.manager.connect(localhost(), true).await);
    assert_eq!(h.recorder.created(), 2);
}

#[tokio::test]
async fn test_malformed_code_is_reported() {
    let h = harness().await;
    assert!(h.manager.connect(localhost(), false).await);
    h.manager.start_pairing().await.unwrap();

    let err = h.manager.finish_pairing("12 34").await.unwrap_err();
    assert!(matches!(err, Error::InvalidPairingCode(_)));
    assert_eq!(h.events.errors().len(), 1);
}

#[tokio::test]
async fn test_disconnect_fires_once() {
    let h = harness().await;

    h.manager.disconnect().await;
    assert_eq!(h.events.disconnected(), 0);

    assert!(h.manager.connect(localhost(), true).await);
    let transport = h.recorder.latest();

    h.manager.disconnect().await;
    h.manager.disconnect().await;
    assert_eq!(h.events.disconnected(), 1);
    assert!(transport.disconnected.load(Ordering::SeqCst));
    assert_eq!(h.manager.state(), SessionState::Disconnected);
    assert_eq!(h.manager.address(), None);
}

#[tokio::test]
async fn test_commands_need_connection() {
    let h = harness().await;

    h.manager.send_key(KeyCode::HOME, KeyDirection::Short);
    h.manager.send_text("abc");
    h.manager.set_text("abc");
    h.manager.launch_app("https://www.youtube.com");
    assert!(h.recorder.keys().is_empty());
    assert!(h.recorder.texts().is_empty());
    assert!(h.recorder.edits().is_empty());
    assert!(h.recorder.links().is_empty());

    assert!(h.manager.connect(localhost(), true).await);
    h.manager.send_key(KeyCode::HOME, KeyDirection::Short);
    h.manager.launch_app("https://www.youtube.com");
    assert_eq!(h.recorder.keys(), vec![(KeyCode::HOME, KeyDirection::Short)]);
    assert_eq!(h.recorder.links(), vec!["https://www.youtube.com"]);
}

#[tokio::test]
async fn test_drop_and_recover_events() {
    let h = harness().await;
    assert!(h.manager.connect(localhost(), true).await);

    h.recorder.set_available(false);
    assert_eq!(h.events.disconnected(), 1);
    assert!(!h.manager.is_connected());

    h.recorder.set_available(false);
    assert_eq!(h.events.disconnected(), 1);

    h.recorder.set_available(true);
    assert_eq!(h.events.connected(), 2);
    assert!(h.manager.is_connected());
    assert_eq!(h.manager.state(), SessionState::Ready);
}

#[tokio::test]
async fn test_drop_before_availability_is_noticed() {
    let h = harness().await;
    h.recorder.auto_available.store(false, Ordering::SeqCst);

    assert!(h.manager.connect(localhost(), false).await);
    assert_eq!(h.events.connected(), 1);

    // The TV closes the channel without ever signalling availability.
    h.recorder.set_link(false);
    assert!(!h.manager.is_connected());
    assert_eq!(h.events.disconnected(), 1);
    assert_eq!(h.manager.state(), SessionState::Connecting);

    // A new connect builds a fresh transport instead of reusing the dead one.
    assert!(h.manager.connect(localhost(), false).await);
    assert_eq!(h.recorder.created(), 2);
    assert_eq!(h.events.connected(), 2);
    assert!(h.manager.is_connected());
}

#[tokio::test]
async fn test_link_recovers_before_availability() {
    let h = harness().await;
    h.recorder.auto_available.store(false, Ordering::SeqCst);
    assert!(h.manager.connect(localhost(), true).await);

    h.recorder.set_link(false);
    assert_eq!(h.events.disconnected(), 1);

    h.recorder.set_link(true);
    assert_eq!(h.events.connected(), 2);
    assert_eq!(h.manager.state(), SessionState::AwaitingHandshake);

    h.recorder.set_available(true);
    assert_eq!(h.events.connected(), 2);
    assert_eq!(h.manager.state(), SessionState::Ready);
}

#[tokio::test]
async fn test_concurrent_connects_build_one_transport() {
    let h = harness().await;
    h.recorder.set_connect_delay(Duration::from_millis(100));

    let (first, second) = tokio::join!(
        h.manager.connect(localhost(), true),
        h.manager.connect(localhost(), true)
    );

    assert!(first && second);
    assert_eq!(h.recorder.created(), 1);
    assert_eq!(h.events.connected(), 1);
    assert_eq!(h.manager.state(), SessionState::Ready);
}

#[tokio::test]
async fn test_disconnect_waits_for_connect_in_progress() {
    let h = harness().await;
    h.recorder.set_connect_delay(Duration::from_millis(200));
    let order = Mutex::new(Vec::new());

    let (connected, ()) = tokio::join!(
        async {
            let connected = h.manager.connect(localhost(), true).await;
            order.lock().unwrap().push("connect");
            connected
        },
        async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            h.manager.disconnect().await;
            order.lock().unwrap().push("disconnect");
        }
    );

    assert!(connected);
    assert_eq!(*order.lock().unwrap(), vec!["connect", "disconnect"]);
    assert_eq!(h.recorder.created(), 1);
    assert!(h.recorder.latest().disconnected.load(Ordering::SeqCst));
    assert!(!h.manager.is_connected());
    assert_eq!(h.manager.state(), SessionState::Disconnected);
    assert_eq!(h.events.connected(), 1);
    assert_eq!(h.events.disconnected(), 1);
}

#[tokio::test]
async fn test_set_text_replaces_whole_field() {
    let h = harness().await;
    assert!(h.manager.connect(localhost(), true).await);

    h.recorder.deliver(&tv_field("HEL", 3, 1));
    assert_eq!(h.events.texts(), vec!["HEL"]);

    h.manager.set_text("HELLO");
    let edits = h.recorder.edits();
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0], ImeEdit::replace(3, 1, 0, 3, "HELLO"));
    assert_eq!(h.manager.ime().text(), "HELLO");
}

#[tokio::test]
async fn test_update_text_sends_deltas() {
    let h = harness().await;
    assert!(h.manager.connect(localhost(), true).await);
    h.recorder.deliver(&tv_field("HEL", 3, 1));

    // First update after connecting resynchronizes the whole field.
    h.manager.update_text("HELL");
    assert_eq!(h.recorder.edits(), vec![ImeEdit::replace(3, 1, 0, 3, "HELL")]);

    h.manager.update_text("HELLO");
    assert_eq!(h.recorder.texts(), vec!["O"]);
    assert!(h.recorder.keys().is_empty());

    h.manager.update_text("HELP");
    assert_eq!(
        h.recorder.keys(),
        vec![
            (KeyCode::DEL, KeyDirection::Short),
            (KeyCode::DEL, KeyDirection::Short)
        ]
    );
    assert_eq!(h.recorder.texts(), vec!["O", "P"]);

    // Unchanged text sends nothing.
    h.manager.update_text("HELP");
    assert_eq!(h.recorder.keys().len(), 2);
    assert_eq!(h.recorder.texts().len(), 2);
}

#[tokio::test]
async fn test_late_confirmation_does_not_over_delete() {
    let h = harness().await;
    assert!(h.manager.connect(localhost(), true).await);

    h.manager.update_text("HELLO");
    h.manager.update_text("HELL");
    h.manager.update_text("HEL");
    assert_eq!(h.recorder.keys().len(), 2);

    h.recorder.deliver(&tv_field("HELL", 5, 1));
    h.manager.update_text("HE");
    assert_eq!(h.recorder.keys().len(), 3);
    assert!(h.recorder.texts().is_empty());
}

#[tokio::test]
async fn test_reset_pairing_forgets_everything() {
    let h = harness().await;
    assert!(h.manager.connect(localhost(), false).await);
    h.manager.start_pairing().await.unwrap();
    h.manager.finish_pairing("A1B2C3").await.unwrap();
    assert!(h.manager.is_paired(localhost()));
    assert!(h._keys.path().join(CERT_FILE).exists());

    h.manager.reset_pairing().await.unwrap();

    assert!(!h.manager.is_paired(localhost()));
    assert!(!h.manager.is_connected());
    assert!(!h._keys.path().join(CERT_FILE).exists());
    assert!(!h._keys.path().join(KEY_FILE).exists());
}

#[derive(Default)]
struct RecordingBridge {
    keys: Mutex<Vec<KeyCode>>,
    texts: Mutex<Vec<String>>,
}

#[async_trait]
impl DebugBridge for RecordingBridge {
    async fn connect(&self, _address: std::net::IpAddr) -> Result<()> {
        Ok(())
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        self.texts.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn send_key(&self, key: KeyCode) -> Result<()> {
        self.keys.lock().unwrap().push(key);
        Ok(())
    }

    async fn screenshot(&self, _local_path: &std::path::Path) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_debug_bridge_route() {
    let h = harness().await;
    assert!(h.manager.connect(localhost(), true).await);

    let bridge = Arc::new(RecordingBridge::default());
    h.manager.attach_debug_bridge(bridge.clone());
    h.manager.set_input_route(InputRoute::DebugBridge);

    h.manager.send_key(KeyCode::BACK, KeyDirection::Short);
    h.manager.send_text("hi");
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(*bridge.keys.lock().unwrap(), vec![KeyCode::BACK]);
    assert_eq!(*bridge.texts.lock().unwrap(), vec!["hi"]);
    assert!(h.recorder.keys().is_empty());

    h.manager.set_input_route(InputRoute::Remote);
    h.manager.send_key(KeyCode::BACK, KeyDirection::Short);
    assert_eq!(h.recorder.keys().len(), 1);
}
