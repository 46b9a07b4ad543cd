//! Event bridge toward the presentation layer.
//!
//! Four events, each with at most one subscriber. Subscribing again replaces the
//! previous subscriber. Callbacks run inline on the task that caused the event,
//! so a subscriber that needs to do slow work must hand it off itself. Events
//! fired while nobody is subscribed are dropped, never replayed.

use std::sync::{Arc, PoisonError, RwLock};

type Callback = Arc<dyn Fn() + Send + Sync>;
type MessageCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Connect, disconnect, error and text-changed notifications.
#[derive(Default)]
pub struct EventBridge {
    connected: RwLock<Option<Callback>>,
    disconnected: RwLock<Option<Callback>>,
    error: RwLock<Option<MessageCallback>>,
    text_changed: RwLock<Option<MessageCallback>>,
}

impl std::fmt::Debug for EventBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let set = |slot: bool| if slot { "set" } else { "unset" };
        f.debug_struct("EventBridge")
            .field("connected", &set(read(&self.connected).is_some()))
            .field("disconnected", &set(read(&self.disconnected).is_some()))
            .field("error", &set(read(&self.error).is_some()))
            .field("text_changed", &set(read(&self.text_changed).is_some()))
            .finish()
    }
}

fn read<T: Clone>(slot: &RwLock<Option<T>>) -> Option<T> {
    slot.read().unwrap_or_else(PoisonError::into_inner).clone()
}

fn replace<T>(slot: &RwLock<Option<T>>, value: Option<T>) {
    *slot.write().unwrap_or_else(PoisonError::into_inner) = value;
}

impl EventBridge {
    /// Create a bridge with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to `connected`.
    pub fn on_connected(&self, f: impl Fn() + Send + Sync + 'static) {
        replace(&self.connected, Some(Arc::new(f)));
    }

    /// Subscribe to `disconnected`.
    pub fn on_disconnected(&self, f: impl Fn() + Send + Sync + 'static) {
        replace(&self.disconnected, Some(Arc::new(f)));
    }

    /// Subscribe to `error`.
    pub fn on_error(&self, f: impl Fn(&str) + Send + Sync + 'static) {
        replace(&self.error, Some(Arc::new(f)));
    }

    /// Subscribe to `text_changed`.
    pub fn on_text_changed(&self, f: impl Fn(&str) + Send + Sync + 'static) {
        replace(&self.text_changed, Some(Arc::new(f)));
    }

    /// Remove every subscriber.
    pub fn clear(&self) {
        replace(&self.connected, None);
        replace(&self.disconnected, None);
        replace(&self.error, None);
        replace(&self.text_changed, None);
    }

    pub(crate) fn connected(&self) {
        tracing::debug!("event: connected");
        if let Some(f) = read(&self.connected) {
            f();
        }
    }

    pub(crate) fn disconnected(&self) {
        tracing::debug!("event: disconnected");
        if let Some(f) = read(&self.disconnected) {
            f();
        }
    }

    pub(crate) fn error(&self, message: &str) {
        tracing::debug!("event: error({})", message);
        if let Some(f) = read(&self.error) {
            f(message);
        }
    }

    pub(crate) fn text_changed(&self, text: &str) {
        tracing::debug!("event: text_changed({} chars)", text.chars().count());
        if let Some(f) = read(&self.text_changed) {
            f(text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[test]
    fn test_events_without_subscribers_are_dropped() {
        let bridge = EventBridge::new();
        bridge.connected();
        bridge.error("nobody listens");

        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        bridge.on_connected(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(count.load(Ordering::SeqCst), 0);

        bridge.connected();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscribing_replaces_previous() {
        let bridge = EventBridge::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&seen);
        bridge.on_text_changed(move |t| first.lock().unwrap().push(format!("first:{t}")));
        let second = Arc::clone(&seen);
        bridge.on_text_changed(move |t| second.lock().unwrap().push(format!("second:{t}")));

        bridge.text_changed("abc");
        assert_eq!(seen.lock().unwrap().clone(), vec!["second:abc".to_string()]);
    }

    #[test]
    fn test_callback_may_resubscribe_inline() {
        let bridge = Arc::new(EventBridge::new());
        let b = Arc::clone(&bridge);
        bridge.on_error(move |_| {
            // slot lock is not held while the callback runs
            b.on_error(|_| {});
        });
        bridge.error("boom");
    }

    #[test]
    fn test_clear() {
        let bridge = EventBridge::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        bridge.on_disconnected(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        bridge.clear();
        bridge.disconnected();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
