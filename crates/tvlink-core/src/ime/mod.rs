//! Text synchronization with the TV's input field.
//!
//! [`ImeSync`] keeps a shadow of the focused field: its text and the two edit
//! counters the TV last reported. Every outbound edit carries those counters;
//! the TV rejects edits made against counters it has moved past.
//!
//! ## Inbound
//!
//! Each message is inspected for field state. Counters are taken from the
//! message first, then the shadow text, and only then is the text-changed
//! callback run. While that callback runs, an edit that would only send the
//! same text back is suppressed.
//!
//! ## Outbound
//!
//! - **Absolute replacement** ([`ImeSync::compose_replacement`]): select
//!   `[0, len)` of the shadow and replace it. Converges regardless of lost
//!   deltas; used for programmatic text and after a resync.
//! - **Delta** ([`ImeSync::compose_update`]): diff against the text last sent
//!   and send only the change, as backspaces plus an inserted suffix. Used for
//!   live typing.
//!
//! The shadow is updated optimistically as soon as an edit is composed. The
//! delta baseline is separate from the shadow text: confirmations from the TV
//! arrive late during fast typing, and diffing against them would delete or
//! insert twice. Only outbound edits, and remote text adopted by the local view
//! under [`ImeSync::applying_remote`], move the baseline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::protocol::{ImeEdit, RemoteMessage};

/// An outbound change composed against the shadow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextChange {
    /// Replace the whole field
    Replace(ImeEdit),
    /// Delete `delete` characters before the cursor, then insert `insert`
    Delta {
        /// Backspaces to send
        delete: usize,
        /// Text to append after deleting
        insert: String,
    },
}

#[derive(Debug, Default)]
struct Shadow {
    /// Field text as last reported by the TV or replaced by us
    text: String,
    /// Text the local view last sent or adopted
    last_sent: String,
    ime_counter: i32,
    field_counter: i32,
    resync: bool,
}

impl Shadow {
    fn char_len(&self) -> i32 {
        i32::try_from(self.text.chars().count()).unwrap_or(i32::MAX)
    }
}

/// Shadow state of the TV's focused input field.
#[derive(Debug)]
pub struct ImeSync {
    shadow: Mutex<Shadow>,
    applying_remote: AtomicBool,
}

impl Default for ImeSync {
    fn default() -> Self {
        Self::new()
    }
}

impl ImeSync {
    /// Empty shadow. The first delta update is sent as a replacement.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shadow: Mutex::new(Shadow {
                resync: true,
                ..Shadow::default()
            }),
            applying_remote: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shadow> {
        self.shadow.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current shadow text.
    #[must_use]
    pub fn text(&self) -> String {
        self.lock().text.clone()
    }

    /// `(ime_counter, field_counter)` last observed from the TV.
    #[must_use]
    pub fn counters(&self) -> (i32, i32) {
        let shadow = self.lock();
        (shadow.ime_counter, shadow.field_counter)
    }

    /// Update the shadow from an inbound message.
    ///
    /// Returns the field's new text when the message carried one.
    pub fn observe(&self, message: &RemoteMessage) -> Option<String> {
        let mut shadow = self.lock();
        match message {
            RemoteMessage::ImeBatchEdit(edit) => {
                shadow.ime_counter = edit.ime_counter;
                shadow.field_counter = edit.field_counter;
                let text = edit.text()?;
                shadow.text = text.to_string();
            }
            RemoteMessage::ImeKeyInject {
                field: Some(field), ..
            }
            | RemoteMessage::ImeShowRequest { field: Some(field) } => {
                shadow.field_counter = field.field_counter;
                shadow.text.clone_from(&field.value);
            }
            _ => return None,
        }

        tracing::debug!(
            "TV field now {:?} (counters {}, {})",
            shadow.text,
            shadow.ime_counter,
            shadow.field_counter
        );
        Some(shadow.text.clone())
    }

    /// Run `f` with the remote-update guard raised.
    pub fn applying_remote<T>(&self, f: impl FnOnce() -> T) -> T {
        struct Reset<'a>(&'a AtomicBool);
        impl Drop for Reset<'_> {
            fn drop(&mut self) {
                self.0.store(false, Ordering::SeqCst);
            }
        }

        self.applying_remote.store(true, Ordering::SeqCst);
        let _reset = Reset(&self.applying_remote);
        f()
    }

    /// Text the next delta is computed against.
    #[must_use]
    pub fn last_sent(&self) -> String {
        self.lock().last_sent.clone()
    }

    fn is_echo(&self, shadow: &Shadow, text: &str) -> bool {
        self.applying_remote.load(Ordering::SeqCst) && shadow.text == text
    }

    /// Compose an absolute replacement of the whole field with `text`.
    ///
    /// Returns `None` when the edit would only echo a remote update.
    pub fn compose_replacement(&self, text: &str) -> Option<ImeEdit> {
        let mut shadow = self.lock();
        if self.is_echo(&shadow, text) {
            tracing::trace!("Suppressed echo of remote text");
            return None;
        }
        Some(Self::replace_locked(&mut shadow, text))
    }

    fn replace_locked(shadow: &mut Shadow, text: &str) -> ImeEdit {
        let edit = ImeEdit::replace(
            shadow.ime_counter,
            shadow.field_counter,
            0,
            shadow.char_len(),
            text,
        );
        shadow.text = text.to_string();
        shadow.last_sent = text.to_string();
        shadow.resync = false;
        edit
    }

    /// Compose the change from the text last sent to `text` typed locally.
    ///
    /// After [`ImeSync::reset`] the change is a full replacement. Returns `None`
    /// when nothing changed or the edit would only echo a remote update; in the
    /// latter case the local view now shows the TV's text and it becomes the
    /// baseline.
    pub fn compose_update(&self, text: &str) -> Option<TextChange> {
        let mut shadow = self.lock();
        if self.is_echo(&shadow, text) {
            tracing::trace!("Suppressed echo of remote text");
            shadow.last_sent = text.to_string();
            return None;
        }
        if shadow.resync {
            return Some(TextChange::Replace(Self::replace_locked(&mut shadow, text)));
        }
        if shadow.last_sent == text {
            return None;
        }

        let common = shadow
            .last_sent
            .chars()
            .zip(text.chars())
            .take_while(|(a, b)| a == b)
            .count();
        let delete = shadow.last_sent.chars().count() - common;
        let insert: String = text.chars().skip(common).collect();

        shadow.text = text.to_string();
        shadow.last_sent = text.to_string();
        Some(TextChange::Delta { delete, insert })
    }

    /// Mark the shadow stale, e.g. after a reconnect. The next update is sent
    /// as a full replacement.
    pub fn reset(&self) {
        self.lock().resync = true;
    }
}
