//! # tvlink Core Library
//!
//! `tvlink-core` remote-controls Android TV devices over the TV remote protocol:
//! a TLS session on a fixed port, authenticated by a client certificate that the
//! TV learns through a one-time pairing code exchange.
//!
//! ## Features
//!
//! - **Resilient sessions**: port probing, retried handshakes, optimistic connect
//!   for TVs that signal readiness late or never
//! - **Pairing**: 6-character hex code exchange on the pairing port, persisted registry
//! - **IME sync**: the TV's text field mirrored locally, edited with absolute
//!   replacement or keystroke deltas using the TV's edit counters
//! - **Events**: connected / disconnected / error / text-changed callbacks
//!
//! ## Modules
//!
//! - [`adb`] - Debug-bridge collaborator (screenshots, alternate input route)
//! - [`code`] - Pairing code parsing and validation
//! - [`config`] - Configuration management
//! - [`connection`] - Address parsing and port reachability probing
//! - [`crypto`] - Client certificate storage and TLS configuration
//! - [`discovery`] - Discovered-device records supplied by an external browser
//! - [`events`] - Event bridge toward the presentation layer
//! - [`ime`] - Text synchronization with the TV's input field
//! - [`mirror`] - Screen mirroring subprocess launcher
//! - [`protocol`] - Wire framing and remote/pairing messages
//! - [`registry`] - Paired-device registry
//! - [`session`] - Session manager state machine and task scheduler
//! - [`transport`] - Transport seam and the TLS implementation
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tvlink_core::config::ConfigStore;
//! use tvlink_core::protocol::{KeyCode, KeyDirection};
//! use tvlink_core::session::SessionManager;
//!
//! let config = Arc::new(ConfigStore::load()?);
//! let manager = SessionManager::new(config);
//! manager.events().on_text_changed(|text| println!("TV field: {text}"));
//!
//! let address = "192.168.1.50".parse()?;
//! if manager.connect(address, true).await {
//!     manager.send_key(KeyCode::HOME, KeyDirection::Short);
//!     manager.set_text("hello");
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::unused_async)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::unused_self)]

pub mod adb;
pub mod code;
pub mod config;
pub mod connection;
pub mod crypto;
pub mod discovery;
pub mod error;
pub mod events;
pub mod ime;
pub mod mirror;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod transport;

pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Remote control port (TLS)
pub const DEFAULT_REMOTE_PORT: u16 = 6466;

/// Pairing handshake port (TLS)
pub const DEFAULT_PAIRING_PORT: u16 = 6467;

/// Default port probe timeout in milliseconds
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 3_000;

/// Default wait for the TV's availability signal in milliseconds
pub const DEFAULT_READY_TIMEOUT_MS: u64 = 5_000;

/// Default number of handshake attempts per connect
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 2;

/// Default delay between handshake attempts in milliseconds
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;

/// Client name announced to the TV when none is configured
pub const DEFAULT_CLIENT_NAME: &str = "tvlink";
