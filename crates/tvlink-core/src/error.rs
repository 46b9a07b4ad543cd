//! Error types for tvlink.
//!
//! This module provides a unified error type for all tvlink operations,
//! with specific error variants for different failure modes.

use std::io;
use std::net::IpAddr;

use thiserror::Error;

/// A specialized `Result` type for tvlink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for tvlink.
#[derive(Error, Debug)]
pub enum Error {
    /// The remote control port is closed or unreachable (E001)
    #[error("port {port} is closed on {address}")]
    PortUnreachable {
        /// Device address
        address: IpAddr,
        /// Port that was probed
        port: u16,
    },

    /// TLS or protocol handshake with the TV failed (E002)
    #[error("handshake with {address} failed: {reason}")]
    HandshakeFailed {
        /// Device address
        address: IpAddr,
        /// Underlying failure
        reason: String,
    },

    /// The TV rejected the pairing exchange (E003)
    #[error("pairing rejected: {0}")]
    PairingRejected(String),

    /// The established transport dropped (E004)
    #[error("connection to {0} dropped")]
    TransportDropped(IpAddr),

    /// A fire-and-forget command could not be delivered (E005)
    #[error("command failed: {0}")]
    CommandFailed(String),

    /// No session is connected
    #[error("not connected to a device")]
    NotConnected,

    /// No transport client has been created yet
    #[error("no client initialized, connect first")]
    NoClient,

    /// `finish_pairing` was called without a pairing exchange in progress
    #[error("pairing has not been started")]
    PairingNotStarted,

    /// Pairing code has the wrong shape
    #[error("invalid pairing code: {0}")]
    InvalidPairingCode(String),

    /// Unknown key name or code
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Device address could not be parsed
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// TLS setup failed
    #[error("TLS error: {0}")]
    TlsError(String),

    /// Invalid protocol message
    #[error("invalid protocol message: {0}")]
    ProtocolError(String),

    /// Configuration file error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Operation timeout
    #[error("operation timed out after {0} ms")]
    Timeout(u64),

    /// Debug-bridge subprocess failure
    #[error("debug bridge error: {0}")]
    DebugBridge(String),

    /// Mirroring subprocess failure
    #[error("mirroring error: {0}")]
    Mirroring(String),

    /// Internal error (should not happen)
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the error code associated with this error, if any.
    ///
    /// Error codes follow the pattern EXXX where XXX is a 3-digit number.
    #[must_use]
    pub const fn code(&self) -> Option<&'static str> {
        match self {
            Self::PortUnreachable { .. } => Some("E001"),
            Self::HandshakeFailed { .. } => Some("E002"),
            Self::PairingRejected(_) => Some("E003"),
            Self::TransportDropped(_) => Some("E004"),
            Self::CommandFailed(_) => Some("E005"),
            _ => None,
        }
    }

    /// Returns whether this error is recoverable (can be retried).
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::HandshakeFailed { .. }
                | Self::TransportDropped(_)
                | Self::Timeout(_)
                | Self::Io(_)
        )
    }

    /// Returns a helpful suggestion for resolving the error, if applicable.
    #[must_use]
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::PortUnreachable { .. } => {
                Some("Is the TV on and on the same network?")
            }
            Self::HandshakeFailed { .. } => Some(
                "The TV may not know this client yet. Pair it with:\n\
                   tvlink pair <ADDRESS>",
            ),
            Self::PairingRejected(_) => {
                Some("Check the code shown on the TV and enter it again.")
            }
            Self::InvalidPairingCode(_) => {
                Some("The pairing code is the 6 characters shown on the TV (0-9, A-F).")
            }
            Self::TlsError(_) => Some(
                "The local certificate may be corrupted. Reset pairing with:\n\
                   tvlink reset",
            ),
            Self::DebugBridge(_) => Some(
                "Make sure adb is installed and network debugging is enabled on the TV.",
            ),
            Self::Mirroring(_) => Some("Make sure scrcpy is installed and in PATH."),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_unreachable_message_mentions_port() {
        let err = Error::PortUnreachable {
            address: "192.168.1.50".parse().unwrap(),
            port: 6466,
        };
        assert_eq!(err.to_string(), "port 6466 is closed on 192.168.1.50");
        assert_eq!(err.code(), Some("E001"));
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn test_recoverable_errors() {
        let handshake = Error::HandshakeFailed {
            address: "10.0.0.2".parse().unwrap(),
            reason: "reset".to_string(),
        };
        assert!(handshake.is_recoverable());
        assert!(!Error::PairingRejected("bad secret".to_string()).is_recoverable());
        assert!(!Error::CommandFailed("queue closed".to_string()).is_recoverable());
    }
}
