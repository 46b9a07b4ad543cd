//! Pairing channel messages (port 6467).
//!
//! ```text
//! client                         TV
//!   │── PairingRequest ──────────▶│
//!   │◀───────────── RequestAck ───│
//!   │── Option (hex, 6 symbols) ─▶│
//!   │◀───────────────── Option ───│
//!   │── Configuration ───────────▶│
//!   │◀──────── ConfigurationAck ──│   TV shows the code
//!   │── Secret ──────────────────▶│
//!   │◀─────────────── SecretAck ──│
//! ```

use super::wire::{for_each_field, Writer};
use crate::error::{Error, Result};

/// Pairing protocol version.
pub const PROTOCOL_VERSION: i32 = 2;

/// Hexadecimal code encoding.
pub const ENCODING_HEXADECIMAL: i32 = 3;

/// Symbols in the displayed code.
pub const SYMBOL_LENGTH: i32 = 6;

/// Client acts as the input side (the user types the code).
pub const ROLE_INPUT: i32 = 1;

/// Status carried by every pairing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingStatus {
    /// 200
    Ok,
    /// 400
    Error,
    /// 401
    BadConfiguration,
    /// 402
    BadSecret,
    /// Any other value
    Other(i32),
}

impl PairingStatus {
    /// Numeric status.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Ok => 200,
            Self::Error => 400,
            Self::BadConfiguration => 401,
            Self::BadSecret => 402,
            Self::Other(code) => code,
        }
    }

    /// Parse a numeric status.
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            200 => Self::Ok,
            400 => Self::Error,
            401 => Self::BadConfiguration,
            402 => Self::BadSecret,
            other => Self::Other(other),
        }
    }
}

/// Payload of a pairing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingPayload {
    /// Client introduces itself
    Request {
        /// Service being paired
        service_name: String,
        /// Name shown on the TV
        client_name: String,
    },
    /// TV accepts the request
    RequestAck {
        /// TV name
        server_name: String,
    },
    /// Supported code encodings
    Option {
        /// Encoding type
        encoding: i32,
        /// Code length
        symbol_length: i32,
        /// Preferred role
        preferred_role: i32,
    },
    /// Chosen code encoding
    Configuration {
        /// Encoding type
        encoding: i32,
        /// Code length
        symbol_length: i32,
        /// Client role
        client_role: i32,
    },
    /// TV acknowledges the configuration and shows the code
    ConfigurationAck,
    /// Secret derived from the code
    Secret(Vec<u8>),
    /// TV accepted the secret
    SecretAck(Vec<u8>),
    /// Status-only message (errors)
    None,
}

mod field {
    pub const PROTOCOL_VERSION: u32 = 1;
    pub const STATUS: u32 = 2;
    pub const REQUEST: u32 = 10;
    pub const REQUEST_ACK: u32 = 11;
    pub const OPTION: u32 = 20;
    pub const CONFIGURATION: u32 = 30;
    pub const CONFIGURATION_ACK: u32 = 31;
    pub const SECRET: u32 = 40;
    pub const SECRET_ACK: u32 = 41;
}

/// A message on the pairing channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingMessage {
    /// Status of the sender
    pub status: PairingStatus,
    /// Message body
    pub payload: PairingPayload,
}

impl PairingMessage {
    /// An OK message with the given payload.
    #[must_use]
    pub const fn ok(payload: PairingPayload) -> Self {
        Self {
            status: PairingStatus::Ok,
            payload,
        }
    }

    /// Encode to protobuf bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let outer = Writer::new()
            .int(field::PROTOCOL_VERSION, i64::from(PROTOCOL_VERSION))
            .int(field::STATUS, i64::from(self.status.code()));

        let encoding = |kind: i32, length: i32| {
            Writer::new()
                .int(1, i64::from(kind))
                .int(2, i64::from(length))
        };

        let outer = match &self.payload {
            PairingPayload::Request {
                service_name,
                client_name,
            } => outer.message(
                field::REQUEST,
                Writer::new().string(1, service_name).string(2, client_name),
            ),
            PairingPayload::RequestAck { server_name } => {
                outer.message(field::REQUEST_ACK, Writer::new().string(1, server_name))
            }
            PairingPayload::Option {
                encoding: kind,
                symbol_length,
                preferred_role,
            } => outer.message(
                field::OPTION,
                Writer::new()
                    .message(1, encoding(*kind, *symbol_length))
                    .int(3, i64::from(*preferred_role)),
            ),
            PairingPayload::Configuration {
                encoding: kind,
                symbol_length,
                client_role,
            } => outer.message(
                field::CONFIGURATION,
                Writer::new()
                    .message(1, encoding(*kind, *symbol_length))
                    .int(2, i64::from(*client_role)),
            ),
            PairingPayload::ConfigurationAck => {
                outer.message(field::CONFIGURATION_ACK, Writer::new())
            }
            PairingPayload::Secret(secret) => {
                outer.message(field::SECRET, Writer::new().bytes(1, secret))
            }
            PairingPayload::SecretAck(secret) => {
                outer.message(field::SECRET_ACK, Writer::new().bytes(1, secret))
            }
            PairingPayload::None => outer,
        };
        outer.finish()
    }

    /// Decode from protobuf bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid message.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut status = None;
        let mut payload = PairingPayload::None;

        for_each_field(bytes, |number, value| {
            let inner = value.as_bytes();
            match number {
                field::STATUS => status = Some(PairingStatus::from_code(value.as_i32())),
                field::REQUEST => {
                    let (mut service_name, mut client_name) = (String::new(), String::new());
                    for_each_field(inner, |f, v| {
                        match f {
                            1 => service_name = v.as_string(),
                            2 => client_name = v.as_string(),
                            _ => {}
                        }
                        Ok(())
                    })?;
                    payload = PairingPayload::Request {
                        service_name,
                        client_name,
                    };
                }
                field::REQUEST_ACK => {
                    let mut server_name = String::new();
                    for_each_field(inner, |f, v| {
                        if f == 1 {
                            server_name = v.as_string();
                        }
                        Ok(())
                    })?;
                    payload = PairingPayload::RequestAck { server_name };
                }
                field::OPTION => {
                    let (mut encoding, mut symbol_length, mut preferred_role) = (0, 0, 0);
                    for_each_field(inner, |f, v| {
                        match f {
                            1 | 2 if encoding == 0 => {
                                (encoding, symbol_length) = decode_encoding(v.as_bytes())?;
                            }
                            3 => preferred_role = v.as_i32(),
                            _ => {}
                        }
                        Ok(())
                    })?;
                    payload = PairingPayload::Option {
                        encoding,
                        symbol_length,
                        preferred_role,
                    };
                }
                field::CONFIGURATION => {
                    let (mut encoding, mut symbol_length, mut client_role) = (0, 0, 0);
                    for_each_field(inner, |f, v| {
                        match f {
                            1 => (encoding, symbol_length) = decode_encoding(v.as_bytes())?,
                            2 => client_role = v.as_i32(),
                            _ => {}
                        }
                        Ok(())
                    })?;
                    payload = PairingPayload::Configuration {
                        encoding,
                        symbol_length,
                        client_role,
                    };
                }
                field::CONFIGURATION_ACK => payload = PairingPayload::ConfigurationAck,
                field::SECRET => payload = PairingPayload::Secret(first_bytes(inner)?),
                field::SECRET_ACK => payload = PairingPayload::SecretAck(first_bytes(inner)?),
                _ => {}
            }
            Ok(())
        })?;

        let status = status.ok_or_else(|| {
            Error::ProtocolError("pairing message without status".to_string())
        })?;
        Ok(Self { status, payload })
    }
}

fn decode_encoding(bytes: &[u8]) -> Result<(i32, i32)> {
    let (mut kind, mut length) = (0, 0);
    for_each_field(bytes, |f, v| {
        match f {
            1 => kind = v.as_i32(),
            2 => length = v.as_i32(),
            _ => {}
        }
        Ok(())
    })?;
    Ok((kind, length))
}

fn first_bytes(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut found = Vec::new();
    for_each_field(bytes, |f, v| {
        if f == 1 {
            found = v.as_bytes().to_vec();
        }
        Ok(())
    })?;
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(PairingStatus::from_code(200), PairingStatus::Ok);
        assert_eq!(PairingStatus::from_code(402), PairingStatus::BadSecret);
        assert_eq!(PairingStatus::from_code(999), PairingStatus::Other(999));
        assert_eq!(PairingStatus::BadConfiguration.code(), 401);
    }

    #[test]
    fn test_request_encoding_starts_with_version_and_status() {
        let bytes = PairingMessage::ok(PairingPayload::Request {
            service_name: "atvremote".to_string(),
            client_name: "tvlink".to_string(),
        })
        .encode();

        // 1: 2, 2: 200
        assert_eq!(&bytes[..5], &[0x08, 0x02, 0x10, 0xC8, 0x01]);
    }

    #[test]
    fn test_configuration_decode() {
        let msg = PairingMessage::ok(PairingPayload::Configuration {
            encoding: ENCODING_HEXADECIMAL,
            symbol_length: SYMBOL_LENGTH,
            client_role: ROLE_INPUT,
        });
        assert_eq!(PairingMessage::decode(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn test_error_status_without_payload() {
        let msg = PairingMessage {
            status: PairingStatus::BadSecret,
            payload: PairingPayload::None,
        };
        let decoded = PairingMessage::decode(&msg.encode()).unwrap();
        assert_eq!(decoded.status, PairingStatus::BadSecret);
        assert_eq!(decoded.payload, PairingPayload::None);
    }

    #[test]
    fn test_secret_bytes_preserved() {
        let msg = PairingMessage::ok(PairingPayload::Secret(vec![0xAB; 32]));
        assert_eq!(PairingMessage::decode(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn test_missing_status_is_error() {
        let bytes = Writer::new().int(field::PROTOCOL_VERSION, 2).finish();
        assert!(PairingMessage::decode(&bytes).is_err());
    }
}
