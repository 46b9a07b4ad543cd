//! Android TV remote protocol (v2) framing and messages.
//!
//! Both the remote channel (port 6466) and the pairing channel (port 6467) carry
//! protobuf messages over TLS, each prefixed with its length.
//!
//! ## Frame Format
//!
//! ```text
//! ┌──────────────────────┬──────────────────────────────────┐
//! │   Length (varint)    │        Payload (protobuf)        │
//! │     1-5 bytes        │        Length bytes              │
//! └──────────────────────┴──────────────────────────────────┘
//! ```
//!
//! - Length: unsigned LEB128, at most [`MAX_PAYLOAD_SIZE`]
//! - Payload: a [`RemoteMessage`] or [`PairingMessage`]

pub mod keys;
pub mod pairing;
pub mod remote;
pub mod wire;

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;

use crate::error::{Error, Result};

pub use keys::{KeyCode, KeyDirection};
pub use pairing::{PairingMessage, PairingPayload, PairingStatus};
pub use remote::{DeviceInfo, ImeEdit, ImeField, RemoteMessage, TextFieldStatus};

/// Maximum payload size (64 KiB)
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024;

/// Maximum bytes in a length prefix
const MAX_LENGTH_BYTES: usize = 5;

/// Read a length-prefixed frame.
///
/// # Errors
///
/// Returns an error on I/O failure, an overlong prefix or an oversized payload.
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>>
where
    R: AsyncReadExt + Unpin,
{
    let mut length: usize = 0;
    let mut shift = 0;
    let mut terminated = false;

    for _ in 0..MAX_LENGTH_BYTES {
        let byte = reader.read_u8().await?;
        length |= usize::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            terminated = true;
            break;
        }
        shift += 7;
    }

    if !terminated {
        return Err(Error::ProtocolError("length prefix too long".to_string()));
    }

    if length > MAX_PAYLOAD_SIZE {
        return Err(Error::ProtocolError(format!(
            "frame of {length} bytes exceeds maximum of {MAX_PAYLOAD_SIZE}"
        )));
    }

    let mut payload = vec![0u8; length];
    if length > 0 {
        reader.read_exact(&mut payload).await?;
    }

    Ok(payload)
}

/// Write a length-prefixed frame.
///
/// # Errors
///
/// Returns an error on I/O failure or if the payload is oversized.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWriteExt + Unpin,
{
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(Error::ProtocolError(format!(
            "frame of {} bytes exceeds maximum of {MAX_PAYLOAD_SIZE}",
            payload.len()
        )));
    }

    let mut buf = Vec::with_capacity(payload.len() + MAX_LENGTH_BYTES);
    wire::write_varint(&mut buf, payload.len() as u64);
    buf.extend_from_slice(payload);

    writer.write_all(&buf).await?;
    writer.flush().await?;

    Ok(())
}

/// Read a frame with timeout.
///
/// # Errors
///
/// Returns an error if the read fails or times out.
pub async fn read_frame_with_timeout<R>(reader: &mut R, duration: Duration) -> Result<Vec<u8>>
where
    R: AsyncReadExt + Unpin,
{
    timeout(duration, read_frame(reader))
        .await
        .map_err(|_| Error::Timeout(duration_ms(duration)))?
}

/// Write a frame with timeout.
///
/// # Errors
///
/// Returns an error if the write fails or times out.
pub async fn write_frame_with_timeout<W>(
    writer: &mut W,
    payload: &[u8],
    duration: Duration,
) -> Result<()>
where
    W: AsyncWriteExt + Unpin,
{
    timeout(duration, write_frame(writer, payload))
        .await
        .map_err(|_| Error::Timeout(duration_ms(duration)))?
}

#[allow(clippy::cast_possible_truncation)]
fn duration_ms(duration: Duration) -> u64 {
    duration.as_millis() as u64
}
