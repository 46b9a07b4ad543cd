//! Minimal protobuf encoding for the message subset tvlink exchanges.
//!
//! Only varint and length-delimited fields are produced. Fixed-width fields are
//! skipped on decode; unknown field numbers are ignored by the message decoders.

use crate::error::{Error, Result};

const WIRE_VARINT: u8 = 0;
const WIRE_FIXED64: u8 = 1;
const WIRE_LEN: u8 = 2;
const WIRE_FIXED32: u8 = 5;

/// Append an unsigned LEB128 varint.
pub fn write_varint(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        #[allow(clippy::cast_possible_truncation)]
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
    #[allow(clippy::cast_possible_truncation)]
    buf.push(value as u8);
}

/// Protobuf message builder.
#[derive(Debug, Default, Clone)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    /// Create an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn tag(&mut self, field: u32, wire_type: u8) {
        write_varint(&mut self.buf, (u64::from(field) << 3) | u64::from(wire_type));
    }

    /// Varint field. Negative values use ten-byte two's complement like `int32`.
    #[must_use]
    pub fn int(mut self, field: u32, value: i64) -> Self {
        self.tag(field, WIRE_VARINT);
        #[allow(clippy::cast_sign_loss)]
        write_varint(&mut self.buf, value as u64);
        self
    }

    /// Boolean field.
    #[must_use]
    pub fn bool(self, field: u32, value: bool) -> Self {
        self.int(field, i64::from(value))
    }

    /// Length-delimited bytes field.
    #[must_use]
    pub fn bytes(mut self, field: u32, value: &[u8]) -> Self {
        self.tag(field, WIRE_LEN);
        write_varint(&mut self.buf, value.len() as u64);
        self.buf.extend_from_slice(value);
        self
    }

    /// String field.
    #[must_use]
    pub fn string(self, field: u32, value: &str) -> Self {
        self.bytes(field, value.as_bytes())
    }

    /// Embedded message field.
    #[must_use]
    pub fn message(self, field: u32, inner: Self) -> Self {
        self.bytes(field, &inner.buf)
    }

    /// Finish and return the encoded bytes.
    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// A decoded field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value<'a> {
    /// Varint field
    Varint(u64),
    /// Length-delimited field (bytes, string or embedded message)
    Bytes(&'a [u8]),
}

impl<'a> Value<'a> {
    /// Interpret as a 32-bit signed integer.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Varint(v) => v as i32,
            Self::Bytes(_) => 0,
        }
    }

    /// Interpret as a boolean.
    #[must_use]
    pub fn as_bool(self) -> bool {
        matches!(self, Self::Varint(v) if v != 0)
    }

    /// Interpret as raw bytes.
    #[must_use]
    pub fn as_bytes(self) -> &'a [u8] {
        match self {
            Self::Bytes(b) => b,
            Self::Varint(_) => &[],
        }
    }

    /// Interpret as a UTF-8 string, replacing invalid sequences.
    #[must_use]
    pub fn as_string(self) -> String {
        String::from_utf8_lossy(self.as_bytes()).into_owned()
    }
}

/// Iterator over the fields of an encoded message.
#[derive(Debug, Clone, Copy)]
pub struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Create a reader over an encoded message.
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn read_u8(&mut self) -> Result<u8> {
        let byte = *self
            .bytes
            .get(self.pos)
            .ok_or_else(|| Error::ProtocolError("unexpected end of message".to_string()))?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_varint(&mut self) -> Result<u64> {
        let mut result: u64 = 0;
        let mut shift = 0;
        while shift < 64 {
            let byte = self.read_u8()?;
            result |= u64::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }
        Err(Error::ProtocolError("varint overflow".to_string()))
    }

    fn read_slice(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| Error::ProtocolError("field exceeds message".to_string()))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Read the next field, skipping fixed-width ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the message is truncated or uses an unsupported
    /// wire type.
    pub fn next_field(&mut self) -> Result<Option<(u32, Value<'a>)>> {
        loop {
            if self.pos >= self.bytes.len() {
                return Ok(None);
            }

            let key = self.read_varint()?;
            let field = u32::try_from(key >> 3)
                .map_err(|_| Error::ProtocolError("field number out of range".to_string()))?;

            #[allow(clippy::cast_possible_truncation)]
            match (key & 0x07) as u8 {
                WIRE_VARINT => return Ok(Some((field, Value::Varint(self.read_varint()?)))),
                WIRE_LEN => {
                    let len = usize::try_from(self.read_varint()?).map_err(|_| {
                        Error::ProtocolError("field length out of range".to_string())
                    })?;
                    return Ok(Some((field, Value::Bytes(self.read_slice(len)?))));
                }
                WIRE_FIXED64 => {
                    self.read_slice(8)?;
                }
                WIRE_FIXED32 => {
                    self.read_slice(4)?;
                }
                other => {
                    return Err(Error::ProtocolError(format!(
                        "unsupported wire type {other}"
                    )))
                }
            }
        }
    }
}

/// Call `f` for every field of an encoded message.
///
/// # Errors
///
/// Returns the first decoding error or the first error returned by `f`.
pub fn for_each_field<'a>(
    bytes: &'a [u8],
    mut f: impl FnMut(u32, Value<'a>) -> Result<()>,
) -> Result<()> {
    let mut reader = Reader::new(bytes);
    while let Some((field, value)) = reader.next_field()? {
        f(field, value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_encoding() {
        let mut buf = Vec::new();
        write_varint(&mut buf, 1);
        write_varint(&mut buf, 150);
        assert_eq!(buf, vec![0x01, 0x96, 0x01]);
    }

    #[test]
    fn test_known_encoding() {
        // field 1 varint 150
        let bytes = Writer::new().int(1, 150).finish();
        assert_eq!(bytes, vec![0x08, 0x96, 0x01]);

        // field 2 string "hi"
        let bytes = Writer::new().string(2, "hi").finish();
        assert_eq!(bytes, vec![0x12, 0x02, b'h', b'i']);
    }

    #[test]
    fn test_reader_walks_fields_and_skips_fixed() {
        let mut bytes = Writer::new().int(1, 7).finish();
        // field 3 fixed32
        bytes.extend_from_slice(&[0x1D, 1, 2, 3, 4]);
        bytes.extend(Writer::new().string(4, "ok").finish());

        let mut reader = Reader::new(&bytes);
        assert_eq!(reader.next_field().unwrap(), Some((1, Value::Varint(7))));
        let (field, value) = reader.next_field().unwrap().unwrap();
        assert_eq!(field, 4);
        assert_eq!(value.as_string(), "ok");
        assert_eq!(reader.next_field().unwrap(), None);
    }

    #[test]
    fn test_negative_int_roundtrip() {
        let bytes = Writer::new().int(1, -1).finish();
        assert_eq!(bytes.len(), 11);

        let mut reader = Reader::new(&bytes);
        let (_, value) = reader.next_field().unwrap().unwrap();
        assert_eq!(value.as_i32(), -1);
    }

    #[test]
    fn test_truncated_field_is_error() {
        let bytes = [0x12, 0x05, b'a'];
        let mut reader = Reader::new(&bytes);
        assert!(reader.next_field().is_err());
    }
}
