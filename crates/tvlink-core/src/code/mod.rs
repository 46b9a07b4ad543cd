//! Pairing code parsing and validation.
//!
//! During pairing the TV shows a 6-character hexadecimal code. The first two
//! characters are a check byte derived from both certificates and the rest of
//! the code, the remaining four are a nonce the client mixes into the pairing
//! secret.
//!
//! ## Example
//!
//! ```
//! use tvlink_core::code::PairingCode;
//!
//! let code = PairingCode::parse(" 4d1f2a ").unwrap();
//! assert_eq!(code.as_str(), "4D1F2A");
//! assert_eq!(code.check_byte(), 0x4D);
//! assert_eq!(code.nonce(), [0x1F, 0x2A]);
//! ```

use crate::error::{Error, Result};

/// Length of a pairing code
pub const CODE_LENGTH: usize = 6;

/// A validated pairing code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PairingCode {
    code: String,
    bytes: [u8; 3],
}

impl PairingCode {
    /// Parse and validate a pairing code from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the code is invalid (wrong length or non-hex characters).
    pub fn parse(input: &str) -> Result<Self> {
        let normalized = input.trim().to_uppercase();

        if normalized.len() != CODE_LENGTH {
            return Err(Error::InvalidPairingCode(format!(
                "code must be {} characters, got {}",
                CODE_LENGTH,
                normalized.chars().count()
            )));
        }

        if let Some(c) = normalized.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(Error::InvalidPairingCode(format!(
                "invalid character '{c}' in code"
            )));
        }

        let mut bytes = [0u8; 3];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&normalized[i * 2..i * 2 + 2], 16)
                .map_err(|e| Error::InvalidPairingCode(e.to_string()))?;
        }

        Ok(Self {
            code: normalized,
            bytes,
        })
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.code
    }

    /// Byte the computed secret must start with.
    #[must_use]
    pub const fn check_byte(&self) -> u8 {
        self.bytes[0]
    }

    /// Nonce mixed into the pairing secret.
    #[must_use]
    pub const fn nonce(&self) -> [u8; 2] {
        [self.bytes[1], self.bytes[2]]
    }
}

impl std::fmt::Display for PairingCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code)
    }
}

impl std::str::FromStr for PairingCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
