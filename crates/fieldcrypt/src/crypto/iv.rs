//! Initialisation-vector generation and wire parsing.
//!
//! Two wire encodings are in circulation and both must keep working:
//!
//! - **Text**: the 16 IV bytes sent as a literal 16-character string. Clients
//!   generate alphanumeric IVs so the string is always printable.
//! - **Base64**: the 16 raw bytes base64-encoded (24 characters). Used for
//!   values encoded at the storage boundary.
//!
//! [`Iv::parse`] tells them apart by length alone: exactly 16 characters means
//! text, anything else is base64. A 16-character base64 string cannot be told
//! apart from text under this rule; records already stored depend on it, so it
//! is kept as-is.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng, RngCore};

use super::cipher::{CipherError, IV_LEN};

/// How an IV is rendered into the `<field>_iv` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IvEncoding {
    /// 16 alphanumeric characters carried literally.
    #[default]
    Text,
    /// 16 random bytes, standard base64.
    Base64,
}

/// A 16-byte CBC initialisation vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Iv([u8; IV_LEN]);

impl Iv {
    /// Fresh IV of 16 bytes from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Fresh IV of 16 alphanumeric characters, suitable for the text encoding.
    pub fn generate_text() -> Self {
        let mut bytes = [0u8; IV_LEN];
        for (slot, ch) in bytes.iter_mut().zip(OsRng.sample_iter(&Alphanumeric)) {
            *slot = ch;
        }
        Self(bytes)
    }

    /// Fresh IV whose bytes suit `encoding`.
    pub fn generate_for(encoding: IvEncoding) -> Self {
        match encoding {
            IvEncoding::Text => Self::generate_text(),
            IvEncoding::Base64 => Self::generate(),
        }
    }

    /// Parse a wire IV.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::InvalidIv`] if the value is not 16 characters and
    /// does not base64-decode to exactly 16 bytes.
    pub fn parse(wire: &str) -> Result<Self, CipherError> {
        if wire.chars().count() == IV_LEN {
            return Self::from_slice(wire.as_bytes());
        }
        let decoded = STANDARD
            .decode(wire.trim())
            .map_err(|_| CipherError::InvalidIv(0))?;
        Self::from_slice(&decoded)
    }

    /// Render this IV for the `<field>_iv` attribute.
    ///
    /// Text rendering requires printable ASCII bytes; anything else is emitted
    /// as base64, which [`Iv::parse`] still reads back correctly.
    pub fn to_wire(&self, encoding: IvEncoding) -> String {
        match encoding {
            IvEncoding::Text if self.0.iter().all(u8::is_ascii_graphic) => {
                self.0.iter().map(|&b| b as char).collect()
            }
            _ => STANDARD.encode(self.0),
        }
    }

    /// Raw IV bytes.
    pub fn as_bytes(&self) -> &[u8; IV_LEN] {
        &self.0
    }

    fn from_slice(bytes: &[u8]) -> Result<Self, CipherError> {
        let arr: [u8; IV_LEN] = bytes
            .try_into()
            .map_err(|_| CipherError::InvalidIv(bytes.len()))?;
        Ok(Self(arr))
    }
}

impl From<[u8; IV_LEN]> for Iv {
    fn from(bytes: [u8; IV_LEN]) -> Self {
        Self(bytes)
    }
}
