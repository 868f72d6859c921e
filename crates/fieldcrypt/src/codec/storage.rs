//! Persistence-boundary codec: encode right before a write, decode right after a read.

use serde_json::{Map, Value};

use super::{decrypt_fields_recursive, encrypt_fields, IvHandling};
use crate::crypto::{CipherError, IvEncoding};
use crate::key::{KeyBytes, FALLBACK_KEY};

/// Field codec bound to the server-held key.
///
/// Stored IVs are base64-encoded random bytes. Reads accept both IV
/// encodings, so records written by clients decode as well.
#[derive(Debug, Clone)]
pub struct StorageCodec {
    key: KeyBytes,
    configured: bool,
}

impl StorageCodec {
    /// Build a codec from the configured key, or [`FALLBACK_KEY`] if none.
    pub fn new(configured_key: Option<&str>) -> Self {
        match configured_key {
            Some(k) if !k.is_empty() => Self {
                key: KeyBytes::normalize(k.as_bytes()),
                configured: true,
            },
            _ => Self {
                key: KeyBytes::normalize(FALLBACK_KEY.as_bytes()),
                configured: false,
            },
        }
    }

    /// Whether a real key was configured (as opposed to the fallback).
    pub fn is_configured(&self) -> bool {
        self.configured
    }

    /// The normalised storage key.
    pub fn key(&self) -> &KeyBytes {
        &self.key
    }

    /// Encrypt `fields` of `record` for storage.
    ///
    /// # Errors
    ///
    /// Propagates any [`CipherError`]; the record must not be written.
    pub fn encode<S: AsRef<str>>(
        &self,
        record: &mut Map<String, Value>,
        fields: &[S],
    ) -> Result<(), CipherError> {
        encrypt_fields(record, fields, self.key.as_bytes(), IvEncoding::Base64)
    }

    /// Decrypt `fields` at every nesting level of a stored value.
    pub fn decode<S: AsRef<str>>(&self, value: &mut Value, fields: &[S], handling: IvHandling) {
        decrypt_fields_recursive(value, fields, self.key.as_bytes(), handling);
    }
}
