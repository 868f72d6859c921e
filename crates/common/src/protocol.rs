//! Request and response types exchanged between the client interceptor, the
//! key-issuing endpoint and the storage-side service.
//!
//! All types are serialised as JSON. Field names follow the camelCase
//! convention of the surrounding application API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Application envelope
// ---------------------------------------------------------------------------

/// `{code, data, message}` envelope wrapped around every application response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    /// Application status code; `200` means success.
    pub code: u16,
    /// Response payload, absent on failure.
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Optional human-readable message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiEnvelope<T> {
    /// Wrap `data` in a successful envelope.
    pub fn ok(data: T) -> Self {
        Self {
            code: 200,
            data: Some(data),
            message: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Key issuing
// ---------------------------------------------------------------------------

/// Short-lived key returned by `GET /api/system/encryption-key`.
#[derive(Clone, Serialize, Deserialize)]
pub struct IssuedKey {
    /// Key text. Normalised to 32 bytes by the receiver.
    pub key: String,
    /// Instant after which the key must be re-fetched.
    ///
    /// Accepted on the wire as RFC 3339 text or epoch milliseconds.
    #[serde(rename = "expireTime", deserialize_with = "expire_time::deserialize")]
    pub expire_time: DateTime<Utc>,
}

impl std::fmt::Debug for IssuedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedKey")
            .field("key", &"[REDACTED]")
            .field("expire_time", &self.expire_time)
            .finish()
    }
}

mod expire_time {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{de::Error as _, Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(i64),
        Text(String),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Millis(ms) => Utc
                .timestamp_millis_opt(ms)
                .single()
                .ok_or_else(|| D::Error::custom(format!("expireTime out of range: {ms}"))),
            Raw::Text(s) => DateTime::parse_from_rfc3339(&s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(D::Error::custom),
        }
    }
}

// ---------------------------------------------------------------------------
// Storage-side encode / decode
// ---------------------------------------------------------------------------

/// Request body for `POST /encrypt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptRequest {
    /// Record whose named fields are replaced with ciphertext.
    pub payload: serde_json::Value,
    /// Names of the fields to encrypt.
    pub fields: Vec<String>,
}

/// Request body for `POST /decrypt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecryptRequest {
    /// Record (or sequence of records) to decrypt, walked recursively.
    pub payload: serde_json::Value,
    /// Names of the fields to decrypt at every nesting level.
    pub fields: Vec<String>,
    /// Retain the `<field>_iv` siblings in the output.
    #[serde(default, rename = "keepIv")]
    pub keep_iv: bool,
}

/// Successful response body for `POST /encrypt` and `POST /decrypt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadResponse {
    /// Transformed record.
    pub payload: serde_json::Value,
}

/// Response body for `GET /policy`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyResponse {
    /// Path that was looked up, after normalisation.
    pub path: String,
    /// Whether any configured pattern matched.
    pub matched: bool,
    /// Fields encrypted before sending to this path.
    #[serde(rename = "encryptFields")]
    pub encrypt_fields: Vec<String>,
    /// Fields decrypted in responses from this path.
    #[serde(rename = "decryptFields")]
    pub decrypt_fields: Vec<String>,
}

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

/// Standard error response body returned on any non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short machine-readable error code (e.g. `"bad_request"`).
    pub code: String,
    /// Human-readable description safe to expose to callers.
    pub message: String,
}

impl ErrorResponse {
    /// Construct an [`ErrorResponse`] from a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall service status: `"ok"` or `"degraded"`.
    pub status: String,
    /// Whether a server-held storage key is configured (not the built-in fallback).
    pub key_configured: bool,
    /// Number of path patterns in the active policy table.
    pub policies_loaded: usize,
}
