//! Client side of the key-issuing endpoint.

use std::time::Duration;

use async_trait::async_trait;
use common::protocol::{ApiEnvelope, IssuedKey};
use thiserror::Error;

/// Errors from fetching an issued key. All of them send the resolver to its
/// local fallback tiers.
#[derive(Debug, Error)]
pub enum KeyFetchError {
    /// The HTTP call failed or the body could not be decoded.
    #[error("key endpoint transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The endpoint answered with a non-2xx HTTP status.
    #[error("key endpoint returned HTTP {0}")]
    Status(u16),

    /// The envelope carried a non-200 application code.
    #[error("key endpoint rejected the request with code {0}")]
    Rejected(u16),

    /// The envelope had no key, or an empty one.
    #[error("key endpoint returned no key")]
    MissingKey,

    /// No answer within the configured fetch timeout.
    #[error("key fetch timed out after {0:?}")]
    Timeout(Duration),

    /// A recent fetch failed; the issuer is not retried until the backoff passes.
    #[error("key issuer unavailable; retry suppressed after a recent failure")]
    Backoff,
}

/// A trusted collaborator that hands out short-lived keys.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyIssuer: Send + Sync {
    /// Request a fresh key.
    async fn issue(&self) -> Result<IssuedKey, KeyFetchError>;
}

/// [`KeyIssuer`] backed by `GET <base_url><path>` returning
/// `{code: 200, data: {key, expireTime}}`.
#[derive(Debug, Clone)]
pub struct HttpKeyIssuer {
    client: reqwest::Client,
    url: String,
}

impl HttpKeyIssuer {
    /// Build an issuer for `base_url` + `path`.
    pub fn new(client: reqwest::Client, base_url: &str, path: &str) -> Self {
        Self {
            client,
            url: format!("{}{}", base_url.trim_end_matches('/'), path),
        }
    }

    /// Full URL of the key endpoint.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl KeyIssuer for HttpKeyIssuer {
    async fn issue(&self) -> Result<IssuedKey, KeyFetchError> {
        let resp = self.client.get(&self.url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(KeyFetchError::Status(status.as_u16()));
        }

        let envelope: ApiEnvelope<IssuedKey> = resp.json().await?;
        if envelope.code != 200 {
            return Err(KeyFetchError::Rejected(envelope.code));
        }
        match envelope.data {
            Some(issued) if !issued.key.is_empty() => Ok(issued),
            _ => Err(KeyFetchError::MissingKey),
        }
    }
}
