//! HTTP client that runs the [`Interceptor`] around every call.

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::config::Config;
use crate::crypto::CipherError;
use crate::interceptor::Interceptor;
use crate::key::{HttpKeyIssuer, KeyIssuer, KeyResolver};
use crate::policy::PolicyStore;

/// Errors surfaced to callers of [`SecureClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// Outbound field encryption failed; nothing was sent.
    #[error("request failed")]
    Encryption(#[from] CipherError),

    /// The request could not be sent or the body could not be read.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a status other than 200.
    #[error("unexpected status: {0}")]
    Status(StatusCode),
}

/// `reqwest` client bound to a base URL, with transparent field encryption.
#[derive(Clone)]
pub struct SecureClient {
    http: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
    interceptor: Interceptor,
}

impl SecureClient {
    pub fn new(http: reqwest::Client, base_url: &str, interceptor: Interceptor) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            bearer_token: None,
            interceptor,
        }
    }

    /// Client for `cfg.base_url` with the key resolver and switches taken from `cfg`.
    ///
    /// The remote key issuer is wired in only when a real backend is configured.
    pub fn from_config(cfg: &Config, policies: PolicyStore) -> Self {
        let http = reqwest::Client::new();
        let issuer = (!cfg.local_backend()).then(|| {
            Arc::new(HttpKeyIssuer::new(http.clone(), &cfg.base_url, &cfg.key_endpoint_path))
                as Arc<dyn KeyIssuer>
        });
        let keys = KeyResolver::new(cfg.key_settings(), issuer);
        let interceptor = Interceptor::new(policies, keys).with_enabled(cfg.encryption_enabled);
        Self::new(http, &cfg.base_url, interceptor)
    }

    /// Attach `Authorization: Bearer <token>` to every request.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn interceptor(&self) -> &Interceptor {
        &self.interceptor
    }

    /// Send `body` to `path` and return the decrypted JSON response.
    ///
    /// # Errors
    ///
    /// [`ClientError::Encryption`] if outbound encryption fails,
    /// [`ClientError::Status`] for any status other than 200, and
    /// [`ClientError::Transport`] for network or body-decoding failures.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self.http.request(method.clone(), &url);
        if let Some(token) = &self.bearer_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = body {
            let body = self
                .interceptor
                .on_request(&method, path, body)
                .await
                .inspect_err(|e| warn!(%method, path, error = %e, "outbound encryption failed"))?;
            builder = builder.json(&body);
        }

        let response = builder.send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(ClientError::Status(status));
        }
        let payload: Value = response.json().await?;
        Ok(self.interceptor.on_response(path, payload).await)
    }

    pub async fn get(&self, path: &str) -> Result<Value, ClientError> {
        self.request(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<Value, ClientError> {
        self.request(Method::POST, path, Some(body)).await
    }

    pub async fn put(&self, path: &str, body: Value) -> Result<Value, ClientError> {
        self.request(Method::PUT, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ClientError> {
        self.request(Method::DELETE, path, None).await
    }
}
