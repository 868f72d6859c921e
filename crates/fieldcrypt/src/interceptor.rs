//! Applies the field codec around outbound requests and inbound responses.
//!
//! The interceptor looks up the [`FieldPolicy`](crate::policy::FieldPolicy)
//! for the target path, resolves the active key and runs the codec. Outbound
//! encryption failures abort the request; inbound decryption never fails.

use reqwest::Method;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::codec::{decrypt_fields_recursive, encrypt_fields, IvHandling};
use crate::crypto::{CipherError, IvEncoding};
use crate::key::KeyResolver;
use crate::policy::{normalize_path, PolicyStore};

/// Request/response transformer bound to a policy table and key resolver.
#[derive(Clone)]
pub struct Interceptor {
    policies: PolicyStore,
    keys: KeyResolver,
    enabled: bool,
    iv_encoding: IvEncoding,
}

impl Interceptor {
    /// Create an enabled interceptor that emits 16-character text IVs.
    pub fn new(policies: PolicyStore, keys: KeyResolver) -> Self {
        Self {
            policies,
            keys,
            enabled: true,
            iv_encoding: IvEncoding::Text,
        }
    }

    /// Turn the interceptor on or off; when off both hooks are the identity.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// IV encoding used for outbound fields.
    pub fn with_iv_encoding(mut self, encoding: IvEncoding) -> Self {
        self.iv_encoding = encoding;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn policies(&self) -> &PolicyStore {
        &self.policies
    }

    pub fn keys(&self) -> &KeyResolver {
        &self.keys
    }

    /// Encrypt the policy's outbound fields of `body` before it is sent.
    ///
    /// Bodyless methods, non-object or empty bodies and paths without an
    /// outbound policy pass through unchanged.
    ///
    /// # Errors
    ///
    /// Returns the [`CipherError`] of the first field that fails; the request
    /// must not be sent.
    #[instrument(skip(self, body), fields(path = normalize_path(url)))]
    pub async fn on_request(
        &self,
        method: &Method,
        url: &str,
        body: Value,
    ) -> Result<Value, CipherError> {
        if !self.enabled || !carries_body(method) {
            return Ok(body);
        }
        let mut record = match body {
            Value::Object(record) if !record.is_empty() => record,
            other => return Ok(other),
        };
        let fields = match self.policies.policy_for(url) {
            Some(policy) if !policy.encrypt_on_send.is_empty() => policy.encrypt_on_send,
            _ => return Ok(Value::Object(record)),
        };

        let active = self.keys.resolve_key().await;
        encrypt_fields(&mut record, &fields, active.key.as_bytes(), self.iv_encoding)?;
        debug!(fields = ?fields, key_source = ?active.source, "encrypted outbound fields");
        Ok(Value::Object(record))
    }

    /// Decrypt the policy's inbound fields of a response payload.
    ///
    /// A truthy `data` member (anything but null, `false`, `0` or `""`) is
    /// decrypted in place of the whole payload.
    /// Fields that fail to decrypt are blanked; the call itself cannot fail.
    #[instrument(skip(self, payload), fields(path = normalize_path(url)))]
    pub async fn on_response(&self, url: &str, mut payload: Value) -> Value {
        if !self.enabled {
            return payload;
        }
        let fields = match self.policies.policy_for(url) {
            Some(policy) if !policy.decrypt_on_receive.is_empty() => policy.decrypt_on_receive,
            _ => return payload,
        };

        let active = self.keys.resolve_key().await;
        let key = active.key.as_bytes();
        let has_data = payload.get("data").is_some_and(is_truthy);
        let target = if has_data { &mut payload["data"] } else { &mut payload };
        decrypt_fields_recursive(target, &fields, key, IvHandling::Strip);
        debug!(fields = ?fields, key_source = ?active.source, "decrypted inbound fields");
        payload
    }
}

/// Loose truthiness of a JSON value: empty objects and arrays count as present.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn carries_body(method: &Method) -> bool {
    !matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}
