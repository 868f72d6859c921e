//! Shared application state injected into every Axum handler.

use std::{sync::Arc, time::Duration};

use crate::codec::StorageCodec;
use crate::policy::PolicyStore;

/// Application state shared across all request handlers.
///
/// Every field is `Arc`-backed so Axum can clone the state per request.
#[derive(Clone)]
pub struct AppState {
    /// Field codec bound to the server-held key.
    pub codec: Arc<StorageCodec>,
    /// Active route policy table.
    pub policies: PolicyStore,
    /// Key text handed out by the key-issuing endpoint; `None` disables it.
    pub issued_key: Option<Arc<str>>,
    /// Lifetime of an issued key.
    pub issued_key_ttl: Duration,
}

impl AppState {
    /// Build state around the configured server key.
    ///
    /// Without a key the codec runs on the built-in fallback and the
    /// key-issuing endpoint answers 503.
    pub fn new(configured_key: Option<&str>, policies: PolicyStore, issued_key_ttl: Duration) -> Self {
        let codec = StorageCodec::new(configured_key);
        let issued_key = configured_key
            .filter(|_| codec.is_configured())
            .map(Arc::from);
        Self {
            codec: Arc::new(codec),
            policies,
            issued_key,
            issued_key_ttl,
        }
    }
}

impl Default for AppState {
    /// State with no key and an empty policy table, suitable for tests.
    fn default() -> Self {
        Self::new(None, PolicyStore::default(), Duration::from_secs(3600))
    }
}
