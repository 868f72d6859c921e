//! Active key resolution: issued key, configured key, built-in fallback.
//!
//! # Resolution order
//!
//! 1. Local/mock backend with a configured key: use the configured key.
//! 2. A cached issued key that has not expired.
//! 3. A freshly issued key from the [`KeyIssuer`], bounded by the fetch
//!    timeout and cached with its expiry. A failed fetch is remembered for
//!    the failure backoff, during which callers skip straight to tier 4.
//! 4. The configured key.
//! 5. [`FALLBACK_KEY`].
//!
//! Every tier's key is normalised to 32 bytes by [`KeyBytes::normalize`].
//! [`KeyResolver::resolve_key`] cannot fail.
//!
//! # Security invariants
//!
//! - Key material is never logged or included in traces; only the tier is.
//! - Issued keys live only in the in-memory [`KeyStore`].

pub mod issuer;
pub mod store;

pub use issuer::{HttpKeyIssuer, KeyFetchError, KeyIssuer};
pub use store::{KeyBytes, KeyStore};

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

/// Last-resort key used when nothing else is configured. Development only.
pub const FALLBACK_KEY: &str = "default-test-key-32-bytes-long!!";

/// Which tier produced an [`ActiveKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// Statically configured key.
    Configured,
    /// Key handed out by the key-issuing endpoint.
    Issued,
    /// [`FALLBACK_KEY`].
    Fallback,
}

impl KeySource {
    fn as_str(self) -> &'static str {
        match self {
            KeySource::Configured => "configured",
            KeySource::Issued => "issued",
            KeySource::Fallback => "fallback",
        }
    }
}

/// A resolved 32-byte key plus its provenance.
#[derive(Debug, Clone)]
pub struct ActiveKey {
    pub key: KeyBytes,
    pub source: KeySource,
    /// Expiry of an issued key; `None` for local tiers.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Inputs to key resolution.
#[derive(Debug, Clone)]
pub struct KeySettings {
    /// Statically configured key text, if any.
    pub configured_key: Option<String>,
    /// Running against a mock or local backend; the configured key is used
    /// without contacting the issuer.
    pub local_backend: bool,
    /// Upper bound on a single issuer call.
    pub fetch_timeout: Duration,
    /// After a failed fetch, how long callers go straight to the local tiers
    /// before the issuer is tried again.
    pub failure_backoff: Duration,
}

impl Default for KeySettings {
    fn default() -> Self {
        Self {
            configured_key: None,
            local_backend: false,
            fetch_timeout: Duration::from_millis(3000),
            failure_backoff: Duration::from_secs(30),
        }
    }
}

/// Resolves the active key. Cheap to clone; clones share one [`KeyStore`].
#[derive(Clone)]
pub struct KeyResolver {
    settings: Arc<KeySettings>,
    issuer: Option<Arc<dyn KeyIssuer>>,
    store: KeyStore,
}

impl KeyResolver {
    /// Create a resolver. Without an `issuer`, tiers 2 and 3 are skipped.
    pub fn new(settings: KeySettings, issuer: Option<Arc<dyn KeyIssuer>>) -> Self {
        Self {
            settings: Arc::new(settings),
            issuer,
            store: KeyStore::new(),
        }
    }

    /// Resolver that only ever uses the configured key (or the fallback).
    pub fn local(configured_key: Option<String>) -> Self {
        Self::new(
            KeySettings {
                configured_key,
                local_backend: true,
                ..KeySettings::default()
            },
            None,
        )
    }

    /// The shared issued-key cache.
    pub fn store(&self) -> &KeyStore {
        &self.store
    }

    /// Forget the cached issued key.
    pub fn invalidate(&self) {
        self.store.invalidate();
    }

    /// The first tier [`resolve_key`](Self::resolve_key) will try, decided
    /// from settings alone. Never contacts the issuer.
    pub fn preferred_source(&self) -> KeySource {
        let configured = self.settings.configured_key.is_some();
        if self.settings.local_backend && configured {
            KeySource::Configured
        } else if self.issuer.is_some() {
            KeySource::Issued
        } else if configured {
            KeySource::Configured
        } else {
            KeySource::Fallback
        }
    }

    /// Produce the active key, walking the tiers in order.
    pub async fn resolve_key(&self) -> ActiveKey {
        if self.settings.local_backend {
            if let Some(key) = self.settings.configured_key.as_deref() {
                return local_key(key, KeySource::Configured);
            }
        }

        if let Some(issuer) = &self.issuer {
            match self.issued_key(issuer.as_ref()).await {
                Ok(active) => return active,
                Err(KeyFetchError::Backoff) => debug!("issuer in backoff; using local key"),
                Err(e) => warn!(error = %e, "failed to obtain issued key; using local key"),
            }
        }

        match self.settings.configured_key.as_deref() {
            Some(key) => local_key(key, KeySource::Configured),
            None => {
                warn!("no encryption key configured; using built-in fallback key");
                local_key(FALLBACK_KEY, KeySource::Fallback)
            }
        }
    }

    async fn issued_key(&self, issuer: &dyn KeyIssuer) -> Result<ActiveKey, KeyFetchError> {
        if let Some(active) = self.cached() {
            return Ok(active);
        }

        if self.store.in_backoff(Utc::now()) {
            return Err(KeyFetchError::Backoff);
        }

        let _writer = self.store.lock_refresh().await;
        // Another caller may have refreshed, or failed, while we waited.
        if let Some(active) = self.cached() {
            return Ok(active);
        }
        if self.store.in_backoff(Utc::now()) {
            return Err(KeyFetchError::Backoff);
        }

        let timeout = self.settings.fetch_timeout;
        let issued = match tokio::time::timeout(timeout, issuer.issue()).await {
            Ok(Ok(issued)) => issued,
            Ok(Err(e)) => return Err(self.fetch_failed(e)),
            Err(_) => return Err(self.fetch_failed(KeyFetchError::Timeout(timeout))),
        };

        let key = KeyBytes::normalize(issued.key.as_bytes());
        self.store.store(key.clone(), issued.expire_time);
        info!(expires_at = %issued.expire_time, "issued key cached");

        Ok(ActiveKey {
            key,
            source: KeySource::Issued,
            expires_at: Some(issued.expire_time),
        })
    }

    fn fetch_failed(&self, err: KeyFetchError) -> KeyFetchError {
        let backoff = chrono::Duration::from_std(self.settings.failure_backoff)
            .unwrap_or(chrono::Duration::zero());
        self.store.mark_failed(Utc::now() + backoff);
        err
    }

    fn cached(&self) -> Option<ActiveKey> {
        self.store.current(Utc::now()).map(|(key, expires_at)| ActiveKey {
            key,
            source: KeySource::Issued,
            expires_at: Some(expires_at),
        })
    }
}

fn local_key(text: &str, source: KeySource) -> ActiveKey {
    debug!(source = source.as_str(), "using local key");
    ActiveKey {
        key: KeyBytes::normalize(text.as_bytes()),
        source,
        expires_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use common::protocol::IssuedKey;
    use super::issuer::MockKeyIssuer;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn issued(key: &str, expire_time: DateTime<Utc>) -> IssuedKey {
        IssuedKey {
            key: key.into(),
            expire_time,
        }
    }

    fn remote_settings(configured: Option<&str>) -> KeySettings {
        KeySettings {
            configured_key: configured.map(str::to_owned),
            local_backend: false,
            fetch_timeout: Duration::from_millis(200),
            failure_backoff: Duration::from_secs(30),
        }
    }

    #[test]
    fn preferred_source_needs_no_fetch() {
        let mut mock = MockKeyIssuer::new();
        mock.expect_issue().times(0);
        let remote = KeyResolver::new(remote_settings(Some("k")), Some(Arc::new(mock)));
        assert_eq!(remote.preferred_source(), KeySource::Issued);
        assert_eq!(KeyResolver::local(Some("k".into())).preferred_source(), KeySource::Configured);
        assert_eq!(KeyResolver::local(None).preferred_source(), KeySource::Fallback);
    }

    #[tokio::test]
    async fn local_backend_uses_configured_key_without_fetch() {
        let mut mock = MockKeyIssuer::new();
        mock.expect_issue().times(0);
        let resolver = KeyResolver::new(
            KeySettings {
                configured_key: Some("a9F$3dL!8kPz2xQw".into()),
                local_backend: true,
                ..KeySettings::default()
            },
            Some(Arc::new(mock)),
        );
        let active = resolver.resolve_key().await;
        assert_eq!(active.source, KeySource::Configured);
        assert_eq!(active.key.as_bytes(), b"a9F$3dL!8kPz2xQw0000000000000000");
    }

    #[tokio::test]
    async fn issued_key_is_cached_until_expiry() {
        let mut mock = MockKeyIssuer::new();
        mock.expect_issue()
            .times(1)
            .returning(|| Ok(issued("remote", Utc::now() + ChronoDuration::hours(1))));
        let resolver = KeyResolver::new(remote_settings(Some("local")), Some(Arc::new(mock)));

        let first = resolver.resolve_key().await;
        let second = resolver.resolve_key().await;
        assert_eq!(first.source, KeySource::Issued);
        assert_eq!(second.source, KeySource::Issued);
        assert_eq!(first.key, KeyBytes::normalize(b"remote"));
        assert_eq!(second.key, first.key);
    }

    #[tokio::test]
    async fn expired_key_is_refetched() {
        let mut mock = MockKeyIssuer::new();
        mock.expect_issue()
            .times(2)
            .returning(|| Ok(issued("remote", Utc::now() - ChronoDuration::seconds(1))));
        let resolver = KeyResolver::new(remote_settings(None), Some(Arc::new(mock)));
        resolver.resolve_key().await;
        resolver.resolve_key().await;
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let mut mock = MockKeyIssuer::new();
        mock.expect_issue()
            .times(2)
            .returning(|| Ok(issued("remote", Utc::now() + ChronoDuration::hours(1))));
        let resolver = KeyResolver::new(remote_settings(None), Some(Arc::new(mock)));
        resolver.resolve_key().await;
        resolver.invalidate();
        resolver.resolve_key().await;
    }

    #[tokio::test]
    async fn fetch_failure_falls_back_to_configured_key() {
        let mut mock = MockKeyIssuer::new();
        mock.expect_issue()
            .returning(|| Err(KeyFetchError::Rejected(500)));
        let resolver = KeyResolver::new(remote_settings(Some("local-key")), Some(Arc::new(mock)));
        let active = resolver.resolve_key().await;
        assert_eq!(active.source, KeySource::Configured);
        assert_eq!(active.key, KeyBytes::normalize(b"local-key"));
        assert!(!resolver.store().is_cached());
    }

    #[tokio::test]
    async fn nothing_configured_uses_fallback() {
        let mut mock = MockKeyIssuer::new();
        mock.expect_issue().returning(|| Err(KeyFetchError::MissingKey));
        let resolver = KeyResolver::new(remote_settings(None), Some(Arc::new(mock)));
        let active = resolver.resolve_key().await;
        assert_eq!(active.source, KeySource::Fallback);
        assert_eq!(active.key.as_bytes(), FALLBACK_KEY.as_bytes());
    }

    #[tokio::test]
    async fn no_issuer_and_no_key_uses_fallback() {
        let resolver = KeyResolver::local(None);
        assert_eq!(resolver.resolve_key().await.source, KeySource::Fallback);
    }

    struct SlowIssuer {
        delay: Duration,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl KeyIssuer for SlowIssuer {
        async fn issue(&self) -> Result<IssuedKey, KeyFetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(issued("slow", Utc::now() + ChronoDuration::hours(1)))
        }
    }

    #[tokio::test]
    async fn slow_issuer_times_out_into_configured_key() {
        let issuer = Arc::new(SlowIssuer {
            delay: Duration::from_secs(5),
            calls: AtomicUsize::new(0),
        });
        let resolver = KeyResolver::new(
            KeySettings {
                fetch_timeout: Duration::from_millis(20),
                ..remote_settings(Some("local"))
            },
            Some(issuer as Arc<dyn KeyIssuer>),
        );
        let active = resolver.resolve_key().await;
        assert_eq!(active.source, KeySource::Configured);
    }

    #[tokio::test]
    async fn concurrent_resolves_fetch_once() {
        let issuer = Arc::new(SlowIssuer {
            delay: Duration::from_millis(50),
            calls: AtomicUsize::new(0),
        });
        let resolver = KeyResolver::new(remote_settings(None), Some(issuer.clone() as Arc<dyn KeyIssuer>));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let r = resolver.clone();
                tokio::spawn(async move { r.resolve_key().await })
            })
            .collect();
        for h in handles {
            let active = h.await.unwrap();
            assert_eq!(active.source, KeySource::Issued);
            assert_eq!(active.key, KeyBytes::normalize(b"slow"));
        }
        assert_eq!(issuer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn hanging_issuer_times_out_once_for_concurrent_callers() {
        let issuer = Arc::new(SlowIssuer {
            delay: Duration::from_secs(60),
            calls: AtomicUsize::new(0),
        });
        let fetch_timeout = Duration::from_millis(200);
        let resolver = KeyResolver::new(
            KeySettings {
                fetch_timeout,
                ..remote_settings(Some("local"))
            },
            Some(issuer.clone() as Arc<dyn KeyIssuer>),
        );

        let started = std::time::Instant::now();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let r = resolver.clone();
                tokio::spawn(async move { r.resolve_key().await })
            })
            .collect();
        for h in handles {
            assert_eq!(h.await.unwrap().source, KeySource::Configured);
        }
        let elapsed = started.elapsed();

        assert_eq!(issuer.calls.load(Ordering::SeqCst), 1);
        assert!(elapsed < fetch_timeout * 3, "callers waited {elapsed:?}");
    }

    #[tokio::test]
    async fn failed_fetch_is_retried_after_backoff() {
        let mut mock = MockKeyIssuer::new();
        mock.expect_issue()
            .times(2)
            .returning(|| Err(KeyFetchError::Rejected(500)));
        let resolver = KeyResolver::new(
            KeySettings {
                failure_backoff: Duration::from_millis(50),
                ..remote_settings(Some("local"))
            },
            Some(Arc::new(mock)),
        );

        resolver.resolve_key().await;
        // Within the backoff window the issuer is not called again.
        assert_eq!(resolver.resolve_key().await.source, KeySource::Configured);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(resolver.resolve_key().await.source, KeySource::Configured);
    }
}
