//! [`KeyStore`]: process-wide cache for a remotely issued key and its expiry.

use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard};

use crate::crypto::KEY_LEN;

/// Byte used to right-pad short source keys: ASCII `'0'`, matching the keys
/// already used by existing clients and stored records.
pub const KEY_PAD_BYTE: u8 = b'0';

/// Fixed-size key buffer that holds exactly [`KEY_LEN`] bytes.
///
/// When this type is dropped, the memory is overwritten with zeroes to
/// minimise the window during which plaintext key material lives in RAM.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyBytes(Box<[u8; KEY_LEN]>);

impl KeyBytes {
    /// Normalise arbitrary source key material to exactly [`KEY_LEN`] bytes.
    ///
    /// Shorter input is right-padded with [`KEY_PAD_BYTE`]; longer input is
    /// truncated.
    pub fn normalize(source: &[u8]) -> Self {
        let mut buf = Box::new([KEY_PAD_BYTE; KEY_LEN]);
        let n = source.len().min(KEY_LEN);
        buf[..n].copy_from_slice(&source[..n]);
        Self(buf)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl Drop for KeyBytes {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

impl std::fmt::Debug for KeyBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material, not even in debug builds.
        f.write_str("KeyBytes([REDACTED])")
    }
}

/// Cache state of the remotely issued key.
///
/// `Cached` entries whose `expires_at` has passed are the `Expired` state;
/// they are kept until the next fetch replaces them.
#[derive(Debug, Clone)]
pub enum KeyState {
    /// Nothing fetched yet (or explicitly invalidated).
    Uninitialized,
    /// A key and the instant after which it must be re-fetched.
    Cached {
        key: KeyBytes,
        expires_at: DateTime<Utc>,
    },
    /// The last fetch failed; no new fetch is attempted before `retry_after`.
    Failed { retry_after: DateTime<Utc> },
}

impl KeyState {
    /// The cached key, if one exists and has not expired at `now`.
    pub fn fresh_key(&self, now: DateTime<Utc>) -> Option<(KeyBytes, DateTime<Utc>)> {
        match self {
            KeyState::Cached { key, expires_at } if *expires_at > now => {
                Some((key.clone(), *expires_at))
            }
            _ => None,
        }
    }

    /// Whether a recent failed fetch still suppresses retries at `now`.
    pub fn in_backoff(&self, now: DateTime<Utc>) -> bool {
        matches!(self, KeyState::Failed { retry_after } if *retry_after > now)
    }
}

/// Shared store for the issued key.
///
/// The key and its expiry live in one [`KeyState`] value behind an
/// [`ArcSwap`], so readers always see a matching pair and never block. Writers
/// are serialised through [`KeyStore::lock_refresh`] so that only one fetch is
/// in flight at a time.
#[derive(Clone, Debug)]
pub struct KeyStore {
    state: Arc<ArcSwap<KeyState>>,
    refresh: Arc<Mutex<()>>,
}

impl KeyStore {
    /// Create a new, empty [`KeyStore`].
    pub fn new() -> Self {
        Self {
            state: Arc::new(ArcSwap::from_pointee(KeyState::Uninitialized)),
            refresh: Arc::new(Mutex::new(())),
        }
    }

    /// Lock-free read of the key, if cached and still valid at `now`.
    pub fn current(&self, now: DateTime<Utc>) -> Option<(KeyBytes, DateTime<Utc>)> {
        self.state.load().fresh_key(now)
    }

    /// Returns `true` if any key (fresh or expired) is cached.
    pub fn is_cached(&self) -> bool {
        matches!(**self.state.load(), KeyState::Cached { .. })
    }

    /// Replace the cached key and expiry in one atomic swap.
    pub fn store(&self, key: KeyBytes, expires_at: DateTime<Utc>) {
        self.state
            .store(Arc::new(KeyState::Cached { key, expires_at }));
    }

    /// Returns `true` if a failed fetch blocks retries at `now`.
    pub fn in_backoff(&self, now: DateTime<Utc>) -> bool {
        self.state.load().in_backoff(now)
    }

    /// Record a failed fetch; retries are suppressed until `retry_after`.
    pub fn mark_failed(&self, retry_after: DateTime<Utc>) {
        self.state.store(Arc::new(KeyState::Failed { retry_after }));
    }

    /// Drop the cached key so the next resolution fetches a new one.
    pub fn invalidate(&self) {
        self.state.store(Arc::new(KeyState::Uninitialized));
    }

    /// Acquire the single-writer refresh lock.
    pub async fn lock_refresh(&self) -> MutexGuard<'_, ()> {
        self.refresh.lock().await
    }
}

impl Default for KeyStore {
    fn default() -> Self {
        Self::new()
    }
}
