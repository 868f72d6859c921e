//! Configuration loading and validation.
//!
//! All values are read from environment variables at startup. The process
//! exits with a clear error message if a variable is present but invalid.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::key::KeySettings;

/// Validated service configuration.
#[derive(Clone, Deserialize)]
pub struct Config {
    /// Shared encryption key text. Normalised to 32 bytes; absent means the
    /// built-in fallback key is used.
    #[serde(default)]
    pub encryption_key: Option<String>,

    /// Master switch for the request/response interceptor.
    #[serde(default = "default_true")]
    pub encryption_enabled: bool,

    /// Running against a mock backend: never contact the key issuer.
    #[serde(default)]
    pub is_mock: bool,

    /// Base URL of the application backend. Empty means local-only.
    #[serde(default)]
    pub base_url: String,

    /// Path of the key-issuing endpoint on `base_url`.
    #[serde(default = "default_key_endpoint_path")]
    pub key_endpoint_path: String,

    /// Upper bound (milliseconds) on a single key fetch.
    #[serde(default = "default_key_fetch_timeout_ms")]
    pub key_fetch_timeout_ms: u64,

    /// After a failed key fetch, how long (seconds) to use the local key
    /// before asking the issuer again.
    #[serde(default = "default_key_fetch_backoff")]
    pub key_fetch_backoff_secs: u64,

    /// Lifetime (seconds) of keys handed out by this service.
    #[serde(default = "default_issued_key_ttl")]
    pub issued_key_ttl_secs: u64,

    /// YAML or JSON policy table. Absent means the built-in default table.
    #[serde(default)]
    pub policy_path: Option<PathBuf>,

    /// How often (seconds) to re-read `policy_path`.
    #[serde(default = "default_policy_refresh_interval")]
    pub policy_refresh_interval_secs: u64,

    /// Port the HTTP server listens on.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// OTLP collector endpoint; spans are exported only when set.
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: Option<String>,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_true() -> bool {
    true
}
fn default_key_endpoint_path() -> String {
    "/api/system/encryption-key".into()
}
fn default_key_fetch_timeout_ms() -> u64 {
    3000
}
fn default_key_fetch_backoff() -> u64 {
    30
}
fn default_issued_key_ttl() -> u64 {
    3600
}
fn default_policy_refresh_interval() -> u64 {
    300
}
fn default_listen_port() -> u16 {
    8080
}
fn default_log_level() -> String {
    "info".into()
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("encryption_key", &self.encryption_key.as_ref().map(|_| "[REDACTED]"))
            .field("encryption_enabled", &self.encryption_enabled)
            .field("is_mock", &self.is_mock)
            .field("base_url", &self.base_url)
            .field("key_endpoint_path", &self.key_endpoint_path)
            .field("key_fetch_timeout_ms", &self.key_fetch_timeout_ms)
            .field("key_fetch_backoff_secs", &self.key_fetch_backoff_secs)
            .field("issued_key_ttl_secs", &self.issued_key_ttl_secs)
            .field("policy_path", &self.policy_path)
            .field("policy_refresh_interval_secs", &self.policy_refresh_interval_secs)
            .field("listen_port", &self.listen_port)
            .field("otel_exporter_otlp_endpoint", &self.otel_exporter_otlp_endpoint)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed or fails validation.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build configuration from environment")?;

        let mut c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.normalise();
        c.validate()?;
        Ok(c)
    }

    /// Treat blank optional values as absent.
    fn normalise(&mut self) {
        if self.encryption_key.as_deref().is_some_and(str::is_empty) {
            self.encryption_key = None;
        }
        if self
            .otel_exporter_otlp_endpoint
            .as_deref()
            .is_some_and(|e| e.trim().is_empty())
        {
            self.otel_exporter_otlp_endpoint = None;
        }
        self.base_url = self.base_url.trim().trim_end_matches('/').to_owned();
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        if self.key_fetch_timeout_ms == 0 {
            anyhow::bail!("KEY_FETCH_TIMEOUT_MS must be > 0");
        }
        if self.issued_key_ttl_secs == 0 {
            anyhow::bail!("ISSUED_KEY_TTL_SECS must be > 0");
        }
        if self.policy_refresh_interval_secs == 0 {
            anyhow::bail!("POLICY_REFRESH_INTERVAL_SECS must be > 0");
        }
        if !self.key_endpoint_path.starts_with('/') {
            anyhow::bail!("KEY_ENDPOINT_PATH must start with '/'");
        }
        if !self.base_url.is_empty()
            && !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://"))
        {
            anyhow::bail!("BASE_URL must be an http:// or https:// URL");
        }
        Ok(())
    }

    /// Mock mode or no backend: the configured key is used without contacting
    /// the key issuer.
    pub fn local_backend(&self) -> bool {
        self.is_mock || self.base_url.is_empty()
    }

    pub fn key_settings(&self) -> KeySettings {
        KeySettings {
            configured_key: self.encryption_key.clone(),
            local_backend: self.local_backend(),
            fetch_timeout: Duration::from_millis(self.key_fetch_timeout_ms),
            failure_backoff: Duration::from_secs(self.key_fetch_backoff_secs),
        }
    }

    pub fn issued_key_ttl(&self) -> Duration {
        Duration::from_secs(self.issued_key_ttl_secs)
    }

    pub fn policy_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.policy_refresh_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Config {
        Config {
            encryption_key: Some("k".into()),
            encryption_enabled: true,
            is_mock: false,
            base_url: String::new(),
            key_endpoint_path: default_key_endpoint_path(),
            key_fetch_timeout_ms: default_key_fetch_timeout_ms(),
            key_fetch_backoff_secs: default_key_fetch_backoff(),
            issued_key_ttl_secs: default_issued_key_ttl(),
            policy_path: None,
            policy_refresh_interval_secs: default_policy_refresh_interval(),
            listen_port: default_listen_port(),
            otel_exporter_otlp_endpoint: None,
            log_level: default_log_level(),
        }
    }

    #[test]
    fn defaults_are_correct() {
        assert!(default_true());
        assert_eq!(default_key_endpoint_path(), "/api/system/encryption-key");
        assert_eq!(default_key_fetch_timeout_ms(), 3000);
        assert_eq!(default_key_fetch_backoff(), 30);
        assert_eq!(default_issued_key_ttl(), 3600);
        assert_eq!(default_policy_refresh_interval(), 300);
        assert_eq!(default_listen_port(), 8080);
        assert_eq!(default_log_level(), "info");
    }

    #[test]
    fn validate_accepts_base() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let cfg = Config {
            key_fetch_timeout_ms: 0,
            ..base()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_base_url() {
        let cfg = Config {
            base_url: "ftp://x".into(),
            ..base()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn local_backend_when_mock_or_no_base_url() {
        assert!(base().local_backend());
        let remote = Config {
            base_url: "https://api.example.com".into(),
            ..base()
        };
        assert!(!remote.local_backend());
        let mock = Config {
            is_mock: true,
            ..remote.clone()
        };
        assert!(mock.local_backend());
        assert!(mock.key_settings().local_backend);
    }

    #[test]
    fn normalise_blanks_and_trailing_slash() {
        let mut cfg = Config {
            encryption_key: Some(String::new()),
            otel_exporter_otlp_endpoint: Some(" ".into()),
            base_url: "https://api.example.com/".into(),
            ..base()
        };
        cfg.normalise();
        assert!(cfg.encryption_key.is_none());
        assert!(cfg.otel_exporter_otlp_endpoint.is_none());
        assert_eq!(cfg.base_url, "https://api.example.com");
    }

    #[test]
    fn debug_redacts_key() {
        let dbg = format!("{:?}", Config {
            encryption_key: Some("top-secret".into()),
            ..base()
        });
        assert!(!dbg.contains("top-secret"));
    }
}
