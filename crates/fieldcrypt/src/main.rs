//! `fieldcrypt` binary entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Initialise the telemetry pipeline (tracing + optional OTLP).
//! 3. Load the policy table from `POLICY_PATH`, or the built-in table.
//! 4. Log which key tier the client will try first (no network call).
//! 5. Spawn background tasks: policy reload.
//! 6. Build the Axum router and start the HTTP server.

use anyhow::Result;
use tracing::{info, warn};

use fieldcrypt::config::Config;
use fieldcrypt::policy::{self, PolicyStore};
use fieldcrypt::server::{self, state::AppState};
use fieldcrypt::{telemetry, SecureClient};

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init_telemetry(cfg.otel_exporter_otlp_endpoint.as_deref(), &cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = cfg.listen_port,
        encryption_enabled = cfg.encryption_enabled,
        "fieldcrypt starting"
    );

    // -----------------------------------------------------------------------
    // 3. Policy table
    // -----------------------------------------------------------------------
    let table = match &cfg.policy_path {
        Some(path) => policy::load_file(path).await?,
        None => policy::default_table()?,
    };
    let policies = PolicyStore::new(table);

    // -----------------------------------------------------------------------
    // 4. Key resolution
    // -----------------------------------------------------------------------
    let client = SecureClient::from_config(&cfg, policies.clone());
    // Issued keys are fetched lazily on first use; startup never waits on the issuer.
    let key_source = client.interceptor().keys().preferred_source();
    info!(key_source = ?key_source, "client key tier selected");
    if cfg.encryption_key.is_none() {
        warn!("ENCRYPTION_KEY is not set; storage codec uses the built-in fallback key");
    }

    // -----------------------------------------------------------------------
    // 5. Background tasks
    // -----------------------------------------------------------------------
    let _policy_reload = cfg
        .policy_path
        .clone()
        .map(|path| policy::reload_task(path, cfg.policy_refresh_interval(), policies.clone()));

    // -----------------------------------------------------------------------
    // 6. HTTP server
    // -----------------------------------------------------------------------
    let state = AppState::new(cfg.encryption_key.as_deref(), policies, cfg.issued_key_ttl());
    let router = server::router::build(state);

    let addr: std::net::SocketAddr = ([0, 0, 0, 0], cfg.listen_port).into();
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
