//! Route encryption policy: which fields to encrypt or decrypt per endpoint.
//!
//! # Responsibilities
//!
//! - Load the policy table (YAML, or JSON) from disk at startup.
//! - Resolve an endpoint URL to its [`FieldPolicy`] with wildcard matching.
//! - Optionally reload the table on an interval.
//!
//! # Module invariants
//!
//! - **No crypto dependencies.** This module must not import anything from
//!   `crate::crypto`, `crate::codec` or `crate::key`.
//! - The table is read-only to the rest of the crate; only the reload task
//!   swaps it.

pub mod matcher;
pub mod store;

pub use matcher::{normalize_path, FieldPolicy, PolicyError, PolicyTable};
pub use store::PolicyStore;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::time;
use tracing::{info, warn};

/// Policy table for the class-management API, used when no file is configured.
pub const DEFAULT_POLICIES: &str = include_str!("../../policies/default.yaml");

/// Parse [`DEFAULT_POLICIES`].
///
/// # Errors
///
/// Returns an error only if the embedded table is malformed.
pub fn default_table() -> Result<PolicyTable> {
    PolicyTable::parse(DEFAULT_POLICIES).context("built-in policy table is invalid")
}

/// Read and parse a policy file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a valid policy document.
pub async fn load_file(path: &Path) -> Result<PolicyTable> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read policy file {}", path.display()))?;
    let table = PolicyTable::parse(&text)
        .with_context(|| format!("failed to parse policy file {}", path.display()))?;
    info!(path = %path.display(), patterns = table.len(), "loaded policy table");
    Ok(table)
}

/// Spawn a background task that periodically reloads the policy file.
///
/// On reload failure the previous table is retained and a warning is emitted.
pub fn reload_task(
    path: PathBuf,
    interval: std::time::Duration,
    store: PolicyStore,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        // First tick fires immediately; the table was loaded at startup.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match load_file(&path).await {
                Ok(table) => store.replace(table),
                Err(e) => warn!(error = %e, "policy reload failed; retaining previous table"),
            }
        }
    })
}
