//! Tracing and OpenTelemetry setup.
//!
//! # Telemetry invariants
//!
//! - **No field plaintext or key material** may appear in any span
//!   attribute or log field. Field names, paths and key tiers are fine.
//! - Log level is configurable via `LOG_LEVEL` (default: `info`), overridden
//!   by `RUST_LOG` when set.

pub mod init;

pub use init::init_telemetry;
