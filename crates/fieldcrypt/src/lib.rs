//! Selective field-level encryption of JSON records.
//!
//! Sensitive fields are encrypted with AES-256-CBC before a record leaves the
//! client and decrypted after it returns, driven by a per-endpoint policy
//! table. The same codec runs on the storage side with a server-held key.

pub mod client;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod interceptor;
pub mod key;
pub mod policy;
pub mod server;
pub mod telemetry;

pub use client::{ClientError, SecureClient};
pub use interceptor::Interceptor;
