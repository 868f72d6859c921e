//! Storage-side HTTP service.
//!
//! # Responsibilities
//! - Encode and decode records with the server-held key (`/encrypt`, `/decrypt`).
//! - Issue the shared key to clients (`/api/system/encryption-key`).
//! - Expose policy lookup and health endpoints.

pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;
