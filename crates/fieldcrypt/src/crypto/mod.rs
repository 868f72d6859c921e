//! AES-256-CBC value encryption and IV handling.
//!
//! This module is intentionally free of key-resolution and HTTP dependencies.
//! It provides the low-level operations used by the field codec.
//!
//! # Wire format
//!
//! ```text
//! "<field>":    "<base64(AES-256-CBC/PKCS7 ciphertext)>"
//! "<field>_iv": "<16 literal chars>" | "<base64(16 bytes)>"
//! ```

pub mod cipher;
pub mod iv;

pub use cipher::{decrypt_value, encrypt_value, CipherError, IV_LEN, KEY_LEN};
pub use iv::{Iv, IvEncoding};
