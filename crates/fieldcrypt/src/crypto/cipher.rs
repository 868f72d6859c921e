//! AES-256-CBC encryption and decryption of individual string values.
//!
//! **Algorithm choice:** AES-256-CBC with PKCS#7 padding is what already-stored
//! records and existing clients use, so it is kept for interoperability. CBC
//! gives no integrity protection; a wrong key or tampered ciphertext is only
//! detected through the padding check and UTF-8 validation below.
//!
//! **Never reuse an IV.** Callers obtain a fresh IV per value from
//! [`super::iv`].

use aes::Aes256;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use thiserror::Error;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Byte length of an AES-256 key (32 bytes = 256 bits).
pub const KEY_LEN: usize = 32;

/// Byte length of a CBC initialisation vector (one AES block).
pub const IV_LEN: usize = 16;

/// Errors produced by the cipher layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CipherError {
    /// The key is the wrong length (must be [`KEY_LEN`] bytes).
    #[error("invalid key length: expected {KEY_LEN} bytes, got {0}")]
    InvalidKeyLength(usize),

    /// A wire IV decoded to something other than [`IV_LEN`] bytes.
    #[error("invalid IV: expected {IV_LEN} bytes, got {0}")]
    InvalidIv(usize),

    /// Decryption failed: bad base64, bad padding, wrong key/IV, or non-UTF-8 plaintext.
    #[error("decryption failed")]
    Decryption,
}

/// Encrypt `plaintext` and return the ciphertext as standard padded base64.
///
/// # Errors
///
/// Returns [`CipherError::InvalidKeyLength`] if `key` is not [`KEY_LEN`] bytes.
pub fn encrypt_value(plaintext: &str, key: &[u8], iv: &[u8; IV_LEN]) -> Result<String, CipherError> {
    let cipher = Aes256CbcEnc::new_from_slices(key, iv)
        .map_err(|_| CipherError::InvalidKeyLength(key.len()))?;
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
    Ok(STANDARD.encode(ciphertext))
}

/// Decrypt base64 `ciphertext` back to its UTF-8 plaintext.
///
/// # Errors
///
/// Returns [`CipherError::InvalidKeyLength`] if `key` is not [`KEY_LEN`] bytes.
/// Returns [`CipherError::Decryption`] if the ciphertext is not valid base64,
/// fails the padding check, or does not decrypt to UTF-8.
pub fn decrypt_value(ciphertext: &str, key: &[u8], iv: &[u8; IV_LEN]) -> Result<String, CipherError> {
    let cipher = Aes256CbcDec::new_from_slices(key, iv)
        .map_err(|_| CipherError::InvalidKeyLength(key.len()))?;
    let raw = STANDARD
        .decode(ciphertext.trim())
        .map_err(|_| CipherError::Decryption)?;
    let plaintext = cipher
        .decrypt_padded_vec_mut::<Pkcs7>(&raw)
        .map_err(|_| CipherError::Decryption)?;
    String::from_utf8(plaintext).map_err(|_| CipherError::Decryption)
}
