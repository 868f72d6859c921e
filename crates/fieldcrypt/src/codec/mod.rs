//! Field-level encryption of JSON records.
//!
//! An encrypted field keeps its name and position; its value becomes base64
//! ciphertext and a sibling `<field>_iv` attribute carries the IV:
//!
//! ```text
//! {"name": "张三", "studentNo": "2024001"}
//!   → {"name": "张三", "studentNo": "q8V…==", "studentNo_iv": "Xk2…"}
//! ```
//!
//! Encryption errors propagate: a record must never be sent half-encrypted.
//! Decryption errors are contained per field: the field is blanked and the
//! rest of the record is still returned.

pub mod storage;

pub use storage::StorageCodec;

use serde_json::{Map, Value};
use tracing::debug;

use crate::crypto::{decrypt_value, encrypt_value, CipherError, Iv, IvEncoding, KEY_LEN};

/// Suffix of the sibling attribute that carries a field's IV.
pub const IV_SUFFIX: &str = "_iv";

/// What to do with `<field>_iv` attributes after decryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IvHandling {
    /// Remove them. Used for anything returned to an API consumer.
    #[default]
    Strip,
    /// Leave them in place for internal re-use of the record.
    Keep,
}

/// Name of the IV attribute for `field`.
pub fn iv_key(field: &str) -> String {
    format!("{field}{IV_SUFFIX}")
}

/// Encrypt each named field of `record` in place.
///
/// Absent, `null` and empty-string fields are left untouched and get no IV
/// attribute. Non-string values are encrypted as their JSON text. Every
/// encrypted field gets a freshly generated IV.
///
/// # Errors
///
/// Returns the first [`CipherError`]; `record` may then be partially
/// transformed and must be discarded.
pub fn encrypt_fields<S: AsRef<str>>(
    record: &mut Map<String, Value>,
    fields: &[S],
    key: &[u8; KEY_LEN],
    encoding: IvEncoding,
) -> Result<(), CipherError> {
    for field in fields {
        let field = field.as_ref();
        let plaintext = match record.get(field).and_then(plaintext_of) {
            Some(p) => p,
            None => continue,
        };

        let iv = Iv::generate_for(encoding);
        let ciphertext = encrypt_value(&plaintext, key, iv.as_bytes())?;
        record.insert(field.to_owned(), Value::String(ciphertext));
        record.insert(iv_key(field), Value::String(iv.to_wire(encoding)));
    }
    Ok(())
}

/// Decrypt each named field of `record` in place.
///
/// A field is decrypted only when both it and its `<field>_iv` attribute are
/// non-empty strings; otherwise it is treated as plaintext and left alone.
/// A field that fails to decrypt becomes `""`. With [`IvHandling::Strip`]
/// the IV attribute of every named field is removed.
pub fn decrypt_fields<S: AsRef<str>>(
    record: &mut Map<String, Value>,
    fields: &[S],
    key: &[u8; KEY_LEN],
    handling: IvHandling,
) {
    for field in fields {
        let field = field.as_ref();
        let iv_name = iv_key(field);

        let pair = match (record.get(field), record.get(&iv_name)) {
            (Some(Value::String(ct)), Some(Value::String(iv)))
                if !ct.is_empty() && !iv.is_empty() =>
            {
                Some((ct.clone(), iv.clone()))
            }
            _ => None,
        };

        if let Some((ciphertext, wire_iv)) = pair {
            let restored = decrypt_field(&ciphertext, &wire_iv, key).unwrap_or_else(|e| {
                debug!(field, error = %e, "field decryption failed; blanking value");
                Value::String(String::new())
            });
            record.insert(field.to_owned(), restored);
        }

        if handling == IvHandling::Strip {
            record.shift_remove(&iv_name);
        }
    }
}

/// Decrypt the named fields at every nesting level of `value`.
///
/// Records are decrypted with [`decrypt_fields`] and then walked; sequences
/// are walked element by element; scalars are left alone.
pub fn decrypt_fields_recursive<S: AsRef<str>>(
    value: &mut Value,
    fields: &[S],
    key: &[u8; KEY_LEN],
    handling: IvHandling,
) {
    match value {
        Value::Array(items) => {
            for item in items.iter_mut() {
                decrypt_fields_recursive(item, fields, key, handling);
            }
        }
        Value::Object(record) => {
            decrypt_fields(record, fields, key, handling);
            for child in record.values_mut() {
                if child.is_object() || child.is_array() {
                    decrypt_fields_recursive(child, fields, key, handling);
                }
            }
        }
        _ => {}
    }
}

/// Decrypt one field value given its wire IV.
///
/// Plaintext that is a JSON object or array is restored to that structure;
/// anything else is returned as a string.
///
/// # Errors
///
/// Returns [`CipherError::InvalidIv`] or [`CipherError::Decryption`].
pub fn decrypt_field(
    ciphertext: &str,
    wire_iv: &str,
    key: &[u8; KEY_LEN],
) -> Result<Value, CipherError> {
    let iv = Iv::parse(wire_iv)?;
    let plaintext = decrypt_value(ciphertext, key, iv.as_bytes())?;
    Ok(restore(plaintext))
}

fn plaintext_of(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn restore(plaintext: String) -> Value {
    if plaintext.starts_with('{') || plaintext.starts_with('[') {
        if let Ok(structured @ (Value::Object(_) | Value::Array(_))) =
            serde_json::from_str::<Value>(&plaintext)
        {
            return structured;
        }
    }
    Value::String(plaintext)
}
