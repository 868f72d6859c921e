//! Path-pattern matching from endpoint paths to field policies.
//!
//! Patterns are endpoint paths in which a `:name` segment stands for exactly
//! one path segment, e.g. `/api/leave/:leaveRequestId/detail`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors from building a [`PolicyTable`].
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A pattern did not compile to a valid regular expression.
    #[error("invalid path pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// The policy document is not valid YAML or JSON, or has the wrong shape.
    #[error("invalid policy document: {0}")]
    Parse(String),
}

/// Fields transformed for one endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldPolicy {
    /// Fields encrypted in request bodies sent to the endpoint.
    #[serde(default, rename = "encryptFields")]
    pub encrypt_on_send: Vec<String>,
    /// Fields decrypted in responses from the endpoint.
    #[serde(default, rename = "decryptFields")]
    pub decrypt_on_receive: Vec<String>,
}

impl FieldPolicy {
    /// Build a policy from field name lists.
    pub fn new<E, D>(encrypt_on_send: E, decrypt_on_receive: D) -> Self
    where
        E: IntoIterator,
        E::Item: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        Self {
            encrypt_on_send: encrypt_on_send.into_iter().map(Into::into).collect(),
            decrypt_on_receive: decrypt_on_receive.into_iter().map(Into::into).collect(),
        }
    }
}

/// A compiled path pattern.
#[derive(Debug, Clone)]
struct PathPattern {
    raw: String,
    /// `None` for patterns without wildcard segments.
    wildcard: Option<Regex>,
}

impl PathPattern {
    fn compile(raw: &str) -> Result<Self, PolicyError> {
        let has_wildcard = raw.split('/').any(|seg| seg.starts_with(':') && seg.len() > 1);
        let wildcard = if has_wildcard {
            let body = raw
                .split('/')
                .map(|seg| {
                    if seg.starts_with(':') && seg.len() > 1 {
                        "[^/]+".to_owned()
                    } else {
                        regex::escape(seg)
                    }
                })
                .collect::<Vec<_>>()
                .join("/");
            let re = Regex::new(&format!("^{body}$")).map_err(|source| {
                PolicyError::InvalidPattern {
                    pattern: raw.to_owned(),
                    source,
                }
            })?;
            Some(re)
        } else {
            None
        };
        Ok(Self {
            raw: raw.to_owned(),
            wildcard,
        })
    }

    fn matches(&self, path: &str) -> bool {
        self.raw == path || self.wildcard.as_ref().is_some_and(|re| re.is_match(path))
    }
}

/// Ordered table of (pattern, policy) pairs.
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    entries: Vec<(PathPattern, FieldPolicy)>,
}

impl PolicyTable {
    /// Build a table; declaration order is preserved.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidPattern`] for the first pattern that does not compile.
    pub fn from_entries<P: AsRef<str>>(
        entries: impl IntoIterator<Item = (P, FieldPolicy)>,
    ) -> Result<Self, PolicyError> {
        let entries = entries
            .into_iter()
            .map(|(p, policy)| Ok((PathPattern::compile(p.as_ref())?, policy)))
            .collect::<Result<Vec<_>, PolicyError>>()?;
        Ok(Self { entries })
    }

    /// Parse a YAML (or JSON) mapping of pattern → `{encryptFields, decryptFields}`.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Parse`] if the text is neither valid YAML nor
    /// JSON of that shape, or [`PolicyError::InvalidPattern`].
    pub fn parse(text: &str) -> Result<Self, PolicyError> {
        let doc: Map<String, Value> = if let Ok(parsed) = serde_yaml::from_str(text) {
            parsed
        } else {
            serde_json::from_str(text).map_err(|e| PolicyError::Parse(e.to_string()))?
        };

        let entries = doc
            .into_iter()
            .map(|(pattern, raw)| {
                serde_json::from_value::<FieldPolicy>(raw)
                    .map(|policy| (pattern.clone(), policy))
                    .map_err(|e| PolicyError::Parse(format!("{pattern}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_entries(entries)
    }

    /// Number of configured patterns.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no patterns are configured.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The policy that applies to `url`, if any.
    ///
    /// Scheme, host, query string and fragment are ignored. Patterns are
    /// tried in declaration order and the first one that matches wins,
    /// whether it is a literal path or contains wildcard segments.
    pub fn policy_for(&self, url: &str) -> Option<&FieldPolicy> {
        let path = normalize_path(url);
        self.entries
            .iter()
            .find(|(pattern, _)| pattern.matches(path))
            .map(|(_, policy)| policy)
    }
}

/// Reduce a URL to its path: drop `scheme://host`, query string and fragment.
pub fn normalize_path(url: &str) -> &str {
    let without_origin = ["https://", "http://"]
        .iter()
        .find_map(|scheme| url.strip_prefix(*scheme))
        .map(|rest| rest.find('/').map_or("", |i| &rest[i..]))
        .unwrap_or(url);
    let end = without_origin
        .find(|c: char| c == '?' || c == '#')
        .unwrap_or(without_origin.len());
    &without_origin[..end]
}
