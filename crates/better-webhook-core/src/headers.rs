//! Normalized HTTP header map.
//!
//! Every component downstream of the transport boundary (providers,
//! observers, handlers, the pipeline itself) sees headers in exactly one
//! form: lowercase keys, a single value per key. Normalization happens once
//! when [`Headers`] is constructed and is idempotent.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Case-insensitive header map with single string values.
///
/// Keys are lowercased on insertion. Multi-valued headers collapse to the
/// first value seen, matching the wire order of the original request.
///
/// # Examples
///
/// ```rust
/// use better_webhook_core::Headers;
///
/// let headers = Headers::from_pairs([
///     ("X-GitHub-Event".to_string(), "push".to_string()),
///     ("x-github-event".to_string(), "ignored-duplicate".to_string()),
/// ]);
/// assert_eq!(headers.get("X-GITHUB-EVENT"), Some("push"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers(HashMap<String, String>);

impl Headers {
    /// Create an empty header map.
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Build a normalized map from raw header pairs.
    ///
    /// Keys are lowercased; when the same key appears more than once the
    /// first occurrence wins.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut map = HashMap::new();
        for (key, value) in pairs {
            map.entry(key.to_ascii_lowercase()).or_insert(value);
        }
        Self(map)
    }

    /// Build a normalized map from an existing map of raw headers.
    pub fn from_map(raw: &HashMap<String, String>) -> Self {
        Self::from_pairs(raw.iter().map(|(k, v)| (k.clone(), v.clone())))
    }

    /// Look up a header value, ignoring name case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Whether a header is present, ignoring name case.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(&name.to_ascii_lowercase())
    }

    /// Iterate over `(name, value)` pairs in normalized form.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of distinct headers.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<const N: usize> From<[(String, String); N]> for Headers {
    fn from(pairs: [(String, String); N]) -> Self {
        Self::from_pairs(pairs)
    }
}

impl FromIterator<(String, String)> for Headers {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}

#[cfg(test)]
#[path = "headers_tests.rs"]
mod tests;
