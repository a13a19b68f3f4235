//! Capture record model.
//!
//! A [`CaptureRecord`] is the on-disk representation of one intercepted
//! HTTP request. The JSON layout is a stable contract: camelCase keys,
//! ISO-8601 UTC timestamps with millisecond precision, headers as an
//! ordered list of `{key, value}` pairs preserving wire order, and the
//! body both parsed (`body`) and verbatim (`rawBody`).

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// One header as it appeared on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderPair {
    pub key: String,
    pub value: String,
}

impl HeaderPair {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Millisecond-precision ISO-8601 UTC timestamps on the wire.
mod timestamp_millis {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// A persisted capture of a single intercepted request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRecord {
    /// Globally unique capture id (UUID v4).
    pub id: String,
    #[serde(with = "timestamp_millis")]
    pub timestamp: DateTime<Utc>,
    pub method: String,
    /// Request target as received (path plus query string).
    pub url: String,
    pub path: String,
    /// Headers in wire order.
    pub headers: Vec<HeaderPair>,
    /// Query parameters, multi-valued.
    pub query: HashMap<String, Vec<String>>,
    /// Parsed body: a JSON value when the content type allows, a decoded
    /// map for form bodies, the raw string otherwise.
    pub body: Value,
    /// Body bytes verbatim, UTF-8 decoded.
    pub raw_body: String,
    /// Detected provider, when a heuristic matched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub content_length: u64,
}

impl CaptureRecord {
    /// Assemble a record from raw request parts.
    pub fn from_request(
        method: impl Into<String>,
        url: impl Into<String>,
        headers: Vec<HeaderPair>,
        raw_body: &[u8],
    ) -> Self {
        let url = url.into();
        let (path, query_string) = match url.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (url.clone(), None),
        };

        let content_type = headers
            .iter()
            .find(|pair| pair.key.eq_ignore_ascii_case("content-type"))
            .map(|pair| pair.value.clone());

        let raw_body_text = String::from_utf8_lossy(raw_body).into_owned();
        let body = classify_body(content_type.as_deref(), &raw_body_text);

        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            method: method.into(),
            url,
            path,
            headers,
            query: query_string.as_deref().map(parse_query).unwrap_or_default(),
            body,
            raw_body: raw_body_text,
            provider: None,
            content_type,
            content_length: raw_body.len() as u64,
        }
    }

    /// First eight characters of the id, used in filenames.
    pub fn id_prefix(&self) -> &str {
        &self.id[..self.id.len().min(8)]
    }

    /// On-disk filename: `YYYY-MM-DD_HH-mm-ss_<id8>.json`.
    ///
    /// Descending lexicographic order over these names is
    /// reverse-chronological order.
    pub fn filename(&self) -> String {
        format!(
            "{}_{}.json",
            self.timestamp.format("%Y-%m-%d_%H-%M-%S"),
            self.id_prefix()
        )
    }
}

/// A capture paired with the file it lives in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureFile {
    pub file: String,
    pub capture: CaptureRecord,
}

/// Parse the request body according to its content type.
///
/// JSON content types parse to a JSON value, urlencoded forms decode to an
/// object of string values, anything else stays a string. A body that
/// fails to parse also stays a string; capture never rejects traffic.
pub fn classify_body(content_type: Option<&str>, raw: &str) -> Value {
    let media_type = content_type
        .unwrap_or("")
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    if media_type == "application/json" || media_type.ends_with("+json") || media_type.is_empty() {
        if let Ok(value) = serde_json::from_str::<Value>(raw) {
            return value;
        }
    }

    if media_type == "application/x-www-form-urlencoded" {
        let mut map = serde_json::Map::new();
        for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
            map.insert(key.into_owned(), Value::String(value.into_owned()));
        }
        return Value::Object(map);
    }

    Value::String(raw.to_string())
}

/// Decode a query string into a multi-valued map.
pub fn parse_query(query: &str) -> HashMap<String, Vec<String>> {
    let mut out: HashMap<String, Vec<String>> = HashMap::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        out.entry(key.into_owned()).or_default().push(value.into_owned());
    }
    out
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod tests;
