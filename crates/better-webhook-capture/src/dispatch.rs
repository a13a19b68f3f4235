//! Replay dispatcher.
//!
//! Reconstructs an HTTP request from a stored capture and re-issues it
//! against a developer endpoint. Headers are forwarded exactly as
//! captured, minus hop-by-hop headers the new transport owns, with
//! caller-supplied overrides applied case-insensitively. The body is the
//! captured raw bytes verbatim. No retries.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument};

use crate::record::HeaderPair;
use crate::store::{CaptureStore, CaptureStoreError};

/// Headers meaningful only to a single transport hop, never forwarded.
pub const HOP_BY_HOP_HEADERS: &[&str] = &["host", "content-length", "connection", "accept-encoding"];

/// Caller inputs for a replay.
#[derive(Debug, Clone)]
pub struct ReplayOptions {
    pub target_url: String,
    /// Method override; defaults to the captured method.
    pub method: Option<String>,
    /// Headers overlaid on the captured set, overwriting by
    /// case-insensitive name.
    pub headers: Vec<HeaderPair>,
}

impl ReplayOptions {
    pub fn new(target_url: impl Into<String>) -> Self {
        Self {
            target_url: target_url.into(),
            method: None,
            headers: Vec::new(),
        }
    }
}

/// Result of one dispatched request.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub status: u16,
    pub status_text: String,
    /// Response headers in wire order.
    pub headers: Vec<HeaderPair>,
    pub body_text: String,
    pub duration: Duration,
}

/// Errors from replaying a capture.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("capture not found: {query}")]
    CaptureNotFound { query: String },

    #[error("capture store failed: {0}")]
    Store(CaptureStoreError),

    #[error("invalid replay request: {message}")]
    InvalidRequest { message: String },

    /// The request was sent but transport failed; carries elapsed time.
    #[error("dispatch failed after {duration_ms}ms: {message}")]
    ExecutionFailed { message: String, duration_ms: u64 },
}

/// Merge captured headers with caller overrides.
///
/// Hop-by-hop headers are dropped; override names replace captured values
/// case-insensitively while preserving the captured position of replaced
/// names.
pub(crate) fn merge_headers(captured: &[HeaderPair], overrides: &[HeaderPair]) -> Vec<HeaderPair> {
    let mut merged: Vec<HeaderPair> = captured
        .iter()
        .filter(|pair| {
            !HOP_BY_HOP_HEADERS
                .iter()
                .any(|hop| pair.key.eq_ignore_ascii_case(hop))
        })
        .cloned()
        .collect();

    for override_pair in overrides {
        match merged
            .iter_mut()
            .find(|pair| pair.key.eq_ignore_ascii_case(&override_pair.key))
        {
            Some(existing) => existing.value = override_pair.value.clone(),
            None => merged.push(override_pair.clone()),
        }
    }
    merged
}

/// Dispatches stored captures to target URLs.
#[derive(Debug, Clone)]
pub struct ReplayDispatcher {
    store: Arc<CaptureStore>,
    client: reqwest::Client,
}

impl ReplayDispatcher {
    pub fn new(store: Arc<CaptureStore>) -> Self {
        Self {
            store,
            client: reqwest::Client::new(),
        }
    }

    /// Use a preconfigured client (timeouts, proxies).
    pub fn with_client(store: Arc<CaptureStore>, client: reqwest::Client) -> Self {
        Self { store, client }
    }

    /// Replay a capture against a target URL.
    #[instrument(skip(self, options), fields(capture = %capture_id, target = %options.target_url))]
    pub async fn replay(
        &self,
        capture_id: &str,
        options: ReplayOptions,
    ) -> Result<DispatchOutcome, DispatchError> {
        let entry = match self.store.get(capture_id).await {
            Ok(entry) => entry,
            Err(CaptureStoreError::NotFound { query }) => {
                return Err(DispatchError::CaptureNotFound { query });
            }
            Err(e) => return Err(DispatchError::Store(e)),
        };
        let capture = &entry.capture;

        let method_name = options.method.as_deref().unwrap_or(&capture.method);
        let method = reqwest::Method::from_bytes(method_name.as_bytes()).map_err(|_| {
            DispatchError::InvalidRequest {
                message: format!("invalid method '{}'", method_name),
            }
        })?;

        let headers = merge_headers(&capture.headers, &options.headers);

        // Raw bytes verbatim when we have them; reconstructed JSON only
        // for legacy records without a raw body.
        let body: Vec<u8> = if capture.raw_body.is_empty() {
            serde_json::to_vec(&capture.body).map_err(|e| DispatchError::InvalidRequest {
                message: format!("capture body not serializable: {}", e),
            })?
        } else {
            capture.raw_body.clone().into_bytes()
        };

        let mut request = self.client.request(method, &options.target_url);
        for pair in &headers {
            request = request.header(pair.key.as_str(), pair.value.as_str());
        }
        request = request.body(body);

        let started = Instant::now();
        let response = request
            .send()
            .await
            .map_err(|e| DispatchError::ExecutionFailed {
                message: e.to_string(),
                duration_ms: started.elapsed().as_millis() as u64,
            })?;

        let status = response.status();
        let response_headers: Vec<HeaderPair> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                HeaderPair::new(name.as_str(), String::from_utf8_lossy(value.as_bytes()))
            })
            .collect();
        let body_text = response
            .text()
            .await
            .map_err(|e| DispatchError::ExecutionFailed {
                message: e.to_string(),
                duration_ms: started.elapsed().as_millis() as u64,
            })?;
        let duration = started.elapsed();

        info!(
            status = status.as_u16(),
            duration_ms = duration.as_millis() as u64,
            "replay dispatched"
        );

        Ok(DispatchOutcome {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            headers: response_headers,
            body_text,
            duration,
        })
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
