//! Outbound webhook executor.
//!
//! Issues a synthetic webhook against a developer endpoint: provider
//! baseline headers, caller overrides, JSON body encoding, and — when a
//! secret and provider are supplied — a real signature computed with the
//! provider's scheme, so the receiving pipeline verifies it exactly as it
//! would production traffic.

use chrono::Utc;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{info, instrument};
use uuid::Uuid;

use better_webhook_core::provider::catalog;
use better_webhook_core::signature::{SignatureScheme, SigningMaterial};

use crate::dispatch::{merge_headers, DispatchError, DispatchOutcome};
use crate::record::HeaderPair;

/// Inputs for one outbound send.
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub url: String,
    /// Defaults to POST.
    pub method: Option<String>,
    /// Overlaid on the provider baseline, overwriting case-insensitively.
    pub headers: Vec<HeaderPair>,
    /// String bodies go out verbatim; other values are JSON-encoded.
    pub body: Option<Value>,
    /// Signing secret; with `provider` and a body, signature headers are
    /// synthesized.
    pub secret: Option<String>,
    /// Built-in provider name whose conventions to imitate.
    pub provider: Option<String>,
}

impl SendRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: None,
            headers: Vec::new(),
            body: None,
            secret: None,
            provider: None,
        }
    }
}

/// Find a header value by case-insensitive name.
fn find_header<'a>(headers: &'a [HeaderPair], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|pair| pair.key.eq_ignore_ascii_case(name))
        .map(|pair| pair.value.as_str())
}

/// Baseline headers a provider's real deliveries would carry.
///
/// These give synthetic sends the provider's recognizable surface (event
/// and delivery headers, timestamps); callers override anything via
/// [`SendRequest::headers`].
fn provider_baseline(provider: &str) -> Vec<HeaderPair> {
    let now = Utc::now().timestamp().to_string();
    match provider {
        "github" => vec![
            HeaderPair::new("x-github-event", "push"),
            HeaderPair::new("x-github-delivery", Uuid::new_v4().to_string()),
        ],
        "shopify" => vec![
            HeaderPair::new("x-shopify-topic", "orders/create"),
            HeaderPair::new("x-shopify-webhook-id", Uuid::new_v4().to_string()),
        ],
        "slack" => vec![HeaderPair::new("x-slack-request-timestamp", now)],
        "svix" | "clerk" => vec![
            HeaderPair::new("svix-id", format!("msg_{}", Uuid::new_v4().simple())),
            HeaderPair::new("svix-timestamp", now),
        ],
        "recall" => vec![
            HeaderPair::new("webhook-id", format!("msg_{}", Uuid::new_v4().simple())),
            HeaderPair::new("webhook-timestamp", now),
        ],
        "sendgrid" => vec![HeaderPair::new(
            "x-twilio-email-event-webhook-timestamp",
            now,
        )],
        "linear" => vec![HeaderPair::new(
            "linear-delivery",
            Uuid::new_v4().to_string(),
        )],
        "twilio" => vec![HeaderPair::new(
            "i-twilio-idempotency-token",
            Uuid::new_v4().to_string(),
        )],
        _ => Vec::new(),
    }
}

/// Signing material for a scheme, harvested from the outgoing header set
/// or freshly generated.
fn signing_material(scheme: &SignatureScheme, headers: &[HeaderPair], url: &str) -> SigningMaterial {
    let timestamp = scheme
        .timestamp_header
        .as_deref()
        .and_then(|name| find_header(headers, name))
        .map(str::to_string)
        .or_else(|| Some(Utc::now().timestamp().to_string()));
    let id = scheme
        .id_header
        .as_deref()
        .and_then(|name| find_header(headers, name))
        .map(str::to_string)
        .or_else(|| Some(format!("msg_{}", Uuid::new_v4().simple())));
    SigningMaterial {
        timestamp,
        id,
        url: Some(url.to_string()),
    }
}

/// Outbound webhook executor with a configurable timeout.
#[derive(Debug, Clone)]
pub struct Executor {
    client: reqwest::Client,
    timeout: Duration,
}

impl Executor {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    /// Send a webhook, optionally signed.
    #[instrument(skip(self, request), fields(url = %request.url, provider = request.provider.as_deref().unwrap_or("-")))]
    pub async fn send(&self, request: SendRequest) -> Result<DispatchOutcome, DispatchError> {
        let method_name = request.method.as_deref().unwrap_or("POST");
        let method = reqwest::Method::from_bytes(method_name.as_bytes()).map_err(|_| {
            DispatchError::InvalidRequest {
                message: format!("invalid method '{}'", method_name),
            }
        })?;

        // Provider baseline first, caller overrides on top.
        let baseline = request
            .provider
            .as_deref()
            .map(provider_baseline)
            .unwrap_or_default();
        let mut headers = merge_headers(&baseline, &request.headers);

        let body: Vec<u8> = match &request.body {
            None => Vec::new(),
            Some(Value::String(raw)) => raw.clone().into_bytes(),
            Some(value) => {
                serde_json::to_vec(value).map_err(|e| DispatchError::InvalidRequest {
                    message: format!("body not serializable: {}", e),
                })?
            }
        };

        if find_header(&headers, "content-type").is_none() {
            headers.push(HeaderPair::new("content-type", "application/json"));
        }

        // Synthesize the provider signature when we have everything the
        // scheme needs.
        if let (Some(secret), Some(provider)) = (&request.secret, &request.provider) {
            if !body.is_empty() {
                let scheme = catalog::by_name(provider)
                    .and_then(|p| p.spec().signature.clone());
                if let Some(scheme) = scheme {
                    let material = signing_material(&scheme, &headers, &request.url);
                    if let Some(signed) = scheme.sign(&body, &material, secret) {
                        let signed_pairs: Vec<HeaderPair> = signed
                            .into_iter()
                            .map(|(key, value)| HeaderPair::new(key, value))
                            .collect();
                        headers = merge_headers(&headers, &signed_pairs);
                    }
                }
            }
        }

        let mut outbound = self
            .client
            .request(method, &request.url)
            .timeout(self.timeout);
        for pair in &headers {
            outbound = outbound.header(pair.key.as_str(), pair.value.as_str());
        }
        outbound = outbound.body(body);

        let started = Instant::now();
        let response = outbound
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
            "webhook sent"
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

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
