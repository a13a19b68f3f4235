//! Provider detection heuristics.
//!
//! Maps the observable surface of a request (headers and body shape) to a
//! provider id. Detection is best-effort annotation for captured traffic:
//! the highest-confidence detector wins, ties break in registration order,
//! and a request matching nothing is simply left unannotated.

use better_webhook_core::Headers;
use serde_json::Value;
use std::sync::Arc;

/// What a detector sees.
#[derive(Debug, Clone, Copy)]
pub struct DetectionInput<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub headers: &'a Headers,
    pub body: Option<&'a Value>,
}

/// A positive identification with a confidence in `(0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub provider: String,
    pub confidence: f32,
}

impl Detection {
    fn new(provider: &str, confidence: f32) -> Self {
        Self {
            provider: provider.to_string(),
            confidence,
        }
    }
}

type DetectorFn = Arc<dyn Fn(&DetectionInput<'_>) -> Option<Detection> + Send + Sync>;

/// Registry of detector functions.
#[derive(Clone, Default)]
pub struct ProviderDetector {
    detectors: Vec<DetectorFn>,
}

impl ProviderDetector {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in heuristics.
    pub fn with_defaults() -> Self {
        let mut detector = Self::new();
        detector.register(detect_github);
        detector.register(detect_stripe);
        detector.register(detect_shopify);
        detector.register(detect_slack);
        detector.register(detect_svix_family);
        detector.register(detect_sendgrid);
        detector.register(detect_linear);
        detector.register(detect_twilio);
        detector.register(detect_discord);
        detector.register(detect_ragie);
        detector
    }

    /// Append a detector. Registration order breaks confidence ties.
    pub fn register(
        &mut self,
        detector: impl Fn(&DetectionInput<'_>) -> Option<Detection> + Send + Sync + 'static,
    ) {
        self.detectors.push(Arc::new(detector));
    }

    /// Run every detector and return the best non-null answer.
    pub fn detect(&self, input: &DetectionInput<'_>) -> Option<Detection> {
        let mut best: Option<Detection> = None;
        for detector in &self.detectors {
            let Some(candidate) = detector(input) else {
                continue;
            };
            let better = match &best {
                None => true,
                // Strictly greater: earlier registration wins ties.
                Some(current) => candidate.confidence > current.confidence,
            };
            if better {
                best = Some(candidate);
            }
        }
        best
    }
}

impl std::fmt::Debug for ProviderDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderDetector")
            .field("detectors", &self.detectors.len())
            .finish()
    }
}

// ============================================================================
// Built-in heuristics
// ============================================================================

fn detect_github(input: &DetectionInput<'_>) -> Option<Detection> {
    if input.headers.contains("x-github-event") || input.headers.contains("x-hub-signature-256") {
        return Some(Detection::new("github", 0.95));
    }
    None
}

fn detect_stripe(input: &DetectionInput<'_>) -> Option<Detection> {
    if input.headers.contains("stripe-signature") {
        return Some(Detection::new("stripe", 0.95));
    }
    None
}

fn detect_shopify(input: &DetectionInput<'_>) -> Option<Detection> {
    if input.headers.contains("x-shopify-topic") || input.headers.contains("x-shopify-hmac-sha256")
    {
        return Some(Detection::new("shopify", 0.95));
    }
    None
}

fn detect_slack(input: &DetectionInput<'_>) -> Option<Detection> {
    if input.headers.contains("x-slack-signature") {
        return Some(Detection::new("slack", 0.95));
    }
    None
}

/// Does a body's event name look like Recall's (`bot.*` / `transcript.*`)?
fn body_event_is_recall(body: Option<&Value>) -> bool {
    body.and_then(|b| b.get("event"))
        .and_then(Value::as_str)
        .is_some_and(|event| event.starts_with("bot.") || event.starts_with("transcript."))
}

/// Does a body look like a Clerk event envelope?
fn body_looks_like_clerk(body: Option<&Value>) -> bool {
    let Some(body) = body else {
        return false;
    };
    if body.get("object").and_then(Value::as_str) == Some("event") {
        return true;
    }
    body.get("type")
        .and_then(Value::as_str)
        .is_some_and(|t| {
            t.starts_with("user.") || t.starts_with("session.") || t.starts_with("organization.")
        })
}

/// Svix wire formats: branded `svix-*` headers or unbranded `webhook-*`
/// headers; the body discriminates Recall from Clerk.
fn detect_svix_family(input: &DetectionInput<'_>) -> Option<Detection> {
    let branded = input.headers.contains("svix-signature");
    let unbranded =
        input.headers.contains("webhook-signature") && input.headers.contains("webhook-id");
    if !branded && !unbranded {
        return None;
    }

    if body_event_is_recall(input.body) {
        return Some(Detection::new("recall", 0.9));
    }
    if body_looks_like_clerk(input.body) {
        return Some(Detection::new("clerk", 0.85));
    }
    // Svix wire format without a recognized body: keep the weaker guess.
    Some(Detection::new(if unbranded { "recall" } else { "svix" }, 0.5))
}

fn detect_sendgrid(input: &DetectionInput<'_>) -> Option<Detection> {
    if input
        .headers
        .contains("x-twilio-email-event-webhook-signature")
    {
        return Some(Detection::new("sendgrid", 0.9));
    }
    None
}

fn detect_linear(input: &DetectionInput<'_>) -> Option<Detection> {
    if input.headers.contains("linear-signature") {
        return Some(Detection::new("linear", 0.9));
    }
    None
}

fn detect_twilio(input: &DetectionInput<'_>) -> Option<Detection> {
    if input.headers.contains("x-twilio-signature") {
        return Some(Detection::new("twilio", 0.9));
    }
    None
}

fn detect_discord(input: &DetectionInput<'_>) -> Option<Detection> {
    if input.headers.contains("x-signature-ed25519") {
        return Some(Detection::new("discord", 0.95));
    }
    None
}

fn detect_ragie(input: &DetectionInput<'_>) -> Option<Detection> {
    if !input.headers.contains("x-signature") {
        return None;
    }
    let enveloped = input
        .body
        .is_some_and(|b| b.get("payload").is_some() && b.get("nonce").is_some());
    if enveloped {
        Some(Detection::new("ragie", 0.7))
    } else {
        None
    }
}

#[cfg(test)]
#[path = "detect_tests.rs"]
mod tests;
