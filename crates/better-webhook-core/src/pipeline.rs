//! The per-request receiver pipeline.
//!
//! [`WebhookReceiver::process`] runs a fixed sequence of stages for every
//! incoming webhook: size guard, JSON parse, event-type extraction, secret
//! resolution, signature verification, replay reservation, schema
//! validation, ordered handler execution, replay commit/release, and
//! observation emission.
//!
//! Guarantees, for every invocation:
//!
//! - exactly one `completed` observation is emitted, last
//! - a 401/413/400 outcome runs zero handlers
//! - a reserved replay key is committed exactly once (200/204) or released
//!   exactly once (any other terminal status), never both, never neither
//! - hook and observer failures never change the result

use bytes::Bytes;
use chrono::Utc;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument, warn};

use crate::builder::{ErrorContext, HandlerContext, WebhookReceiver};
use crate::headers::Headers;
use crate::observe::{ObservationContext, ObservationEvent};
use crate::provider::VerificationMode;
use crate::replay_store::{DuplicatePolicy, ReplayContext, Reservation};
use crate::secrets::{resolve_secret, SecretSource};

// ============================================================================
// Input / output
// ============================================================================

/// Transport-agnostic request input.
///
/// Adapters must pass the body bytes exactly as delivered; signature
/// verification depends on them bit-for-bit.
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    /// Raw request headers; normalized internally.
    pub headers: HashMap<String, String>,
    /// Raw request body, unmodified.
    pub raw_body: Bytes,
    /// Per-request secret override.
    pub secret: Option<String>,
    /// Per-request body-size limit override.
    pub max_body_bytes: Option<usize>,
}

impl ProcessOptions {
    pub fn new(headers: HashMap<String, String>, raw_body: impl Into<Bytes>) -> Self {
        Self {
            headers,
            raw_body: raw_body.into(),
            secret: None,
            max_body_bytes: None,
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = Some(limit);
        self
    }
}

/// JSON response body for non-204 outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseBody {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseBody {
    fn ok() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(message.into()),
        }
    }
}

/// Terminal pipeline outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    pub status: u16,
    pub event_type: Option<String>,
    /// `None` exactly when the status is 204.
    pub body: Option<ResponseBody>,
}

impl ProcessResult {
    /// Whether this outcome counts as success (200 or 204).
    pub fn is_success(&self) -> bool {
        self.status == 200 || self.status == 204
    }
}

// Response error strings, part of the wire contract.
const ERR_PAYLOAD_TOO_LARGE: &str = "Payload too large";
const ERR_INVALID_JSON: &str = "Invalid JSON payload";
const ERR_MISSING_SECRET: &str = "Missing webhook secret";
const ERR_BAD_SIGNATURE: &str = "Signature verification failed";
const ERR_STALE_DELIVERY: &str = "Webhook delivery outside freshness tolerance";
const ERR_DUPLICATE_DELIVERY: &str = "Duplicate webhook delivery";
const ERR_SCHEMA_INVALID: &str = "Schema validation failed";
const ERR_HANDLER_FAILED: &str = "Handler execution failed";
const ERR_REPLAY_FAILED: &str = "Replay protection failed";

// ============================================================================
// Per-request state
// ============================================================================

/// Mutable narration state for one request.
struct RequestState {
    provider: String,
    event_type: Option<String>,
    delivery_id: Option<String>,
    raw_body_bytes: usize,
    received_at: chrono::DateTime<Utc>,
    started_at: Instant,
}

impl RequestState {
    fn context(&self) -> ObservationContext {
        ObservationContext {
            provider: self.provider.clone(),
            event_type: self.event_type.clone(),
            delivery_id: self.delivery_id.clone(),
            raw_body_bytes: self.raw_body_bytes,
            received_at: self.received_at,
            started_at: self.started_at,
        }
    }
}

/// What the stage runner hands back to the finalizer.
struct StageOutcome {
    result: ProcessResult,
    /// Replay key currently held and awaiting commit/release.
    held_key: Option<String>,
}

impl StageOutcome {
    fn done(status: u16, event_type: Option<String>, body: Option<ResponseBody>) -> Self {
        Self {
            result: ProcessResult {
                status,
                event_type,
                body,
            },
            held_key: None,
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

impl WebhookReceiver {
    /// Process one incoming webhook request.
    #[instrument(skip(self, options), fields(provider = %self.provider.name()))]
    pub async fn process(&self, options: ProcessOptions) -> ProcessResult {
        let mut state = RequestState {
            provider: self.provider.name().to_string(),
            event_type: None,
            delivery_id: None,
            raw_body_bytes: options.raw_body.len(),
            received_at: Utc::now(),
            started_at: Instant::now(),
        };

        self.observers.emit(&ObservationEvent::RequestReceived {
            context: state.context(),
        });

        let outcome = self.run_stages(&options, &mut state).await;
        let mut result = outcome.result;

        // Finalize replay: commit on success, release otherwise. A store
        // failure here degrades the whole request to 500.
        if let Some(key) = outcome.held_key {
            if let Err(failure) = self.finalize_replay(&key, result.is_success(), &state).await {
                warn!(error = %failure, key = %key, "replay finalize failed");
                self.invoke_error_hook(
                    &anyhow::anyhow!(failure),
                    &ErrorContext {
                        event_type: state.event_type.clone(),
                        delivery_id: state.delivery_id.clone(),
                        payload: None,
                    },
                );
                result = ProcessResult {
                    status: 500,
                    event_type: result.event_type,
                    body: Some(ResponseBody::error(ERR_REPLAY_FAILED)),
                };
            }
        }

        self.observers.emit(&ObservationEvent::Completed {
            context: state.context(),
            status: result.status,
            success: result.is_success(),
            duration: state.started_at.elapsed(),
        });

        debug!(
            status = result.status,
            event_type = result.event_type.as_deref().unwrap_or("-"),
            duration_ms = state.started_at.elapsed().as_millis() as u64,
            "webhook processed"
        );

        result
    }

    async fn run_stages(&self, options: &ProcessOptions, state: &mut RequestState) -> StageOutcome {
        let headers = Headers::from_map(&options.headers);
        let raw_body = &options.raw_body;

        // Size guard, before any other work.
        let limit = options.max_body_bytes.or(self.max_body_bytes);
        if let Some(limit) = limit {
            if raw_body.len() > limit {
                self.observers.emit(&ObservationEvent::BodyTooLarge {
                    context: state.context(),
                    limit,
                    actual: raw_body.len(),
                });
                return StageOutcome::done(
                    413,
                    None,
                    Some(ResponseBody::error(ERR_PAYLOAD_TOO_LARGE)),
                );
            }
        }

        // JSON parse. The raw bytes are never rewritten; parsing produces a
        // separate value.
        let parsed: Value = match serde_json::from_slice(raw_body) {
            Ok(value) => value,
            Err(e) => {
                self.observers.emit(&ObservationEvent::JsonParseFailed {
                    context: state.context(),
                    error: e.to_string(),
                });
                return StageOutcome::done(400, None, Some(ResponseBody::error(ERR_INVALID_JSON)));
            }
        };

        // Extraction.
        state.event_type = self.provider.event_type(&headers, Some(&parsed));
        state.delivery_id = self.provider.delivery_id(&headers);

        // Verification.
        if self.provider.verification_mode() == VerificationMode::Required {
            let resolved = resolve_secret(
                self.provider.name(),
                options.secret.as_deref(),
                self.provider.secret(),
            );
            let Some((secret, source)) = resolved else {
                return self.reject_verification(state, &headers, ERR_MISSING_SECRET);
            };
            if source == SecretSource::GlobalEnv {
                warn!(
                    provider = %state.provider,
                    "using global WEBHOOK_SECRET fallback; prefer a per-provider secret"
                );
                self.observers.emit(&ObservationEvent::SecretFallbackUsed {
                    context: state.context(),
                });
            }

            if !self
                .provider
                .verify(raw_body, &headers, secret.expose_secret())
                .await
            {
                return self.reject_verification(state, &headers, ERR_BAD_SIGNATURE);
            }
            self.observers.emit(&ObservationEvent::VerificationSucceeded {
                context: state.context(),
            });
        }

        // Replay protection.
        let mut held_key = None;
        if let Some(protection) = &self.replay {
            let hints = self
                .provider
                .replay_context(&headers, Some(&parsed))
                .unwrap_or_default();
            let replay_context = ReplayContext {
                provider: state.provider.clone(),
                event_type: state.event_type.clone(),
                delivery_id: state.delivery_id.clone(),
                replay_key: hints.replay_key,
                timestamp: hints.timestamp,
            };

            if let (Some(tolerance), Some(timestamp)) =
                (protection.policy.tolerance(), replay_context.timestamp)
            {
                let skew = (Utc::now().timestamp() - timestamp).abs();
                if skew as u64 > tolerance.as_secs() {
                    self.observers
                        .emit(&ObservationEvent::ReplayFreshnessRejected {
                            context: state.context(),
                            skew_secs: skew,
                        });
                    return StageOutcome::done(
                        409,
                        state.event_type.clone(),
                        Some(ResponseBody::error(ERR_STALE_DELIVERY)),
                    );
                }
            }

            match protection.policy.key(&replay_context) {
                None => {
                    self.observers.emit(&ObservationEvent::ReplaySkipped {
                        context: state.context(),
                    });
                }
                Some(key) => {
                    let reservation = protection
                        .store
                        .reserve(&key, protection.policy.in_flight_ttl())
                        .await;
                    match reservation {
                        Err(e) => {
                            warn!(error = %e, key = %key, "replay reservation failed");
                            self.invoke_error_hook(
                                &anyhow::anyhow!(e),
                                &ErrorContext {
                                    event_type: state.event_type.clone(),
                                    delivery_id: state.delivery_id.clone(),
                                    payload: None,
                                },
                            );
                            return StageOutcome::done(
                                500,
                                state.event_type.clone(),
                                Some(ResponseBody::error(ERR_REPLAY_FAILED)),
                            );
                        }
                        Ok(Reservation::Duplicate) => {
                            self.observers.emit(&ObservationEvent::ReplayDuplicate {
                                context: state.context(),
                                key: key.clone(),
                            });
                            return match protection.policy.on_duplicate() {
                                DuplicatePolicy::Ignore => StageOutcome::done(
                                    200,
                                    state.event_type.clone(),
                                    Some(ResponseBody::ok()),
                                ),
                                DuplicatePolicy::Conflict => StageOutcome::done(
                                    409,
                                    state.event_type.clone(),
                                    Some(ResponseBody::error(ERR_DUPLICATE_DELIVERY)),
                                ),
                            };
                        }
                        Ok(Reservation::Reserved) => {
                            self.observers.emit(&ObservationEvent::ReplayReserved {
                                context: state.context(),
                                key: key.clone(),
                            });
                            held_key = Some(key);
                        }
                    }
                }
            }
        }

        // Dispatch.
        let entry = state
            .event_type
            .as_deref()
            .and_then(|name| self.entries.get(name));
        let Some(entry) = entry else {
            self.observers.emit(&ObservationEvent::EventUnhandled {
                context: state.context(),
            });
            return StageOutcome {
                result: ProcessResult {
                    status: 204,
                    event_type: state.event_type.clone(),
                    body: None,
                },
                held_key,
            };
        };

        // Envelope unwrap, then schema validation.
        let payload = self.provider.payload(&parsed).unwrap_or(parsed);
        let validated = match entry.schema.validate(&payload) {
            Ok(value) => value,
            Err(violation) => {
                self.observers
                    .emit(&ObservationEvent::SchemaValidationFailed {
                        context: state.context(),
                        error: violation.to_string(),
                    });
                self.invoke_error_hook(
                    &anyhow::anyhow!(violation),
                    &ErrorContext {
                        event_type: state.event_type.clone(),
                        delivery_id: state.delivery_id.clone(),
                        payload: Some(payload),
                    },
                );
                return StageOutcome {
                    result: ProcessResult {
                        status: 400,
                        event_type: state.event_type.clone(),
                        body: Some(ResponseBody::error(ERR_SCHEMA_INVALID)),
                    },
                    held_key,
                };
            }
        };
        self.observers
            .emit(&ObservationEvent::SchemaValidationSucceeded {
                context: state.context(),
            });

        // Ordered handler execution. The same context instance is shared by
        // every handler of this delivery.
        let handler_context = Arc::new(HandlerContext {
            event_type: state.event_type.clone().unwrap_or_default(),
            provider: state.provider.clone(),
            delivery_id: state.delivery_id.clone(),
            headers: headers.clone(),
            raw_body: String::from_utf8_lossy(raw_body).into_owned(),
            received_at: state.received_at,
        });

        let total = entry.handlers.len();
        for (index, handler) in entry.handlers.iter().enumerate() {
            self.observers.emit(&ObservationEvent::HandlerStarted {
                context: state.context(),
                index,
                total,
            });

            let future = handler(validated.clone(), Arc::clone(&handler_context));
            // A panicking handler must not skip replay finalize; contain it
            // and treat it as a failure.
            let outcome = AssertUnwindSafe(future).catch_unwind().await;
            let error: Option<anyhow::Error> = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(panic) => Some(anyhow::anyhow!("handler panicked: {}", panic_message(&panic))),
            };

            match error {
                None => {
                    self.observers.emit(&ObservationEvent::HandlerSucceeded {
                        context: state.context(),
                        index,
                        total,
                    });
                }
                Some(error) => {
                    self.observers.emit(&ObservationEvent::HandlerFailed {
                        context: state.context(),
                        index,
                        total,
                        error: error.to_string(),
                    });
                    self.invoke_error_hook(
                        &error,
                        &ErrorContext {
                            event_type: state.event_type.clone(),
                            delivery_id: state.delivery_id.clone(),
                            payload: Some(validated.clone()),
                        },
                    );
                    return StageOutcome {
                        result: ProcessResult {
                            status: 500,
                            event_type: state.event_type.clone(),
                            body: Some(ResponseBody::error(ERR_HANDLER_FAILED)),
                        },
                        held_key,
                    };
                }
            }
        }

        StageOutcome {
            result: ProcessResult {
                status: 200,
                event_type: state.event_type.clone(),
                body: Some(ResponseBody::ok()),
            },
            held_key,
        }
    }

    fn reject_verification(
        &self,
        state: &RequestState,
        headers: &Headers,
        reason: &'static str,
    ) -> StageOutcome {
        self.observers.emit(&ObservationEvent::VerificationFailed {
            context: state.context(),
            reason: reason.to_string(),
        });
        self.invoke_verification_hook(reason, headers);
        StageOutcome::done(
            401,
            state.event_type.clone(),
            Some(ResponseBody::error(reason)),
        )
    }

    async fn finalize_replay(
        &self,
        key: &str,
        success: bool,
        state: &RequestState,
    ) -> Result<(), crate::replay_store::ReplayStoreError> {
        let Some(protection) = &self.replay else {
            return Ok(());
        };
        if success {
            protection.store.commit(key, protection.policy.ttl()).await?;
            self.observers.emit(&ObservationEvent::ReplayCommitted {
                context: state.context(),
                key: key.to_string(),
            });
        } else {
            protection.store.release(key).await?;
            self.observers.emit(&ObservationEvent::ReplayReleased {
                context: state.context(),
                key: key.to_string(),
            });
        }
        Ok(())
    }

    /// Invoke the user error hook, swallowing any panic.
    fn invoke_error_hook(&self, error: &anyhow::Error, context: &ErrorContext) {
        if let Some(hook) = &self.on_error {
            let outcome =
                std::panic::catch_unwind(AssertUnwindSafe(|| hook(error, context)));
            if outcome.is_err() {
                warn!("on_error hook panicked; discarding");
            }
        }
    }

    /// Invoke the user verification-failure hook, swallowing any panic.
    fn invoke_verification_hook(&self, reason: &str, headers: &Headers) {
        if let Some(hook) = &self.on_verification_failed {
            let outcome =
                std::panic::catch_unwind(AssertUnwindSafe(|| hook(reason, headers)));
            if outcome.is_err() {
                warn!("on_verification_failed hook panicked; discarding");
            }
        }
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
