//! Observation bus.
//!
//! The pipeline narrates every request as a sequence of
//! [`ObservationEvent`]s fanned out to registered [`Observer`]s. Exactly
//! one [`ObservationEvent::Completed`] is emitted per request, last.
//!
//! Observers are for metrics, logging, and tracing; they can never affect
//! the request outcome. Every observer invocation is isolated: a panic is
//! caught, logged, and discarded.

use chrono::{DateTime, Utc};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

// ============================================================================
// Events
// ============================================================================

/// Fields common to every observation.
#[derive(Debug, Clone)]
pub struct ObservationContext {
    pub provider: String,
    pub event_type: Option<String>,
    pub delivery_id: Option<String>,
    pub raw_body_bytes: usize,
    pub received_at: DateTime<Utc>,
    pub started_at: Instant,
}

/// A lifecycle event emitted by the receiver pipeline.
#[derive(Debug, Clone)]
pub enum ObservationEvent {
    RequestReceived {
        context: ObservationContext,
    },
    BodyTooLarge {
        context: ObservationContext,
        limit: usize,
        actual: usize,
    },
    JsonParseFailed {
        context: ObservationContext,
        error: String,
    },
    EventUnhandled {
        context: ObservationContext,
    },
    VerificationSucceeded {
        context: ObservationContext,
    },
    VerificationFailed {
        context: ObservationContext,
        reason: String,
    },
    /// The global `WEBHOOK_SECRET` fallback supplied the secret.
    SecretFallbackUsed {
        context: ObservationContext,
    },
    SchemaValidationSucceeded {
        context: ObservationContext,
    },
    SchemaValidationFailed {
        context: ObservationContext,
        error: String,
    },
    HandlerStarted {
        context: ObservationContext,
        index: usize,
        total: usize,
    },
    HandlerSucceeded {
        context: ObservationContext,
        index: usize,
        total: usize,
    },
    HandlerFailed {
        context: ObservationContext,
        index: usize,
        total: usize,
        error: String,
    },
    ReplaySkipped {
        context: ObservationContext,
    },
    ReplayFreshnessRejected {
        context: ObservationContext,
        skew_secs: i64,
    },
    ReplayReserved {
        context: ObservationContext,
        key: String,
    },
    ReplayDuplicate {
        context: ObservationContext,
        key: String,
    },
    ReplayCommitted {
        context: ObservationContext,
        key: String,
    },
    ReplayReleased {
        context: ObservationContext,
        key: String,
    },
    Completed {
        context: ObservationContext,
        status: u16,
        success: bool,
        duration: Duration,
    },
}

impl ObservationEvent {
    /// Common fields of this event.
    pub fn context(&self) -> &ObservationContext {
        match self {
            Self::RequestReceived { context }
            | Self::BodyTooLarge { context, .. }
            | Self::JsonParseFailed { context, .. }
            | Self::EventUnhandled { context }
            | Self::VerificationSucceeded { context }
            | Self::VerificationFailed { context, .. }
            | Self::SecretFallbackUsed { context }
            | Self::SchemaValidationSucceeded { context }
            | Self::SchemaValidationFailed { context, .. }
            | Self::HandlerStarted { context, .. }
            | Self::HandlerSucceeded { context, .. }
            | Self::HandlerFailed { context, .. }
            | Self::ReplaySkipped { context }
            | Self::ReplayFreshnessRejected { context, .. }
            | Self::ReplayReserved { context, .. }
            | Self::ReplayDuplicate { context, .. }
            | Self::ReplayCommitted { context, .. }
            | Self::ReplayReleased { context, .. }
            | Self::Completed { context, .. } => context,
        }
    }

    /// Stable kind name, for logging and assertions.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RequestReceived { .. } => "request_received",
            Self::BodyTooLarge { .. } => "body_too_large",
            Self::JsonParseFailed { .. } => "json_parse_failed",
            Self::EventUnhandled { .. } => "event_unhandled",
            Self::VerificationSucceeded { .. } => "verification_succeeded",
            Self::VerificationFailed { .. } => "verification_failed",
            Self::SecretFallbackUsed { .. } => "secret_fallback_used",
            Self::SchemaValidationSucceeded { .. } => "schema_validation_succeeded",
            Self::SchemaValidationFailed { .. } => "schema_validation_failed",
            Self::HandlerStarted { .. } => "handler_started",
            Self::HandlerSucceeded { .. } => "handler_succeeded",
            Self::HandlerFailed { .. } => "handler_failed",
            Self::ReplaySkipped { .. } => "replay_skipped",
            Self::ReplayFreshnessRejected { .. } => "replay_freshness_rejected",
            Self::ReplayReserved { .. } => "replay_reserved",
            Self::ReplayDuplicate { .. } => "replay_duplicate",
            Self::ReplayCommitted { .. } => "replay_committed",
            Self::ReplayReleased { .. } => "replay_released",
            Self::Completed { .. } => "completed",
        }
    }
}

// ============================================================================
// Observer
// ============================================================================

/// A pipeline lifecycle observer.
///
/// Implement the methods for the kinds of interest; the rest default to
/// no-ops. Implementations must not assume they can affect the request:
/// panics are caught and discarded at the emission boundary.
#[allow(unused_variables)]
pub trait Observer: Send + Sync {
    fn on_request_received(&self, event: &ObservationEvent) {}
    fn on_body_too_large(&self, event: &ObservationEvent) {}
    fn on_json_parse_failed(&self, event: &ObservationEvent) {}
    fn on_event_unhandled(&self, event: &ObservationEvent) {}
    fn on_verification_succeeded(&self, event: &ObservationEvent) {}
    fn on_verification_failed(&self, event: &ObservationEvent) {}
    fn on_secret_fallback_used(&self, event: &ObservationEvent) {}
    fn on_schema_validation_succeeded(&self, event: &ObservationEvent) {}
    fn on_schema_validation_failed(&self, event: &ObservationEvent) {}
    fn on_handler_started(&self, event: &ObservationEvent) {}
    fn on_handler_succeeded(&self, event: &ObservationEvent) {}
    fn on_handler_failed(&self, event: &ObservationEvent) {}
    fn on_replay_skipped(&self, event: &ObservationEvent) {}
    fn on_replay_freshness_rejected(&self, event: &ObservationEvent) {}
    fn on_replay_reserved(&self, event: &ObservationEvent) {}
    fn on_replay_duplicate(&self, event: &ObservationEvent) {}
    fn on_replay_committed(&self, event: &ObservationEvent) {}
    fn on_replay_released(&self, event: &ObservationEvent) {}
    fn on_completed(&self, event: &ObservationEvent) {}
}

fn dispatch(observer: &dyn Observer, event: &ObservationEvent) {
    match event {
        ObservationEvent::RequestReceived { .. } => observer.on_request_received(event),
        ObservationEvent::BodyTooLarge { .. } => observer.on_body_too_large(event),
        ObservationEvent::JsonParseFailed { .. } => observer.on_json_parse_failed(event),
        ObservationEvent::EventUnhandled { .. } => observer.on_event_unhandled(event),
        ObservationEvent::VerificationSucceeded { .. } => observer.on_verification_succeeded(event),
        ObservationEvent::VerificationFailed { .. } => observer.on_verification_failed(event),
        ObservationEvent::SecretFallbackUsed { .. } => observer.on_secret_fallback_used(event),
        ObservationEvent::SchemaValidationSucceeded { .. } => {
            observer.on_schema_validation_succeeded(event)
        }
        ObservationEvent::SchemaValidationFailed { .. } => {
            observer.on_schema_validation_failed(event)
        }
        ObservationEvent::HandlerStarted { .. } => observer.on_handler_started(event),
        ObservationEvent::HandlerSucceeded { .. } => observer.on_handler_succeeded(event),
        ObservationEvent::HandlerFailed { .. } => observer.on_handler_failed(event),
        ObservationEvent::ReplaySkipped { .. } => observer.on_replay_skipped(event),
        ObservationEvent::ReplayFreshnessRejected { .. } => {
            observer.on_replay_freshness_rejected(event)
        }
        ObservationEvent::ReplayReserved { .. } => observer.on_replay_reserved(event),
        ObservationEvent::ReplayDuplicate { .. } => observer.on_replay_duplicate(event),
        ObservationEvent::ReplayCommitted { .. } => observer.on_replay_committed(event),
        ObservationEvent::ReplayReleased { .. } => observer.on_replay_released(event),
        ObservationEvent::Completed { .. } => observer.on_completed(event),
    }
}

// ============================================================================
// Fan-out
// ============================================================================

/// Ordered observer list with isolated, synchronous fan-out.
#[derive(Clone, Default)]
pub struct ObserverSet {
    observers: Vec<Arc<dyn Observer>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of this set with one observer appended.
    pub fn with(&self, observer: Arc<dyn Observer>) -> Self {
        let mut observers = self.observers.clone();
        observers.push(observer);
        Self { observers }
    }

    /// Copy of this set with several observers appended, in order.
    pub fn with_all(&self, new: impl IntoIterator<Item = Arc<dyn Observer>>) -> Self {
        let mut observers = self.observers.clone();
        observers.extend(new);
        Self { observers }
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Fan an event out to every observer, in registration order.
    ///
    /// Observer panics are caught and discarded; they never reach the
    /// pipeline.
    pub fn emit(&self, event: &ObservationEvent) {
        for observer in &self.observers {
            let outcome = catch_unwind(AssertUnwindSafe(|| dispatch(observer.as_ref(), event)));
            if outcome.is_err() {
                warn!(
                    kind = event.kind(),
                    provider = %event.context().provider,
                    "observer panicked; discarding"
                );
            }
        }
    }
}

impl std::fmt::Debug for ObserverSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverSet")
            .field("observers", &self.observers.len())
            .finish()
    }
}

// ============================================================================
// Built-in observers
// ============================================================================

/// Observer that narrates the pipeline through `tracing`.
///
/// Terminal failures log at `warn`, handler failures at `error`, the rest
/// at `debug`. Attach with `.observe(LogObserver)` during development to
/// see every stage of a request.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn on_request_received(&self, event: &ObservationEvent) {
        let context = event.context();
        tracing::debug!(
            provider = %context.provider,
            raw_body_bytes = context.raw_body_bytes,
            "webhook received"
        );
    }

    fn on_body_too_large(&self, event: &ObservationEvent) {
        if let ObservationEvent::BodyTooLarge { context, limit, actual } = event {
            tracing::warn!(
                provider = %context.provider,
                limit,
                actual,
                "webhook body too large"
            );
        }
    }

    fn on_json_parse_failed(&self, event: &ObservationEvent) {
        if let ObservationEvent::JsonParseFailed { context, error } = event {
            tracing::warn!(provider = %context.provider, error = %error, "webhook body is not JSON");
        }
    }

    fn on_verification_failed(&self, event: &ObservationEvent) {
        if let ObservationEvent::VerificationFailed { context, reason } = event {
            tracing::warn!(
                provider = %context.provider,
                delivery_id = context.delivery_id.as_deref().unwrap_or("-"),
                reason = %reason,
                "webhook verification failed"
            );
        }
    }

    fn on_handler_failed(&self, event: &ObservationEvent) {
        if let ObservationEvent::HandlerFailed { context, index, total, error } = event {
            tracing::error!(
                provider = %context.provider,
                event_type = context.event_type.as_deref().unwrap_or("-"),
                handler = %format!("{}/{}", index + 1, total),
                error = %error,
                "webhook handler failed"
            );
        }
    }

    fn on_replay_duplicate(&self, event: &ObservationEvent) {
        if let ObservationEvent::ReplayDuplicate { context, key } = event {
            tracing::warn!(provider = %context.provider, key = %key, "duplicate webhook delivery");
        }
    }

    fn on_completed(&self, event: &ObservationEvent) {
        if let ObservationEvent::Completed { context, status, success, duration } = event {
            tracing::debug!(
                provider = %context.provider,
                event_type = context.event_type.as_deref().unwrap_or("-"),
                status,
                success,
                duration_ms = duration.as_millis() as u64,
                "webhook processed"
            );
        }
    }
}

#[cfg(test)]
#[path = "observe_tests.rs"]
mod tests;
