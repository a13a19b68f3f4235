//! Immutable webhook receiver configuration.
//!
//! [`WebhookReceiver`] is a value type: every mutator returns a new
//! instance and leaves the original untouched, so a configured receiver
//! can be shared freely across tasks. Handler lists are `Arc`-shared and
//! copied on write.
//!
//! # Examples
//!
//! ```rust
//! use better_webhook_core::provider::catalog;
//! use better_webhook_core::WebhookReceiver;
//!
//! let receiver = WebhookReceiver::new(catalog::github()).event("push", |payload, ctx| async move {
//!     println!("push to {} ({})", payload["repository"]["full_name"], ctx.provider);
//!     Ok(())
//! });
//! ```

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::headers::Headers;
use crate::observe::{Observer, ObserverSet};
use crate::provider::Provider;
use crate::replay_store::ReplayProtection;
use crate::schema::{AnySchema, Schema};

// ============================================================================
// Handlers
// ============================================================================

/// Boxed future returned by a handler.
pub type HandlerFuture = BoxFuture<'static, anyhow::Result<()>>;

/// A registered handler callable.
pub type Handler = Arc<dyn Fn(Value, Arc<HandlerContext>) -> HandlerFuture + Send + Sync>;

/// Request context shared by every handler of a single delivery.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub event_type: String,
    pub provider: String,
    pub delivery_id: Option<String>,
    pub headers: Headers,
    /// Raw body as delivered, UTF-8 decoded (lossy for non-UTF-8 input).
    pub raw_body: String,
    pub received_at: DateTime<Utc>,
}

/// Per-event-name registration record.
#[derive(Clone)]
pub(crate) struct HandlerEntry {
    pub(crate) schema: Arc<dyn Schema>,
    pub(crate) handlers: Vec<Handler>,
}

/// Declarative event registration: a name paired with its payload schema.
#[derive(Clone)]
pub struct WebhookEvent {
    pub name: String,
    pub schema: Arc<dyn Schema>,
}

impl WebhookEvent {
    /// Event accepting any payload.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: Arc::new(AnySchema),
        }
    }

    /// Event with an explicit payload schema.
    pub fn with_schema(name: impl Into<String>, schema: impl Schema + 'static) -> Self {
        Self {
            name: name.into(),
            schema: Arc::new(schema),
        }
    }
}

// ============================================================================
// Hooks
// ============================================================================

/// Context passed to the user error hook.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub event_type: Option<String>,
    pub delivery_id: Option<String>,
    pub payload: Option<Value>,
}

/// Best-effort error hook, invoked on handler failures and schema
/// violations. Panics are swallowed; the hook cannot change the outcome.
pub type ErrorHook = Arc<dyn Fn(&anyhow::Error, &ErrorContext) + Send + Sync>;

/// Best-effort verification-failure hook, invoked on 401 outcomes with the
/// failure reason and the normalized request headers.
pub type VerificationHook = Arc<dyn Fn(&str, &Headers) + Send + Sync>;

// ============================================================================
// WebhookReceiver
// ============================================================================

/// An immutable, shareable webhook receiver.
///
/// Construction starts from a [`Provider`]; mutators layer on event
/// handlers, hooks, observers, a body-size limit, and replay protection.
/// Call [`WebhookReceiver::process`] (see the pipeline module) once per
/// incoming request.
#[derive(Clone)]
pub struct WebhookReceiver {
    pub(crate) provider: Arc<dyn Provider>,
    pub(crate) entries: HashMap<String, HandlerEntry>,
    pub(crate) observers: ObserverSet,
    pub(crate) on_error: Option<ErrorHook>,
    pub(crate) on_verification_failed: Option<VerificationHook>,
    pub(crate) max_body_bytes: Option<usize>,
    pub(crate) replay: Option<ReplayProtection>,
}

impl WebhookReceiver {
    /// Receiver for a provider, with no handlers registered yet.
    pub fn new(provider: impl Provider + 'static) -> Self {
        Self::with_provider(Arc::new(provider))
    }

    /// Receiver over an already-shared provider.
    pub fn with_provider(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            entries: HashMap::new(),
            observers: ObserverSet::new(),
            on_error: None,
            on_verification_failed: None,
            max_body_bytes: None,
            replay: None,
        }
    }

    /// The provider this receiver is bound to.
    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    /// Register a handler for an event, accepting any payload.
    ///
    /// Repeated registrations for the same name append handlers; they run
    /// in registration order.
    pub fn event<F, Fut>(&self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value, Arc<HandlerContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(name.into(), None, box_handler(handler))
    }

    /// Register a handler with a payload schema.
    ///
    /// The schema applies to every handler registered under this name; a
    /// later registration with a schema replaces the earlier one.
    pub fn event_with_schema<F, Fut>(
        &self,
        name: impl Into<String>,
        schema: impl Schema + 'static,
        handler: F,
    ) -> Self
    where
        F: Fn(Value, Arc<HandlerContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(name.into(), Some(Arc::new(schema)), box_handler(handler))
    }

    /// Register a handler for a declarative [`WebhookEvent`].
    pub fn on<F, Fut>(&self, event: &WebhookEvent, handler: F) -> Self
    where
        F: Fn(Value, Arc<HandlerContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(
            event.name.clone(),
            Some(event.schema.clone()),
            box_handler(handler),
        )
    }

    fn register(&self, name: String, schema: Option<Arc<dyn Schema>>, handler: Handler) -> Self {
        let mut next = self.clone();
        match next.entries.get_mut(&name) {
            Some(entry) => {
                entry.handlers.push(handler);
                if let Some(schema) = schema {
                    entry.schema = schema;
                }
            }
            None => {
                next.entries.insert(
                    name,
                    HandlerEntry {
                        schema: schema.unwrap_or_else(|| Arc::new(AnySchema)),
                        handlers: vec![handler],
                    },
                );
            }
        }
        next
    }

    /// Install the best-effort error hook.
    pub fn on_error(&self, hook: impl Fn(&anyhow::Error, &ErrorContext) + Send + Sync + 'static) -> Self {
        let mut next = self.clone();
        next.on_error = Some(Arc::new(hook));
        next
    }

    /// Install the best-effort verification-failure hook.
    pub fn on_verification_failed(
        &self,
        hook: impl Fn(&str, &Headers) + Send + Sync + 'static,
    ) -> Self {
        let mut next = self.clone();
        next.on_verification_failed = Some(Arc::new(hook));
        next
    }

    /// Append one observer.
    pub fn observe(&self, observer: impl Observer + 'static) -> Self {
        let mut next = self.clone();
        next.observers = next.observers.with(Arc::new(observer));
        next
    }

    /// Append several observers, in order.
    pub fn observe_all(&self, observers: impl IntoIterator<Item = Arc<dyn Observer>>) -> Self {
        let mut next = self.clone();
        next.observers = next.observers.with_all(observers);
        next
    }

    /// Reject bodies larger than `limit` bytes with 413.
    pub fn max_body_bytes(&self, limit: usize) -> Self {
        let mut next = self.clone();
        next.max_body_bytes = Some(limit);
        next
    }

    /// Attach replay protection.
    pub fn with_replay_protection(&self, protection: ReplayProtection) -> Self {
        let mut next = self.clone();
        next.replay = Some(protection);
        next
    }

    /// Registered handler count for an event name. Diagnostics hook.
    pub fn handler_count(&self, name: &str) -> usize {
        self.entries.get(name).map_or(0, |e| e.handlers.len())
    }
}

impl std::fmt::Debug for WebhookReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookReceiver")
            .field("provider", &self.provider.name())
            .field("events", &self.entries.keys().collect::<Vec<_>>())
            .field("observers", &self.observers.len())
            .field("max_body_bytes", &self.max_body_bytes)
            .field("replay_protection", &self.replay.is_some())
            .finish()
    }
}

fn box_handler<F, Fut>(handler: F) -> Handler
where
    F: Fn(Value, Arc<HandlerContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |payload, context| Box::pin(handler(payload, context)))
}

#[cfg(test)]
#[path = "builder_tests.rs"]
mod tests;
