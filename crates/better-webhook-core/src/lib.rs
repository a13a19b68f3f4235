//! # better-webhook Core
//!
//! Runtime library for building verified, schema-validated, replay-safe
//! webhook receivers.
//!
//! The central type is [`WebhookReceiver`]: an immutable value configured
//! with a [`Provider`](provider::Provider), event handlers, optional
//! replay protection, and observers. Calling
//! [`WebhookReceiver::process`] runs the per-request pipeline: size guard,
//! JSON parse, signature verification, replay reservation, schema
//! validation, and ordered handler execution, narrated through the
//! observation bus.
//!
//! ## Architecture
//!
//! - Transport adapters translate framework requests into
//!   [`ProcessOptions`] and results back into responses; the pipeline has
//!   no transport coupling
//! - Provider wire conventions live behind the
//!   [`Provider`](provider::Provider) trait; the built-in catalog covers
//!   the common sources
//! - Replay protection is an injected [`ReplayStore`](replay_store::ReplayStore);
//!   the in-memory implementation suits a single process
//!
//! ## Usage
//!
//! ```rust
//! use better_webhook_core::provider::catalog;
//! use better_webhook_core::WebhookReceiver;
//!
//! let receiver = WebhookReceiver::new(catalog::github())
//!     .event("push", |payload, _ctx| async move {
//!         println!("push: {}", payload["ref"]);
//!         Ok(())
//!     })
//!     .max_body_bytes(1024 * 1024);
//! ```

/// Normalized header map shared by every pipeline stage.
pub mod headers;

/// HMAC signature primitives and provider schemes.
pub mod signature;

/// Payload schema validation contract.
pub mod schema;

/// Secret wrapping and resolution.
pub mod secrets;

/// Provider abstraction and built-in catalog.
pub mod provider;

/// Idempotency-key replay store and policy.
pub mod replay_store;

/// Observation events and observer fan-out.
pub mod observe;

/// Immutable receiver configuration.
pub mod builder;

/// The per-request state machine.
pub mod pipeline;

// Re-export the primary surface.
pub use builder::{
    ErrorContext, Handler, HandlerContext, HandlerFuture, WebhookEvent, WebhookReceiver,
};
pub use headers::Headers;
pub use observe::{LogObserver, ObservationContext, ObservationEvent, Observer, ObserverSet};
pub use pipeline::{ProcessOptions, ProcessResult, ResponseBody};
pub use replay_store::{
    DuplicatePolicy, MemoryReplayStore, MemoryReplayStoreConfig, ReplayContext, ReplayPolicy,
    ReplayProtection, ReplayStore, ReplayStoreError, Reservation,
};
pub use schema::{AnySchema, FnSchema, Schema, SchemaIssue, SchemaViolation, TypedSchema};
pub use secrets::{SecretSource, SecretString};
