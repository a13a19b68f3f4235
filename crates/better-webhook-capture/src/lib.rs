//! # better-webhook Capture
//!
//! Local capture/replay engine for webhook traffic.
//!
//! The capture server records every inbound request verbatim to a
//! content-addressed on-disk store, annotated with the detected provider.
//! The replay dispatcher reconstructs a captured request and re-issues it
//! against a developer endpoint with exact header preservation. The
//! executor sends synthetic webhooks, including real provider signatures,
//! from stored templates or ad-hoc payloads.
//!
//! ## Usage
//!
//! ```no_run
//! use better_webhook_capture::detect::ProviderDetector;
//! use better_webhook_capture::server::{start_capture_server, CaptureServerConfig};
//! use better_webhook_capture::store::CaptureStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = CaptureStore::new("./captures".into()).await?;
//! let handle = start_capture_server(
//!     CaptureServerConfig::default(),
//!     store,
//!     ProviderDetector::with_defaults(),
//! )
//! .await?;
//! println!("capturing on {}", handle.addr());
//! # Ok(())
//! # }
//! ```

/// Capture record model and body classification.
pub mod record;

/// Filesystem capture store.
pub mod store;

/// Provider detection heuristics.
pub mod detect;

/// Capture HTTP server.
pub mod server;

/// Replay dispatcher.
pub mod dispatch;

/// Outbound webhook executor.
pub mod executor;

/// Template store and remote index cache.
pub mod templates;

// Re-export the primary surface.
pub use detect::{Detection, DetectionInput, ProviderDetector};
pub use dispatch::{
    DispatchError, DispatchOutcome, ReplayDispatcher, ReplayOptions, HOP_BY_HOP_HEADERS,
};
pub use executor::{Executor, SendRequest};
pub use record::{CaptureFile, CaptureRecord, HeaderPair};
pub use server::{
    start_capture_server, CaptureResponse, CaptureServerConfig, CaptureServerError,
    CaptureServerHandle,
};
pub use store::{default_captures_dir, CaptureStore, CaptureStoreError};
pub use templates::{
    default_templates_dir, Template, TemplateError, TemplateIndexCache, TemplateIndexEntry,
    TemplateRef, TemplateStore,
};
