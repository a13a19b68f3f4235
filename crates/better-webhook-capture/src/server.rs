//! Capture HTTP server.
//!
//! Accepts any method on any path, records the request verbatim as a
//! [`CaptureRecord`], annotates it with the detected provider, persists it
//! through the [`CaptureStore`], and notifies subscribers over a broadcast
//! channel. Persistence failures are logged and answered with 500; the
//! server itself keeps running.

use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json, Router,
};
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument};

use better_webhook_core::Headers;

use crate::detect::{DetectionInput, ProviderDetector};
use crate::record::{CaptureFile, CaptureRecord, HeaderPair};
use crate::store::CaptureStore;

// ============================================================================
// Configuration
// ============================================================================

/// Capture server settings.
#[derive(Debug, Clone)]
pub struct CaptureServerConfig {
    pub host: String,
    /// Port to listen on; 0 selects an ephemeral port.
    pub port: u16,
    /// Maximum accepted request body; larger bodies answer 413.
    pub max_body_bytes: usize,
}

impl Default for CaptureServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Errors starting or running the capture server.
#[derive(Debug, thiserror::Error)]
pub enum CaptureServerError {
    #[error("failed to bind {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("server failed: {message}")]
    ServerFailed { message: String },
}

// ============================================================================
// Wire types
// ============================================================================

/// Success response for a captured request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureResponse {
    pub success: bool,
    pub message: String,
    pub id: String,
    pub timestamp: String,
    pub file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CaptureErrorResponse {
    success: bool,
    message: String,
}

// ============================================================================
// Server
// ============================================================================

struct ServerState {
    store: CaptureStore,
    detector: ProviderDetector,
    events: broadcast::Sender<CaptureFile>,
    max_body_bytes: usize,
}

/// Handle to a running capture server.
pub struct CaptureServerHandle {
    addr: SocketAddr,
    events: broadcast::Sender<CaptureFile>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), CaptureServerError>>,
}

impl CaptureServerHandle {
    /// Actual bound address (useful with an ephemeral port).
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Subscribe to captures as they are persisted.
    pub fn subscribe(&self) -> broadcast::Receiver<CaptureFile> {
        self.events.subscribe()
    }

    /// Stop the server: close the listener, drain in-flight requests, and
    /// release subscriber resources.
    pub async fn stop(mut self) -> Result<(), CaptureServerError> {
        if let Some(shutdown) = self.shutdown.take() {
            // The server task may already be gone; nothing to signal then.
            let _ = shutdown.send(());
        }
        match (&mut self.task).await {
            Ok(result) => result,
            Err(e) => Err(CaptureServerError::ServerFailed {
                message: e.to_string(),
            }),
        }
    }
}

/// Start the capture server.
///
/// Binds `host:port` (port 0 selects ephemeral) and serves until
/// [`CaptureServerHandle::stop`] is called.
pub async fn start_capture_server(
    config: CaptureServerConfig,
    store: CaptureStore,
    detector: ProviderDetector,
) -> Result<CaptureServerHandle, CaptureServerError> {
    let address = format!("{}:{}", config.host, config.port);
    let listener =
        tokio::net::TcpListener::bind(&address)
            .await
            .map_err(|e| CaptureServerError::BindFailed {
                address: address.clone(),
                message: e.to_string(),
            })?;
    let addr = listener
        .local_addr()
        .map_err(|e| CaptureServerError::BindFailed {
            address,
            message: e.to_string(),
        })?;

    let (events, _) = broadcast::channel(64);
    let state = Arc::new(ServerState {
        store,
        detector,
        events: events.clone(),
        max_body_bytes: config.max_body_bytes,
    });

    let app = Router::new()
        .fallback(capture_any)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .map_err(|e| CaptureServerError::ServerFailed {
                message: e.to_string(),
            })
    });

    info!(%addr, "capture server listening");
    Ok(CaptureServerHandle {
        addr,
        events,
        shutdown: Some(shutdown_tx),
        task,
    })
}

/// Record one request, whatever its method or path.
#[instrument(skip(state, request), fields(method = %request.method(), path = %request.uri().path()))]
async fn capture_any(State(state): State<Arc<ServerState>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    let bytes = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(CaptureErrorResponse {
                    success: false,
                    message: "Request body exceeds the configured capture limit".to_string(),
                }),
            )
                .into_response();
        }
    };

    let header_pairs: Vec<HeaderPair> = parts
        .headers
        .iter()
        .map(|(name, value)| {
            HeaderPair::new(name.as_str(), String::from_utf8_lossy(value.as_bytes()))
        })
        .collect();

    let mut record = CaptureRecord::from_request(
        parts.method.as_str(),
        parts.uri.to_string(),
        header_pairs,
        &bytes,
    );

    let normalized = Headers::from_pairs(
        record
            .headers
            .iter()
            .map(|pair| (pair.key.clone(), pair.value.clone())),
    );
    record.provider = state
        .detector
        .detect(&DetectionInput {
            method: &record.method,
            path: &record.path,
            headers: &normalized,
            body: Some(&record.body),
        })
        .map(|detection| detection.provider);

    let saved = match state.store.save(record).await {
        Ok(saved) => saved,
        Err(e) => {
            error!(error = %e, "failed to persist capture");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(CaptureErrorResponse {
                    success: false,
                    message: "Failed to persist capture".to_string(),
                }),
            )
                .into_response();
        }
    };

    info!(
        id = %saved.capture.id,
        file = %saved.file,
        provider = saved.capture.provider.as_deref().unwrap_or("-"),
        "request captured"
    );

    // Subscribers are optional; a lagging or absent receiver is not an
    // error.
    let _ = state.events.send(saved.clone());

    let response_body = CaptureResponse {
        success: true,
        message: "Webhook captured".to_string(),
        id: saved.capture.id.clone(),
        timestamp: saved
            .capture
            .timestamp
            .to_rfc3339_opts(SecondsFormat::Millis, true),
        file: saved.file.clone(),
    };

    let mut response = (StatusCode::OK, Json(response_body)).into_response();
    if let Ok(value) = HeaderValue::from_str(&saved.capture.id) {
        response.headers_mut().insert("x-capture-id", value);
    }
    response
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
