//! HTTP adapter: serves a [`Dispatcher`] with axum.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Router,
};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use crate::dispatch::{Dispatcher, Request};
use crate::error::MuxError;

/// Default cap on buffered request bodies.
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Shared state of the fallback handler.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }
}

/// Create a router that feeds every request into `dispatcher`.
pub fn create_router(dispatcher: Arc<Dispatcher>) -> Router {
    create_router_with_state(AppState::new(dispatcher))
}

/// Create the router with custom state.
pub fn create_router_with_state(state: AppState) -> Router {
    Router::new()
        .fallback(dispatch_request)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .with_state(state)
}

/// Buffer the body and run the pipeline on the blocking pool.
///
/// A panicking target is re-raised here so the surrounding
/// `CatchPanicLayer` answers it.
async fn dispatch_request(
    State(state): State<AppState>,
    request: axum::extract::Request,
) -> Response {
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(uri = %parts.uri, error = %e, "failed to read request body");
            return (StatusCode::PAYLOAD_TOO_LARGE, "request body too large").into_response();
        }
    };

    let request = Request::from_parts(parts, body);
    let dispatcher = state.dispatcher.clone();
    match tokio::task::spawn_blocking(move || dispatcher.dispatch(request)).await {
        Ok(response) => response.into_http(),
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => {
            tracing::error!(error = %e, "dispatch task cancelled");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Largest request body accepted, in bytes.
    pub max_body_bytes: usize,
    /// Stop accepting on Ctrl-C and let in-flight requests finish.
    pub graceful_shutdown: bool,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn without_graceful_shutdown(mut self) -> Self {
        self.graceful_shutdown = false;
        self
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            graceful_shutdown: true,
        }
    }
}

/// Bind and serve `dispatcher` until shutdown.
pub async fn serve(config: ServerConfig, dispatcher: Arc<Dispatcher>) -> crate::Result<()> {
    let addr = config.bind_address();
    let router = create_router_with_state(
        AppState::new(dispatcher).with_max_body_bytes(config.max_body_bytes),
    );

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(MuxError::Io)?;
    tracing::info!("Starting session-mux server on {}", addr);

    let server = axum::serve(listener, router);
    let result = if config.graceful_shutdown {
        server.with_graceful_shutdown(shutdown_signal()).await
    } else {
        server.await
    };
    result.map_err(|e| MuxError::Server(e.to_string()))?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Wait for Ctrl-C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
