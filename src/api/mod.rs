//! API layer for session-mux.
//!
//! Hosts a [`Dispatcher`](crate::dispatch::Dispatcher) behind axum. Every
//! request lands in a single fallback route and goes through the
//! dispatcher's filters and handlers.
//!
//! ## Built-in routes
//!
//! Registered only through [`register_introspection`]:
//! - `GET /_mux/state` - In-flight requests, live sessions, span statistics
//! - `GET /_mux/session` - The caller's own session
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use session_mux::api::{serve, ServerConfig};
//! use session_mux::{Context, Dispatcher};
//!
//! #[tokio::main]
//! async fn main() -> session_mux::Result<()> {
//!     let mut mux = Dispatcher::new("");
//!     mux.handle_fn("^/hello$", |ctx: &mut Context| ctx.print("hello"))?;
//!     serve(ServerConfig::new("127.0.0.1", 3000), Arc::new(mux)).await
//! }
//! ```

pub mod introspection;
pub mod router;

pub use introspection::{register_introspection, SESSION_PATH, STATE_PATH};
pub use router::{
    create_router, create_router_with_state, serve, AppState, ServerConfig,
    DEFAULT_MAX_BODY_BYTES,
};
