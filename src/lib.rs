//! # session-mux
//!
//! Session-aware HTTP dispatcher with ordered regex filters and handlers.
//!
//! Every request is bound to a session resolved from a cookie, then runs
//! through filters and handlers registered against regular expressions.
//! Each one answers [`Control::Continue`] to let the next matching entry
//! run or [`Control::Return`] to end the pipeline. Requests nothing matched
//! get a 404.
//!
//! ## Features
//!
//! - **Ordered routing**: filters then handlers, in registration order
//! - **Method masks**: entries restricted to a set of HTTP methods
//! - **Session backends**: in-memory with idle expiry, or per request
//! - **Introspection**: in-flight bindings and per-route span timings
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use session_mux::{Context, Control, Dispatcher, MemoryBackend, MemoryConfig};
//!
//! #[tokio::main]
//! async fn main() -> session_mux::Result<()> {
//!     session_mux::logging::try_init().ok();
//!
//!     let backend = Arc::new(MemoryBackend::new(MemoryConfig::new(
//!         "sid",
//!         Duration::from_secs(1800),
//!     )));
//!     backend.start_reaper();
//!
//!     let mut mux = Dispatcher::with_backend("", backend);
//!     mux.filter_fn("^/admin/.*", |ctx: &mut Context| {
//!         if ctx.str_value("user").is_none() {
//!             return ctx.redirect("/login");
//!         }
//!         Control::Continue
//!     })?;
//!     mux.handle_fn("^/admin/home$", |ctx: &mut Context| ctx.print("welcome"))?;
//!
//!     session_mux::api::serve(Default::default(), Arc::new(mux)).await
//! }
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod cookie;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod observability;
pub mod routing;
pub mod session;

// Re-export commonly used types
pub use dispatch::{Context, DispatchConfig, Dispatcher, Request, RequestHandle, Response};
pub use error::{MuxError, Result};
pub use observability::{Monitor, SpanTracker};
pub use routing::{Continuation, Control, Handler, LegacyHandler, MethodMask};
pub use session::{
    MemoryBackend, MemoryConfig, RequestScopedBackend, Session, SessionBackend, SessionEvent,
    SessionEventFn, SessionEvents, SessionId,
};
