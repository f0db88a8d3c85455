//! Request dispatch.
//!
//! # Data Flow
//! ```text
//! Request
//!     → strip prefix
//!     → backend.resolve (cookie identity → Session, Set-Cookie on create)
//!     → bind handle → session
//!     → filters (in order) → handlers (in order)
//!     → unbind, backend.release, slow-request check
//! Response (404 when no entry matched)
//! ```
//!
//! # Design Decisions
//! - Targets are synchronous; the HTTP adapter runs them off the async workers
//! - Bookkeeping runs in drop guards so panics never leak bindings
//! - A `Return` from a filter skips every handler

mod binding;
mod context;
mod dispatcher;

pub use binding::{Binding, BindingInfo, BindingTable, RequestHandle};
pub use context::{Context, CookieScope, Request, Response, CONTENT_TYPE_PLAIN_TEXT};
pub use dispatcher::{DispatchConfig, Dispatcher};
