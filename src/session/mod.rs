//! Session management module.
//!
//! A [`Session`] is a per-client key/value store. A [`SessionBackend`]
//! decides which session a request belongs to and when sessions die:
//! [`MemoryBackend`] keeps cookie-identified sessions until they idle out,
//! [`RequestScopedBackend`] hands every request a throwaway session.

mod backend;
mod id;
mod memory;
mod scoped;
mod store;

pub use backend::{SessionBackend, SessionEvent, SessionEventFn, SessionEvents};
pub use id::SessionId;
pub use memory::{
    CookieConfig, MemoryBackend, MemoryConfig, DEFAULT_COOKIE_MAX_AGE, DEFAULT_IDLE_TIMEOUT,
    DEFAULT_POLL_INTERVAL,
};
pub use scoped::RequestScopedBackend;
pub use store::Session;
