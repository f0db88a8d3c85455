//! The contract every session backend satisfies.

use std::fmt;
use std::sync::Arc;

use axum::http::HeaderMap;

use super::Session;

/// Lifecycle notification kinds delivered to a [`SessionEventFn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEvent {
    /// A session was created while resolving a request.
    Create,
    /// A session was removed for being idle past the timeout.
    Expire,
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEvent::Create => write!(f, "CREATE"),
            SessionEvent::Expire => write!(f, "EXPIRE"),
        }
    }
}

/// Receiver of session lifecycle events.
///
/// Callbacks run synchronously on the caller's thread: `on_create` on the
/// request that resolved the session, `on_expire` on the reaper. A slow
/// callback stalls that caller. The store mutation is already committed
/// when a callback runs.
pub trait SessionEvents: Send + Sync {
    fn on_create(&self, session: &Session);
    fn on_expire(&self, session: &Session);
}

/// Adapts a closure into [`SessionEvents`].
pub struct SessionEventFn<F>(pub F);

impl<F> SessionEventFn<F>
where
    F: Fn(SessionEvent, &Session) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> SessionEvents for SessionEventFn<F>
where
    F: Fn(SessionEvent, &Session) + Send + Sync,
{
    fn on_create(&self, session: &Session) {
        (self.0)(SessionEvent::Create, session)
    }

    fn on_expire(&self, session: &Session) {
        (self.0)(SessionEvent::Expire, session)
    }
}

/// Creates, finds and expires sessions.
///
/// Implementations never fail: an identity that is missing or does not
/// parse is simply treated as absent.
pub trait SessionBackend: Send + Sync {
    /// Pure lookup by identity. Never creates and never touches.
    fn find(&self, id: &str) -> Option<Arc<Session>>;

    /// Per-request entry point.
    ///
    /// Returns the session named by the request, touching it, or creates a
    /// new one and writes whatever identity-carrying headers the client
    /// needs into `response`.
    fn resolve(&self, request: &HeaderMap, response: &mut HeaderMap) -> Arc<Session>;

    /// Register the lifecycle event receiver, replacing any previous one.
    fn set_event_sink(&self, sink: Arc<dyn SessionEvents>);

    /// Called exactly once when the request that resolved `session` ends.
    fn release(&self, _session: &Arc<Session>) {}
}
