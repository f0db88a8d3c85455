//! Backend giving each request its own throwaway session.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use axum::http::HeaderMap;

use super::{Session, SessionBackend, SessionEvents, SessionId};

/// Session backend without client identity.
///
/// Every request gets a fresh session that lives exactly as long as the
/// request: it is findable by ID while the pipeline runs and dropped on
/// [`SessionBackend::release`]. This is the backend of a dispatcher built
/// without one, useful when filters only need to pass values to handlers.
#[derive(Default)]
pub struct RequestScopedBackend {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    events: RwLock<Option<Arc<dyn SessionEvents>>>,
}

impl RequestScopedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions belonging to requests still in flight.
    pub fn count(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl SessionBackend for RequestScopedBackend {
    fn find(&self, id: &str) -> Option<Arc<Session>> {
        let id = SessionId::parse_token(id)?;
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    fn resolve(&self, _request: &HeaderMap, _response: &mut HeaderMap) -> Arc<Session> {
        let session = Arc::new(Session::new(SessionId::new()));
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session.id(), Arc::clone(&session));

        let events = self
            .events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(events) = events {
            let pending = Unclaimed {
                backend: self,
                session: Some(&session),
            };
            events.on_create(&session);
            pending.claim();
        }
        session
    }

    fn set_event_sink(&self, sink: Arc<dyn SessionEvents>) {
        *self.events.write().unwrap_or_else(PoisonError::into_inner) = Some(sink);
    }

    fn release(&self, session: &Arc<Session>) {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&session.id());
    }
}

/// Removes a just-created session if the create callback unwinds before
/// the session is handed to the caller.
struct Unclaimed<'a> {
    backend: &'a RequestScopedBackend,
    session: Option<&'a Arc<Session>>,
}

impl Unclaimed<'_> {
    fn claim(mut self) {
        self.session = None;
    }
}

impl Drop for Unclaimed<'_> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.backend.release(session);
        }
    }
}
