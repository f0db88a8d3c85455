//! In-memory session backend with a background expiry reaper.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use axum::http::HeaderMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::{Session, SessionBackend, SessionEvents, SessionId};
use crate::cookie::{self, SetCookie};

/// Default cookie lifetime: ten days, independent of the idle timeout.
pub const DEFAULT_COOKIE_MAX_AGE: Duration = Duration::from_secs(10 * 24 * 60 * 60);

/// Default idle timeout.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Default reaper poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Where the session identity travels.
#[derive(Debug, Clone)]
pub struct CookieConfig {
    /// Cookie name.
    pub name: String,
    /// Cookie domain; empty means host-only.
    pub domain: String,
    /// Cookie path.
    pub path: String,
    /// Max-Age issued with a new identity.
    pub max_age: Duration,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: "session_mux".to_string(),
            domain: String::new(),
            path: "/".to_string(),
            max_age: DEFAULT_COOKIE_MAX_AGE,
        }
    }
}

/// Configuration for [`MemoryBackend`].
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Session cookie settings.
    pub cookie: CookieConfig,
    /// Sessions idle strictly longer than this are reaped. Zero disables
    /// the reaper.
    pub idle_timeout: Duration,
    /// How often the reaper scans the store.
    pub poll_interval: Duration,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            cookie: CookieConfig::default(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl MemoryConfig {
    /// Config with the given cookie name and idle timeout.
    pub fn new(cookie_name: impl Into<String>, idle_timeout: Duration) -> Self {
        Self {
            cookie: CookieConfig {
                name: cookie_name.into(),
                ..CookieConfig::default()
            },
            idle_timeout,
            ..Self::default()
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_cookie_scope(mut self, domain: impl Into<String>, path: impl Into<String>) -> Self {
        self.cookie.domain = domain.into();
        self.cookie.path = path.into();
        self
    }
}

struct MemoryInner {
    config: MemoryConfig,
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    events: RwLock<Option<Arc<dyn SessionEvents>>>,
}

impl MemoryInner {
    fn read_sessions(&self) -> RwLockReadGuard<'_, HashMap<SessionId, Arc<Session>>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_sessions(&self) -> RwLockWriteGuard<'_, HashMap<SessionId, Arc<Session>>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn event_sink(&self) -> Option<Arc<dyn SessionEvents>> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// One reaper pass.
    ///
    /// Candidates are collected under the read lock and removed under a
    /// separately taken write lock, so a session touched in between is still
    /// removed.
    fn reap_expired(&self) -> usize {
        let now = Instant::now();
        let timeout = self.config.idle_timeout;

        let expired: Vec<SessionId> = self
            .read_sessions()
            .iter()
            .filter(|(_, session)| session.idle_at(now) > timeout)
            .map(|(id, _)| *id)
            .collect();
        if expired.is_empty() {
            return 0;
        }

        let removed: Vec<Arc<Session>> = {
            let mut sessions = self.write_sessions();
            expired.iter().filter_map(|id| sessions.remove(id)).collect()
        };
        debug!(count = removed.len(), "removed idle sessions");

        if let Some(events) = self.event_sink() {
            for session in &removed {
                let fired = catch_unwind(AssertUnwindSafe(|| events.on_expire(session)));
                if fired.is_err() {
                    warn!(session = %session.id(), "session expire callback panicked");
                }
            }
        }
        removed.len()
    }
}

struct ReaperHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Session backend keeping every session in process memory.
///
/// The identity travels in a cookie. Idle sessions are removed by a reaper
/// task started with [`MemoryBackend::start_reaper`].
pub struct MemoryBackend {
    inner: Arc<MemoryInner>,
    reaper: Mutex<Option<ReaperHandle>>,
}

impl MemoryBackend {
    /// Create a new empty backend.
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                config,
                sessions: RwLock::new(HashMap::new()),
                events: RwLock::new(None),
            }),
            reaper: Mutex::new(None),
        }
    }

    /// The backend configuration.
    pub fn config(&self) -> &MemoryConfig {
        &self.inner.config
    }

    /// Number of live sessions.
    pub fn count(&self) -> usize {
        self.inner.read_sessions().len()
    }

    /// All live session IDs.
    pub fn list_ids(&self) -> Vec<SessionId> {
        self.inner.read_sessions().keys().copied().collect()
    }

    /// Run one expiry pass now, returning how many sessions were removed.
    pub fn reap_expired(&self) -> usize {
        self.inner.reap_expired()
    }

    /// Start the background reaper.
    ///
    /// Does nothing when the idle timeout is zero or a reaper is already
    /// running.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn start_reaper(&self) {
        if self.inner.config.idle_timeout.is_zero() {
            return;
        }

        let mut slot = self.reaper.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|handle| !handle.task.is_finished()) {
            return;
        }

        let (stop, mut stopped) = watch::channel(false);
        let inner = Arc::clone(&self.inner);
        let period = inner.config.poll_interval.max(Duration::from_millis(1));

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                timeout_ms = inner.config.idle_timeout.as_millis() as u64,
                poll_ms = period.as_millis() as u64,
                "session reaper started"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        inner.reap_expired();
                    }
                    changed = stopped.changed() => {
                        // A dropped sender means the backend itself is gone.
                        if changed.is_err() || *stopped.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("session reaper stopped");
        });

        *slot = Some(ReaperHandle { stop, task });
    }

    /// Stop the background reaper. Safe to call repeatedly and from any
    /// thread; never waits for an in-progress pass.
    pub fn stop_reaper(&self) {
        let handle = self
            .reaper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.stop.send(true);
        }
    }

    /// Check if a reaper task is currently running.
    pub fn is_reaping(&self) -> bool {
        self.reaper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.task.is_finished())
    }

    fn identity_cookie(&self, session: &Session) -> SetCookie {
        let cookie = &self.inner.config.cookie;
        SetCookie::new(cookie.name.clone(), session.id().to_string())
            .domain(cookie.domain.clone())
            .path(cookie.path.clone())
            .max_age(cookie.max_age)
    }
}

impl SessionBackend for MemoryBackend {
    fn find(&self, id: &str) -> Option<Arc<Session>> {
        let id = SessionId::parse_token(id)?;
        self.inner.read_sessions().get(&id).cloned()
    }

    fn resolve(&self, request: &HeaderMap, response: &mut HeaderMap) -> Arc<Session> {
        let presented = cookie::find(request, &self.inner.config.cookie.name)
            .and_then(|token| SessionId::parse_token(&token));

        let (session, created) = {
            let mut sessions = self.inner.write_sessions();
            match presented.and_then(|id| sessions.get(&id).cloned()) {
                Some(session) => {
                    session.touch();
                    (session, false)
                }
                None => {
                    let session = Arc::new(Session::new(SessionId::new()));
                    sessions.insert(session.id(), Arc::clone(&session));
                    (session, true)
                }
            }
        };

        if created {
            self.identity_cookie(&session).append_to(response);
            debug!(session = %session.id(), "session created");
            if let Some(events) = self.inner.event_sink() {
                events.on_create(&session);
            }
        }
        session
    }

    fn set_event_sink(&self, sink: Arc<dyn SessionEvents>) {
        *self
            .inner
            .events
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(sink);
    }
}

impl Drop for MemoryBackend {
    fn drop(&mut self) {
        self.stop_reaper();
    }
}
