//! In-flight request bookkeeping.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use axum::http::Method;
use serde::Serialize;

use crate::session::Session;

/// Global counter for request handles.
static HANDLE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Correlates a request with its in-flight binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RequestHandle(u64);

impl RequestHandle {
    /// Allocate the next handle.
    pub fn new() -> Self {
        Self(HANDLE_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for RequestHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{:08x}", self.0)
    }
}

/// Session bound to a request for the duration of its pipeline.
#[derive(Debug, Clone)]
pub struct Binding {
    pub session: Arc<Session>,
    pub method: Method,
    pub path: String,
    pub started: Instant,
}

/// Serializable view of one binding.
#[derive(Debug, Clone, Serialize)]
pub struct BindingInfo {
    pub handle: String,
    pub session: String,
    pub method: String,
    pub path: String,
    pub elapsed_ms: u64,
}

/// Request handle → binding, shared between the dispatcher and anything
/// that wants to see which requests are in flight.
#[derive(Debug, Default)]
pub struct BindingTable {
    bindings: RwLock<HashMap<RequestHandle, Binding>>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session bound to an in-flight request.
    pub fn session(&self, handle: RequestHandle) -> Option<Arc<Session>> {
        self.read(|bindings| bindings.get(&handle).map(|b| b.session.clone()))
    }

    pub fn get(&self, handle: RequestHandle) -> Option<Binding> {
        self.read(|bindings| bindings.get(&handle).cloned())
    }

    pub fn contains(&self, handle: RequestHandle) -> bool {
        self.read(|bindings| bindings.contains_key(&handle))
    }

    pub fn len(&self) -> usize {
        self.read(HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All in-flight bindings, oldest handle first.
    pub fn snapshot(&self) -> Vec<BindingInfo> {
        let mut infos: Vec<(RequestHandle, BindingInfo)> = self.read(|bindings| {
            bindings
                .iter()
                .map(|(handle, binding)| {
                    let info = BindingInfo {
                        handle: handle.to_string(),
                        session: binding.session.id().to_string(),
                        method: binding.method.to_string(),
                        path: binding.path.clone(),
                        elapsed_ms: binding.started.elapsed().as_millis() as u64,
                    };
                    (*handle, info)
                })
                .collect()
        });
        infos.sort_by_key(|(handle, _)| *handle);
        infos.into_iter().map(|(_, info)| info).collect()
    }

    pub(crate) fn insert(&self, handle: RequestHandle, binding: Binding) {
        self.bindings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle, binding);
    }

    pub(crate) fn remove(&self, handle: RequestHandle) -> Option<Binding> {
        self.bindings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle)
    }

    fn read<T>(&self, f: impl FnOnce(&HashMap<RequestHandle, Binding>) -> T) -> T {
        let bindings = self.bindings.read().unwrap_or_else(PoisonError::into_inner);
        f(&bindings)
    }
}
