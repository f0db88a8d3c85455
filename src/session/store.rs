//! Per-client key/value session.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use serde_json::Value;

use super::SessionId;

/// A client session: identity, dynamically typed values and activity time.
///
/// Sessions are shared between concurrent requests for the same client as
/// `Arc<Session>`, so every accessor takes `&self` and synchronizes
/// internally.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    values: RwLock<HashMap<String, Value>>,
    created_at: Instant,
    last_activity: Mutex<Instant>,
}

impl Session {
    /// Create an empty session with the given ID.
    pub fn new(id: SessionId) -> Self {
        let now = Instant::now();
        Self {
            id,
            values: RwLock::new(HashMap::new()),
            created_at: now,
            last_activity: Mutex::new(now),
        }
    }

    /// The session identity.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Get a clone of the value stored under `key`.
    pub fn value(&self, key: &str) -> Option<Value> {
        self.read_values().get(key).cloned()
    }

    /// Get the value under `key` rendered as text.
    ///
    /// Strings come back without JSON quoting; other values use their JSON
    /// form.
    pub fn str_value(&self, key: &str) -> Option<String> {
        self.read_values().get(key).map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// Store a value. Storing `null` removes the key.
    pub fn set_value(&self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        if value.is_null() {
            values.remove(&key);
        } else {
            values.insert(key, value);
        }
    }

    /// Remove a key, returning its previous value.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    /// Check if a key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.read_values().contains_key(key)
    }

    /// All keys currently stored, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        self.read_values().keys().cloned().collect()
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.read_values().len()
    }

    /// Check if the session holds no values.
    pub fn is_empty(&self) -> bool {
        self.read_values().is_empty()
    }

    /// Update the last activity timestamp.
    pub fn touch(&self) {
        *self
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    /// Time of last activity.
    pub fn last_activity(&self) -> Instant {
        *self
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the idle duration since last activity.
    pub fn idle_duration(&self) -> Duration {
        self.last_activity().elapsed()
    }

    /// Idle duration measured against a fixed instant.
    pub fn idle_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity())
    }

    /// Time since the session was created.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    fn read_values(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Value>> {
        self.values.read().unwrap_or_else(PoisonError::into_inner)
    }
}
