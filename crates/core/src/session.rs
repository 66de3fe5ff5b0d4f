//! Session-scoped capture state.
//!
//! The host's session store owns persistence; this module only describes
//! the fields capture keeps there and the read-modify-write helpers used on
//! them. Nothing here locks across requests: two concurrent requests of the
//! same session may both read the same sequence number.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Capture fields kept on the visitor's session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// Sequence number the next event will carry.
    pub next_sequence_no: u64,
    /// Time of the most recently attempted send.
    pub last_event_at: Option<DateTime<Utc>>,
    /// Correlation id most recently resolved for this session.
    pub correlation_id: Option<String>,
}

/// Persistence of [`SessionState`], provided by the host.
pub trait SessionStore: Send + Sync {
    fn load(&self, session_id: &str) -> SessionState;
    fn save(&self, session_id: &str, state: SessionState);
}

/// Session store kept in process memory.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<String, SessionState>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn load(&self, session_id: &str) -> SessionState {
        self.sessions
            .get(session_id)
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    fn save(&self, session_id: &str, state: SessionState) {
        self.sessions.insert(session_id.to_string(), state);
    }
}

/// The current request's session: its id plus the store it lives in.
#[derive(Clone)]
pub struct SessionHandle {
    id: String,
    store: Arc<dyn SessionStore>,
}

impl SessionHandle {
    pub fn new(id: impl Into<String>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            id: id.into(),
            store,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.store.load(&self.id)
    }

    /// Load, mutate and persist the session state; returns the new state.
    pub fn update(&self, f: impl FnOnce(&mut SessionState)) -> SessionState {
        let mut state = self.store.load(&self.id);
        f(&mut state);
        self.store.save(&self.id, state.clone());
        state
    }

    /// Take the next sequence number: 0 on first use, then +1 per call.
    pub fn next_sequence_no(&self) -> u64 {
        let mut taken = 0;
        self.update(|s| {
            taken = s.next_sequence_no;
            s.next_sequence_no += 1;
        });
        taken
    }

    pub fn last_event_at(&self) -> Option<DateTime<Utc>> {
        self.state().last_event_at
    }

    pub fn stamp_last_event(&self, at: DateTime<Utc>) {
        self.update(|s| s.last_event_at = Some(at));
    }

    pub fn clear_last_event(&self) {
        self.update(|s| s.last_event_at = None);
    }

    pub fn record_correlation_id(&self, correlation_id: &str) {
        self.update(|s| s.correlation_id = Some(correlation_id.to_string()));
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle").field("id", &self.id).finish()
    }
}
