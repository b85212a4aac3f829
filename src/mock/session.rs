//! Session registry
//!
//! Sessions are created by `CreateSession` and looked up by every later
//! session-scoped call. Lifecycle transitions are recorded for test
//! assertions but never enforced: a client calling `Start` before
//! `SelectDevices` is served all the same.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use portal_protocol::Options;
use serde::{Deserialize, Serialize};

use super::handle::{HandleAllocator, HandleKind};

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// Created, no devices selected yet
    Created,
    /// `SelectDevices` was called
    DevicesSelected,
    /// `Start` was called
    Started,
}

impl SessionState {
    /// Returns true if moving from `self` to `next` follows the usual order
    pub fn is_forward(&self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (SessionState::Created, SessionState::DevicesSelected)
                | (SessionState::Created, SessionState::Started)
                | (SessionState::DevicesSelected, SessionState::DevicesSelected)
                | (SessionState::DevicesSelected, SessionState::Started)
        )
    }
}

/// A portal session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub handle: String,
    /// Unique name of the owning caller
    pub sender: String,
    /// Options passed to `CreateSession`
    pub options: Options,
    pub state: SessionState,
    pub state_history: Vec<(SessionState, DateTime<Utc>)>,
    /// Options of the most recent `SelectDevices`
    pub selected_devices: Option<Options>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(handle: String, sender: String, options: Options) -> Self {
        let now = Utc::now();
        Self {
            handle,
            sender,
            options,
            state: SessionState::Created,
            state_history: vec![(SessionState::Created, now)],
            selected_devices: None,
            created_at: now,
        }
    }

    /// Record a transition, warning when it is out of the usual order
    pub fn transition(&mut self, next: SessionState) {
        if !self.state.is_forward(next) {
            tracing::warn!(
                session = %self.handle,
                from = ?self.state,
                to = ?next,
                "unusual session transition"
            );
        }
        self.state = next;
        self.state_history.push((next, Utc::now()));
    }
}

/// Mapping from session handle to session, guarded by one mutex
#[derive(Debug)]
pub struct SessionRegistry {
    handles: HandleAllocator,
    sessions: Mutex<HashMap<String, Session>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            handles: HandleAllocator::new(HandleKind::Session),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate and store a new session
    pub fn create(&self, sender: &str, options: Options) -> Session {
        let handle = self.handles.next_for(sender, &options);
        let session = Session::new(handle.clone(), sender.to_string(), options);
        self.lock().insert(handle, session.clone());
        session
    }

    /// Snapshot of a session
    pub fn lookup(&self, handle: &str) -> Option<Session> {
        self.lock().get(handle).cloned()
    }

    pub fn contains(&self, handle: &str) -> bool {
        self.lock().contains_key(handle)
    }

    /// Apply `f` to a stored session; returns None for unknown handles
    pub fn update<T>(&self, handle: &str, f: impl FnOnce(&mut Session) -> T) -> Option<T> {
        self.lock().get_mut(handle).map(f)
    }

    /// Record a lifecycle transition; returns false for unknown handles
    pub fn mark(&self, handle: &str, state: SessionState) -> bool {
        self.update(handle, |session| session.transition(state)).is_some()
    }

    pub fn remove(&self, handle: &str) -> Option<Session> {
        self.lock().remove(handle)
    }

    /// Drop every session owned by `sender`, returning them
    pub fn remove_by_sender(&self, sender: &str) -> Vec<Session> {
        let mut sessions = self.lock();
        let handles: Vec<String> = sessions
            .values()
            .filter(|s| s.sender == sender)
            .map(|s| s.handle.clone())
            .collect();
        handles
            .into_iter()
            .filter_map(|h| sessions.remove(&h))
            .collect()
    }

    /// Handles of all live sessions, sorted
    pub fn handles(&self) -> Vec<String> {
        let mut handles: Vec<String> = self.lock().keys().cloned().collect();
        handles.sort();
        handles
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}
