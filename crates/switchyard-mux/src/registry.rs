//! Authoritative map of live session records.
//!
//! Pure in-memory bookkeeping: no I/O, no subscriptions. The session
//! controller is the only writer.

use std::collections::HashMap;

use chrono::Utc;

use crate::session::{Session, SessionId, SessionStatus};

/// Outcome of [`SessionRegistry::update_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    /// The status moved to the reported value.
    Applied,
    /// The session already had the reported status.
    Unchanged,
    /// The transition is not allowed (terminal session, wrong kind, or a
    /// backwards move). The record is untouched.
    Rejected,
    /// No session with that id; the report was stale.
    Unknown,
}

impl StatusChange {
    pub fn is_applied(self) -> bool {
        self == StatusChange::Applied
    }
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session record, returning any record it replaced.
    pub fn insert(&mut self, session: Session) -> Option<Session> {
        self.sessions.insert(session.id().clone(), session)
    }

    /// Apply an externally reported status.
    ///
    /// Unknown ids are ignored without creating a record. Entering a terminal
    /// status stamps `completed_at`.
    pub fn update_status(&mut self, id: &SessionId, status: SessionStatus) -> StatusChange {
        let Some(session) = self.sessions.get_mut(id) else {
            return StatusChange::Unknown;
        };

        if session.status() == status {
            return StatusChange::Unchanged;
        }
        if !session.status().can_transition_to(status) {
            return StatusChange::Rejected;
        }

        session.set_status(status, Utc::now());
        StatusChange::Applied
    }

    pub fn remove(&mut self, id: &SessionId) -> Option<Session> {
        self.sessions.remove(id)
    }

    pub fn get(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// All sessions, oldest first.
    pub fn all(&self) -> Vec<&Session> {
        let mut sessions: Vec<&Session> = self.sessions.values().collect();
        sessions.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().cmp(b.id()))
        });
        sessions
    }

    /// Sessions whose status is not terminal, oldest first.
    pub fn live_sessions(&self) -> Vec<&Session> {
        self.all().into_iter().filter(|s| s.is_live()).collect()
    }

    /// Ids of every registered session.
    pub fn ids(&self) -> Vec<SessionId> {
        self.all().into_iter().map(|s| s.id().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
