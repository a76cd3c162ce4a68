//! Read-only views handed to the UI after every mutation.

use serde::Serialize;

use crate::session::{SessionId, SessionStatus};
use crate::tabs::TabId;

/// One tab as the UI renders it: label, focus, and the status dot of its
/// bound session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TabView {
    pub id: TabId,
    pub label: String,
    pub is_active: bool,
    pub session_id: Option<SessionId>,
    pub status: Option<SessionStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MuxSnapshot {
    pub tabs: Vec<TabView>,
    pub active_tab: Option<TabId>,
    /// `false` once the tab limit is reached; the UI disables "new tab".
    pub can_add_tab: bool,
}

impl MuxSnapshot {
    pub fn active(&self) -> Option<&TabView> {
        self.tabs.iter().find(|t| t.is_active)
    }
}
