//! Ordered tab list with a single active tab.
//!
//! Tabs are UI slots. A tab is created unbound, bound to one session once its
//! process exists, and never rebound. The registry enforces the tab limit and
//! keeps at most one tab active (exactly one whenever any tab exists).

use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::MuxError;
use crate::session::{LaunchSpec, SessionId};

/// Maximum number of tabs open at once.
pub const TAB_LIMIT: usize = 10;

pub const TAB_LABEL_PREFIX: &str = "Terminal ";

/// Locally assigned tab identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(u64);

impl TabId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tab-{}", self.0)
    }
}

/// Where a tab is in its one-shot session creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpawnState {
    /// Waiting for the viewport to report its size.
    Pending,
    /// A spawn call is in flight.
    Spawning,
    /// Bound to a session.
    Bound,
}

#[derive(Debug, Clone)]
pub struct Tab {
    id: TabId,
    label: String,
    launch: LaunchSpec,
    session_id: Option<SessionId>,
    is_active: bool,
    spawn: SpawnState,
}

impl Tab {
    pub fn id(&self) -> TabId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn launch(&self) -> &LaunchSpec {
        &self.launch
    }

    /// The bound session, if any. The tab does not own the session.
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn spawn_state(&self) -> SpawnState {
        self.spawn
    }
}

#[derive(Debug)]
pub struct TabRegistry {
    tabs: Vec<Tab>,
    /// Monotonic; labels and ids are never reused after a tab closes.
    counter: u64,
    limit: usize,
}

impl TabRegistry {
    pub fn new() -> Self {
        Self::with_limit(TAB_LIMIT)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            tabs: Vec::new(),
            counter: 0,
            limit,
        }
    }

    /// Append a new unbound tab and make it the only active one.
    pub fn add_tab(&mut self, launch: LaunchSpec) -> Result<TabId, MuxError> {
        if self.tabs.len() >= self.limit {
            return Err(MuxError::TabLimitReached { limit: self.limit });
        }

        self.counter += 1;
        let id = TabId(self.counter);
        for tab in &mut self.tabs {
            tab.is_active = false;
        }
        self.tabs.push(Tab {
            id,
            label: format!("{TAB_LABEL_PREFIX}{}", self.counter),
            launch,
            session_id: None,
            is_active: true,
            spawn: SpawnState::Pending,
        });
        Ok(id)
    }

    /// Remove a tab. Unknown ids are a no-op.
    ///
    /// When the active tab is removed, the tab now at the same position (or
    /// the new last tab) becomes active.
    pub fn remove_tab(&mut self, id: TabId) -> Option<Tab> {
        let index = self.position(id)?;
        let removed = self.tabs.remove(index);

        if removed.is_active && !self.tabs.is_empty() {
            let next = index.min(self.tabs.len() - 1);
            self.tabs[next].is_active = true;
        }
        Some(removed)
    }

    /// Make `id` the only active tab. Returns `false` if it does not exist.
    pub fn set_active(&mut self, id: TabId) -> bool {
        if self.position(id).is_none() {
            return false;
        }
        for tab in &mut self.tabs {
            tab.is_active = tab.id == id;
        }
        true
    }

    /// Bind a session to a tab that has none yet.
    ///
    /// Ignored when the tab is missing or already bound.
    pub fn bind_session(&mut self, id: TabId, session_id: SessionId) -> bool {
        let Some(tab) = self.tabs.iter_mut().find(|t| t.id == id) else {
            return false;
        };
        if let Some(existing) = &tab.session_id {
            debug!("tab {id} already bound to {existing}; ignoring {session_id}");
            return false;
        }
        tab.session_id = Some(session_id);
        tab.spawn = SpawnState::Bound;
        true
    }

    /// Claim the tab's single session creation. Only a pending tab can be
    /// claimed; returns `false` otherwise.
    pub fn begin_spawn(&mut self, id: TabId) -> bool {
        match self.tabs.iter_mut().find(|t| t.id == id) {
            Some(tab) if tab.spawn == SpawnState::Pending => {
                tab.spawn = SpawnState::Spawning;
                true
            }
            _ => false,
        }
    }

    /// Release a claim after a failed spawn so creation can be retried.
    pub fn abort_spawn(&mut self, id: TabId) {
        if let Some(tab) = self.tabs.iter_mut().find(|t| t.id == id) {
            if tab.spawn == SpawnState::Spawning {
                tab.spawn = SpawnState::Pending;
            }
        }
    }

    pub fn get(&self, id: TabId) -> Option<&Tab> {
        self.tabs.iter().find(|t| t.id == id)
    }

    pub fn position(&self, id: TabId) -> Option<usize> {
        self.tabs.iter().position(|t| t.id == id)
    }

    /// The tab bound to `session_id`, if any.
    pub fn find_by_session(&self, session_id: &SessionId) -> Option<&Tab> {
        self.tabs
            .iter()
            .find(|t| t.session_id.as_ref() == Some(session_id))
    }

    pub fn active_tab(&self) -> Option<&Tab> {
        self.tabs.iter().find(|t| t.is_active)
    }

    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn can_add_tab(&self) -> bool {
        self.tabs.len() < self.limit
    }
}

impl Default for TabRegistry {
    fn default() -> Self {
        Self::new()
    }
}
