//! User-facing tab lifecycle.
//!
//! [`Multiplexer`] composes tab registry mutations with session controller
//! calls. A tab's session is created lazily, once the tab has been rendered
//! and reports its viewport size, and closing a tab always tears its session
//! down before the tab disappears.
//!
//! Every operation takes `&mut self`, so a single owning task serializes
//! them. A `close_tab` that arrives while a spawn is in flight therefore runs
//! after the spawn resolves, and the freshly bound session is torn down with
//! its tab.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info};

use crate::backend::ProcessBackend;
use crate::controller::{SessionController, StatusReceiver, StatusReport};
use crate::error::MuxError;
use crate::events::EventSource;
use crate::registry::StatusChange;
use crate::relay::DisplaySink;
use crate::session::{LaunchSpec, Session, SessionId, SessionStatus, TermSize};
use crate::snapshot::{MuxSnapshot, TabView};
use crate::tabs::{Tab, TabId, TabRegistry};

/// Result of [`Multiplexer::tab_ready`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyOutcome {
    /// The tab's session was created and bound.
    Created(SessionId),
    /// The tab already has (or is getting) its session.
    AlreadyStarted,
    /// No such tab; it was closed before it became ready.
    UnknownTab,
}

pub struct Multiplexer {
    controller: SessionController,
    tabs: TabRegistry,
    default_dir: PathBuf,
}

impl Multiplexer {
    /// `default_dir` is where plain shell tabs start.
    pub fn new(
        backend: Arc<dyn ProcessBackend>,
        events: Arc<dyn EventSource>,
        default_dir: impl Into<PathBuf>,
    ) -> (Self, StatusReceiver) {
        Self::with_tabs(backend, events, default_dir, TabRegistry::new())
    }

    pub fn with_tabs(
        backend: Arc<dyn ProcessBackend>,
        events: Arc<dyn EventSource>,
        default_dir: impl Into<PathBuf>,
        tabs: TabRegistry,
    ) -> (Self, StatusReceiver) {
        let (controller, status_rx) = SessionController::new(backend, events);
        let mux = Self {
            controller,
            tabs,
            default_dir: default_dir.into(),
        };
        (mux, status_rx)
    }

    /// Open a shell tab in the default working directory.
    pub fn new_tab(&mut self) -> Result<TabId, MuxError> {
        self.new_tab_with(LaunchSpec::shell(self.default_dir.clone()))
    }

    /// Open a tab that will start `launch` once it reports its size.
    pub fn new_tab_with(&mut self, launch: LaunchSpec) -> Result<TabId, MuxError> {
        let id = self.tabs.add_tab(launch)?;
        info!("opened {id} ({} of {})", self.tabs.len(), self.tabs.limit());
        Ok(id)
    }

    /// The tab was rendered at `size`: create and bind its session.
    ///
    /// Runs at most once per tab. A failed spawn returns the error and leaves
    /// the tab unbound so a later call can retry.
    pub async fn tab_ready(
        &mut self,
        tab_id: TabId,
        size: TermSize,
        sink: Arc<dyn DisplaySink>,
    ) -> Result<ReadyOutcome, MuxError> {
        let Some(tab) = self.tabs.get(tab_id) else {
            debug!("ready report for unknown {tab_id}");
            return Ok(ReadyOutcome::UnknownTab);
        };
        let launch = tab.launch().clone();

        if !self.tabs.begin_spawn(tab_id) {
            debug!("{tab_id} already started");
            return Ok(ReadyOutcome::AlreadyStarted);
        }

        match self.controller.create_session(&launch, size, sink).await {
            Ok(session_id) => {
                self.tabs.bind_session(tab_id, session_id.clone());
                Ok(ReadyOutcome::Created(session_id))
            }
            Err(e) => {
                self.tabs.abort_spawn(tab_id);
                Err(e)
            }
        }
    }

    /// Close a tab, terminating its session first.
    ///
    /// Returns `false` if the tab does not exist.
    pub async fn close_tab(&mut self, tab_id: TabId) -> bool {
        let Some(tab) = self.tabs.get(tab_id) else {
            return false;
        };
        if let Some(session_id) = tab.session_id().cloned() {
            self.controller.terminate_session(&session_id).await;
        }
        let removed = self.tabs.remove_tab(tab_id).is_some();
        info!("closed {tab_id}");
        removed
    }

    pub fn switch_tab(&mut self, tab_id: TabId) -> bool {
        self.tabs.set_active(tab_id)
    }

    /// Send input to the tab's session. No-op for unbound or unknown tabs.
    pub async fn forward_input(&self, tab_id: TabId, data: &[u8]) {
        if let Some(session_id) = self.bound_session(tab_id) {
            self.controller.send_input(session_id, data).await;
        }
    }

    /// Resize the tab's session. No-op for unbound or unknown tabs.
    pub async fn forward_resize(&self, tab_id: TabId, size: TermSize) {
        if let Some(session_id) = self.bound_session(tab_id) {
            self.controller.resize(session_id, size).await;
        }
    }

    pub fn report_status(&mut self, report: StatusReport) -> StatusChange {
        self.controller.report_status(report)
    }

    pub fn active_tab(&self) -> Option<&Tab> {
        self.tabs.active_tab()
    }

    /// The session bound to the active tab.
    pub fn active_session(&self) -> Option<&Session> {
        let session_id = self.active_tab()?.session_id()?;
        self.controller.session(session_id)
    }

    /// Whether the active tab hosts an agent that has not finished.
    pub fn is_active_agent_running(&self) -> bool {
        self.active_session()
            .is_some_and(|s| s.kind().is_agent() && s.is_live())
    }

    pub fn tab(&self, tab_id: TabId) -> Option<&Tab> {
        self.tabs.get(tab_id)
    }

    pub fn tab_for_session(&self, session_id: &SessionId) -> Option<&Tab> {
        self.tabs.find_by_session(session_id)
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    pub fn default_dir(&self) -> &Path {
        &self.default_dir
    }

    pub fn snapshot(&self) -> MuxSnapshot {
        let tabs = self
            .tabs
            .tabs()
            .iter()
            .map(|tab| TabView {
                id: tab.id(),
                label: tab.label().to_string(),
                is_active: tab.is_active(),
                session_id: tab.session_id().cloned(),
                status: self.tab_status(tab),
            })
            .collect();

        MuxSnapshot {
            tabs,
            active_tab: self.tabs.active_tab().map(Tab::id),
            can_add_tab: self.tabs.can_add_tab(),
        }
    }

    /// Close every tab and terminate any session left without one.
    pub async fn close_all(&mut self) {
        let ids: Vec<TabId> = self.tabs.tabs().iter().map(Tab::id).collect();
        for tab_id in ids {
            self.close_tab(tab_id).await;
        }
        self.controller.shutdown().await;
    }

    fn bound_session(&self, tab_id: TabId) -> Option<&SessionId> {
        self.tabs.get(tab_id)?.session_id()
    }

    fn tab_status(&self, tab: &Tab) -> Option<SessionStatus> {
        let session_id = tab.session_id()?;
        self.controller.session(session_id).map(Session::status)
    }
}
