//! IPC types for communication between the host and its UI process.
//!
//! One JSON object per line in each direction. Requests arrive on stdin,
//! events leave on stdout, both tagged by `type`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use switchyard_mux::{AgentMode, AgentStatus, MuxSnapshot, SessionId, TabId};

/// Requests sent from the UI to the host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Open a shell tab. Without `working_dir` the host's default is used.
    NewTab {
        #[serde(default)]
        working_dir: Option<PathBuf>,
    },
    /// Open a coding-agent tab on a worktree.
    NewAgentTab {
        worktree_path: PathBuf,
        #[serde(default)]
        issue_context: String,
        mode: AgentMode,
    },
    /// The tab was rendered; start its session at this size.
    TabReady { tab_id: TabId, cols: u16, rows: u16 },
    CloseTab { tab_id: TabId },
    SwitchTab { tab_id: TabId },
    /// Raw bytes for the tab's process.
    Input { tab_id: TabId, data: Vec<u8> },
    Resize { tab_id: TabId, cols: u16, rows: u16 },
    /// Ask for an agent session's status.
    AgentStatus { session_id: SessionId },
    Snapshot,
    /// Close every tab and exit.
    Shutdown,
}

/// Events sent from the host to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    TabOpened {
        tab_id: TabId,
    },
    SessionStarted {
        tab_id: TabId,
        session_id: SessionId,
    },
    /// Tabs, focus, and session statuses after a change.
    Snapshot(MuxSnapshot),
    /// A chunk of process output, in order per tab.
    Output {
        tab_id: TabId,
        data: Vec<u8>,
    },
    AgentStatus {
        session_id: SessionId,
        /// `None` for unknown ids and shell sessions.
        status: Option<AgentStatus>,
    },
    Error {
        message: String,
    },
}

impl Event {
    pub fn error(message: impl Into<String>) -> Self {
        Event::Error {
            message: message.into(),
        }
    }
}
