use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MuxError;

/// Unique identifier for a session.
///
/// Assigned by the process backend when the session is spawned and never
/// changed afterwards. The multiplexer treats it as opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermSize {
    pub cols: u16,
    pub rows: u16,
}

/// Size used until a viewport reports its real geometry.
pub const DEFAULT_TERM_SIZE: TermSize = TermSize { cols: 80, rows: 24 };

impl TermSize {
    /// Build a size, rejecting zero columns or rows.
    pub fn new(cols: u16, rows: u16) -> Result<Self, MuxError> {
        if cols == 0 || rows == 0 {
            return Err(MuxError::InvalidSize { cols, rows });
        }
        Ok(Self { cols, rows })
    }
}

impl Default for TermSize {
    fn default() -> Self {
        DEFAULT_TERM_SIZE
    }
}

impl fmt::Display for TermSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    Plan,
    Act,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Starting,
    Running,
    Waiting,
    Completed,
    Error,
}

impl AgentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, AgentStatus::Completed | AgentStatus::Error)
    }

    fn can_transition_to(self, next: AgentStatus) -> bool {
        use AgentStatus::*;
        match (self, next) {
            (Completed | Error, _) => false,
            (Starting, Running | Waiting | Completed | Error) => true,
            (Running, Waiting | Completed | Error) => true,
            (Waiting, Running | Completed | Error) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShellStatus {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

impl ShellStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ShellStatus::Disconnected | ShellStatus::Error)
    }

    fn can_transition_to(self, next: ShellStatus) -> bool {
        use ShellStatus::*;
        match (self, next) {
            (Disconnected | Error, _) => false,
            (Connecting, Connected | Disconnected | Error) => true,
            (Connected, Disconnected | Error) => true,
            _ => false,
        }
    }
}

/// Status of a session, scoped to its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum SessionStatus {
    Agent(AgentStatus),
    Shell(ShellStatus),
}

impl SessionStatus {
    /// Terminal statuses never transition again.
    pub fn is_terminal(self) -> bool {
        match self {
            SessionStatus::Agent(s) => s.is_terminal(),
            SessionStatus::Shell(s) => s.is_terminal(),
        }
    }

    pub fn is_live(self) -> bool {
        !self.is_terminal()
    }

    /// Whether `next` is a legal successor of this status.
    ///
    /// A status of the other session kind is never a legal successor.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        match (self, next) {
            (SessionStatus::Agent(from), SessionStatus::Agent(to)) => from.can_transition_to(to),
            (SessionStatus::Shell(from), SessionStatus::Shell(to)) => from.can_transition_to(to),
            _ => false,
        }
    }
}

impl From<AgentStatus> for SessionStatus {
    fn from(status: AgentStatus) -> Self {
        SessionStatus::Agent(status)
    }
}

impl From<ShellStatus> for SessionStatus {
    fn from(status: ShellStatus) -> Self {
        SessionStatus::Shell(status)
    }
}

/// What kind of process backs a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SessionKind {
    Agent {
        worktree_path: PathBuf,
        mode: AgentMode,
    },
    Shell {
        working_dir: PathBuf,
    },
}

impl SessionKind {
    pub fn is_agent(&self) -> bool {
        matches!(self, SessionKind::Agent { .. })
    }

    /// Status assigned on successful creation, before any external report.
    pub fn initial_status(&self) -> SessionStatus {
        match self {
            SessionKind::Agent { .. } => SessionStatus::Agent(AgentStatus::Starting),
            SessionKind::Shell { .. } => SessionStatus::Shell(ShellStatus::Connecting),
        }
    }
}

/// Parameters for starting a coding-agent session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentLaunch {
    pub worktree_path: PathBuf,
    /// Sent to the agent as its first line of input. Empty means none.
    #[serde(default)]
    pub issue_context: String,
    pub mode: AgentMode,
}

/// What a tab starts once its viewport size is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LaunchSpec {
    Shell { working_dir: PathBuf },
    Agent(AgentLaunch),
}

impl LaunchSpec {
    pub fn shell(working_dir: impl Into<PathBuf>) -> Self {
        LaunchSpec::Shell {
            working_dir: working_dir.into(),
        }
    }

    pub fn kind(&self) -> SessionKind {
        match self {
            LaunchSpec::Shell { working_dir } => SessionKind::Shell {
                working_dir: working_dir.clone(),
            },
            LaunchSpec::Agent(agent) => SessionKind::Agent {
                worktree_path: agent.worktree_path.clone(),
                mode: agent.mode,
            },
        }
    }
}

/// One external interactive process bound into the multiplexer.
///
/// Only `status` and `completed_at` change after creation, and only through
/// the session registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    id: SessionId,
    #[serde(flatten)]
    kind: SessionKind,
    status: SessionStatus,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl Session {
    /// A freshly created session in its kind's initial status.
    pub fn new(id: SessionId, kind: SessionKind) -> Self {
        let status = kind.initial_status();
        Self {
            id,
            kind,
            status,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn kind(&self) -> &SessionKind {
        &self.kind
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn is_live(&self) -> bool {
        self.status.is_live()
    }

    pub(crate) fn set_status(&mut self, status: SessionStatus, at: DateTime<Utc>) {
        self.status = status;
        if status.is_terminal() {
            self.completed_at = Some(at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_transitions() {
        let starting = SessionStatus::Agent(AgentStatus::Starting);
        let running = SessionStatus::Agent(AgentStatus::Running);
        let waiting = SessionStatus::Agent(AgentStatus::Waiting);
        let completed = SessionStatus::Agent(AgentStatus::Completed);

        assert!(starting.can_transition_to(running));
        assert!(running.can_transition_to(waiting));
        assert!(waiting.can_transition_to(running));
        assert!(waiting.can_transition_to(completed));
        assert!(!running.can_transition_to(starting));
        assert!(!completed.can_transition_to(running));
    }

    #[test]
    fn test_shell_transitions() {
        let connecting = SessionStatus::Shell(ShellStatus::Connecting);
        let connected = SessionStatus::Shell(ShellStatus::Connected);
        let disconnected = SessionStatus::Shell(ShellStatus::Disconnected);

        assert!(connecting.can_transition_to(connected));
        assert!(connected.can_transition_to(disconnected));
        assert!(!connected.can_transition_to(connecting));
        assert!(!disconnected.can_transition_to(connected));
        assert!(disconnected.is_terminal());
    }

    #[test]
    fn test_cross_kind_transition_rejected() {
        let running = SessionStatus::Agent(AgentStatus::Running);
        let connected = SessionStatus::Shell(ShellStatus::Connected);
        assert!(!running.can_transition_to(connected));
        assert!(!connected.can_transition_to(running));
    }

    #[test]
    fn test_initial_status() {
        let agent = SessionKind::Agent {
            worktree_path: PathBuf::from("/wt"),
            mode: AgentMode::Plan,
        };
        let shell = SessionKind::Shell {
            working_dir: PathBuf::from("/repo"),
        };
        assert_eq!(agent.initial_status(), AgentStatus::Starting.into());
        assert_eq!(shell.initial_status(), ShellStatus::Connecting.into());
    }

    #[test]
    fn test_term_size_rejects_zero() {
        assert!(TermSize::new(0, 24).is_err());
        assert!(TermSize::new(80, 0).is_err());
        assert_eq!(TermSize::new(100, 30).unwrap(), TermSize { cols: 100, rows: 30 });
        assert_eq!(TermSize::default().to_string(), "80x24");
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&SessionStatus::Agent(AgentStatus::Waiting)).unwrap();
        assert_eq!(json, "\"waiting\"");
        let json = serde_json::to_string(&SessionStatus::Shell(ShellStatus::Connected)).unwrap();
        assert_eq!(json, "\"connected\"");
    }

    #[test]
    fn test_launch_spec_kind() {
        let launch = LaunchSpec::Agent(AgentLaunch {
            worktree_path: PathBuf::from("/wt/issue-7"),
            issue_context: "Fix the bug".to_string(),
            mode: AgentMode::Act,
        });
        assert_eq!(
            launch.kind(),
            SessionKind::Agent {
                worktree_path: PathBuf::from("/wt/issue-7"),
                mode: AgentMode::Act,
            }
        );
        assert!(!LaunchSpec::shell("/repo").kind().is_agent());
    }
}
