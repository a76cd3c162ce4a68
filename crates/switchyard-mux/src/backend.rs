//! The external process capability the multiplexer drives.
//!
//! A backend spawns processes, assigns their session ids, and streams their
//! output and status changes into an [`EventSource`](crate::events::EventSource).
//! Everything except spawning is best-effort from the multiplexer's side.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use crate::session::{AgentLaunch, SessionId, TermSize};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("spawn failed: {0}")]
    SpawnFailed(String),

    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    #[error("session {0} is closed")]
    Closed(SessionId),

    #[error("resize failed: {0}")]
    ResizeFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait ProcessBackend: Send + Sync {
    /// Start a coding agent in `launch.worktree_path`.
    async fn spawn_agent(&self, launch: &AgentLaunch, size: TermSize) -> Result<SessionId, BackendError>;

    /// Start an interactive shell in `working_dir`.
    async fn spawn_shell(&self, working_dir: &Path, size: TermSize) -> Result<SessionId, BackendError>;

    /// Acknowledge creation: the session is registered and subscribed.
    ///
    /// A backend must not emit output for a session before this call, so no
    /// chunk can arrive ahead of its subscription.
    async fn start_output(&self, session_id: &SessionId) -> Result<(), BackendError>;

    async fn send_input(&self, session_id: &SessionId, data: &[u8]) -> Result<(), BackendError>;

    async fn resize(&self, session_id: &SessionId, size: TermSize) -> Result<(), BackendError>;

    /// Stop the process and release its resources.
    async fn terminate(&self, session_id: &SessionId) -> Result<(), BackendError>;
}
