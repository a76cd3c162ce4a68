//! [`ProcessBackend`] over real pseudo-terminals.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use log::{debug, info, warn};
use portable_pty::CommandBuilder;
use switchyard_mux::{AgentLaunch, BackendError, EventBus, ProcessBackend, SessionId, TermSize};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::command::PtyConfig;
use crate::io_thread::{lock_child, start_reader, start_writer, ProcessKind, SharedChild, WriterCommand};
use crate::pty::PtyHandle;

struct PtySession {
    kind: ProcessKind,
    commands: mpsc::UnboundedSender<WriterCommand>,
    /// Taken by `start_output`; dropping it stops a reader that never started.
    attach: Option<oneshot::Sender<()>>,
    child: SharedChild,
}

/// Spawns shells and agents on PTYs and streams their output into an
/// [`EventBus`].
pub struct PtyBackend {
    config: PtyConfig,
    events: Arc<EventBus>,
    sessions: Mutex<HashMap<SessionId, PtySession>>,
}

impl PtyBackend {
    pub fn new(config: PtyConfig, events: Arc<EventBus>) -> Self {
        Self {
            config,
            events,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &PtyConfig {
        &self.config
    }

    /// Ids of processes that have not been terminated.
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, PtySession>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn spawn(
        &self,
        kind: ProcessKind,
        cmd: CommandBuilder,
        size: TermSize,
        first_input: Option<Vec<u8>>,
    ) -> Result<SessionId, BackendError> {
        let session_id = SessionId::new(Uuid::new_v4().to_string());
        let handle = PtyHandle::spawn(cmd, size)?;
        let child: SharedChild = Arc::new(Mutex::new(handle.child));

        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (attach, attach_rx) = oneshot::channel();

        let started = start_writer(session_id.clone(), handle.master, handle.writer, commands_rx)
            .and_then(|()| {
                start_reader(
                    session_id.clone(),
                    kind,
                    handle.reader,
                    Arc::clone(&child),
                    Arc::clone(&self.events),
                    attach_rx,
                )
            });
        if let Err(e) = started {
            kill_and_reap(&session_id, &child);
            return Err(BackendError::SpawnFailed(format!("failed to start I/O threads: {e}")));
        }

        if let Some(data) = first_input {
            // The writer was just started, so the queue is open.
            let _ = commands.send(WriterCommand::Write(data));
        }

        self.lock().insert(
            session_id.clone(),
            PtySession {
                kind,
                commands,
                attach: Some(attach),
                child,
            },
        );
        info!("spawned {kind:?} process {session_id} at {size}");
        Ok(session_id)
    }

    fn send_command(&self, session_id: &SessionId, command: WriterCommand) -> Result<(), BackendError> {
        let sessions = self.lock();
        let session = sessions
            .get(session_id)
            .ok_or_else(|| BackendError::SessionNotFound(session_id.clone()))?;
        session
            .commands
            .send(command)
            .map_err(|_| BackendError::Closed(session_id.clone()))
    }
}

#[async_trait]
impl ProcessBackend for PtyBackend {
    async fn spawn_agent(&self, launch: &AgentLaunch, size: TermSize) -> Result<SessionId, BackendError> {
        let cmd = self.config.agent_command(launch);
        let first_input = (!launch.issue_context.is_empty())
            .then(|| format!("{}\n", launch.issue_context).into_bytes());
        self.spawn(ProcessKind::Agent, cmd, size, first_input)
    }

    async fn spawn_shell(&self, working_dir: &Path, size: TermSize) -> Result<SessionId, BackendError> {
        let cmd = self.config.shell_command(working_dir);
        self.spawn(ProcessKind::Shell, cmd, size, None)
    }

    async fn start_output(&self, session_id: &SessionId) -> Result<(), BackendError> {
        let attach = {
            let mut sessions = self.lock();
            let session = sessions
                .get_mut(session_id)
                .ok_or_else(|| BackendError::SessionNotFound(session_id.clone()))?;
            session.attach.take()
        };
        match attach {
            Some(attach) => attach
                .send(())
                .map_err(|()| BackendError::Closed(session_id.clone())),
            None => {
                debug!("output for {session_id} already started");
                Ok(())
            }
        }
    }

    async fn send_input(&self, session_id: &SessionId, data: &[u8]) -> Result<(), BackendError> {
        self.send_command(session_id, WriterCommand::Write(data.to_vec()))
    }

    async fn resize(&self, session_id: &SessionId, size: TermSize) -> Result<(), BackendError> {
        self.send_command(session_id, WriterCommand::Resize(size))
    }

    async fn terminate(&self, session_id: &SessionId) -> Result<(), BackendError> {
        let session = self
            .lock()
            .remove(session_id)
            .ok_or_else(|| BackendError::SessionNotFound(session_id.clone()))?;

        let _ = session.commands.send(WriterCommand::Close);
        drop(session.attach);

        let id = session_id.clone();
        let child = session.child;
        tokio::task::spawn_blocking(move || kill_and_reap(&id, &child))
            .await
            .map_err(|e| BackendError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

        info!("terminated {:?} process {session_id}", session.kind);
        Ok(())
    }
}

impl Drop for PtyBackend {
    fn drop(&mut self) {
        for (session_id, session) in self.lock().drain() {
            let _ = session.commands.send(WriterCommand::Close);
            if let Err(e) = lock_child(&session.child).kill() {
                debug!("kill of {session_id} on drop failed: {e}");
            }
        }
    }
}

fn kill_and_reap(session_id: &SessionId, child: &SharedChild) {
    let mut child = lock_child(child);
    if let Err(e) = child.kill() {
        // Already exited; wait() below still reaps it.
        debug!("kill of {session_id} failed: {e}");
    }
    if let Err(e) = child.wait() {
        warn!("failed to reap {session_id}: {e}");
    }
}
