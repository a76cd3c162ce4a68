//! Per-session I/O threads.
//!
//! PTY reads and writes block, so each session gets two dedicated OS threads:
//! a reader that streams output into the event bus, and a writer that applies
//! queued input and resize commands in order. Neither thread touches the
//! backend's session table.

use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use log::{debug, warn};
use portable_pty::{Child, MasterPty};
use switchyard_mux::{
    AgentStatus, EventBus, OutputStream, SessionId, SessionStatus, ShellStatus, StatusStream,
    TermSize,
};
use tokio::sync::{mpsc, oneshot};

use crate::pty;

pub(crate) const READ_BUFFER_SIZE: usize = 4096;

/// How long the reader waits for a child to be reaped after its output ends.
const REAP_ATTEMPTS: u32 = 20;
const REAP_INTERVAL: Duration = Duration::from_millis(50);

pub(crate) type SharedChild = Arc<Mutex<Box<dyn Child + Send + Sync>>>;

pub(crate) fn lock_child(child: &SharedChild) -> MutexGuard<'_, Box<dyn Child + Send + Sync>> {
    child.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Which event streams a session reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessKind {
    Agent,
    Shell,
}

impl ProcessKind {
    fn output_stream(self) -> OutputStream {
        match self {
            ProcessKind::Agent => OutputStream::Agent,
            ProcessKind::Shell => OutputStream::Shell,
        }
    }

    fn status_stream(self) -> StatusStream {
        match self {
            ProcessKind::Agent => StatusStream::Agent,
            ProcessKind::Shell => StatusStream::Shell,
        }
    }

    fn started(self) -> SessionStatus {
        match self {
            ProcessKind::Agent => AgentStatus::Running.into(),
            ProcessKind::Shell => ShellStatus::Connected.into(),
        }
    }

    fn exited(self, exit_code: Option<u32>) -> SessionStatus {
        match (self, exit_code) {
            (ProcessKind::Agent, Some(0)) => AgentStatus::Completed.into(),
            (ProcessKind::Agent, _) => AgentStatus::Error.into(),
            (ProcessKind::Shell, Some(_)) => ShellStatus::Disconnected.into(),
            (ProcessKind::Shell, None) => ShellStatus::Error.into(),
        }
    }
}

/// Commands for the writer thread, applied in the order they were queued.
#[derive(Debug)]
pub(crate) enum WriterCommand {
    Write(Vec<u8>),
    Resize(TermSize),
    Close,
}

/// Start the output reader for a session.
///
/// The thread waits for `attach_rx` before its first read, so no output is
/// emitted until the session is registered. If the sender is dropped first
/// the thread exits without reading.
pub(crate) fn start_reader(
    session_id: SessionId,
    kind: ProcessKind,
    reader: Box<dyn Read + Send>,
    child: SharedChild,
    events: Arc<EventBus>,
    attach_rx: oneshot::Receiver<()>,
) -> io::Result<()> {
    thread::Builder::new()
        .name(format!("pty-read-{session_id}"))
        .spawn(move || {
            if attach_rx.blocking_recv().is_err() {
                debug!("session {session_id} closed before output started");
                return;
            }
            events.emit_status(kind.status_stream(), &session_id, kind.started());
            read_loop(&session_id, kind, reader, &events);

            let exit_code = reap(&child);
            debug!("session {session_id} exited with {exit_code:?}");
            events.emit_status(kind.status_stream(), &session_id, kind.exited(exit_code));
        })?;
    Ok(())
}

fn read_loop(session_id: &SessionId, kind: ProcessKind, mut reader: Box<dyn Read + Send>, events: &EventBus) {
    let mut buf = [0u8; READ_BUFFER_SIZE];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => return,
            Ok(n) => {
                events.emit_output(kind.output_stream(), session_id, &buf[..n]);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            // Linux reports EIO once the child side of the PTY is closed.
            Err(e) => {
                debug!("read from {session_id} ended: {e}");
                return;
            }
        }
    }
}

/// Collect the child's exit code, giving it a short grace period to exit.
fn reap(child: &SharedChild) -> Option<u32> {
    for _ in 0..REAP_ATTEMPTS {
        match lock_child(child).try_wait() {
            Ok(Some(status)) => return Some(status.exit_code()),
            Ok(None) => {}
            Err(e) => {
                warn!("failed to query child status: {e}");
                return None;
            }
        }
        thread::sleep(REAP_INTERVAL);
    }
    None
}

/// Start the command writer for a session.
///
/// The thread owns the PTY master and writer and exits on `Close` or when
/// every sender is gone, closing the master side.
pub(crate) fn start_writer(
    session_id: SessionId,
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    commands: mpsc::UnboundedReceiver<WriterCommand>,
) -> io::Result<()> {
    thread::Builder::new()
        .name(format!("pty-write-{session_id}"))
        .spawn(move || write_loop(&session_id, master, writer, commands))?;
    Ok(())
}

fn write_loop(
    session_id: &SessionId,
    master: Box<dyn MasterPty + Send>,
    mut writer: Box<dyn Write + Send>,
    mut commands: mpsc::UnboundedReceiver<WriterCommand>,
) {
    while let Some(command) = commands.blocking_recv() {
        match command {
            WriterCommand::Write(data) => {
                if let Err(e) = pty::write_all(writer.as_mut(), &data) {
                    warn!("write to {session_id} failed: {e}");
                    return;
                }
            }
            WriterCommand::Resize(size) => {
                if let Err(e) = pty::resize(master.as_ref(), size) {
                    warn!("resize of {session_id} failed: {e}");
                }
            }
            WriterCommand::Close => return,
        }
    }
}
