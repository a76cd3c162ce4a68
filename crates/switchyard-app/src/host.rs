//! The owning task: applies IPC requests and status reports to the
//! multiplexer one at a time, and writes events to the UI.

use std::io;
use std::sync::Arc;

use log::{debug, info, warn};
use switchyard_mux::{
    AgentLaunch, DisplaySink, LaunchSpec, Multiplexer, ReadyOutcome, StatusReceiver, StatusReport,
    TabId, TermSize,
};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::ipc::{Event, Request};

pub type EventSender = mpsc::UnboundedSender<Event>;

/// Whether the host keeps reading requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Display sink for one tab. Chunks join the shared event queue in the order
/// the session's reader produced them.
pub struct TabSink {
    tab_id: TabId,
    events: EventSender,
}

impl DisplaySink for TabSink {
    fn write(&self, data: &[u8]) {
        // Fails only once the writer task is gone at exit.
        let _ = self.events.send(Event::Output {
            tab_id: self.tab_id,
            data: data.to_vec(),
        });
    }
}

pub struct Host {
    mux: Multiplexer,
    events: EventSender,
}

impl Host {
    pub fn new(mux: Multiplexer, events: EventSender) -> Self {
        Self { mux, events }
    }

    pub async fn handle(&mut self, request: Request) -> Flow {
        match request {
            Request::NewTab { working_dir } => {
                let opened = match working_dir {
                    Some(dir) => self.mux.new_tab_with(LaunchSpec::shell(dir)),
                    None => self.mux.new_tab(),
                };
                self.tab_opened(opened);
            }
            Request::NewAgentTab {
                worktree_path,
                issue_context,
                mode,
            } => {
                let opened = self.mux.new_tab_with(LaunchSpec::Agent(AgentLaunch {
                    worktree_path,
                    issue_context,
                    mode,
                }));
                self.tab_opened(opened);
            }
            Request::TabReady { tab_id, cols, rows } => {
                let Some(size) = self.size(cols, rows) else {
                    return Flow::Continue;
                };
                let sink = Arc::new(TabSink {
                    tab_id,
                    events: self.events.clone(),
                });
                match self.mux.tab_ready(tab_id, size, sink).await {
                    Ok(ReadyOutcome::Created(session_id)) => {
                        self.emit(Event::SessionStarted { tab_id, session_id });
                        self.emit_snapshot();
                    }
                    Ok(outcome) => debug!("tab_ready for {tab_id}: {outcome:?}"),
                    Err(e) => {
                        warn!("failed to start session for {tab_id}: {e}");
                        self.emit(Event::error(e.to_string()));
                    }
                }
            }
            Request::CloseTab { tab_id } => {
                if self.mux.close_tab(tab_id).await {
                    self.emit_snapshot();
                }
            }
            Request::SwitchTab { tab_id } => {
                if self.mux.switch_tab(tab_id) {
                    self.emit_snapshot();
                }
            }
            Request::Input { tab_id, data } => {
                self.mux.forward_input(tab_id, &data).await;
            }
            Request::Resize { tab_id, cols, rows } => {
                if let Some(size) = self.size(cols, rows) {
                    self.mux.forward_resize(tab_id, size).await;
                }
            }
            Request::AgentStatus { session_id } => {
                let status = self.mux.controller().agent_status(&session_id);
                self.emit(Event::AgentStatus { session_id, status });
            }
            Request::Snapshot => self.emit_snapshot(),
            Request::Shutdown => return Flow::Stop,
        }
        Flow::Continue
    }

    /// Apply a status report; the UI hears about it only if it changed
    /// something.
    pub fn handle_status(&mut self, report: StatusReport) {
        if self.mux.report_status(report).is_applied() {
            self.emit_snapshot();
        }
    }

    /// Parse and apply one request line.
    pub async fn handle_line(&mut self, line: &str) -> Flow {
        let line = line.trim();
        if line.is_empty() {
            return Flow::Continue;
        }
        match serde_json::from_str::<Request>(line) {
            Ok(request) => self.handle(request).await,
            Err(e) => {
                warn!("invalid request: {e}");
                self.emit(Event::error(format!("invalid request: {e}")));
                Flow::Continue
            }
        }
    }

    /// Close every tab and terminate every session.
    pub async fn shutdown(&mut self) {
        self.mux.close_all().await;
        info!("all sessions closed");
    }

    pub fn mux(&self) -> &Multiplexer {
        &self.mux
    }

    fn tab_opened(&self, opened: Result<TabId, switchyard_mux::MuxError>) {
        match opened {
            Ok(tab_id) => {
                self.emit(Event::TabOpened { tab_id });
                self.emit_snapshot();
            }
            Err(e) => self.emit(Event::error(e.to_string())),
        }
    }

    fn size(&self, cols: u16, rows: u16) -> Option<TermSize> {
        match TermSize::new(cols, rows) {
            Ok(size) => Some(size),
            Err(e) => {
                self.emit(Event::error(e.to_string()));
                None
            }
        }
    }

    fn emit_snapshot(&self) {
        self.emit(Event::Snapshot(self.mux.snapshot()));
    }

    fn emit(&self, event: Event) {
        if self.events.send(event).is_err() {
            debug!("event dropped: writer closed");
        }
    }
}

/// Drive the host until `Shutdown` or the end of input, then close
/// everything.
pub async fn run(
    mut host: Host,
    mut requests: mpsc::UnboundedReceiver<String>,
    mut status_rx: StatusReceiver,
) {
    loop {
        tokio::select! {
            line = requests.recv() => match line {
                Some(line) => {
                    if host.handle_line(&line).await == Flow::Stop {
                        info!("shutdown requested");
                        break;
                    }
                }
                None => {
                    info!("input closed");
                    break;
                }
            },
            Some(report) = status_rx.recv() => host.handle_status(report),
        }
    }
    host.shutdown().await;
}

/// Write events as JSON lines until every sender is dropped.
pub fn spawn_writer<W>(mut out: W, mut events: mpsc::UnboundedReceiver<Event>) -> JoinHandle<io::Result<()>>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let mut line = serde_json::to_vec(&event)?;
            line.push(b'\n');
            out.write_all(&line).await?;
            out.flush().await?;
        }
        Ok(())
    })
}

/// Forward stdin lines to the host from a dedicated OS thread.
///
/// Blocking reads stay off the runtime, so a pending read never delays
/// shutdown. The channel closes at end of input.
pub fn start_stdin_reader() -> io::Result<mpsc::UnboundedReceiver<String>> {
    use std::io::BufRead;

    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("stdin read failed: {e}");
                        return;
                    }
                };
                if tx.send(line).is_err() {
                    return;
                }
            }
        })?;
    Ok(rx)
}
