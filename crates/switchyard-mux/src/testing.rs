//! Test doubles shared by the unit tests in this crate.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::backend::{BackendError, ProcessBackend};
use crate::events::{EventBus, OutputStream};
use crate::relay::DisplaySink;
use crate::session::{AgentLaunch, SessionId, TermSize};

#[derive(Default)]
pub struct RecordingSink {
    chunks: Mutex<Vec<Vec<u8>>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn chunks(&self) -> Vec<Vec<u8>> {
        self.chunks.lock().unwrap().clone()
    }

    pub fn text(&self) -> String {
        String::from_utf8(self.chunks().concat()).unwrap()
    }
}

impl DisplaySink for RecordingSink {
    fn write(&self, data: &[u8]) {
        self.chunks.lock().unwrap().push(data.to_vec());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    SpawnAgent(AgentLaunch, TermSize),
    SpawnShell(PathBuf, TermSize),
    StartOutput(SessionId),
    Input(SessionId, Vec<u8>),
    Resize(SessionId, TermSize),
    Terminate(SessionId),
}

/// Backend that records every call and hands out scripted session ids.
#[derive(Default)]
pub struct FakeBackend {
    calls: Mutex<Vec<Call>>,
    ids: Mutex<VecDeque<SessionId>>,
    fail_spawns: Mutex<usize>,
    fail_control: Mutex<bool>,
    /// When set, `terminate` emits a chunk for the session on this bus
    /// before returning, to observe whether its subscription is still live.
    late_output: Option<Arc<EventBus>>,
    counter: Mutex<u64>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_late_output(bus: Arc<EventBus>) -> Arc<Self> {
        Arc::new(Self {
            late_output: Some(bus),
            ..Self::default()
        })
    }

    pub fn with_ids(self: &Arc<Self>, ids: &[&str]) -> Arc<Self> {
        self.ids
            .lock()
            .unwrap()
            .extend(ids.iter().map(|id| SessionId::from(*id)));
        Arc::clone(self)
    }

    pub fn fail_next_spawns(&self, n: usize) {
        *self.fail_spawns.lock().unwrap() = n;
    }

    pub fn fail_control_calls(&self) {
        *self.fail_control.lock().unwrap() = true;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn next_id(&self) -> Result<SessionId, BackendError> {
        {
            let mut failures = self.fail_spawns.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(BackendError::SpawnFailed("scripted failure".to_string()));
            }
        }
        if let Some(id) = self.ids.lock().unwrap().pop_front() {
            return Ok(id);
        }
        let mut counter = self.counter.lock().unwrap();
        *counter += 1;
        Ok(SessionId::new(format!("fake-{counter}")))
    }

    fn control_result(&self, session_id: &SessionId) -> Result<(), BackendError> {
        if *self.fail_control.lock().unwrap() {
            Err(BackendError::Closed(session_id.clone()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ProcessBackend for FakeBackend {
    async fn spawn_agent(&self, launch: &AgentLaunch, size: TermSize) -> Result<SessionId, BackendError> {
        self.record(Call::SpawnAgent(launch.clone(), size));
        self.next_id()
    }

    async fn spawn_shell(&self, working_dir: &Path, size: TermSize) -> Result<SessionId, BackendError> {
        self.record(Call::SpawnShell(working_dir.to_path_buf(), size));
        self.next_id()
    }

    async fn start_output(&self, session_id: &SessionId) -> Result<(), BackendError> {
        self.record(Call::StartOutput(session_id.clone()));
        Ok(())
    }

    async fn send_input(&self, session_id: &SessionId, data: &[u8]) -> Result<(), BackendError> {
        self.record(Call::Input(session_id.clone(), data.to_vec()));
        self.control_result(session_id)
    }

    async fn resize(&self, session_id: &SessionId, size: TermSize) -> Result<(), BackendError> {
        self.record(Call::Resize(session_id.clone(), size));
        self.control_result(session_id)
    }

    async fn terminate(&self, session_id: &SessionId) -> Result<(), BackendError> {
        self.record(Call::Terminate(session_id.clone()));
        if let Some(bus) = &self.late_output {
            bus.emit_output(OutputStream::Shell, session_id, b"late");
            bus.emit_output(OutputStream::Agent, session_id, b"late");
        }
        self.control_result(session_id)
    }
}
