//! Session orchestration.
//!
//! The controller is the single writer of the session registry. It pairs
//! every registry insert with an output subscription and every removal with
//! an unsubscribe, and turns asynchronous status events into registry
//! updates on the owning task.

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::backend::ProcessBackend;
use crate::error::MuxError;
use crate::events::{EventSource, OutputStream, StatusStream, SubscriptionToken};
use crate::registry::{SessionRegistry, StatusChange};
use crate::relay::{DisplaySink, OutputRelay};
use crate::session::{AgentStatus, LaunchSpec, Session, SessionId, SessionStatus, TermSize};

/// A status change reported by the event source, queued for the owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub session_id: SessionId,
    pub status: SessionStatus,
}

/// Receiving end of the controller's status queue.
///
/// The task that owns the controller drains this and feeds each report back
/// through [`SessionController::report_status`].
pub type StatusReceiver = mpsc::UnboundedReceiver<StatusReport>;

pub struct SessionController {
    backend: Arc<dyn ProcessBackend>,
    events: Arc<dyn EventSource>,
    registry: SessionRegistry,
    relay: OutputRelay,
    status_subscriptions: Vec<SubscriptionToken>,
}

impl SessionController {
    /// Create a controller and subscribe it to both status streams.
    pub fn new(backend: Arc<dyn ProcessBackend>, events: Arc<dyn EventSource>) -> (Self, StatusReceiver) {
        let (status_tx, status_rx) = mpsc::unbounded_channel();

        let status_subscriptions = [StatusStream::Agent, StatusStream::Shell]
            .into_iter()
            .map(|stream| {
                let tx = status_tx.clone();
                events.subscribe_status(
                    stream,
                    Box::new(move |session_id, status| {
                        // The receiver is gone only while the owner shuts down.
                        let _ = tx.send(StatusReport {
                            session_id: session_id.clone(),
                            status,
                        });
                    }),
                )
            })
            .collect();

        let controller = Self {
            backend,
            relay: OutputRelay::new(Arc::clone(&events)),
            events,
            registry: SessionRegistry::new(),
            status_subscriptions,
        };
        (controller, status_rx)
    }

    /// Spawn a process for `launch` and register it.
    ///
    /// On failure nothing is recorded and the error is returned unchanged;
    /// retrying is up to the caller.
    pub async fn create_session(
        &mut self,
        launch: &LaunchSpec,
        size: TermSize,
        sink: Arc<dyn DisplaySink>,
    ) -> Result<SessionId, MuxError> {
        let spawned = match launch {
            LaunchSpec::Shell { working_dir } => self.backend.spawn_shell(working_dir, size).await,
            LaunchSpec::Agent(agent) => self.backend.spawn_agent(agent, size).await,
        };
        let session_id = spawned.map_err(MuxError::Spawn)?;

        let kind = launch.kind();
        let stream = if kind.is_agent() {
            OutputStream::Agent
        } else {
            OutputStream::Shell
        };

        if let Some(stale) = self.registry.insert(Session::new(session_id.clone(), kind)) {
            warn!("backend reused session id {}; replacing stale record", stale.id());
        }
        self.relay.attach(session_id.clone(), stream, sink);

        if let Err(e) = self.backend.start_output(&session_id).await {
            warn!("failed to start output for {session_id}: {e}");
        }

        info!("created session {session_id} at {size}");
        Ok(session_id)
    }

    /// Forward input. Dropped silently for unknown sessions.
    pub async fn send_input(&self, session_id: &SessionId, data: &[u8]) {
        if !self.registry.contains(session_id) {
            debug!("dropping {} input bytes for unknown session {session_id}", data.len());
            return;
        }
        if let Err(e) = self.backend.send_input(session_id, data).await {
            warn!("input to {session_id} failed: {e}");
        }
    }

    /// Forward a resize. Dropped silently for unknown sessions.
    pub async fn resize(&self, session_id: &SessionId, size: TermSize) {
        if !self.registry.contains(session_id) {
            debug!("dropping resize for unknown session {session_id}");
            return;
        }
        if let Err(e) = self.backend.resize(session_id, size).await {
            warn!("resize of {session_id} to {size} failed: {e}");
        }
    }

    /// Apply a status change reported by the event source.
    pub fn report_status(&mut self, report: StatusReport) -> StatusChange {
        let change = self.registry.update_status(&report.session_id, report.status);
        match change {
            StatusChange::Applied => {
                info!("session {} is now {:?}", report.session_id, report.status);
            }
            StatusChange::Rejected => {
                debug!(
                    "ignoring status {:?} for session {}",
                    report.status, report.session_id
                );
            }
            StatusChange::Unknown => {
                debug!("ignoring status for unknown session {}", report.session_id);
            }
            StatusChange::Unchanged => {}
        }
        change
    }

    /// Tear a session down: unsubscribe, terminate, then forget it.
    ///
    /// Returns `false` if the session was not registered.
    pub async fn terminate_session(&mut self, session_id: &SessionId) -> bool {
        self.relay.detach(session_id);

        if !self.registry.contains(session_id) {
            debug!("terminate of unknown session {session_id} ignored");
            return false;
        }

        if let Err(e) = self.backend.terminate(session_id).await {
            warn!("terminate of {session_id} failed: {e}");
        }
        self.registry.remove(session_id);
        info!("terminated session {session_id}");
        true
    }

    /// Terminate every registered session.
    pub async fn shutdown(&mut self) {
        for session_id in self.registry.ids() {
            self.terminate_session(&session_id).await;
        }
    }

    pub fn session(&self, session_id: &SessionId) -> Option<&Session> {
        self.registry.get(session_id)
    }

    /// Status of an agent session. `None` for shells and unknown ids.
    pub fn agent_status(&self, session_id: &SessionId) -> Option<AgentStatus> {
        match self.registry.get(session_id)?.status() {
            SessionStatus::Agent(status) => Some(status),
            SessionStatus::Shell(_) => None,
        }
    }

    pub fn sessions(&self) -> Vec<&Session> {
        self.registry.all()
    }

    pub fn live_sessions(&self) -> Vec<&Session> {
        self.registry.live_sessions()
    }

    /// Whether output for `session_id` currently reaches a sink.
    pub fn is_subscribed(&self, session_id: &SessionId) -> bool {
        self.relay.is_attached(session_id)
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        for token in self.status_subscriptions.drain(..) {
            self.events.unsubscribe(token);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::events::EventBus;
    use crate::session::{AgentLaunch, AgentMode, ShellStatus};
    use crate::testing::{Call, FakeBackend, RecordingSink};

    fn controller(backend: &Arc<FakeBackend>) -> (Arc<EventBus>, SessionController, StatusReceiver) {
        let bus = Arc::new(EventBus::new());
        let (controller, rx) = SessionController::new(backend.clone(), bus.clone());
        (bus, controller, rx)
    }

    fn agent_launch() -> LaunchSpec {
        LaunchSpec::Agent(AgentLaunch {
            worktree_path: PathBuf::from("/wt/issue-12"),
            issue_context: "Fix login redirect".to_string(),
            mode: AgentMode::Plan,
        })
    }

    #[tokio::test]
    async fn test_shell_scenario() {
        let bus = Arc::new(EventBus::new());
        let backend = FakeBackend::with_late_output(bus.clone()).with_ids(&["s1"]);
        let (mut controller, _rx) = SessionController::new(backend.clone(), bus.clone());
        let sink = RecordingSink::new();

        let size = TermSize::new(80, 24).unwrap();
        let id = controller
            .create_session(&LaunchSpec::shell("/repo"), size, sink.clone())
            .await
            .unwrap();
        assert_eq!(id, SessionId::from("s1"));

        let bigger = TermSize::new(100, 30).unwrap();
        controller.resize(&id, bigger).await;
        controller.send_input(&id, b"ls\n").await;
        bus.emit_output(OutputStream::Shell, &id, b"file.txt\n");

        assert!(controller.terminate_session(&id).await);

        assert_eq!(
            backend.calls(),
            vec![
                Call::SpawnShell(PathBuf::from("/repo"), size),
                Call::StartOutput(id.clone()),
                Call::Resize(id.clone(), bigger),
                Call::Input(id.clone(), b"ls\n".to_vec()),
                Call::Terminate(id.clone()),
            ]
        );
        // The backend emitted "late" while terminating; it never reached the sink.
        assert_eq!(sink.text(), "file.txt\n");
        assert!(!controller.is_subscribed(&id));
        assert!(controller.session(&id).is_none());
    }

    #[tokio::test]
    async fn test_create_sets_initial_status_and_subscribes() {
        let backend = FakeBackend::new().with_ids(&["a1", "s1"]);
        let (bus, mut controller, _rx) = controller(&backend);

        let agent = controller
            .create_session(&agent_launch(), TermSize::default(), RecordingSink::new())
            .await
            .unwrap();
        let shell = controller
            .create_session(&LaunchSpec::shell("/repo"), TermSize::default(), RecordingSink::new())
            .await
            .unwrap();

        assert_eq!(controller.agent_status(&agent), Some(AgentStatus::Starting));
        assert_eq!(
            controller.session(&shell).unwrap().status(),
            ShellStatus::Connecting.into()
        );
        assert!(controller.agent_status(&shell).is_none());
        assert!(controller.is_subscribed(&agent));
        assert!(controller.is_subscribed(&shell));
        // Two status streams plus one output subscription per session.
        assert_eq!(bus.subscriber_count(), 4);
    }

    #[tokio::test]
    async fn test_spawn_failure_creates_no_state() {
        let backend = FakeBackend::new();
        backend.fail_next_spawns(1);
        let (bus, mut controller, _rx) = controller(&backend);

        let err = controller
            .create_session(&agent_launch(), TermSize::default(), RecordingSink::new())
            .await
            .unwrap_err();

        assert!(matches!(err, MuxError::Spawn(_)));
        assert!(controller.is_empty());
        assert_eq!(bus.subscriber_count(), 2);
        assert!(!backend
            .calls()
            .iter()
            .any(|c| matches!(c, Call::StartOutput(_))));
    }

    #[tokio::test]
    async fn test_unknown_session_input_and_resize_are_dropped() {
        let backend = FakeBackend::new();
        let (_bus, controller, _rx) = controller(&backend);
        let ghost = SessionId::from("ghost");

        controller.send_input(&ghost, b"echo hi\n").await;
        controller.resize(&ghost, TermSize::default()).await;

        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_backend_control_failures_are_not_fatal() {
        let backend = FakeBackend::new().with_ids(&["s1"]);
        let (_bus, mut controller, _rx) = controller(&backend);
        let id = controller
            .create_session(&LaunchSpec::shell("/repo"), TermSize::default(), RecordingSink::new())
            .await
            .unwrap();

        backend.fail_control_calls();
        controller.send_input(&id, b"x").await;
        controller.resize(&id, TermSize::default()).await;
        assert!(controller.session(&id).is_some());

        assert!(controller.terminate_session(&id).await);
        assert!(controller.is_empty());
    }

    #[tokio::test]
    async fn test_status_events_flow_through_queue() {
        let backend = FakeBackend::new().with_ids(&["a1"]);
        let (bus, mut controller, mut rx) = controller(&backend);
        let id = controller
            .create_session(&agent_launch(), TermSize::default(), RecordingSink::new())
            .await
            .unwrap();

        bus.emit_status(StatusStream::Agent, &id, AgentStatus::Running.into());
        bus.emit_status(StatusStream::Agent, &id, AgentStatus::Waiting.into());

        let first = rx.try_recv().unwrap();
        assert_eq!(controller.report_status(first), StatusChange::Applied);
        let second = rx.try_recv().unwrap();
        assert_eq!(controller.report_status(second), StatusChange::Applied);
        assert_eq!(controller.agent_status(&id), Some(AgentStatus::Waiting));
    }

    #[tokio::test]
    async fn test_stale_status_report_is_ignored() {
        let backend = FakeBackend::new();
        let (_bus, mut controller, _rx) = controller(&backend);

        let change = controller.report_status(StatusReport {
            session_id: "gone".into(),
            status: AgentStatus::Completed.into(),
        });
        assert_eq!(change, StatusChange::Unknown);
        assert!(controller.is_empty());
    }

    #[tokio::test]
    async fn test_live_sessions_after_completion() {
        let backend = FakeBackend::new().with_ids(&["a1", "a2"]);
        let (_bus, mut controller, _rx) = controller(&backend);
        let first = controller
            .create_session(&agent_launch(), TermSize::default(), RecordingSink::new())
            .await
            .unwrap();
        let second = controller
            .create_session(&agent_launch(), TermSize::default(), RecordingSink::new())
            .await
            .unwrap();

        controller.report_status(StatusReport {
            session_id: first.clone(),
            status: AgentStatus::Completed.into(),
        });

        let live: Vec<&SessionId> = controller.live_sessions().iter().map(|s| s.id()).collect();
        assert_eq!(live, vec![&second]);
        assert_eq!(controller.sessions().len(), 2);
    }

    #[tokio::test]
    async fn test_terminate_unknown_session() {
        let backend = FakeBackend::new();
        let (_bus, mut controller, _rx) = controller(&backend);

        assert!(!controller.terminate_session(&"nope".into()).await);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_terminates_everything() {
        let backend = FakeBackend::new().with_ids(&["a1", "s1"]);
        let (bus, mut controller, _rx) = controller(&backend);
        controller
            .create_session(&agent_launch(), TermSize::default(), RecordingSink::new())
            .await
            .unwrap();
        controller
            .create_session(&LaunchSpec::shell("/repo"), TermSize::default(), RecordingSink::new())
            .await
            .unwrap();

        controller.shutdown().await;

        assert!(controller.is_empty());
        let terminated = backend
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Terminate(_)))
            .count();
        assert_eq!(terminated, 2);
        assert_eq!(bus.subscriber_count(), 2);

        drop(controller);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
