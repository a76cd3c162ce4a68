//! The shared event source that process output and status changes arrive on.
//!
//! Events are untyped by subscriber: every handler on a stream sees every
//! event, tagged with the session id it belongs to, and filters for itself.
//! [`EventBus`] is the in-process implementation the PTY backend emits into.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::session::{SessionId, SessionStatus};

/// Output event streams, one per session kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputStream {
    Agent,
    Shell,
}

impl OutputStream {
    pub fn name(self) -> &'static str {
        match self {
            OutputStream::Agent => "agent-output",
            OutputStream::Shell => "pty-output",
        }
    }
}

/// Status event streams, one per session kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusStream {
    Agent,
    Shell,
}

impl StatusStream {
    pub fn name(self) -> &'static str {
        match self {
            StatusStream::Agent => "agent-status-changed",
            StatusStream::Shell => "pty-status-changed",
        }
    }
}

pub type OutputHandler = Box<dyn Fn(&SessionId, &[u8]) + Send + Sync>;
pub type StatusHandler = Box<dyn Fn(&SessionId, SessionStatus) + Send + Sync>;

/// Handle returned by a subscription, used to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

/// A source of output and status events.
pub trait EventSource: Send + Sync {
    fn subscribe_output(&self, stream: OutputStream, handler: OutputHandler) -> SubscriptionToken;

    fn subscribe_status(&self, stream: StatusStream, handler: StatusHandler) -> SubscriptionToken;

    /// Cancel a subscription. Once this returns the handler is not running
    /// and will never be called again. Returns `false` for unknown tokens.
    fn unsubscribe(&self, token: SubscriptionToken) -> bool;
}

#[derive(Default)]
struct Subscribers {
    output: Vec<(SubscriptionToken, OutputStream, OutputHandler)>,
    status: Vec<(SubscriptionToken, StatusStream, StatusHandler)>,
}

/// In-process event source.
///
/// Handlers run synchronously on the emitting thread while the subscriber
/// table is locked, so events from one emitter reach each handler in emit
/// order. Handlers must not block and must not call back into the bus.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Subscribers>,
    next_token: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an output chunk to every handler on `stream`.
    ///
    /// Returns the number of handlers invoked.
    pub fn emit_output(&self, stream: OutputStream, session_id: &SessionId, data: &[u8]) -> usize {
        let subscribers = self.lock();
        let mut delivered = 0;
        for (_, s, handler) in &subscribers.output {
            if *s == stream {
                handler(session_id, data);
                delivered += 1;
            }
        }
        delivered
    }

    /// Deliver a status change to every handler on `stream`.
    pub fn emit_status(
        &self,
        stream: StatusStream,
        session_id: &SessionId,
        status: SessionStatus,
    ) -> usize {
        let subscribers = self.lock();
        let mut delivered = 0;
        for (_, s, handler) in &subscribers.status {
            if *s == stream {
                handler(session_id, status);
                delivered += 1;
            }
        }
        delivered
    }

    /// Total number of active subscriptions.
    pub fn subscriber_count(&self) -> usize {
        let subscribers = self.lock();
        subscribers.output.len() + subscribers.status.len()
    }

    fn next_token(&self) -> SubscriptionToken {
        SubscriptionToken(self.next_token.fetch_add(1, Ordering::Relaxed))
    }

    fn lock(&self) -> MutexGuard<'_, Subscribers> {
        // A handler that panicked leaves the table itself consistent.
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl EventSource for EventBus {
    fn subscribe_output(&self, stream: OutputStream, handler: OutputHandler) -> SubscriptionToken {
        let token = self.next_token();
        self.lock().output.push((token, stream, handler));
        token
    }

    fn subscribe_status(&self, stream: StatusStream, handler: StatusHandler) -> SubscriptionToken {
        let token = self.next_token();
        self.lock().status.push((token, stream, handler));
        token
    }

    fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let mut subscribers = self.lock();
        let before = subscribers.output.len() + subscribers.status.len();
        subscribers.output.retain(|(t, _, _)| *t != token);
        subscribers.status.retain(|(t, _, _)| *t != token);
        before != subscribers.output.len() + subscribers.status.len()
    }
}
