//! Per-session output subscriptions.
//!
//! The relay holds exactly one subscription per attached session. Each
//! subscription filters the shared output stream down to its own session id
//! and writes the matching chunks, in arrival order, to that session's sink.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;

use crate::events::{EventSource, OutputStream, SubscriptionToken};
use crate::session::SessionId;

/// Where a session's output is displayed.
///
/// `write` runs on the thread that emitted the output and must not block.
pub trait DisplaySink: Send + Sync {
    fn write(&self, data: &[u8]);
}

pub struct OutputRelay {
    events: Arc<dyn EventSource>,
    subscriptions: HashMap<SessionId, SubscriptionToken>,
}

impl OutputRelay {
    pub fn new(events: Arc<dyn EventSource>) -> Self {
        Self {
            events,
            subscriptions: HashMap::new(),
        }
    }

    /// Subscribe `sink` to the output of `session_id` on `stream`.
    ///
    /// An existing subscription for the same session is cancelled first.
    pub fn attach(&mut self, session_id: SessionId, stream: OutputStream, sink: Arc<dyn DisplaySink>) {
        self.detach(&session_id);

        let target = session_id.clone();
        let token = self.events.subscribe_output(
            stream,
            Box::new(move |id, data| {
                if *id == target {
                    sink.write(data);
                }
            }),
        );
        debug!("relay: attached {session_id} to {}", stream.name());
        self.subscriptions.insert(session_id, token);
    }

    /// Cancel the subscription for `session_id`. Returns `false` if there
    /// was none.
    pub fn detach(&mut self, session_id: &SessionId) -> bool {
        match self.subscriptions.remove(session_id) {
            Some(token) => {
                self.events.unsubscribe(token);
                debug!("relay: detached {session_id}");
                true
            }
            None => false,
        }
    }

    pub fn is_attached(&self, session_id: &SessionId) -> bool {
        self.subscriptions.contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

impl Drop for OutputRelay {
    fn drop(&mut self) {
        for (_, token) in self.subscriptions.drain() {
            self.events.unsubscribe(token);
        }
    }
}
