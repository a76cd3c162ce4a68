//! switchyard-mux: the interactive session multiplexer.
//!
//! Keeps several coding-agent and shell sessions alive side by side, each
//! bound to one tab, and guarantees that closing a tab tears its session
//! down without leaking output subscriptions or processes.
//!
//! # Architecture
//!
//! - [`SessionRegistry`] — authoritative session records and status transitions.
//! - [`TabRegistry`] — ordered tabs with a tab limit and a single active tab.
//! - [`OutputRelay`] — one output subscription per live session, routed to its sink.
//! - [`SessionController`] — creates, drives, and tears down sessions through a
//!   [`ProcessBackend`].
//! - [`Multiplexer`] — user-facing tab operations built on the controller.
//!
//! No OS process code lives here; `switchyard-pty` provides the backend.

pub mod backend;
pub mod controller;
pub mod error;
pub mod events;
pub mod multiplexer;
pub mod registry;
pub mod relay;
pub mod session;
pub mod snapshot;
pub mod tabs;

#[cfg(test)]
mod testing;

pub use backend::{BackendError, ProcessBackend};
pub use controller::{SessionController, StatusReceiver, StatusReport};
pub use error::MuxError;
pub use events::{EventBus, EventSource, OutputStream, StatusStream, SubscriptionToken};
pub use multiplexer::{Multiplexer, ReadyOutcome};
pub use registry::{SessionRegistry, StatusChange};
pub use relay::{DisplaySink, OutputRelay};
pub use session::{
    AgentLaunch, AgentMode, AgentStatus, LaunchSpec, Session, SessionId, SessionKind,
    SessionStatus, ShellStatus, TermSize, DEFAULT_TERM_SIZE,
};
pub use snapshot::{MuxSnapshot, TabView};
pub use tabs::{SpawnState, Tab, TabId, TabRegistry, TAB_LIMIT};
