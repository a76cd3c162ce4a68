//! switchyard-pty: PTY-backed process backend for switchyard.
//!
//! Spawns interactive shells and coding agents on pseudo-terminals, streams
//! their output into the shared [`EventBus`](switchyard_mux::EventBus), and
//! reports their status as they start and exit.
//!
//! # Architecture
//!
//! - [`PtyHandle`] — Low-level PTY process creation.
//! - [`PtyConfig`] — Which shell and agent command lines to run.
//! - [`PtyBackend`] — The [`ProcessBackend`](switchyard_mux::ProcessBackend)
//!   implementation, with one reader and one writer thread per session.

pub mod backend;
pub mod command;
mod io_thread;
pub mod pty;

pub use backend::PtyBackend;
pub use command::{default_shell, PtyConfig, DEFAULT_AGENT_PROGRAM, DEFAULT_PLAN_ARGS};
pub use pty::{PtyError, PtyHandle};
