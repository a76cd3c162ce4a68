use thiserror::Error;

use crate::backend::BackendError;

/// Errors surfaced by the multiplexer to its immediate caller.
///
/// Stale references (input, resize or status for a session that is already
/// gone) are not errors; those operations are silent no-ops.
#[derive(Debug, Error)]
pub enum MuxError {
    #[error("tab limit of {limit} reached")]
    TabLimitReached { limit: usize },

    #[error("invalid terminal size {cols}x{rows}")]
    InvalidSize { cols: u16, rows: u16 },

    #[error("session spawn failed: {0}")]
    Spawn(#[source] BackendError),
}
