//! Output sink: where the orchestrator presents things to the user.

use serde::{Deserialize, Serialize};

/// What kind of message is being presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    /// A direct answer from the assistant
    Reply,
    /// Progress lines (job started, thinking)
    Status,
    /// A summarized job result
    Notification,
    /// A failed turn
    Error,
}

/// A side-effecting presentation boundary. Implementations must not block
/// for long; they are called from the scheduler and from bus handlers.
pub trait OutputSink: Send + Sync {
    fn present(&self, kind: OutputKind, content: &str);
}
