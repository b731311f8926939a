//! The Backchannel agent: chat in the foreground, tools in the background.
//!
//! 1. **Receive** user input from the event bus
//! 2. **Decide** via the completion service: answer directly, launch a tool, or both
//! 3. **Launch** tools as background jobs that report back on the bus
//! 4. **Notify** the user with a summary when each job finishes
//!
//! Only one turn runs at a time, and pending user input always goes
//! before pending notifications.

pub mod launcher;
pub mod orchestrator;
pub mod queue;

pub use launcher::JobLauncher;
pub use orchestrator::{DEFAULT_POLL_INTERVAL, Orchestrator};
pub use queue::{PendingQueues, WorkItem};
