//! The orchestrator's pending work.

use std::collections::VecDeque;

use backchannel_core::job::JobResult;

/// One unit of orchestrator work.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkItem {
    /// A message the user typed.
    UserInput(String),
    /// A finished job waiting to be summarized.
    Notification(JobResult),
}

/// Two FIFO queues. User input always drains before notifications.
#[derive(Debug, Default)]
pub struct PendingQueues {
    user: VecDeque<String>,
    notifications: VecDeque<JobResult>,
}

impl PendingQueues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.user.push_back(text.into());
    }

    pub fn push_notification(&mut self, result: JobResult) {
        self.notifications.push_back(result);
    }

    /// Take the next item, preferring user input.
    pub fn next(&mut self) -> Option<WorkItem> {
        if let Some(text) = self.user.pop_front() {
            return Some(WorkItem::UserInput(text));
        }
        self.notifications.pop_front().map(WorkItem::Notification)
    }

    /// `(user, notifications)` queue lengths.
    pub fn lens(&self) -> (usize, usize) {
        (self.user.len(), self.notifications.len())
    }

    pub fn is_empty(&self) -> bool {
        self.user.is_empty() && self.notifications.is_empty()
    }
}
