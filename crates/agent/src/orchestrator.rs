//! The orchestrator: a single-turn scheduler between the user, the model
//! and background jobs.
//!
//! Bus handlers only enqueue work and wake the scheduler. [`Orchestrator::tick`]
//! then takes one item, user input before notifications, and runs it to
//! completion while no other turn may start. Launched jobs keep running
//! in the meantime; their results queue up as notifications.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use backchannel_core::completion::CompletionService;
use backchannel_core::conversation::{ConversationLog, TurnRole};
use backchannel_core::error::{Error, Result, panic_message};
use backchannel_core::event::{DomainEvent, EventBus, SubscriptionId, topics};
use backchannel_core::job::{JobContext, JobResult};
use backchannel_core::output::{OutputKind, OutputSink};
use futures::FutureExt;
use serde_json::json;
use tokio::sync::Notify;
use tracing::{debug, info, trace, warn};

use crate::launcher::JobLauncher;
use crate::queue::{PendingQueues, WorkItem};

/// Default upper bound on an idle wait.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

pub struct Orchestrator {
    bus: Arc<EventBus>,
    log: Arc<ConversationLog>,
    launcher: Arc<JobLauncher>,
    completion: Arc<dyn CompletionService>,
    output: Arc<dyn OutputSink>,
    queues: Arc<Mutex<PendingQueues>>,
    wake: Arc<Notify>,
    busy: AtomicBool,
    poll_interval: Duration,
    subscriptions: Vec<SubscriptionId>,
}

/// Holds the busy flag for the duration of one turn.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn claim(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn lock(queues: &Mutex<PendingQueues>) -> MutexGuard<'_, PendingQueues> {
    queues.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Orchestrator {
    /// Create an orchestrator and subscribe it to `user:input`,
    /// `job:started` and `job:completed` on `bus`.
    ///
    /// Subscriptions are removed when the orchestrator is dropped.
    pub fn attach(
        bus: Arc<EventBus>,
        log: Arc<ConversationLog>,
        launcher: Arc<JobLauncher>,
        completion: Arc<dyn CompletionService>,
        output: Arc<dyn OutputSink>,
    ) -> Self {
        let queues = Arc::new(Mutex::new(PendingQueues::new()));
        let wake = Arc::new(Notify::new());
        let mut subscriptions = Vec::with_capacity(3);

        {
            let queues = Arc::clone(&queues);
            let wake = Arc::clone(&wake);
            subscriptions.push(bus.subscribe(topics::USER_INPUT, move |event| {
                let DomainEvent::UserInput { text } = event else {
                    return Err(unexpected(event));
                };
                lock(&queues).push_user(text.clone());
                wake.notify_one();
                Ok(())
            }));
        }

        {
            let output = Arc::clone(&output);
            subscriptions.push(bus.subscribe(topics::JOB_STARTED, move |event| {
                let DomainEvent::JobStarted { job_id, tool_name, .. } = event else {
                    return Err(unexpected(event));
                };
                output.present(
                    OutputKind::Status,
                    &format!("Job started: {tool_name} (ID: {}...)", job_id.short()),
                );
                Ok(())
            }));
        }

        {
            let queues = Arc::clone(&queues);
            let wake = Arc::clone(&wake);
            subscriptions.push(bus.subscribe(topics::JOB_COMPLETED, move |event| {
                let DomainEvent::JobCompleted(result) = event else {
                    return Err(unexpected(event));
                };
                lock(&queues).push_notification(result.clone());
                wake.notify_one();
                Ok(())
            }));
        }

        Self {
            bus,
            log,
            launcher,
            completion,
            output,
            queues,
            wake,
            busy: AtomicBool::new(false),
            poll_interval: DEFAULT_POLL_INTERVAL,
            subscriptions,
        }
    }

    /// Set the upper bound on how long an idle `run` loop sleeps before
    /// re-checking its queues.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// `(user, notifications)` waiting to be processed.
    pub fn pending(&self) -> (usize, usize) {
        lock(&self.queues).lens()
    }

    pub fn log(&self) -> &Arc<ConversationLog> {
        &self.log
    }

    /// Perform at most one unit of work. Returns `false` if there was
    /// nothing to do or another turn is already in progress.
    ///
    /// Failures inside the turn (completion errors, panics) are presented
    /// as [`OutputKind::Error`] and never escape.
    pub async fn tick(&self) -> bool {
        let Some(_busy) = BusyGuard::claim(&self.busy) else {
            trace!("Turn in progress, skipping tick");
            return false;
        };
        let Some(item) = self.next_item() else {
            return false;
        };

        let outcome = AssertUnwindSafe(self.process(item)).catch_unwind().await;
        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(panic) => Some(format!("Turn aborted: {}", panic_message(panic.as_ref()))),
        };
        if let Some(message) = failure {
            warn!(error = %message, "Turn failed");
            self.output.present(OutputKind::Error, &message);
        }
        true
    }

    /// Drive `tick` until `shutdown` resolves.
    ///
    /// After a unit of work the next tick runs immediately. When idle the
    /// loop waits for new work, at most one poll interval at a time.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        info!(poll_ms = self.poll_interval.as_millis() as u64, "Orchestrator running");

        loop {
            if self.tick().await {
                if shutdown.as_mut().now_or_never().is_some() {
                    break;
                }
                tokio::task::yield_now().await;
                continue;
            }

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::timeout(self.poll_interval, self.wake.notified()) => {}
            }
        }

        let (user, notifications) = self.pending();
        info!(user, notifications, "Orchestrator stopped");
    }

    fn next_item(&self) -> Option<WorkItem> {
        lock(&self.queues).next()
    }

    async fn process(&self, item: WorkItem) -> Result<()> {
        match item {
            WorkItem::UserInput(text) => self.handle_user_input(text).await,
            WorkItem::Notification(result) => self.handle_notification(result).await,
        }
    }

    async fn handle_user_input(&self, text: String) -> Result<()> {
        self.output.present(OutputKind::Status, "Thinking...");
        self.log.append_user(text.as_str());

        let tools = self.launcher.registry().definitions();
        let decision = self.completion.chat(&self.log.snapshot(), &tools).await?;

        if decision.is_empty() {
            debug!("Model returned neither text nor a tool call");
        }

        if let Some(call) = decision.tool_call {
            let job_id = self.launcher.launch(
                &call.name,
                call.arguments,
                JobContext::from_user_intent(text),
            );
            let reply = format!("I've started the '{}' task for you. (ID: {job_id}).", call.name);

            let mut metadata = serde_json::Map::new();
            metadata.insert("job_id".into(), json!(job_id));
            metadata.insert("tool_name".into(), json!(call.name));
            self.log.append(TurnRole::Model, reply.as_str(), metadata);
            self.output.present(OutputKind::Reply, &reply);
        }

        if let Some(reply) = decision.text {
            self.log.append_model(reply.as_str());
            self.output.present(OutputKind::Reply, &reply);
        }

        Ok(())
    }

    async fn handle_notification(&self, result: JobResult) -> Result<()> {
        debug!(job_id = %result.job_id, status = %result.status(), "Summarizing job result");
        let summary = self.completion.summarize(&result).await?;

        let mut metadata = serde_json::Map::new();
        metadata.insert("kind".into(), json!("system_update"));
        metadata.insert("job_id".into(), json!(result.job_id));
        metadata.insert("tool_name".into(), json!(result.tool_name));
        metadata.insert("status".into(), json!(result.status().as_str()));
        self.log.append(
            TurnRole::Model,
            format!("[System Update]: {summary}"),
            metadata,
        );
        self.output.present(OutputKind::Notification, &summary);
        Ok(())
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        for id in self.subscriptions.drain(..) {
            self.bus.unsubscribe(id);
        }
    }
}

fn unexpected(event: &DomainEvent) -> Error {
    Error::Handler(format!("unexpected payload on '{}'", event.topic()))
}
