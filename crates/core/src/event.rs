//! Domain event system: decoupled communication between components.
//!
//! Events are published on a named topic and dispatched synchronously to
//! every handler subscribed to that topic, in registration order. The bus
//! keeps no backlog: an event published to a topic nobody listens on is
//! dropped.
//!
//! A failing handler (returned error or panic) is reported to the bus's
//! error sink and never reaches the publisher or the handlers after it.

use crate::error::{Error, Result, panic_message};
use crate::job::{JobContext, JobId, JobResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{error, trace};

/// Well-known topic names.
pub mod topics {
    pub const USER_INPUT: &str = "user:input";
    pub const JOB_STARTED: &str = "job:started";
    pub const JOB_COMPLETED: &str = "job:completed";
}

/// All domain events in the system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// Raw text typed by the user.
    UserInput { text: String },

    /// A background job was launched.
    JobStarted {
        job_id: JobId,
        tool_name: String,
        context: JobContext,
    },

    /// A background job finished, successfully or not.
    JobCompleted(JobResult),

    /// Any other topic with a free-form payload.
    Custom {
        topic: String,
        payload: serde_json::Value,
    },
}

impl DomainEvent {
    pub fn user_input(text: impl Into<String>) -> Self {
        Self::UserInput { text: text.into() }
    }

    /// The topic this event is dispatched on.
    pub fn topic(&self) -> &str {
        match self {
            Self::UserInput { .. } => topics::USER_INPUT,
            Self::JobStarted { .. } => topics::JOB_STARTED,
            Self::JobCompleted(_) => topics::JOB_COMPLETED,
            Self::Custom { topic, .. } => topic,
        }
    }
}

/// Token returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A subscribed event handler.
pub type Handler = Arc<dyn Fn(&DomainEvent) -> Result<()> + Send + Sync>;

/// Receives handler failures as `(topic, error)`.
pub type ErrorSink = Arc<dyn Fn(&str, &Error) + Send + Sync>;

/// A topic-keyed, synchronous publish/subscribe registry.
///
/// Safe to share across tasks: job executions publish completions from
/// their own tasks while the orchestrator publishes and consumes.
pub struct EventBus {
    handlers: RwLock<HashMap<String, Vec<(SubscriptionId, Handler)>>>,
    next_id: AtomicU64,
    error_sink: ErrorSink,
}

impl EventBus {
    /// Create a bus that reports handler failures through `tracing`.
    pub fn new() -> Self {
        Self::with_error_sink(Arc::new(|topic: &str, err: &Error| {
            error!(topic, error = %err, "Event handler failed");
        }))
    }

    /// Create a bus with a custom sink for handler failures.
    pub fn with_error_sink(error_sink: ErrorSink) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            error_sink,
        }
    }

    /// Register a handler for `topic`.
    pub fn subscribe<F>(&self, topic: impl Into<String>, handler: F) -> SubscriptionId
    where
        F: Fn(&DomainEvent) -> Result<()> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        handlers
            .entry(topic.into())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler. Returns `false` if the token was unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        for list in handlers.values_mut() {
            if let Some(pos) = list.iter().position(|(sid, _)| *sid == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    /// Number of handlers currently subscribed to `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .map_or(0, Vec::len)
    }

    /// Dispatch `event` to every handler of its topic, in registration order.
    ///
    /// Returns how many handlers were invoked. The handler list is copied
    /// before dispatch, so handlers may publish or subscribe themselves.
    pub fn publish(&self, event: &DomainEvent) -> usize {
        let topic = event.topic();
        let handlers: Vec<Handler> = {
            let map = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
            match map.get(topic) {
                Some(list) => list.iter().map(|(_, h)| Arc::clone(h)).collect(),
                None => Vec::new(),
            }
        };

        if handlers.is_empty() {
            trace!(topic, "No subscribers, event dropped");
            return 0;
        }

        for handler in &handlers {
            let outcome = catch_unwind(AssertUnwindSafe(|| handler(event)));
            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(panic) => Some(Error::Handler(format!(
                    "handler panicked: {}",
                    panic_message(panic.as_ref())
                ))),
            };
            if let Some(err) = failure {
                (self.error_sink)(topic, &err);
            }
        }

        handlers.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recording_bus() -> (EventBus, Arc<Mutex<Vec<String>>>) {
        let failures = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&failures);
        let bus = EventBus::with_error_sink(Arc::new(move |topic: &str, err: &Error| {
            sink.lock().unwrap().push(format!("{topic}: {err}"));
        }));
        (bus, failures)
    }

    #[test]
    fn publish_reaches_topic_subscribers_in_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for label in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            bus.subscribe(topics::USER_INPUT, move |event| {
                if let DomainEvent::UserInput { text } = event {
                    seen.lock().unwrap().push(format!("{label}:{text}"));
                }
                Ok(())
            });
        }

        let delivered = bus.publish(&DomainEvent::user_input("hello"));
        assert_eq!(delivered, 3);
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["first:hello", "second:hello", "third:hello"]
        );
    }

    #[test]
    fn other_topics_are_not_dispatched() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&hits);
        bus.subscribe(topics::JOB_STARTED, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.publish(&DomainEvent::user_input("ignored"));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn no_subscribers_drops_event() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(&DomainEvent::user_input("lost")), 0);
    }

    #[test]
    fn failing_handler_does_not_stop_later_handlers() {
        let (bus, failures) = recording_bus();
        let reached = Arc::new(AtomicU64::new(0));

        bus.subscribe(topics::USER_INPUT, |_| Err(Error::Internal("nope".into())));
        bus.subscribe(topics::USER_INPUT, |_| panic!("kaboom"));
        let counter = Arc::clone(&reached);
        bus.subscribe(topics::USER_INPUT, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.publish(&DomainEvent::user_input("x"));

        assert_eq!(reached.load(Ordering::SeqCst), 1);
        let failures = failures.lock().unwrap();
        assert_eq!(failures.len(), 2);
        assert!(failures[0].contains("nope"));
        assert!(failures[1].contains("kaboom"));
        assert!(failures.iter().all(|f| f.starts_with("user:input")));
    }

    #[test]
    fn unsubscribe_removes_only_that_handler() {
        let bus = EventBus::new();
        let a = bus.subscribe(topics::JOB_COMPLETED, |_| Ok(()));
        let _b = bus.subscribe(topics::JOB_COMPLETED, |_| Ok(()));
        assert_eq!(bus.subscriber_count(topics::JOB_COMPLETED), 2);

        assert!(bus.unsubscribe(a));
        assert!(!bus.unsubscribe(a));
        assert_eq!(bus.subscriber_count(topics::JOB_COMPLETED), 1);
    }

    #[test]
    fn handler_may_publish_reentrantly() {
        let bus = Arc::new(EventBus::new());
        let echoed = Arc::new(AtomicU64::new(0));

        let inner = Arc::clone(&bus);
        bus.subscribe(topics::USER_INPUT, move |_| {
            inner.publish(&DomainEvent::Custom {
                topic: "echo".into(),
                payload: serde_json::json!({"ok": true}),
            });
            Ok(())
        });
        let counter = Arc::clone(&echoed);
        bus.subscribe("echo", move |event| {
            assert_eq!(event.topic(), "echo");
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.publish(&DomainEvent::user_input("ping"));
        assert_eq!(echoed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_publishers_are_all_delivered() {
        let bus = Arc::new(EventBus::new());
        let count = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&count);
        bus.subscribe(topics::USER_INPUT, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let mut handles = Vec::new();
        for i in 0..8 {
            let bus = Arc::clone(&bus);
            handles.push(std::thread::spawn(move || {
                for j in 0..25 {
                    bus.publish(&DomainEvent::user_input(format!("{i}-{j}")));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(count.load(Ordering::SeqCst), 200);
    }

    #[test]
    fn topics_match_event_variants() {
        let started = DomainEvent::JobStarted {
            job_id: JobId("j".into()),
            tool_name: "long_task".into(),
            context: JobContext::default(),
        };
        assert_eq!(started.topic(), "job:started");
        assert_eq!(DomainEvent::user_input("x").topic(), "user:input");
    }
}
