//! End-to-end integration tests for Backchannel.
//!
//! These tests wire the real event bus, launcher, orchestrator, tools and
//! completion adapter together, with only the HTTP provider scripted.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use backchannel_agent::{JobLauncher, Orchestrator};
use backchannel_config::AppConfig;
use backchannel_core::conversation::{ConversationLog, TurnRole};
use backchannel_core::error::ProviderError;
use backchannel_core::event::{DomainEvent, EventBus, topics};
use backchannel_core::job::{JobContext, JobResult, JobStatus};
use backchannel_core::message::{Message, MessageToolCall};
use backchannel_core::output::{OutputKind, OutputSink};
use backchannel_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use backchannel_providers::ProviderCompletionService;
use backchannel_tools::default_registry;
use tokio::sync::mpsc;

// ── Mock Provider ────────────────────────────────────────────────────────

/// A mock provider that returns scripted responses in sequence.
struct ScriptedProvider {
    responses: Mutex<VecDeque<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(responses: Vec<ProviderResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 500,
                message: "script exhausted".into(),
            })
    }
}

fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

fn tool_response(name: &str, arguments: serde_json::Value) -> ProviderResponse {
    let mut message = Message::assistant("");
    message.tool_calls.push(MessageToolCall {
        id: "call_1".into(),
        name: name.into(),
        arguments: arguments.to_string(),
    });
    ProviderResponse {
        message,
        usage: None,
        model: "mock-model".into(),
    }
}

// ── Recording output ─────────────────────────────────────────────────────

#[derive(Default)]
struct RecordingSink {
    items: Mutex<Vec<(OutputKind, String)>>,
}

impl RecordingSink {
    fn of(&self, kind: OutputKind) -> Vec<String> {
        self.items
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, c)| c.clone())
            .collect()
    }
}

impl OutputSink for RecordingSink {
    fn present(&self, kind: OutputKind, content: &str) {
        self.items.lock().unwrap().push((kind, content.to_string()));
    }
}

// ── Harness ──────────────────────────────────────────────────────────────

struct Agent {
    bus: Arc<EventBus>,
    provider: Arc<ScriptedProvider>,
    sink: Arc<RecordingSink>,
    orchestrator: Arc<Orchestrator>,
}

fn agent(config: &AppConfig, responses: Vec<ProviderResponse>) -> Agent {
    let bus = Arc::new(EventBus::new());
    let registry = Arc::new(default_registry(config));
    let launcher = Arc::new(JobLauncher::new(bus.clone(), registry));
    let provider = ScriptedProvider::new(responses);
    let completion = Arc::new(ProviderCompletionService::new(provider.clone(), "mock-model"));
    let sink = Arc::new(RecordingSink::default());
    let orchestrator = Arc::new(
        Orchestrator::attach(
            bus.clone(),
            Arc::new(ConversationLog::new()),
            launcher,
            completion,
            sink.clone(),
        )
        .with_poll_interval(Duration::from_millis(50)),
    );
    Agent { bus, provider, sink, orchestrator }
}

/// Run the orchestrator loop until `done` holds, then stop it.
async fn run_until(agent: &Agent, done: impl Fn(&Agent) -> bool) {
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let runner = {
        let orchestrator = agent.orchestrator.clone();
        tokio::spawn(async move {
            orchestrator.run(async { let _ = stop_rx.await; }).await;
        })
    };

    tokio::time::timeout(Duration::from_secs(60), async {
        while !done(agent) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition never reached");

    stop_tx.send(()).unwrap();
    runner.await.unwrap();
}

fn jobs(bus: &EventBus) -> (mpsc::UnboundedReceiver<DomainEvent>, mpsc::UnboundedReceiver<JobResult>) {
    let (started_tx, started_rx) = mpsc::unbounded_channel();
    bus.subscribe(topics::JOB_STARTED, move |event| {
        let _ = started_tx.send(event.clone());
        Ok(())
    });
    let (done_tx, done_rx) = mpsc::unbounded_channel();
    bus.subscribe(topics::JOB_COMPLETED, move |event| {
        if let DomainEvent::JobCompleted(result) = event {
            let _ = done_tx.send(result.clone());
        }
        Ok(())
    });
    (started_rx, done_rx)
}

// ═══════════════════════════════════════════════════════════════════════════
// Scenarios
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn long_task_reports_start_immediately_and_result_later() {
    let bus = Arc::new(EventBus::new());
    let (mut started, mut done) = jobs(&bus);
    let launcher = JobLauncher::new(bus, Arc::new(default_registry(&AppConfig::default())));

    let began = tokio::time::Instant::now();
    let id = launcher.launch("long_task", serde_json::json!({"input": "x"}), JobContext::default());

    match started.try_recv().unwrap() {
        DomainEvent::JobStarted { job_id, tool_name, .. } => {
            assert_eq!(job_id, id);
            assert_eq!(tool_name, "long_task");
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(done.try_recv().is_err());

    let result = done.recv().await.unwrap();
    assert_eq!(result.job_id, id);
    assert_eq!(result.status(), JobStatus::Success);
    assert_eq!(result.output(), Some("Task processed: x"));
    assert!(began.elapsed() >= Duration::from_secs(10));
}

#[tokio::test]
async fn hello_gets_a_direct_reply() {
    let agent = agent(&AppConfig::default(), vec![text_response("hi")]);

    agent.bus.publish(&DomainEvent::user_input("hello"));
    assert!(agent.orchestrator.tick().await);

    assert_eq!(agent.sink.of(OutputKind::Reply), vec!["hi"]);
    let turns = agent.orchestrator.log().snapshot();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].role, TurnRole::User);
    assert_eq!(turns[0].text(), "hello");
    assert_eq!(turns[1].role, TurnRole::Model);
    assert_eq!(turns[1].text(), "hi");

    // Every registered tool was offered to the model.
    let request = &agent.provider.requests()[0];
    assert_eq!(request.tools.len(), 5);
}

#[tokio::test(start_paused = true)]
async fn back_to_back_messages_are_processed_in_order() {
    let agent = agent(
        &AppConfig::default(),
        vec![text_response("first answer"), text_response("second answer")],
    );

    agent.bus.publish(&DomainEvent::user_input("first"));
    agent.bus.publish(&DomainEvent::user_input("second"));
    run_until(&agent, |a| a.orchestrator.log().len() == 4).await;

    let texts: Vec<String> = agent
        .orchestrator
        .log()
        .snapshot()
        .iter()
        .map(|t| t.text().into_owned())
        .collect();
    assert_eq!(texts, vec!["first", "first answer", "second", "second answer"]);

    // The second chat request saw the whole first exchange.
    let requests = agent.provider.requests();
    assert_eq!(requests[0].messages.len(), 2);
    assert_eq!(requests[1].messages.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn tool_call_runs_in_background_and_is_summarized() {
    let agent = agent(
        &AppConfig::default(),
        vec![
            tool_response("long_task", serde_json::json!({"input": "x"})),
            text_response("sure, 42"),
            text_response("Your task finished: x was processed."),
        ],
    );

    agent.bus.publish(&DomainEvent::user_input("process x in the background"));
    run_until(&agent, |a| a.sink.of(OutputKind::Reply).len() == 1).await;

    // The user keeps chatting while the job runs.
    agent.bus.publish(&DomainEvent::user_input("what is 6 * 7?"));
    run_until(&agent, |a| !a.sink.of(OutputKind::Notification).is_empty()).await;

    let replies = agent.sink.of(OutputKind::Reply);
    assert!(replies[0].starts_with("I've started the 'long_task' task for you."));
    assert_eq!(replies[1], "sure, 42");
    assert_eq!(
        agent.sink.of(OutputKind::Notification),
        vec!["Your task finished: x was processed."]
    );
    assert!(
        agent.sink.of(OutputKind::Status)
            .iter()
            .any(|s| s.starts_with("Job started: long_task (ID: "))
    );

    // The summary prompt carried the original intent and the output.
    let requests = agent.provider.requests();
    let prompt = &requests[2].messages[0].content;
    assert!(prompt.contains("process x in the background"));
    assert!(prompt.contains("Task processed: x"));

    let last = agent.orchestrator.log().snapshot().pop().unwrap();
    assert_eq!(last.text(), "[System Update]: Your task finished: x was processed.");
    assert_eq!(last.metadata["tool_name"], "long_task");
}

#[tokio::test]
async fn unconfigured_tool_fails_without_breaking_the_turn() {
    let agent = agent(
        &AppConfig::default(),
        vec![
            tool_response("asana_list_tasks", serde_json::json!({})),
            text_response("I couldn't reach Asana: it isn't configured."),
        ],
    );
    let (_, mut done) = jobs(&agent.bus);

    agent.bus.publish(&DomainEvent::user_input("what's on my list?"));
    assert!(agent.orchestrator.tick().await);
    assert!(agent.sink.of(OutputKind::Error).is_empty());

    let result = done.recv().await.unwrap();
    assert_eq!(result.status(), JobStatus::Failed);
    assert!(result.error().unwrap().contains("ASANA"));

    while agent.orchestrator.pending().1 == 0 {
        tokio::task::yield_now().await;
    }
    assert!(agent.orchestrator.tick().await);

    let prompt = &agent.provider.requests()[1].messages[0].content;
    assert!(prompt.contains("FAILED"));
    let last = agent.orchestrator.log().snapshot().pop().unwrap();
    assert_eq!(last.metadata["status"], "failed");
}

#[tokio::test]
async fn provider_failure_is_reported_and_the_agent_recovers() {
    // An empty script makes the first call fail.
    let agent = agent(&AppConfig::default(), vec![]);
    agent.bus.publish(&DomainEvent::user_input("hello?"));
    assert!(agent.orchestrator.tick().await);

    let errors = agent.sink.of(OutputKind::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("script exhausted"));
    assert_eq!(agent.orchestrator.log().len(), 1);
    assert!(!agent.orchestrator.is_busy());
}

#[tokio::test]
async fn pending_user_input_goes_before_notifications() {
    let agent = agent(
        &AppConfig::default(),
        vec![text_response("answer"), text_response("summary")],
    );

    agent.bus.publish(&DomainEvent::JobCompleted(JobResult::success(
        backchannel_core::job::JobId::new(),
        "long_task",
        "Task processed: y",
        JobContext::from_user_intent("y please"),
    )));
    agent.bus.publish(&DomainEvent::user_input("question"));

    agent.orchestrator.tick().await;
    assert_eq!(agent.sink.of(OutputKind::Reply), vec!["answer"]);
    assert!(agent.sink.of(OutputKind::Notification).is_empty());

    agent.orchestrator.tick().await;
    assert_eq!(agent.sink.of(OutputKind::Notification), vec!["summary"]);
}
