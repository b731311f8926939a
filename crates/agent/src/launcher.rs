//! Job launcher: runs tools as fire-and-forget background jobs.
//!
//! `launch` publishes `job:started`, spawns the tool on the tokio runtime
//! and returns the job id at once. The outcome is only observable through
//! the bus: exactly one `job:completed` per launch, success or failure.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use backchannel_core::error::{ToolError, panic_message};
use backchannel_core::event::{DomainEvent, EventBus};
use backchannel_core::job::{JobContext, JobId, JobResult};
use backchannel_core::tool::ToolRegistry;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

pub struct JobLauncher {
    bus: Arc<EventBus>,
    registry: Arc<ToolRegistry>,
    /// Execution gate; `None` means unbounded.
    semaphore: Option<Arc<Semaphore>>,
    in_flight: Arc<AtomicUsize>,
}

impl JobLauncher {
    pub fn new(bus: Arc<EventBus>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            bus,
            registry,
            semaphore: None,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Run at most `max` tools at once. Extra jobs still start immediately
    /// (and publish `job:started`) but wait for a slot before executing.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.semaphore = Some(Arc::new(Semaphore::new(max.max(1))));
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Jobs started but not yet completed.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Start `tool_name` in the background and return its id.
    ///
    /// Never fails at the call site: an unknown tool, a tool error or a
    /// panic inside the tool all arrive later as a failed `job:completed`.
    /// Must be called from within a tokio runtime.
    pub fn launch(
        &self,
        tool_name: &str,
        input: serde_json::Value,
        context: JobContext,
    ) -> JobId {
        let job_id = JobId::new();
        info!(job_id = %job_id, tool = tool_name, "Launching job");

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.bus.publish(&DomainEvent::JobStarted {
            job_id: job_id.clone(),
            tool_name: tool_name.to_string(),
            context: context.clone(),
        });

        let bus = Arc::clone(&self.bus);
        let registry = Arc::clone(&self.registry);
        let semaphore = self.semaphore.clone();
        let in_flight = Arc::clone(&self.in_flight);
        let id = job_id.clone();
        let tool_name = tool_name.to_string();

        tokio::spawn(async move {
            let _permit = match semaphore {
                Some(gate) => gate.acquire_owned().await.ok(),
                None => None,
            };

            let result = run_job(&registry, id, tool_name, input, context).await;
            debug!(job_id = %result.job_id, status = %result.status(), "Job finished");

            in_flight.fetch_sub(1, Ordering::SeqCst);
            bus.publish(&DomainEvent::JobCompleted(result));
        });

        job_id
    }
}

/// Execute one job and fold every failure mode into a [`JobResult`].
async fn run_job(
    registry: &ToolRegistry,
    job_id: JobId,
    tool_name: String,
    input: serde_json::Value,
    context: JobContext,
) -> JobResult {
    let Some(tool) = registry.get(&tool_name) else {
        let err = ToolError::NotFound(tool_name.clone());
        warn!(job_id = %job_id, "{err}");
        return JobResult::failed(job_id, tool_name, err.to_string(), context);
    };

    // A separate task so a panicking tool surfaces as a JoinError.
    let execution = tokio::spawn(async move { tool.execute(input).await });

    match execution.await {
        Ok(Ok(output)) if output.success => {
            let result = JobResult::success(job_id, tool_name, output.output, context);
            match output.data {
                Some(data) => result.with_data(data),
                None => result,
            }
        }
        Ok(Ok(output)) => JobResult::failed(job_id, tool_name, output.output, context),
        Ok(Err(err)) => {
            warn!(job_id = %job_id, error = %err, "Tool failed");
            JobResult::failed(job_id, tool_name, err.to_string(), context)
        }
        Err(join) => {
            let reason = join_failure(join);
            warn!(job_id = %job_id, reason = %reason, "Tool aborted");
            JobResult::failed(job_id, tool_name, reason, context)
        }
    }
}

fn join_failure(err: JoinError) -> String {
    if err.is_cancelled() {
        return "job was cancelled".into();
    }
    format!("tool panicked: {}", panic_message(err.into_panic().as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use backchannel_core::event::topics;
    use backchannel_core::job::JobStatus;
    use backchannel_core::tool::{Tool, ToolResult};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct SleepTool;

    #[async_trait]
    impl Tool for SleepTool {
        fn name(&self) -> &str { "sleep" }
        fn description(&self) -> &str { "sleeps" }
        fn parameters_schema(&self) -> serde_json::Value { serde_json::json!({}) }
        async fn execute(&self, args: serde_json::Value) -> Result<ToolResult, ToolError> {
            let ms = args["ms"].as_u64().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(ToolResult::ok(format!("slept {ms}")))
        }
    }

    struct FailTool;

    #[async_trait]
    impl Tool for FailTool {
        fn name(&self) -> &str { "fail" }
        fn description(&self) -> &str { "fails" }
        fn parameters_schema(&self) -> serde_json::Value { serde_json::json!({}) }
        async fn execute(&self, _args: serde_json::Value) -> Result<ToolResult, ToolError> {
            Err(ToolError::ExecutionFailed {
                tool_name: "fail".into(),
                reason: "upstream said no".into(),
            })
        }
    }

    struct PanicTool;

    #[async_trait]
    impl Tool for PanicTool {
        fn name(&self) -> &str { "panic" }
        fn description(&self) -> &str { "panics" }
        fn parameters_schema(&self) -> serde_json::Value { serde_json::json!({}) }
        async fn execute(&self, _args: serde_json::Value) -> Result<ToolResult, ToolError> {
            panic!("boom");
        }
    }

    struct SoftFailTool;

    #[async_trait]
    impl Tool for SoftFailTool {
        fn name(&self) -> &str { "soft_fail" }
        fn description(&self) -> &str { "reports failure" }
        fn parameters_schema(&self) -> serde_json::Value { serde_json::json!({}) }
        async fn execute(&self, _args: serde_json::Value) -> Result<ToolResult, ToolError> {
            Ok(ToolResult::failure(""))
        }
    }

    struct LookupTool;

    #[async_trait]
    impl Tool for LookupTool {
        fn name(&self) -> &str { "lookup" }
        fn description(&self) -> &str { "returns records" }
        fn parameters_schema(&self) -> serde_json::Value { serde_json::json!({}) }
        async fn execute(&self, _args: serde_json::Value) -> Result<ToolResult, ToolError> {
            Ok(ToolResult::ok("1 record").with_data(serde_json::json!([{"id": 7}])))
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(SleepTool));
        registry.register(Arc::new(FailTool));
        registry.register(Arc::new(PanicTool));
        registry.register(Arc::new(SoftFailTool));
        registry.register(Arc::new(LookupTool));
        Arc::new(registry)
    }

    /// Forward completions into a channel.
    fn completions(bus: &EventBus) -> mpsc::UnboundedReceiver<JobResult> {
        let (tx, rx) = mpsc::unbounded_channel();
        bus.subscribe(topics::JOB_COMPLETED, move |event| {
            if let DomainEvent::JobCompleted(result) = event {
                let _ = tx.send(result.clone());
            }
            Ok(())
        });
        rx
    }

    #[tokio::test(start_paused = true)]
    async fn launch_returns_before_the_result() {
        let bus = Arc::new(EventBus::new());
        let started = Arc::new(Mutex::new(Vec::new()));
        let sink = started.clone();
        bus.subscribe(topics::JOB_STARTED, move |event| {
            if let DomainEvent::JobStarted { job_id, .. } = event {
                sink.lock().unwrap().push(job_id.clone());
            }
            Ok(())
        });
        let mut done = completions(&bus);
        let launcher = JobLauncher::new(bus.clone(), registry());

        let id = launcher.launch("sleep", serde_json::json!({"ms": 1000}), JobContext::default());

        assert_eq!(started.lock().unwrap().as_slice(), &[id.clone()]);
        assert!(done.try_recv().is_err());
        assert_eq!(launcher.in_flight(), 1);

        let result = done.recv().await.unwrap();
        assert_eq!(result.job_id, id);
        assert_eq!(result.output(), Some("slept 1000"));
        assert_eq!(launcher.in_flight(), 0);
    }

    #[tokio::test]
    async fn tool_error_becomes_failed_result() {
        let bus = Arc::new(EventBus::new());
        let mut done = completions(&bus);
        let launcher = JobLauncher::new(bus, registry());

        let ctx = JobContext::from_user_intent("please fail");
        launcher.launch("fail", serde_json::json!({}), ctx.clone());

        let result = done.recv().await.unwrap();
        assert_eq!(result.status(), JobStatus::Failed);
        assert!(result.error().unwrap().contains("upstream said no"));
        assert_eq!(result.context, ctx);
    }

    #[tokio::test]
    async fn unknown_tool_becomes_failed_result() {
        let bus = Arc::new(EventBus::new());
        let mut done = completions(&bus);
        let launcher = JobLauncher::new(bus, registry());

        launcher.launch("nope", serde_json::json!({}), JobContext::default());

        let result = done.recv().await.unwrap();
        assert_eq!(result.tool_name, "nope");
        assert!(result.error().unwrap().contains("nope"));
    }

    #[tokio::test]
    async fn panicking_tool_becomes_failed_result() {
        let bus = Arc::new(EventBus::new());
        let mut done = completions(&bus);
        let launcher = JobLauncher::new(bus, registry());

        launcher.launch("panic", serde_json::json!({}), JobContext::default());

        let result = done.recv().await.unwrap();
        assert_eq!(result.status(), JobStatus::Failed);
        assert!(result.error().unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn structured_tool_data_reaches_the_result() {
        let bus = Arc::new(EventBus::new());
        let mut done = completions(&bus);
        let launcher = JobLauncher::new(bus, registry());

        launcher.launch("lookup", serde_json::json!({}), JobContext::default());

        let result = done.recv().await.unwrap();
        assert_eq!(result.output(), Some("1 record"));
        assert_eq!(result.data().unwrap()[0]["id"], 7);
    }

    #[tokio::test]
    async fn unsuccessful_tool_result_is_failed_with_message() {
        let bus = Arc::new(EventBus::new());
        let mut done = completions(&bus);
        let launcher = JobLauncher::new(bus, registry());

        launcher.launch("soft_fail", serde_json::json!({}), JobContext::default());

        let result = done.recv().await.unwrap();
        assert_eq!(result.status(), JobStatus::Failed);
        assert!(!result.error().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn each_launch_completes_exactly_once() {
        let bus = Arc::new(EventBus::new());
        let mut done = completions(&bus);
        let launcher = JobLauncher::new(bus, registry());

        let mut ids: Vec<JobId> = (0..5)
            .map(|i| launcher.launch("sleep", serde_json::json!({"ms": 100 * (5 - i)}), JobContext::default()))
            .collect();

        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(done.recv().await.unwrap().job_id);
        }
        // Completion order follows duration, not launch order.
        assert_eq!(seen.first(), ids.last());

        ids.sort_by(|a, b| a.0.cmp(&b.0));
        seen.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(ids, seen);
        assert!(done.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_ceiling_serializes_execution() {
        let bus = Arc::new(EventBus::new());
        let mut done = completions(&bus);
        let launcher = JobLauncher::new(bus, registry()).with_max_concurrent(1);
        let started_at = tokio::time::Instant::now();

        launcher.launch("sleep", serde_json::json!({"ms": 1000}), JobContext::default());
        launcher.launch("sleep", serde_json::json!({"ms": 1000}), JobContext::default());
        assert_eq!(launcher.in_flight(), 2);

        done.recv().await.unwrap();
        done.recv().await.unwrap();
        assert!(started_at.elapsed() >= Duration::from_millis(2000));
    }
}
