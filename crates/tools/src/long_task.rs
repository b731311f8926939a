//! Long task tool: simulated slow background work.
//!
//! Sleeps for a configurable delay, then echoes its input. Useful for
//! watching the agent keep chatting while a job is in flight.

use std::time::Duration;

use async_trait::async_trait;
use backchannel_core::error::ToolError;
use backchannel_core::tool::{Tool, ToolResult};
use tracing::debug;

pub struct LongTaskTool {
    delay: Duration,
}

impl LongTaskTool {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for LongTaskTool {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl Tool for LongTaskTool {
    fn name(&self) -> &str {
        "long_task"
    }

    fn description(&self) -> &str {
        "Simulates a long-running background task. Takes a while, then reports the processed input."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "input": {
                    "type": "string",
                    "description": "The text to process"
                }
            },
            "required": ["input"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        // Accept a bare string as well as {"input": "..."}.
        let input = match &arguments {
            serde_json::Value::String(s) => s.as_str(),
            other => other["input"]
                .as_str()
                .ok_or_else(|| ToolError::InvalidArguments("Missing 'input' argument".into()))?,
        };

        debug!(delay_ms = self.delay.as_millis() as u64, "long_task sleeping");
        tokio::time::sleep(self.delay).await;

        Ok(ToolResult::ok(format!("Task processed: {input}")))
    }
}
