//! Completion adapter: turns a [`Provider`] into a [`CompletionService`].
//!
//! Owns the two prompts the agent uses: the chat system prompt (which
//! decides between answering and launching a tool) and the notification
//! prompt that turns a finished job into one or two sentences.

use std::sync::Arc;

use async_trait::async_trait;
use backchannel_core::completion::{ChatDecision, CompletionService, ToolCallRequest};
use backchannel_core::conversation::{Turn, TurnRole};
use backchannel_core::error::ProviderError;
use backchannel_core::job::{JobOutcome, JobResult};
use backchannel_core::message::Message;
use backchannel_core::provider::{Provider, ProviderRequest, ToolDefinition};
use tracing::debug;

/// Default chat system prompt.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a helpful AI project manager assistant.

TOOLS:
- You can launch background tools. They run asynchronously and the user is \
notified when they finish, so never wait for or invent their results.
- If the user asks to complete or delete a task but you don't know the task ID, \
ALWAYS call 'asana_list_tasks' first to find it. Never guess an ID.

BEHAVIOR:
- If details are missing (like a task name), ask the user.
- Be concise.";

/// Fallback when a job carries no user intent.
const NO_INTENT: &str = "No specific question asked.";

/// A [`CompletionService`] backed by any chat [`Provider`].
pub struct ProviderCompletionService {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    system_prompt: String,
}

impl ProviderCompletionService {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// System prompt followed by the log, `model` turns as assistant.
    fn build_messages(&self, history: &[Turn]) -> Vec<Message> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(Message::system(&self.system_prompt));
        messages.extend(history.iter().map(|turn| match turn.role {
            TurnRole::User => Message::user(turn.text()),
            TurnRole::Model => Message::assistant(turn.text()),
        }));
        messages
    }

    fn request(&self, messages: Vec<Message>, tools: Vec<ToolDefinition>) -> ProviderRequest {
        ProviderRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools,
        }
    }
}

/// The notification prompt for a finished job.
pub fn notification_prompt(result: &JobResult) -> String {
    let intent = result.context.user_intent().unwrap_or(NO_INTENT);
    let outcome = match &result.outcome {
        JobOutcome::Success { output, data: None } => format!("The tool output was:\n{output}"),
        JobOutcome::Success {
            output,
            data: Some(data),
        } => format!("The tool output was:\n{output}\nStructured data:\n{data}"),
        JobOutcome::Failed { error } => format!("The tool FAILED with this error:\n{error}"),
    };

    format!(
        "LOG CONTEXT:\n\
         1. The user originally said: \"{intent}\"\n\
         2. We ran a background tool: {tool}\n\
         3. {outcome}\n\
         \n\
         INSTRUCTION:\n\
         Write a notification for the user.\n\
         - If the user asked a specific question (like \"When is X?\"), answer it using the tool output.\n\
         - If the user just gave a command (like \"Create X\"), confirm it was done.\n\
         - If the tool failed, say what went wrong.\n\
         - Keep it concise (1-2 sentences).\n\
         - Do NOT mention IDs unless there is an error.",
        tool = result.tool_name,
    )
}

/// Parse tool-call arguments; an empty string means no arguments.
fn parse_arguments(tool: &str, raw: &str) -> Result<serde_json::Value, ProviderError> {
    if raw.trim().is_empty() {
        return Ok(serde_json::json!({}));
    }
    serde_json::from_str(raw).map_err(|e| {
        ProviderError::MalformedResponse(format!("invalid arguments for tool '{tool}': {e}"))
    })
}

#[async_trait]
impl CompletionService for ProviderCompletionService {
    async fn chat(
        &self,
        history: &[Turn],
        tools: &[ToolDefinition],
    ) -> Result<ChatDecision, ProviderError> {
        let request = self.request(self.build_messages(history), tools.to_vec());
        let response = self.provider.complete(request).await?;

        let tool_call = match response.message.tool_calls.first() {
            Some(tc) => Some(ToolCallRequest {
                name: tc.name.clone(),
                arguments: parse_arguments(&tc.name, &tc.arguments)?,
            }),
            None => None,
        };

        if response.message.tool_calls.len() > 1 {
            debug!(
                count = response.message.tool_calls.len(),
                "Model requested several tools; launching the first"
            );
        }

        let text = Some(response.message.content)
            .filter(|t| !t.trim().is_empty());

        Ok(ChatDecision { text, tool_call })
    }

    async fn summarize(&self, result: &JobResult) -> Result<String, ProviderError> {
        let messages = vec![Message::user(notification_prompt(result))];
        let response = self.provider.complete(self.request(messages, Vec::new())).await?;

        let summary = response.message.content.trim().to_string();
        if summary.is_empty() {
            return Err(ProviderError::MalformedResponse(
                "empty notification from provider".into(),
            ));
        }
        Ok(summary)
    }
}
