//! The completion service boundary.
//!
//! The orchestrator asks exactly two things of a language model: what to
//! do with the conversation so far, and how to phrase a finished job for
//! the user. Everything about prompts and wire formats lives behind this
//! trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::conversation::Turn;
use crate::error::ProviderError;
use crate::job::JobResult;
use crate::provider::ToolDefinition;

/// A request from the model to start a tool as a background job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub name: String,
    pub arguments: serde_json::Value,
}

/// The model's decision for one user turn. Either part may be absent, and
/// both may be present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatDecision {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCallRequest>,
}

impl ChatDecision {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_call: None,
        }
    }

    pub fn tool_call(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            text: None,
            tool_call: Some(ToolCallRequest {
                name: name.into(),
                arguments,
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.tool_call.is_none()
    }
}

#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Decide how to answer, given the full history and the available tools.
    async fn chat(
        &self,
        history: &[Turn],
        tools: &[ToolDefinition],
    ) -> std::result::Result<ChatDecision, ProviderError>;

    /// Turn a finished job into a short user-facing notification.
    async fn summarize(&self, result: &JobResult) -> std::result::Result<String, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_constructors() {
        let d = ChatDecision::text("hi");
        assert_eq!(d.text.as_deref(), Some("hi"));
        assert!(d.tool_call.is_none());

        let d = ChatDecision::tool_call("long_task", serde_json::json!({"input": "x"}));
        assert_eq!(d.tool_call.as_ref().unwrap().name, "long_task");
        assert!(!d.is_empty());
        assert!(ChatDecision::default().is_empty());
    }
}
