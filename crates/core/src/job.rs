//! Job domain types.
//!
//! A job is a named tool invocation that runs in the background. Jobs are
//! never looked up after launch: the only way to learn how one went is the
//! `job:completed` event carrying a [`JobResult`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier for a launched job, used for correlation only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The first eight characters, for status lines.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Open key/value context that travels with a job from launch to result.
///
/// Always carries the originating user message under `user_intent` when
/// launched by the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobContext(pub serde_json::Map<String, serde_json::Value>);

impl JobContext {
    pub const USER_INTENT: &'static str = "user_intent";

    /// Context for a job triggered by a user message.
    pub fn from_user_intent(intent: impl Into<String>) -> Self {
        let mut map = serde_json::Map::new();
        map.insert(Self::USER_INTENT.into(), serde_json::Value::String(intent.into()));
        Self(map)
    }

    pub fn user_intent(&self) -> Option<&str> {
        self.0.get(Self::USER_INTENT).and_then(|v| v.as_str())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }
}

/// Success or failure marker of a finished job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Success,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a job produced: output on success, a readable message on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Success {
        output: String,
        /// Structured data the tool returned alongside its text output.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<serde_json::Value>,
    },
    Failed { error: String },
}

/// The single terminal record of a launched job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: JobId,
    pub tool_name: String,
    #[serde(flatten)]
    pub outcome: JobOutcome,
    #[serde(default)]
    pub context: JobContext,
}

impl JobResult {
    pub fn success(
        job_id: JobId,
        tool_name: impl Into<String>,
        output: impl Into<String>,
        context: JobContext,
    ) -> Self {
        Self {
            job_id,
            tool_name: tool_name.into(),
            outcome: JobOutcome::Success {
                output: output.into(),
                data: None,
            },
            context,
        }
    }

    /// Attach structured data to a successful result. No effect on a
    /// failed one.
    pub fn with_data(mut self, value: serde_json::Value) -> Self {
        if let JobOutcome::Success { data, .. } = &mut self.outcome {
            *data = Some(value);
        }
        self
    }

    /// A failed result. An empty message is replaced so failures always
    /// carry something readable.
    pub fn failed(
        job_id: JobId,
        tool_name: impl Into<String>,
        error: impl Into<String>,
        context: JobContext,
    ) -> Self {
        let mut error = error.into();
        if error.trim().is_empty() {
            error = "job failed without an error message".into();
        }
        Self {
            job_id,
            tool_name: tool_name.into(),
            outcome: JobOutcome::Failed { error },
            context,
        }
    }

    pub fn status(&self) -> JobStatus {
        match self.outcome {
            JobOutcome::Success { .. } => JobStatus::Success,
            JobOutcome::Failed { .. } => JobStatus::Failed,
        }
    }

    pub fn output(&self) -> Option<&str> {
        match &self.outcome {
            JobOutcome::Success { output, .. } => Some(output),
            JobOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            JobOutcome::Success { .. } => None,
            JobOutcome::Failed { error } => Some(error),
        }
    }

    pub fn data(&self) -> Option<&serde_json::Value> {
        match &self.outcome {
            JobOutcome::Success { data, .. } => data.as_ref(),
            JobOutcome::Failed { .. } => None,
        }
    }
}
