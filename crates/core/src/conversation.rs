//! The append-only conversation log.
//!
//! The log is the literal context window sent to the completion service,
//! so insertion order matters. Turns are never edited or removed, and
//! readers get an owned [`snapshot`](ConversationLog::snapshot) rather than
//! a live view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::sync::{PoisonError, RwLock};

/// Who contributed a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Model,
}

/// Plain text or a structured JSON value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TurnContent {
    Text(String),
    Structured(serde_json::Value),
}

impl TurnContent {
    /// Text as-is; structured content JSON-encoded.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Self::Text(s) => Cow::Borrowed(s),
            Self::Structured(v) => Cow::Owned(v.to_string()),
        }
    }
}

impl From<&str> for TurnContent {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for TurnContent {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<serde_json::Value> for TurnContent {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::String(s) => Self::Text(s),
            other => Self::Structured(other),
        }
    }
}

/// One immutable entry in the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: TurnContent,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn text(&self) -> Cow<'_, str> {
        self.content.as_text()
    }
}

/// Ordered, append-only record of the conversation.
#[derive(Debug, Default)]
pub struct ConversationLog {
    turns: RwLock<Vec<Turn>>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn stamped with the current time.
    ///
    /// Timestamps never go backwards, even if the wall clock does.
    pub fn append(
        &self,
        role: TurnRole,
        content: impl Into<TurnContent>,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) {
        let mut turns = self.turns.write().unwrap_or_else(PoisonError::into_inner);
        let now = Utc::now();
        let timestamp = match turns.last() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        };
        turns.push(Turn {
            role,
            content: content.into(),
            metadata,
            timestamp,
        });
    }

    pub fn append_user(&self, content: impl Into<TurnContent>) {
        self.append(TurnRole::User, content, serde_json::Map::new());
    }

    pub fn append_model(&self, content: impl Into<TurnContent>) {
        self.append(TurnRole::Model, content, serde_json::Map::new());
    }

    /// An owned copy of every turn, in order.
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.turns.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
