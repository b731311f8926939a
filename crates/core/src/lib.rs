//! # Backchannel Core
//!
//! Domain types, traits, and error definitions for the Backchannel agent.
//! This crate has **no async runtime dependency**; it defines the domain model
//! that the orchestration engine and its collaborators implement against.
//!
//! ## Layout
//!
//! - [`event`]: in-process topic bus (`user:input`, `job:started`, `job:completed`)
//! - [`conversation`]: the append-only conversation log
//! - [`job`]: job identity, context, and results
//! - [`tool`]: the tool trait and registry
//! - [`provider`] / [`message`]: the LLM backend abstraction
//! - [`completion`]: the chat/summarize boundary the orchestrator calls
//! - [`output`]: the presentation sink

pub mod error;
pub mod event;
pub mod conversation;
pub mod job;
pub mod tool;
pub mod message;
pub mod provider;
pub mod completion;
pub mod output;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus, SubscriptionId};
pub use conversation::{ConversationLog, Turn, TurnContent, TurnRole};
pub use job::{JobContext, JobId, JobOutcome, JobResult, JobStatus};
pub use tool::{Tool, ToolResult, ToolRegistry};
pub use message::{Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition};
pub use completion::{ChatDecision, CompletionService, ToolCallRequest};
pub use output::{OutputKind, OutputSink};
