//! Built-in tool implementations for Backchannel.
//!
//! Every tool here is meant to run as a background job: the agent launches
//! it, keeps chatting, and reports the result when it lands. Tools from
//! configured MCP servers join the same registry through [`mcp`].

pub mod asana;
pub mod long_task;
pub mod mcp;

use std::sync::Arc;
use std::time::Duration;

use backchannel_config::AppConfig;
use backchannel_core::tool::ToolRegistry;

pub use asana::AsanaClient;
pub use long_task::LongTaskTool;
pub use mcp::{McpServer, McpTool, register_mcp_tools};

/// Create the tool registry for a configuration.
///
/// Asana tools are always registered; without credentials they fail at
/// execution time with a readable error.
pub fn default_registry(config: &AppConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(LongTaskTool::new(Duration::from_secs(
        config.tools.long_task_delay_secs,
    ))));

    let asana = Arc::new(AsanaClient::from_config(&config.asana));
    registry.register(Arc::new(asana::AsanaListTasksTool::new(asana.clone())));
    registry.register(Arc::new(asana::AsanaCreateTaskTool::new(asana.clone())));
    registry.register(Arc::new(asana::AsanaUpdateTaskTool::new(asana.clone())));
    registry.register(Arc::new(asana::AsanaDeleteTaskTool::new(asana)));
    registry
}
