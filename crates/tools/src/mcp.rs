//! MCP tools: tools served by external Model Context Protocol servers.
//!
//! Each server under `[mcp.servers]` is connected once at startup, either
//! by spawning its `command` and speaking stdio or by opening a
//! streamable-HTTP session to its `url`. Every tool it lists becomes an
//! [`McpTool`] in the registry and runs as a background job like any
//! built-in tool.

use std::sync::Arc;

use async_trait::async_trait;
use backchannel_config::{McpConfig, McpServerConfig};
use backchannel_core::error::ToolError;
use backchannel_core::tool::{Tool, ToolRegistry, ToolResult};
use rmcp::model::{CallToolRequestParams, Content};
use rmcp::service::RunningService;
use rmcp::transport::{StreamableHttpClientTransport, TokioChildProcess};
use rmcp::{RoleClient, ServiceExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("MCP server '{name}' has neither a command nor a url")]
    NoTransport { name: String },

    #[error("failed to spawn MCP server '{name}': {source}")]
    SpawnFailed {
        name: String,
        source: std::io::Error,
    },

    #[error("MCP protocol error for '{server}': {message}")]
    Protocol { server: String, message: String },
}

/// A live connection to one MCP server.
///
/// Dropping the last handle closes the session (and stops a spawned
/// server process).
pub struct McpServer {
    name: String,
    service: RunningService<RoleClient, ()>,
}

impl McpServer {
    /// Connect and complete the MCP initialization handshake.
    pub async fn connect(name: &str, config: &McpServerConfig) -> Result<Arc<Self>, McpError> {
        let handshake = |e: rmcp::service::ClientInitializeError| McpError::Protocol {
            server: name.to_string(),
            message: format!("initialization failed: {e}"),
        };

        let service = match (&config.command, &config.url) {
            (Some(command), _) => {
                info!(server = name, command = %command, "Starting MCP server");
                let mut cmd = Command::new(command);
                cmd.args(&config.args);
                for (key, value) in &config.env {
                    cmd.env(key, value);
                }
                let transport = TokioChildProcess::new(cmd).map_err(|e| McpError::SpawnFailed {
                    name: name.to_string(),
                    source: e,
                })?;
                ().serve(transport).await.map_err(handshake)?
            }
            (None, Some(url)) => {
                info!(server = name, url = %url, "Connecting to MCP server");
                let transport = StreamableHttpClientTransport::from_uri(url.as_str());
                ().serve(transport).await.map_err(handshake)?
            }
            (None, None) => {
                return Err(McpError::NoTransport {
                    name: name.to_string(),
                });
            }
        };

        Ok(Arc::new(Self {
            name: name.to_string(),
            service,
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Every tool the server offers, ready to register.
    pub async fn tools(self: &Arc<Self>) -> Result<Vec<McpTool>, McpError> {
        let listed = self
            .service
            .list_all_tools()
            .await
            .map_err(|e| McpError::Protocol {
                server: self.name.clone(),
                message: format!("tools/list failed: {e}"),
            })?;

        Ok(listed
            .into_iter()
            .map(|tool| McpTool {
                server: Arc::clone(self),
                name: tool.name.to_string(),
                description: describe(&self.name, tool.description.as_deref()),
                schema: serde_json::Value::Object((*tool.input_schema).clone()),
            })
            .collect())
    }
}

/// One tool hosted by an MCP server.
pub struct McpTool {
    server: Arc<McpServer>,
    name: String,
    description: String,
    schema: serde_json::Value,
}

#[async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        self.schema.clone()
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let arguments = arguments_map(arguments)?;
        debug!(server = %self.server.name, tool = %self.name, "Calling MCP tool");

        let result = self
            .server
            .service
            .call_tool({
                let mut params = CallToolRequestParams::new(self.name.clone());
                params.arguments = arguments;
                params
            })
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name.clone(),
                reason: format!("MCP server '{}': {e}", self.server.name),
            })?;

        let text = content_to_text(&result.content);
        if result.is_error == Some(true) {
            Ok(ToolResult::failure(text))
        } else {
            Ok(ToolResult::ok(text))
        }
    }
}

fn describe(server: &str, description: Option<&str>) -> String {
    match description.map(str::trim) {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => format!("Tool from {server}"),
    }
}

/// MCP takes named arguments only; `null` means none.
fn arguments_map(
    arguments: serde_json::Value,
) -> Result<Option<serde_json::Map<String, serde_json::Value>>, ToolError> {
    match arguments {
        serde_json::Value::Object(map) => Ok(Some(map)),
        serde_json::Value::Null => Ok(None),
        other => Err(ToolError::InvalidArguments(format!(
            "MCP tools take an object of named arguments, got {other}"
        ))),
    }
}

/// Flatten MCP content into text. Non-text items become a `[kind]` marker.
pub fn content_to_text(content: &[Content]) -> String {
    use rmcp::model::{RawContent, ResourceContents};

    content
        .iter()
        .map(|item| match &**item {
            RawContent::Text(text) => text.text.clone(),
            RawContent::Image(_) => "[image]".into(),
            RawContent::Audio(_) => "[audio]".into(),
            RawContent::Resource(res) => match &res.resource {
                ResourceContents::TextResourceContents { text, .. } if !text.is_empty() => text.clone(),
                _ => "[resource]".into(),
            },
            RawContent::ResourceLink(link) => format!("[resource_link: {}]", link.uri),
            #[allow(unreachable_patterns)]
            _ => "[content]".into(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Connect every configured server and register its tools.
///
/// A server that fails to start or list its tools is logged and skipped.
/// A tool whose name is already registered keeps the existing tool.
/// Returns the connected servers.
pub async fn register_mcp_tools(registry: &mut ToolRegistry, config: &McpConfig) -> Vec<Arc<McpServer>> {
    let mut names: Vec<&String> = config.servers.keys().collect();
    names.sort();

    let mut connected = Vec::new();
    for name in names {
        let server = match McpServer::connect(name, &config.servers[name]).await {
            Ok(server) => server,
            Err(e) => {
                warn!(server = %name, error = %e, "Skipping MCP server");
                continue;
            }
        };

        let tools = match server.tools().await {
            Ok(tools) => tools,
            Err(e) => {
                warn!(server = %name, error = %e, "Skipping MCP server");
                continue;
            }
        };

        let mut added = 0;
        for tool in tools {
            if registry.get(tool.name()).is_some() {
                warn!(server = %name, tool = %tool.name(), "MCP tool name already taken, skipping");
                continue;
            }
            registry.register(Arc::new(tool));
            added += 1;
        }
        info!(server = %name, tools = added, "Registered MCP tools");
        connected.push(server);
    }
    connected
}
