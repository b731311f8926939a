//! Asana tools: list, create, update and delete tasks in one project.
//!
//! All four tools share an [`AsanaClient`]. Credentials are optional at
//! construction; a tool invoked without them fails with
//! [`ToolError::NotConfigured`], which the launcher turns into a failed job.

use std::sync::Arc;

use async_trait::async_trait;
use backchannel_config::AsanaConfig;
use backchannel_core::error::ToolError;
use backchannel_core::tool::{Tool, ToolResult};
use reqwest::Method;
use tracing::debug;

const ASANA_API_URL: &str = "https://app.asana.com/api/1.0";
const DEFAULT_LIST_LIMIT: u64 = 10;
const MAX_LIST_LIMIT: u64 = 100;

/// Thin authenticated client for the Asana REST API.
pub struct AsanaClient {
    base_url: String,
    access_token: Option<String>,
    project_id: Option<String>,
    client: reqwest::Client,
}

impl AsanaClient {
    pub fn new(access_token: Option<String>, project_id: Option<String>) -> Self {
        Self {
            base_url: ASANA_API_URL.into(),
            access_token: access_token.filter(|t| !t.trim().is_empty()),
            project_id: project_id.filter(|p| !p.trim().is_empty()),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &AsanaConfig) -> Self {
        Self::new(config.access_token.clone(), config.project_id.clone())
    }

    /// Point the client at a different API root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn is_configured(&self) -> bool {
        self.access_token.is_some()
    }

    fn token(&self) -> Result<&str, ToolError> {
        self.access_token
            .as_deref()
            .ok_or_else(|| ToolError::NotConfigured("Missing ASANA_API_KEY".into()))
    }

    fn project(&self) -> Result<&str, ToolError> {
        self.project_id
            .as_deref()
            .ok_or_else(|| ToolError::NotConfigured("Missing ASANA_PROJECT_ID".into()))
    }

    /// Send a request and return the `data` member of the response.
    async fn call(
        &self,
        tool_name: &str,
        method: Method,
        endpoint: &str,
        body: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, ToolError> {
        let token = self.token()?;
        let url = format!("{}{}", self.base_url, endpoint);
        debug!(%method, url = %url, "Asana request");

        let mut request = self.client.request(method, &url).bearer_auth(token);
        if let Some(data) = body {
            request = request.json(&serde_json::json!({ "data": data }));
        }

        let failed = |reason: String| ToolError::ExecutionFailed {
            tool_name: tool_name.to_string(),
            reason,
        };

        let response = request
            .send()
            .await
            .map_err(|e| failed(format!("Asana request failed: {e}")))?;
        let status = response.status();
        let payload: serde_json::Value = response
            .json()
            .await
            .unwrap_or(serde_json::Value::Null);

        if !status.is_success() {
            return Err(failed(format!(
                "Asana API Error ({status}): {}",
                api_error_message(&payload)
            )));
        }

        Ok(payload.get("data").cloned().unwrap_or(serde_json::Value::Null))
    }
}

/// Collect the `errors[].message` strings Asana returns on failure.
fn api_error_message(payload: &serde_json::Value) -> String {
    let messages: Vec<&str> = payload["errors"]
        .as_array()
        .map(|errors| errors.iter().filter_map(|e| e["message"].as_str()).collect())
        .unwrap_or_default();

    if messages.is_empty() {
        "unknown error".into()
    } else {
        messages.join("; ")
    }
}

/// Task ids are numeric gids; anything else is rejected before it reaches a URL.
fn task_id(arguments: &serde_json::Value) -> Result<&str, ToolError> {
    let id = arguments["taskId"]
        .as_str()
        .map(str::trim)
        .ok_or_else(|| ToolError::InvalidArguments("Missing 'taskId' argument".into()))?;

    if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
        return Err(ToolError::InvalidArguments(format!(
            "Invalid task ID '{id}': expected a numeric Asana ID"
        )));
    }
    Ok(id)
}

/// Render a task list the way the assistant reads it back.
pub fn format_task_list(tasks: &serde_json::Value) -> String {
    let Some(tasks) = tasks.as_array().filter(|t| !t.is_empty()) else {
        return "No tasks found in this project.".into();
    };

    tasks
        .iter()
        .map(|task| {
            let mark = if task["completed"].as_bool().unwrap_or(false) { "X" } else { " " };
            let name = task["name"].as_str().unwrap_or("(untitled)");
            let gid = task["gid"].as_str().unwrap_or("?");
            match task["due_on"].as_str() {
                Some(due) => format!("- [{mark}] {name} (due {due}) (ID: {gid})"),
                None => format!("- [{mark}] {name} (ID: {gid})"),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// --- Tools ---

pub struct AsanaListTasksTool {
    client: Arc<AsanaClient>,
}

impl AsanaListTasksTool {
    pub fn new(client: Arc<AsanaClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for AsanaListTasksTool {
    fn name(&self) -> &str {
        "asana_list_tasks"
    }

    fn description(&self) -> &str {
        "List tasks in the Asana project, with their IDs and completion state. \
         Use this to find a task ID before updating or deleting a task."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of tasks to return (default 10)",
                    "default": DEFAULT_LIST_LIMIT
                }
            }
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let limit = arguments["limit"]
            .as_u64()
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT);
        let project = self.client.project()?;

        let endpoint = format!(
            "/projects/{project}/tasks?opt_fields=name,completed,due_on,permalink_url&limit={limit}"
        );
        let data = self.client.call(self.name(), Method::GET, &endpoint, None).await?;

        Ok(ToolResult::ok(format_task_list(&data)).with_data(data))
    }
}

pub struct AsanaCreateTaskTool {
    client: Arc<AsanaClient>,
}

impl AsanaCreateTaskTool {
    pub fn new(client: Arc<AsanaClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for AsanaCreateTaskTool {
    fn name(&self) -> &str {
        "asana_create_task"
    }

    fn description(&self) -> &str {
        "Create a new task in the Asana project."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "Title of the task"
                },
                "notes": {
                    "type": "string",
                    "description": "Optional description"
                },
                "due_on": {
                    "type": "string",
                    "description": "Optional due date, YYYY-MM-DD"
                }
            },
            "required": ["name"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let name = arguments["name"]
            .as_str()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'name' argument".into()))?;
        let project = self.client.project()?;

        let mut body = serde_json::json!({
            "projects": [project],
            "name": name,
            "notes": arguments["notes"].as_str().unwrap_or(""),
        });
        if let Some(due) = arguments["due_on"].as_str() {
            body["due_on"] = due.into();
        }

        let data = self
            .client
            .call(self.name(), Method::POST, "/tasks", Some(body))
            .await?;

        let gid = data["gid"].as_str().unwrap_or("?");
        let link = data["permalink_url"].as_str().unwrap_or("(no link)");
        Ok(ToolResult::ok(format!(
            "Task Created Successfully!\nID: {gid}\nLink: {link}"
        ))
        .with_data(data))
    }
}

pub struct AsanaUpdateTaskTool {
    client: Arc<AsanaClient>,
}

impl AsanaUpdateTaskTool {
    pub fn new(client: Arc<AsanaClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for AsanaUpdateTaskTool {
    fn name(&self) -> &str {
        "asana_update_task"
    }

    fn description(&self) -> &str {
        "Update an Asana task: mark it completed or active, or rename it. Requires the task ID."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "taskId": {
                    "type": "string",
                    "description": "The Asana task ID"
                },
                "completed": {
                    "type": "boolean",
                    "description": "Mark the task completed (true) or active (false)"
                },
                "name": {
                    "type": "string",
                    "description": "New title for the task"
                }
            },
            "required": ["taskId"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let id = task_id(&arguments)?;

        let mut body = serde_json::Map::new();
        if let Some(completed) = arguments["completed"].as_bool() {
            body.insert("completed".into(), completed.into());
        }
        if let Some(name) = arguments["name"].as_str() {
            body.insert("name".into(), name.into());
        }
        if body.is_empty() {
            return Err(ToolError::InvalidArguments(
                "Nothing to update: pass 'completed' or 'name'".into(),
            ));
        }

        let data = self
            .client
            .call(
                self.name(),
                Method::PUT,
                &format!("/tasks/{id}"),
                Some(serde_json::Value::Object(body)),
            )
            .await?;

        let state = if data["completed"].as_bool().unwrap_or(false) {
            "Completed"
        } else {
            "Active"
        };
        Ok(ToolResult::ok(format!("Task {id} updated. Status: {state}")).with_data(data))
    }
}

pub struct AsanaDeleteTaskTool {
    client: Arc<AsanaClient>,
}

impl AsanaDeleteTaskTool {
    pub fn new(client: Arc<AsanaClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for AsanaDeleteTaskTool {
    fn name(&self) -> &str {
        "asana_delete_task"
    }

    fn description(&self) -> &str {
        "Permanently delete an Asana task. Requires the task ID."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "taskId": {
                    "type": "string",
                    "description": "The Asana task ID"
                }
            },
            "required": ["taskId"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let id = task_id(&arguments)?;
        self.client
            .call(self.name(), Method::DELETE, &format!("/tasks/{id}"), None)
            .await?;
        Ok(ToolResult::ok(format!("Task {id} has been deleted.")))
    }
}
