//! The tool service abstraction.
//!
//! Every service exposes a small vocabulary of named tools invoked with a
//! JSON argument mapping. Tool execution never raises across this boundary:
//! failures come back as a result value carrying an `"error"` key, so a
//! misbehaving tool call cannot take down the server process.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Service names this build knows how to construct.
pub const AVAILABLE_SERVICES: [&str; 3] = ["browseruse", "web_search", "web_crawler"];

/// Tool definition with a JSON Schema for its arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name.
    pub name: String,
    /// Tool description.
    pub description: String,
    /// Argument schema (JSON Schema).
    pub parameters: Value,
}

/// Summary of a running service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    /// Service name.
    pub name: String,
    /// Whether the service is running.
    pub running: bool,
    /// Names of the tools it exposes.
    pub tools: Vec<String>,
}

/// A tool service.
#[async_trait]
pub trait McpService: Send + Sync + std::fmt::Debug {
    /// The service's registered name.
    fn name(&self) -> &str;

    /// Start the service.
    async fn start(&self) -> Result<()>;

    /// Stop the service, releasing any held resources.
    async fn stop(&self) -> Result<()>;

    /// Whether the service is currently running.
    fn running(&self) -> bool;

    /// The tools this service exposes.
    fn tools(&self) -> Vec<ToolDefinition>;

    /// Execute a tool.
    ///
    /// The returned mapping signals failure through an `"error"` key;
    /// everything else is the tool-specific success payload. Implementations
    /// must not propagate faults out of this method.
    async fn call_tool(&self, tool: &str, arguments: Value, session_id: Option<&str>) -> Value;

    /// Health summary string.
    fn health(&self) -> &'static str {
        if self.running() {
            "healthy"
        } else {
            "stopped"
        }
    }

    /// Service summary for listings.
    fn info(&self) -> ServiceInfo {
        ServiceInfo {
            name: self.name().to_string(),
            running: self.running(),
            tools: self.tools().into_iter().map(|t| t.name).collect(),
        }
    }
}

/// The structured result for a tool invoked with an unknown name.
pub fn unknown_tool(name: &str) -> Value {
    serde_json::json!({ "error": format!("Unknown tool: {name}") })
}
