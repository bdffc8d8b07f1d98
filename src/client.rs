//! Client library for the webmcp HTTP API.
//!
//! [`Client`] wraps the raw tool-call endpoint; [`Session`] layers
//! convenience methods over one browser session.
//!
//! ```no_run
//! use webmcp::client::Client;
//!
//! # async fn demo() -> webmcp::Result<()> {
//! let client = Client::new(Some("wmcp_...".into()))?;
//! let mut session = client.create_session(true, 30).await?;
//! session.navigate("https://example.com").await?;
//! let png = session.screenshot().await?;
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::http::{ToolCallRequest, ToolCallResponse};
use crate::service::ToolDefinition;

/// Default server address.
pub const DEFAULT_BASE_URL: &str = "http://localhost:9000";

/// Environment variable consulted when no API key is passed explicitly.
pub const API_KEY_ENV: &str = "WEBMCP_API_KEY";

/// HTTP client for a webmcp server.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl Client {
    /// Connect to the default server address.
    ///
    /// Falls back to the `WEBMCP_API_KEY` environment variable when
    /// `api_key` is `None`.
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL, api_key)
    }

    /// Connect to a specific server address.
    pub fn with_base_url(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let api_key = api_key
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .ok_or_else(|| {
                Error::Client(format!(
                    "No API key provided. Pass one explicitly or set {API_KEY_ENV}."
                ))
            })?;

        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Server health summary (no auth required).
    pub async fn health(&self) -> Result<Value> {
        let response = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Error::Client(format!(
                "Health check failed: HTTP {}",
                response.status().as_u16()
            )));
        }
        Ok(response.json().await?)
    }

    /// Tools exposed by a service.
    pub async fn list_tools(&self, service: &str) -> Result<Vec<ToolDefinition>> {
        let response = self
            .http
            .get(format!("{}/api/v1/services/{service}/tools", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Error::Client(format!(
                "Failed to list tools: HTTP {}",
                response.status().as_u16()
            )));
        }
        let body: Value = response.json().await?;
        let tools = body.get("tools").cloned().unwrap_or(json!([]));
        Ok(serde_json::from_value(tools)?)
    }

    /// Call a tool on a service and return the raw response envelope.
    pub async fn call(
        &self,
        service: &str,
        tool: &str,
        arguments: Value,
        session_id: Option<&str>,
    ) -> Result<ToolCallResponse> {
        let request = ToolCallRequest {
            tool_name: tool.to_string(),
            arguments,
            session_id: session_id.map(String::from),
        };

        let response = self
            .http
            .post(format!("{}/api/v1/services/{service}/call", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Client(format!("HTTP {}: {body}", status.as_u16())));
        }

        Ok(response.json().await?)
    }

    /// Create a browser session and return a handle to it.
    pub async fn create_session(&self, headless: bool, timeout: u64) -> Result<Session> {
        let response = self
            .call(
                "browseruse",
                "create_session",
                json!({ "headless": headless, "timeout": timeout }),
                None,
            )
            .await?;

        if !response.success {
            return Err(Error::Client(format!(
                "Failed to create session: {}",
                response.error.unwrap_or_default()
            )));
        }

        let session_id = response
            .result
            .get("session_id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Client("create_session returned no session_id".into()))?
            .to_string();

        Ok(Session {
            client: self.clone(),
            session_id,
            closed: false,
        })
    }
}

/// Handle to one live browser session.
#[derive(Debug)]
pub struct Session {
    client: Client,
    session_id: String,
    closed: bool,
}

impl Session {
    /// The server-side session id.
    pub fn id(&self) -> &str {
        &self.session_id
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Client("Session is closed".into()));
        }
        Ok(())
    }

    async fn tool(&self, tool: &str, arguments: Value) -> Result<Value> {
        self.ensure_open()?;
        let response = self
            .client
            .call("browseruse", tool, arguments, Some(&self.session_id))
            .await?;
        if !response.success {
            return Err(Error::Client(format!(
                "{tool} failed: {}",
                response.error.unwrap_or_default()
            )));
        }
        Ok(response.result)
    }

    /// Navigate to a URL.
    pub async fn navigate(&self, url: &str) -> Result<Value> {
        self.tool("navigate", json!({ "url": url })).await
    }

    /// Click an element.
    pub async fn click(&self, selector: &str, by: &str) -> Result<Value> {
        self.tool("click_element", json!({ "selector": selector, "by": by }))
            .await
    }

    /// Type text into an element.
    pub async fn type_text(&self, selector: &str, text: &str, by: &str) -> Result<Value> {
        self.tool(
            "type_text",
            json!({ "selector": selector, "text": text, "by": by }),
        )
        .await
    }

    /// Find elements on the current page.
    pub async fn find(&self, selector: &str, by: &str) -> Result<Vec<Value>> {
        let result = self
            .tool("find_elements", json!({ "selector": selector, "by": by }))
            .await?;
        Ok(result
            .get("elements")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    /// Current page information.
    pub async fn page_info(&self) -> Result<Value> {
        self.tool("get_page_info", json!({})).await
    }

    /// Take a screenshot and return the decoded PNG bytes.
    pub async fn screenshot(&self) -> Result<Vec<u8>> {
        let result = self.tool("take_screenshot", json!({})).await?;
        decode_screenshot(&result)
    }

    /// Close the session. A server-side close failure is logged, not fatal;
    /// the handle is unusable afterwards either way.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let response = self
            .client
            .call("browseruse", "close_session", json!({}), Some(&self.session_id))
            .await;
        match response {
            Ok(response) if !response.success => {
                tracing::warn!(
                    session = %self.session_id,
                    error = response.error.as_deref().unwrap_or(""),
                    "failed to close session"
                );
            }
            Err(e) => {
                tracing::warn!(session = %self.session_id, error = %e, "failed to close session");
            }
            Ok(_) => {}
        }
        self.closed = true;
        Ok(())
    }
}

fn decode_screenshot(result: &Value) -> Result<Vec<u8>> {
    let data = result
        .get("screenshot")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Client("screenshot payload missing".into()))?;
    BASE64
        .decode(data)
        .map_err(|e| Error::Client(format!("invalid screenshot payload: {e}")))
}
