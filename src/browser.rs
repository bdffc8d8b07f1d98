//! Browser automation service backed by a bounded session registry.
//!
//! Each session exclusively owns one WebDriver handle. Sessions are created
//! and closed only on explicit request (or service-wide shutdown); there is
//! no implicit garbage collection. Closing a session while one of its
//! operations is still in flight is unsupported.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thirtyfour::prelude::*;
use thirtyfour::ChromiumLikeCapabilities;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::service::{unknown_tool, McpService, ToolDefinition};

/// Element selector strategies accepted by the browser tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// CSS selector.
    Css(String),
    /// XPath expression.
    XPath(String),
    /// Element id.
    Id(String),
    /// Class name.
    Class(String),
    /// Tag name.
    Tag(String),
    /// Name attribute.
    Name(String),
}

impl Selector {
    /// Parse a `(by, target)` pair; `None` when `by` is not a known
    /// strategy.
    pub fn parse(by: &str, target: &str) -> Option<Self> {
        let target = target.to_string();
        match by {
            "css" => Some(Selector::Css(target)),
            "xpath" => Some(Selector::XPath(target)),
            "id" => Some(Selector::Id(target)),
            "class" => Some(Selector::Class(target)),
            "tag" => Some(Selector::Tag(target)),
            "name" => Some(Selector::Name(target)),
            _ => None,
        }
    }

    fn to_by(&self) -> By {
        match self {
            Selector::Css(s) => By::Css(s.clone()),
            Selector::XPath(s) => By::XPath(s.clone()),
            Selector::Id(s) => By::Id(s.clone()),
            Selector::Class(s) => By::ClassName(s.clone()),
            Selector::Tag(s) => By::Tag(s.clone()),
            Selector::Name(s) => By::Name(s.clone()),
        }
    }
}

/// Attributes reported for a matched element.
#[derive(Debug, Clone, Serialize)]
pub struct ElementAttributes {
    /// `id` attribute.
    pub id: Option<String>,
    /// `class` attribute.
    pub class: Option<String>,
    /// `href` attribute.
    pub href: Option<String>,
}

/// One matched element, trimmed to the fields the tools report.
#[derive(Debug, Clone, Serialize)]
pub struct ElementInfo {
    /// Tag name.
    pub tag: String,
    /// Visible text.
    pub text: String,
    /// Selected attributes.
    pub attributes: ElementAttributes,
}

/// Handle to one externally-owned browser automation process.
#[async_trait]
pub trait DriverHandle: Send + Sync {
    /// Load a URL.
    async fn navigate(&self, url: &str) -> Result<()>;
    /// Current URL.
    async fn current_url(&self) -> Result<String>;
    /// Current page title.
    async fn title(&self) -> Result<String>;
    /// Length of the page source.
    async fn page_source_length(&self) -> Result<usize>;
    /// Find all elements matching a selector.
    async fn find_elements(&self, selector: &Selector) -> Result<Vec<ElementInfo>>;
    /// Click the first element matching a selector.
    async fn click(&self, selector: &Selector) -> Result<()>;
    /// Clear and type into the first element matching a selector.
    async fn type_text(&self, selector: &Selector, text: &str) -> Result<()>;
    /// PNG screenshot of the current page.
    async fn screenshot_png(&self) -> Result<Vec<u8>>;
    /// Shut the browser process down.
    async fn quit(self: Box<Self>) -> Result<()>;
}

/// Produces [`DriverHandle`]s. The production connector speaks WebDriver;
/// tests inject a mock.
#[async_trait]
pub trait DriverConnector: Send + Sync {
    /// Start a new browser process and return its handle.
    async fn connect(&self, headless: bool, timeout: Duration) -> Result<Box<dyn DriverHandle>>;
}

/// WebDriver-backed connector (chromedriver et al.).
pub struct WebDriverConnector {
    /// WebDriver endpoint, e.g. `http://localhost:9515`.
    pub url: String,
}

#[async_trait]
impl DriverConnector for WebDriverConnector {
    async fn connect(&self, headless: bool, timeout: Duration) -> Result<Box<dyn DriverHandle>> {
        let mut caps = DesiredCapabilities::chrome();
        if headless {
            caps.set_headless()?;
        }
        caps.add_arg("--no-sandbox")?;
        caps.add_arg("--disable-dev-shm-usage")?;
        caps.add_arg("--disable-gpu")?;
        caps.add_arg("--window-size=1920,1080")?;

        let driver = WebDriver::new(&self.url, caps).await?;
        driver.set_implicit_wait_timeout(timeout).await?;
        Ok(Box::new(WebDriverHandle { driver }))
    }
}

struct WebDriverHandle {
    driver: WebDriver,
}

#[async_trait]
impl DriverHandle for WebDriverHandle {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.driver.goto(url).await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.driver.current_url().await?.to_string())
    }

    async fn title(&self) -> Result<String> {
        Ok(self.driver.title().await?)
    }

    async fn page_source_length(&self) -> Result<usize> {
        Ok(self.driver.source().await?.len())
    }

    async fn find_elements(&self, selector: &Selector) -> Result<Vec<ElementInfo>> {
        let elements = self.driver.find_all(selector.to_by()).await?;
        let mut found = Vec::with_capacity(elements.len());
        for element in elements {
            found.push(ElementInfo {
                tag: element.tag_name().await?,
                text: element.text().await?,
                attributes: ElementAttributes {
                    id: element.attr("id").await?,
                    class: element.attr("class").await?,
                    href: element.attr("href").await?,
                },
            });
        }
        Ok(found)
    }

    async fn click(&self, selector: &Selector) -> Result<()> {
        self.driver.find(selector.to_by()).await?.click().await?;
        Ok(())
    }

    async fn type_text(&self, selector: &Selector, text: &str) -> Result<()> {
        let element = self.driver.find(selector.to_by()).await?;
        element.clear().await?;
        element.send_keys(text).await?;
        Ok(())
    }

    async fn screenshot_png(&self) -> Result<Vec<u8>> {
        Ok(self.driver.screenshot_as_png().await?)
    }

    async fn quit(self: Box<Self>) -> Result<()> {
        self.driver.quit().await?;
        Ok(())
    }
}

/// A live browser session.
pub struct BrowserSession {
    /// Generated session id.
    pub id: String,
    /// Whether the browser runs headless.
    pub headless: bool,
    /// Per-operation deadline.
    pub timeout: Duration,
    handle: Box<dyn DriverHandle>,
}

impl BrowserSession {
    async fn with_timeout<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(self.timeout.as_secs())),
        }
    }

    async fn navigate(&self, url: &str) -> Result<Value> {
        self.with_timeout(async {
            self.handle.navigate(url).await?;
            Ok(json!({
                "url": self.handle.current_url().await?,
                "title": self.handle.title().await?,
                "status": "success",
            }))
        })
        .await
    }

    async fn page_info(&self) -> Result<Value> {
        self.with_timeout(async {
            Ok(json!({
                "url": self.handle.current_url().await?,
                "title": self.handle.title().await?,
                "page_source_length": self.handle.page_source_length().await?,
            }))
        })
        .await
    }

    async fn find_elements(&self, selector: &Selector) -> Result<Value> {
        let elements = self
            .with_timeout(self.handle.find_elements(selector))
            .await?;
        Ok(json!({ "elements": elements }))
    }

    async fn click(&self, selector: &Selector) -> Result<Value> {
        self.with_timeout(async {
            self.handle.click(selector).await?;
            Ok(json!({
                "status": "success",
                "current_url": self.handle.current_url().await?,
            }))
        })
        .await
    }

    async fn type_text(&self, selector: &Selector, text: &str) -> Result<Value> {
        self.with_timeout(self.handle.type_text(selector, text))
            .await?;
        Ok(json!({ "status": "success" }))
    }

    async fn screenshot(&self) -> Result<Value> {
        let png = self.with_timeout(self.handle.screenshot_png()).await?;
        Ok(json!({
            "screenshot": BASE64.encode(png),
            "format": "base64",
        }))
    }
}

#[derive(Debug, Deserialize)]
struct CreateSessionArgs {
    headless: Option<bool>,
    timeout: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct NavigateArgs {
    url: String,
}

fn default_by() -> String {
    "css".into()
}

#[derive(Debug, Deserialize)]
struct FindElementsArgs {
    selector: String,
    #[serde(default = "default_by")]
    by: String,
}

#[derive(Debug, Deserialize)]
struct TypeTextArgs {
    selector: String,
    text: String,
    #[serde(default = "default_by")]
    by: String,
}

/// Browser automation service with a bounded pool of sessions.
pub struct BrowserService {
    sessions: RwLock<HashMap<String, BrowserSession>>,
    connector: Arc<dyn DriverConnector>,
    max_sessions: usize,
    default_headless: bool,
    default_timeout: u64,
    running: AtomicBool,
}

impl std::fmt::Debug for BrowserService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserService")
            .field("max_sessions", &self.max_sessions)
            .field("default_headless", &self.default_headless)
            .field("default_timeout", &self.default_timeout)
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}

impl BrowserService {
    /// Build from a service config mapping, using the WebDriver connector.
    ///
    /// Recognized keys: `max_sessions` (default 5), `headless` (default
    /// true), `timeout` seconds (default 30), `webdriver_url`.
    pub fn from_config(config: &Value) -> Self {
        let url = config
            .get("webdriver_url")
            .and_then(Value::as_str)
            .unwrap_or("http://localhost:9515")
            .to_string();
        Self::with_connector(config, Arc::new(WebDriverConnector { url }))
    }

    /// Build with a custom connector (used by tests).
    pub fn with_connector(config: &Value, connector: Arc<dyn DriverConnector>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            connector,
            max_sessions: config
                .get("max_sessions")
                .and_then(Value::as_u64)
                .unwrap_or(5) as usize,
            default_headless: config
                .get("headless")
                .and_then(Value::as_bool)
                .unwrap_or(true),
            default_timeout: config.get("timeout").and_then(Value::as_u64).unwrap_or(30),
            running: AtomicBool::new(false),
        }
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn create_session(&self, arguments: Value) -> Value {
        let args: CreateSessionArgs = match serde_json::from_value(arguments) {
            Ok(args) => args,
            Err(e) => return json!({ "error": format!("invalid arguments: {e}") }),
        };
        let headless = args.headless.unwrap_or(self.default_headless);
        let timeout = args.timeout.unwrap_or(self.default_timeout);

        // The write lock is held across driver startup so the pool bound
        // holds under concurrent creation attempts.
        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.max_sessions {
            return json!({ "error": format!("Maximum sessions ({}) reached", self.max_sessions) });
        }

        match self
            .connector
            .connect(headless, Duration::from_secs(timeout))
            .await
        {
            Ok(handle) => {
                let id = Uuid::new_v4().to_string();
                sessions.insert(
                    id.clone(),
                    BrowserSession {
                        id: id.clone(),
                        headless,
                        timeout: Duration::from_secs(timeout),
                        handle,
                    },
                );
                tracing::info!(session = %id, headless, timeout, "browser session created");
                json!({
                    "session_id": id,
                    "status": "created",
                    "headless": headless,
                    "timeout": timeout,
                })
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to start browser session");
                json!({ "error": e.to_string() })
            }
        }
    }

    async fn close_session(&self, session_id: &str) -> Value {
        let session = self.sessions.write().await.remove(session_id);
        match session {
            None => json!({ "error": "Session not found" }),
            Some(session) => {
                let BrowserSession { handle, .. } = session;
                if let Err(e) = handle.quit().await {
                    tracing::warn!(session = %session_id, error = %e, "browser did not quit cleanly");
                    return json!({ "error": e.to_string() });
                }
                tracing::info!(session = %session_id, "browser session closed");
                json!({ "session_id": session_id, "status": "closed" })
            }
        }
    }

    async fn session_tool(&self, tool: &str, arguments: Value, session_id: Option<&str>) -> Value {
        let sessions = self.sessions.read().await;
        let session = match session_id.and_then(|id| sessions.get(id)) {
            Some(session) => session,
            None => {
                return json!({
                    "error": "No active session. Create a session first.",
                    "session_id": session_id,
                })
            }
        };

        let result = match tool {
            "navigate" => {
                let args: NavigateArgs = match serde_json::from_value(arguments) {
                    Ok(args) => args,
                    Err(e) => return json!({ "error": format!("invalid arguments: {e}") }),
                };
                session.navigate(&args.url).await
            }
            "get_page_info" => session.page_info().await,
            "find_elements" => {
                let args: FindElementsArgs = match serde_json::from_value(arguments) {
                    Ok(args) => args,
                    Err(e) => return json!({ "error": format!("invalid arguments: {e}") }),
                };
                let Some(selector) = Selector::parse(&args.by, &args.selector) else {
                    return json!({ "error": format!("Unsupported selector type: {}", args.by) });
                };
                session.find_elements(&selector).await
            }
            "click_element" => {
                let args: FindElementsArgs = match serde_json::from_value(arguments) {
                    Ok(args) => args,
                    Err(e) => return json!({ "error": format!("invalid arguments: {e}") }),
                };
                let Some(selector) = parse_interaction_selector(&args.by, &args.selector) else {
                    return json!({ "error": format!("Unsupported selector type: {}", args.by) });
                };
                session.click(&selector).await
            }
            "type_text" => {
                let args: TypeTextArgs = match serde_json::from_value(arguments) {
                    Ok(args) => args,
                    Err(e) => return json!({ "error": format!("invalid arguments: {e}") }),
                };
                let Some(selector) = parse_interaction_selector(&args.by, &args.selector) else {
                    return json!({ "error": format!("Unsupported selector type: {}", args.by) });
                };
                session.type_text(&selector, &args.text).await
            }
            "take_screenshot" => session.screenshot().await,
            _ => return unknown_tool(tool),
        };

        match result {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(tool, error = %e, "browser tool failed");
                json!({ "error": e.to_string() })
            }
        }
    }
}

/// Click/type accept a narrower strategy set than find.
fn parse_interaction_selector(by: &str, target: &str) -> Option<Selector> {
    if !matches!(by, "css" | "xpath" | "id" | "class") {
        return None;
    }
    Selector::parse(by, target)
}

#[async_trait]
impl McpService for BrowserService {
    fn name(&self) -> &str {
        "browseruse"
    }

    async fn start(&self) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        tracing::info!("browseruse service started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let drained: Vec<(String, BrowserSession)> =
            self.sessions.write().await.drain().collect();

        let mut failures = 0usize;
        for (id, session) in drained {
            let BrowserSession { handle, .. } = session;
            if let Err(e) = handle.quit().await {
                failures += 1;
                tracing::warn!(session = %id, error = %e, "failed to close session during shutdown");
            }
        }
        if failures > 0 {
            tracing::warn!(failures, "some sessions did not shut down cleanly");
        }

        self.running.store(false, Ordering::SeqCst);
        tracing::info!("browseruse service stopped");
        Ok(())
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: "create_session".into(),
                description: "Create a new browser session".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "headless": {
                            "type": "boolean",
                            "description": "Run browser in headless mode",
                            "default": true
                        },
                        "timeout": {
                            "type": "integer",
                            "description": "Default timeout in seconds",
                            "default": 30
                        }
                    }
                }),
            },
            ToolDefinition {
                name: "navigate".into(),
                description: "Navigate to a URL".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "url": { "type": "string", "description": "URL to navigate to" }
                    },
                    "required": ["url"]
                }),
            },
            ToolDefinition {
                name: "get_page_info".into(),
                description: "Get current page information".into(),
                parameters: json!({ "type": "object", "properties": {} }),
            },
            ToolDefinition {
                name: "find_elements".into(),
                description: "Find elements on the page".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "selector": { "type": "string", "description": "CSS selector or XPath" },
                        "by": {
                            "type": "string",
                            "description": "Selector type (css, xpath, id, class, tag, name)",
                            "default": "css"
                        }
                    },
                    "required": ["selector"]
                }),
            },
            ToolDefinition {
                name: "click_element".into(),
                description: "Click an element".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "selector": { "type": "string", "description": "CSS selector or XPath" },
                        "by": {
                            "type": "string",
                            "description": "Selector type (css, xpath, id, class)",
                            "default": "css"
                        }
                    },
                    "required": ["selector"]
                }),
            },
            ToolDefinition {
                name: "type_text".into(),
                description: "Type text into an element".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "selector": { "type": "string", "description": "CSS selector or XPath" },
                        "text": { "type": "string", "description": "Text to type" },
                        "by": {
                            "type": "string",
                            "description": "Selector type (css, xpath, id, class)",
                            "default": "css"
                        }
                    },
                    "required": ["selector", "text"]
                }),
            },
            ToolDefinition {
                name: "take_screenshot".into(),
                description: "Take a screenshot of the current page".into(),
                parameters: json!({ "type": "object", "properties": {} }),
            },
            ToolDefinition {
                name: "close_session".into(),
                description: "Close a browser session".into(),
                parameters: json!({ "type": "object", "properties": {} }),
            },
        ]
    }

    async fn call_tool(&self, tool: &str, arguments: Value, session_id: Option<&str>) -> Value {
        match tool {
            "create_session" => self.create_session(arguments).await,
            "close_session" => match session_id {
                Some(id) => self.close_session(id).await,
                None => json!({ "error": "Session not found" }),
            },
            _ => self.session_tool(tool, arguments, session_id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockDriver {
        delay: Duration,
    }

    #[async_trait]
    impl DriverHandle for MockDriver {
        async fn navigate(&self, _url: &str) -> Result<()> {
            tokio::time::sleep(self.delay).await;
            Ok(())
        }

        async fn current_url(&self) -> Result<String> {
            Ok("https://example.com/".into())
        }

        async fn title(&self) -> Result<String> {
            Ok("Example Domain".into())
        }

        async fn page_source_length(&self) -> Result<usize> {
            Ok(1256)
        }

        async fn find_elements(&self, _selector: &Selector) -> Result<Vec<ElementInfo>> {
            Ok(vec![ElementInfo {
                tag: "a".into(),
                text: "More information".into(),
                attributes: ElementAttributes {
                    id: None,
                    class: None,
                    href: Some("https://www.iana.org/domains/example".into()),
                },
            }])
        }

        async fn click(&self, _selector: &Selector) -> Result<()> {
            Ok(())
        }

        async fn type_text(&self, _selector: &Selector, _text: &str) -> Result<()> {
            Ok(())
        }

        async fn screenshot_png(&self) -> Result<Vec<u8>> {
            Ok(vec![0x89, b'P', b'N', b'G'])
        }

        async fn quit(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    struct MockConnector {
        delay: Duration,
    }

    #[async_trait]
    impl DriverConnector for MockConnector {
        async fn connect(
            &self,
            _headless: bool,
            _timeout: Duration,
        ) -> Result<Box<dyn DriverHandle>> {
            Ok(Box::new(MockDriver { delay: self.delay }))
        }
    }

    fn service(max_sessions: u64) -> BrowserService {
        BrowserService::with_connector(
            &json!({ "max_sessions": max_sessions, "timeout": 30 }),
            Arc::new(MockConnector {
                delay: Duration::ZERO,
            }),
        )
    }

    async fn create(service: &BrowserService) -> Value {
        service.call_tool("create_session", json!({}), None).await
    }

    #[tokio::test]
    async fn create_session_reports_settings() {
        let service = service(5);
        let result = create(&service).await;
        assert_eq!(result["status"], "created");
        assert_eq!(result["headless"], true);
        assert_eq!(result["timeout"], 30);
        assert!(result["session_id"].is_string());
    }

    #[tokio::test]
    async fn capacity_bound_is_enforced_and_recoverable() {
        let service = service(2);
        let a = create(&service).await;
        let b = create(&service).await;
        assert_eq!(a["status"], "created");
        assert_eq!(b["status"], "created");

        let c = create(&service).await;
        assert_eq!(c["error"], "Maximum sessions (2) reached");
        assert_eq!(service.session_count().await, 2);

        let a_id = a["session_id"].as_str().unwrap();
        let closed = service.call_tool("close_session", json!({}), Some(a_id)).await;
        assert_eq!(closed["status"], "closed");

        let c = create(&service).await;
        assert_eq!(c["status"], "created");
    }

    #[tokio::test]
    async fn capacity_bound_holds_under_concurrent_creates() {
        let service = Arc::new(service(5));

        let mut tasks = Vec::new();
        for _ in 0..12 {
            let service = service.clone();
            tasks.push(tokio::spawn(async move { create(&service).await }));
        }

        let mut created = 0;
        let mut rejected = 0;
        for task in tasks {
            let result = task.await.unwrap();
            if result["status"] == "created" {
                created += 1;
            } else {
                assert_eq!(result["error"], "Maximum sessions (5) reached");
                rejected += 1;
            }
        }

        assert_eq!(created, 5);
        assert_eq!(rejected, 7);
        assert_eq!(service.session_count().await, 5);
    }

    #[tokio::test]
    async fn close_session_is_idempotent() {
        let service = service(5);
        let created = create(&service).await;
        let id = created["session_id"].as_str().unwrap().to_string();

        let first = service.call_tool("close_session", json!({}), Some(&id)).await;
        assert_eq!(first["status"], "closed");

        let second = service.call_tool("close_session", json!({}), Some(&id)).await;
        assert_eq!(second["error"], "Session not found");
    }

    #[tokio::test]
    async fn missing_session_yields_structured_error() {
        let service = service(5);
        let result = service
            .call_tool("navigate", json!({ "url": "https://example.com" }), Some("nope"))
            .await;
        assert_eq!(result["error"], "No active session. Create a session first.");

        let result = service
            .call_tool("get_page_info", json!({}), None)
            .await;
        assert!(result["error"].is_string());
    }

    #[tokio::test]
    async fn unknown_tool_yields_structured_error() {
        let service = service(5);
        let created = create(&service).await;
        let id = created["session_id"].as_str().unwrap().to_string();

        let result = service.call_tool("bogus", json!({}), Some(&id)).await;
        assert_eq!(result["error"], "Unknown tool: bogus");
    }

    #[tokio::test]
    async fn navigate_and_page_info() {
        let service = service(5);
        let created = create(&service).await;
        let id = created["session_id"].as_str().unwrap().to_string();

        let nav = service
            .call_tool("navigate", json!({ "url": "https://example.com" }), Some(&id))
            .await;
        assert_eq!(nav["status"], "success");
        assert_eq!(nav["url"], "https://example.com/");
        assert_eq!(nav["title"], "Example Domain");

        let info = service.call_tool("get_page_info", json!({}), Some(&id)).await;
        assert_eq!(info["page_source_length"], 1256);
    }

    #[tokio::test]
    async fn find_elements_returns_attributes() {
        let service = service(5);
        let created = create(&service).await;
        let id = created["session_id"].as_str().unwrap().to_string();

        let result = service
            .call_tool("find_elements", json!({ "selector": "a" }), Some(&id))
            .await;
        let elements = result["elements"].as_array().unwrap();
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0]["tag"], "a");
        assert_eq!(
            elements[0]["attributes"]["href"],
            "https://www.iana.org/domains/example"
        );
    }

    #[tokio::test]
    async fn screenshot_is_base64() {
        let service = service(5);
        let created = create(&service).await;
        let id = created["session_id"].as_str().unwrap().to_string();

        let result = service.call_tool("take_screenshot", json!({}), Some(&id)).await;
        assert_eq!(result["format"], "base64");
        let decoded = BASE64
            .decode(result["screenshot"].as_str().unwrap())
            .unwrap();
        assert_eq!(&decoded[..4], &[0x89, b'P', b'N', b'G']);
    }

    #[tokio::test]
    async fn unsupported_selector_types_are_rejected() {
        let service = service(5);
        let created = create(&service).await;
        let id = created["session_id"].as_str().unwrap().to_string();

        let result = service
            .call_tool(
                "find_elements",
                json!({ "selector": "x", "by": "partial_link" }),
                Some(&id),
            )
            .await;
        assert_eq!(result["error"], "Unsupported selector type: partial_link");

        // tag/name are valid for find but not for interaction
        let result = service
            .call_tool(
                "click_element",
                json!({ "selector": "a", "by": "tag" }),
                Some(&id),
            )
            .await;
        assert_eq!(result["error"], "Unsupported selector type: tag");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_operation_surfaces_timeout_error() {
        let service = BrowserService::with_connector(
            &json!({ "max_sessions": 5, "timeout": 5 }),
            Arc::new(MockConnector {
                delay: Duration::from_secs(600),
            }),
        );
        let created = create(&service).await;
        let id = created["session_id"].as_str().unwrap().to_string();

        let result = service
            .call_tool("navigate", json!({ "url": "https://example.com" }), Some(&id))
            .await;
        assert_eq!(result["error"], "operation timed out after 5s");
    }

    #[tokio::test]
    async fn stop_closes_all_sessions() {
        let service = service(5);
        create(&service).await;
        create(&service).await;
        assert_eq!(service.session_count().await, 2);

        service.start().await.unwrap();
        service.stop().await.unwrap();
        assert_eq!(service.session_count().await, 0);
        assert!(!service.running());
    }

    #[test]
    fn selector_parse() {
        assert_eq!(
            Selector::parse("css", "div.x"),
            Some(Selector::Css("div.x".into()))
        );
        assert_eq!(Selector::parse("tag", "a"), Some(Selector::Tag("a".into())));
        assert_eq!(Selector::parse("link", "x"), None);
        assert_eq!(parse_interaction_selector("name", "q"), None);
        assert_eq!(
            parse_interaction_selector("id", "q"),
            Some(Selector::Id("q".into()))
        );
    }
}
