//! HTTP/SSE API surface.
//!
//! The router is a thin layer: the auth manager decides who may call what,
//! the services execute tools. Auth and permission failures map to 401/403;
//! unknown services to 404; every dispatched tool call answers HTTP 200 with
//! a `success` flag, with failures carried inside the envelope.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use futures::stream::Stream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{ApiKey, AuthManager};
use crate::error::{Error, Result};
use crate::registry::ServiceRegistry;
use crate::service::{ToolDefinition, AVAILABLE_SERVICES};

/// Events published on the SSE feed.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A tool call was dispatched.
    ToolCall {
        /// Target service.
        service: String,
        /// Tool name.
        tool: String,
        /// Whether the call succeeded.
        success: bool,
        /// Unix timestamp in milliseconds.
        timestamp: i64,
    },
}

impl ServerEvent {
    /// SSE event name.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::ToolCall { .. } => "tool_call",
        }
    }
}

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Authentication manager.
    pub auth: Arc<AuthManager>,
    /// Running services.
    pub registry: Arc<ServiceRegistry>,
    /// SSE broadcast channel.
    pub events: broadcast::Sender<ServerEvent>,
}

impl AppState {
    /// Create state with a fresh event channel.
    pub fn new(auth: Arc<AuthManager>, registry: Arc<ServiceRegistry>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            auth,
            registry,
            events,
        }
    }
}

/// Extractor that authorizes the request and yields the resolved key.
///
/// Reads the bearer token from the `Authorization` header and the peer
/// address from [`ConnectInfo`], never from a client-supplied header, so
/// the localhost bypass cannot be forged remotely.
#[derive(Debug, Clone)]
pub struct RequireApiKey(pub ApiKey);

#[axum::async_trait]
impl axum::extract::FromRequestParts<AppState> for RequireApiKey {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let bearer = bearer_token(&parts.headers)?;
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.ip())
            .ok_or_else(|| Error::Internal("peer address unavailable".into()))?;

        let key = state.auth.authorize(bearer.as_deref(), peer).await?;
        Ok(RequireApiKey(key))
    }
}

/// Pull the token out of an `Authorization: Bearer <token>` header.
///
/// An absent header is `Ok(None)` (the bypass policy decides what that
/// means); a malformed header is an authentication failure.
fn bearer_token(headers: &HeaderMap) -> Result<Option<String>> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| Error::unauthorized("Invalid authorization header encoding"))?;
    match value.strip_prefix("Bearer ") {
        Some(token) => Ok(Some(token.trim().to_string())),
        None => Err(Error::unauthorized("Invalid authorization header format")),
    }
}

fn empty_arguments() -> Value {
    json!({})
}

/// Request body for tool calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Name of the tool to call.
    pub tool_name: String,
    /// Tool arguments.
    #[serde(default = "empty_arguments")]
    pub arguments: Value,
    /// Session id for stateful tools.
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Response envelope for tool calls. Always delivered with HTTP 200.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResponse {
    /// Whether the call succeeded.
    pub success: bool,
    /// Tool result payload.
    pub result: Value,
    /// Session id, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Error message when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Request body for API key creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyRequest {
    /// Key owner name.
    pub name: String,
    /// Expiration in days.
    #[serde(default)]
    pub expires_days: Option<i64>,
    /// Service permissions.
    #[serde(default)]
    pub permissions: Option<HashMap<String, bool>>,
}

/// Response body for API key creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyResponse {
    /// The generated token. Shown once, at creation.
    pub api_key: String,
    /// Key owner name.
    pub name: String,
    /// Expiration in days, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_days: Option<i64>,
}

async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "message": "webmcp - MCP tool services for AI agents",
        "version": env!("CARGO_PKG_VERSION"),
        "available_services": AVAILABLE_SERVICES,
        "running_services": state.registry.list().await,
    }))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let mut services = serde_json::Map::new();
    for name in AVAILABLE_SERVICES {
        services.insert(name.to_string(), state.registry.status(name).await);
    }
    Json(json!({ "status": "healthy", "services": services }))
}

async fn create_api_key(
    State(state): State<AppState>,
    RequireApiKey(_key): RequireApiKey,
    Json(request): Json<ApiKeyRequest>,
) -> Json<ApiKeyResponse> {
    let token = state
        .auth
        .create_api_key(&request.name, request.expires_days, request.permissions)
        .await;
    Json(ApiKeyResponse {
        api_key: token,
        name: request.name,
        expires_days: request.expires_days,
    })
}

async fn list_api_keys(
    State(state): State<AppState>,
    RequireApiKey(_key): RequireApiKey,
) -> Json<Value> {
    // tokens are redacted here; only the manager ever sees them again
    let keys: Vec<Value> = state
        .auth
        .list_api_keys()
        .await
        .into_values()
        .map(|key| {
            json!({
                "name": key.name,
                "created_at": key.created_at,
                "expires_at": key.expires_at,
                "is_active": key.is_active,
                "permissions": key.permissions,
            })
        })
        .collect();
    Json(json!({ "keys": keys }))
}

async fn list_services(
    State(state): State<AppState>,
    RequireApiKey(_key): RequireApiKey,
) -> Json<Value> {
    let running = state.registry.list().await;

    let mut details = serde_json::Map::new();
    for name in AVAILABLE_SERVICES {
        let detail = match state.registry.get(name).await {
            Some(service) => {
                let info = service.info();
                json!({
                    "name": info.name,
                    "status": if info.running { "running" } else { "stopped" },
                    "tools": info.tools,
                })
            }
            None => json!({ "name": name, "status": "available", "tools": [] }),
        };
        details.insert(name.to_string(), detail);
    }

    Json(json!({
        "available_services": AVAILABLE_SERVICES,
        "running_services": running,
        "service_details": details,
    }))
}

async fn list_service_tools(
    State(state): State<AppState>,
    Path(name): Path<String>,
    RequireApiKey(key): RequireApiKey,
) -> Result<Json<Value>> {
    if !key.allows(&name) {
        return Err(Error::forbidden(format!("No permission for service: {name}")));
    }
    let service = state
        .registry
        .get(&name)
        .await
        .ok_or_else(|| Error::ServiceNotFound(name.clone()))?;

    let tools: Vec<ToolDefinition> = service.tools();
    Ok(Json(json!({ "service": name, "tools": tools })))
}

async fn call_service_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
    RequireApiKey(key): RequireApiKey,
    Json(request): Json<ToolCallRequest>,
) -> Result<Json<ToolCallResponse>> {
    if !key.allows(&name) {
        return Err(Error::forbidden(format!("No permission for service: {name}")));
    }
    let service = state
        .registry
        .get(&name)
        .await
        .ok_or_else(|| Error::ServiceNotFound(name.clone()))?;

    let result = service
        .call_tool(
            &request.tool_name,
            request.arguments,
            request.session_id.as_deref(),
        )
        .await;

    let error = result
        .get("error")
        .and_then(Value::as_str)
        .map(String::from);
    let session_id = result
        .get("session_id")
        .and_then(Value::as_str)
        .map(String::from)
        .or(request.session_id);

    let response = ToolCallResponse {
        success: error.is_none(),
        result,
        session_id,
        error,
    };

    let _ = state.events.send(ServerEvent::ToolCall {
        service: name,
        tool: request.tool_name,
        success: response.success,
        timestamp: Utc::now().timestamp_millis(),
    });

    Ok(Json(response))
}

async fn service_status(
    State(state): State<AppState>,
    Path(name): Path<String>,
    RequireApiKey(_key): RequireApiKey,
) -> Json<Value> {
    Json(state.registry.status(&name).await)
}

async fn event_feed(
    State(state): State<AppState>,
    RequireApiKey(_key): RequireApiKey,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let receiver = state.events.subscribe();
    let stream = BroadcastStream::new(receiver).filter_map(|message| async move {
        // lagged receivers just skip ahead
        let event = message.ok()?;
        let data = serde_json::to_string(&event).ok()?;
        Some(Ok::<Event, Infallible>(
            Event::default().event(event.kind()).data(data),
        ))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/v1/auth/keys", post(create_api_key).get(list_api_keys))
        .route("/api/v1/services", get(list_services))
        .route("/api/v1/services/:name/tools", get(list_service_tools))
        .route("/api/v1/services/:name/call", post(call_service_tool))
        .route("/api/v1/services/:name/status", get(service_status))
        .route("/api/v1/events", get(event_feed))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer wmcp_abc123".parse().unwrap());
        assert_eq!(
            bearer_token(&headers).unwrap(),
            Some("wmcp_abc123".to_string())
        );
    }

    #[test]
    fn missing_header_is_none() {
        let headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers).unwrap(), None);
    }

    #[test]
    fn non_bearer_scheme_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Basic dXNlcjpwYXNz".parse().unwrap());
        assert!(matches!(
            bearer_token(&headers).unwrap_err(),
            Error::Unauthorized(_)
        ));
    }

    #[test]
    fn token_is_trimmed() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            "Bearer   wmcp_spaced   ".parse().unwrap(),
        );
        assert_eq!(
            bearer_token(&headers).unwrap(),
            Some("wmcp_spaced".to_string())
        );
    }

    #[test]
    fn tool_call_request_defaults_arguments_to_empty_object() {
        let request: ToolCallRequest =
            serde_json::from_str(r#"{"tool_name": "get_page_info"}"#).unwrap();
        assert_eq!(request.arguments, json!({}));
        assert!(request.session_id.is_none());
    }

    #[test]
    fn tool_call_response_skips_absent_fields() {
        let response = ToolCallResponse {
            success: true,
            result: json!({ "status": "ok" }),
            session_id: None,
            error: None,
        };
        let encoded = serde_json::to_string(&response).unwrap();
        assert!(!encoded.contains("session_id"));
        assert!(!encoded.contains("error"));
    }

    #[test]
    fn server_event_serialization() {
        let event = ServerEvent::ToolCall {
            service: "browseruse".into(),
            tool: "navigate".into(),
            success: true,
            timestamp: 0,
        };
        assert_eq!(event.kind(), "tool_call");
        let encoded = serde_json::to_value(&event).unwrap();
        assert_eq!(encoded["type"], "tool_call");
        assert_eq!(encoded["service"], "browseruse");
    }
}
