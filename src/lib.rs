//! # webmcp
//!
//! MCP (Model Context Protocol) tool services behind an HTTP/SSE API.
//!
//! This crate bundles browser automation (over WebDriver), web search
//! (Serper), and web crawling/content extraction as tool services, served
//! over HTTP with API-key authentication and an SSE event feed. A CLI
//! launches the server; a small client library wraps the HTTP calls.
//!
//! ## Features
//!
//! - **API-key auth**: in-memory key store with expiry, revocation, and
//!   per-service permissions; optional JWT helpers
//! - **Localhost bypass**: unauthenticated requests from loopback/private
//!   peer addresses get a transient full-access credential
//! - **Bounded browser sessions**: each session owns one WebDriver handle;
//!   the pool never exceeds its configured maximum
//! - **Uniform tool-call envelope**: every dispatched call answers HTTP 200
//!   with a `success` flag; failures ride inside the payload
//!
//! ## Usage
//!
//! ```bash
//! webmcp init-config
//! webmcp serve
//! ```
//!
//! Then call tools over HTTP:
//!
//! ```bash
//! curl -X POST http://localhost:9000/api/v1/services/browseruse/call \
//!   -H "Authorization: Bearer <key>" \
//!   -d '{"tool_name": "create_session", "arguments": {}}'
//! ```
//!
//! ## Security Model
//!
//! Every request is authorized by the [`auth::AuthManager`] before any
//! service sees it. Permission checks are per service; "who you are"
//! failures (401) are distinct from "what you may do" failures (403). The
//! localhost bypass keys off the transport-level peer address only, never a
//! client-supplied header.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod browser;
pub mod client;
pub mod config;
pub mod crawler;
pub mod error;
pub mod http;
pub mod registry;
pub mod search;
pub mod server;
pub mod service;

pub use auth::{ApiKey, AuthManager};
pub use browser::BrowserService;
pub use client::Client;
pub use config::Config;
pub use error::{Error, Result};
pub use registry::ServiceRegistry;
pub use server::Server;
pub use service::{McpService, ToolDefinition};
