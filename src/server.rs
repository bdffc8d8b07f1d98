//! Server bootstrap and lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::Value;

use crate::auth::AuthManager;
use crate::browser::BrowserService;
use crate::config::Config;
use crate::crawler::WebCrawlerService;
use crate::error::{Error, Result};
use crate::http::{self, AppState};
use crate::registry::ServiceRegistry;
use crate::search::WebSearchService;
use crate::service::McpService;

/// Server name.
pub const SERVER_NAME: &str = "webmcp";

/// Server version.
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The webmcp server: owns the auth manager and the service registry, both
/// constructed at startup and threaded through every call.
pub struct Server {
    config: Config,
    auth: Arc<AuthManager>,
    registry: Arc<ServiceRegistry>,
}

impl Server {
    /// Create a server from a loaded configuration.
    pub fn new(config: Config) -> Self {
        let auth = Arc::new(AuthManager::new(config.auth.clone()));
        Self {
            config,
            auth,
            registry: Arc::new(ServiceRegistry::new()),
        }
    }

    /// The authentication manager.
    pub fn auth(&self) -> Arc<AuthManager> {
        self.auth.clone()
    }

    /// The service registry.
    pub fn registry(&self) -> Arc<ServiceRegistry> {
        self.registry.clone()
    }

    /// Construct a service instance by name.
    pub fn build_service(name: &str, config: &Value) -> Result<Arc<dyn McpService>> {
        match name {
            "browseruse" => Ok(Arc::new(BrowserService::from_config(config))),
            "web_search" => Ok(Arc::new(WebSearchService::from_config(config)?)),
            "web_crawler" => Ok(Arc::new(WebCrawlerService::from_config(config)?)),
            other => Err(Error::ServiceNotFound(other.to_string())),
        }
    }

    /// Build and start every enabled service from the configuration.
    ///
    /// A service that fails to build or start is logged and skipped; the
    /// server comes up with whatever remains.
    pub async fn start_services(&self) {
        for entry in &self.config.services {
            if !entry.enabled {
                continue;
            }
            match Self::build_service(&entry.name, &entry.config) {
                Ok(service) => match service.start().await {
                    Ok(()) => {
                        if self.registry.insert(service).await {
                            tracing::info!(service = %entry.name, "started service");
                        }
                    }
                    Err(e) => {
                        tracing::error!(service = %entry.name, error = %e, "failed to start service");
                    }
                },
                Err(e) => {
                    tracing::error!(service = %entry.name, error = %e, "failed to build service");
                }
            }
        }
    }

    /// Stop every running service.
    pub async fn stop(&self) {
        self.registry.stop_all().await;
    }

    async fn log_api_keys(&self) {
        for (token, key) in self.auth.list_api_keys().await {
            tracing::info!(name = %key.name, token = %token, "api key available");
        }
    }

    /// Start services and serve the HTTP API until interrupted, then close
    /// every remaining session and service.
    pub async fn run(self, host: Option<String>, port: Option<u16>) -> Result<()> {
        self.start_services().await;
        self.log_api_keys().await;

        let host = host.unwrap_or_else(|| self.config.server.host.clone());
        let port = port.unwrap_or(self.config.server.port);

        let state = AppState::new(self.auth.clone(), self.registry.clone());
        let app = http::router(state);

        let listener = tokio::net::TcpListener::bind((host.as_str(), port)).await?;
        tracing::info!(%host, port, "{} v{} listening", SERVER_NAME, SERVER_VERSION);

        // ConnectInfo carries the transport-level peer address the
        // localhost-bypass policy keys off.
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        tracing::info!("shutting down");
        self.stop().await;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_service_rejects_unknown_names() {
        let err = Server::build_service("nope", &serde_json::json!({})).unwrap_err();
        assert!(matches!(err, Error::ServiceNotFound(_)));
    }

    #[tokio::test]
    async fn start_services_skips_disabled_and_failing_entries() {
        // default config: browseruse + web_crawler enabled, web_search
        // disabled (no Serper key)
        let server = Server::new(Config::default_config());
        server.start_services().await;

        let running = server.registry().list().await;
        assert!(running.contains(&"browseruse".to_string()));
        assert!(running.contains(&"web_crawler".to_string()));
        assert!(!running.contains(&"web_search".to_string()));

        server.stop().await;
        assert!(server.registry().list().await.is_empty());
    }
}
