//! Registry of running services.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::service::{McpService, AVAILABLE_SERVICES};

/// Holds the running service instances.
///
/// Construction of services from config happens in the server bootstrap;
/// the registry only tracks what is live.
#[derive(Default)]
pub struct ServiceRegistry {
    services: RwLock<HashMap<String, Arc<dyn McpService>>>,
}

impl ServiceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a started service.
    ///
    /// Returns `false` (and keeps the existing instance) when a service
    /// with the same name is already registered.
    pub async fn insert(&self, service: Arc<dyn McpService>) -> bool {
        let name = service.name().to_string();
        let mut services = self.services.write().await;
        if services.contains_key(&name) {
            tracing::warn!(service = %name, "service already running");
            return false;
        }
        services.insert(name, service);
        true
    }

    /// Get a running service by name.
    pub async fn get(&self, name: &str) -> Option<Arc<dyn McpService>> {
        self.services.read().await.get(name).cloned()
    }

    /// Names of all running services.
    pub async fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Status mapping for a service, running or not.
    pub async fn status(&self, name: &str) -> Value {
        match self.services.read().await.get(name) {
            Some(service) => json!({
                "status": "running",
                "available": true,
                "health": service.health(),
            }),
            None => json!({
                "status": "stopped",
                "available": AVAILABLE_SERVICES.contains(&name),
            }),
        }
    }

    /// Stop and deregister every running service.
    ///
    /// Best-effort: a failing shutdown is logged and does not prevent the
    /// remaining services from being stopped.
    pub async fn stop_all(&self) {
        let drained: Vec<(String, Arc<dyn McpService>)> =
            self.services.write().await.drain().collect();

        let mut failures = 0usize;
        for (name, service) in drained {
            if let Err(e) = service.stop().await {
                failures += 1;
                tracing::error!(service = %name, error = %e, "failed to stop service");
            } else {
                tracing::info!(service = %name, "stopped service");
            }
        }
        if failures > 0 {
            tracing::warn!(failures, "some services did not stop cleanly");
        }
    }
}
