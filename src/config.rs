//! Configuration loading and defaults.
//!
//! Configuration is read once at startup from a YAML file. All runtime state
//! (API keys, browser sessions) is in-memory only, so the config file is the
//! single piece of persisted state the server consumes.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    9000
}

fn default_log_level() -> String {
    "info".into()
}

fn default_algorithm() -> String {
    "HS256".into()
}

fn default_expire_minutes() -> i64 {
    30
}

fn default_true() -> bool {
    true
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind host.
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Log level filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
        }
    }
}

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Symmetric JWT signing secret.
    pub secret_key: String,
    /// JWT algorithm (HS256, HS384, HS512).
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    /// Access token lifetime in minutes.
    #[serde(default = "default_expire_minutes")]
    pub access_token_expire_minutes: i64,
    /// Whether unauthenticated requests from loopback/private peer
    /// addresses are granted a transient full-access key.
    #[serde(default = "default_true")]
    pub localhost_bypass: bool,
}

/// Per-service configuration entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name (`browseruse`, `web_search`, `web_crawler`).
    pub name: String,
    /// Whether the service is started at boot.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Service-specific settings, passed through untyped.
    #[serde(default)]
    pub config: serde_json::Value,
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Authentication settings.
    pub auth: AuthConfig,
    /// Services to start.
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

impl Config {
    /// Load configuration from a YAML file, falling back to
    /// [`Config::default_config`] when the file does not exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or_else(|| Path::new("config.yaml"));
        if !path.exists() {
            return Ok(Self::default_config());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&raw)?)
    }

    /// Build the default configuration.
    ///
    /// The JWT secret comes from `WEBMCP_SECRET_KEY` when set. `browseruse`
    /// and `web_crawler` are enabled; `web_search` is listed but disabled
    /// since it needs a Serper API key.
    pub fn default_config() -> Self {
        let secret_key = std::env::var("WEBMCP_SECRET_KEY")
            .unwrap_or_else(|_| "your-secret-key-change-this".into());

        Self {
            server: ServerConfig::default(),
            auth: AuthConfig {
                secret_key,
                algorithm: default_algorithm(),
                access_token_expire_minutes: default_expire_minutes(),
                localhost_bypass: true,
            },
            services: vec![
                ServiceConfig {
                    name: "browseruse".into(),
                    enabled: true,
                    config: serde_json::json!({
                        "headless": true,
                        "timeout": 30,
                        "max_sessions": 5,
                        "webdriver_url": "http://localhost:9515",
                    }),
                },
                ServiceConfig {
                    name: "web_crawler".into(),
                    enabled: true,
                    config: serde_json::json!({
                        "timeout": 30,
                        "max_content_length": 1048576,
                    }),
                },
                ServiceConfig {
                    name: "web_search".into(),
                    enabled: false,
                    config: serde_json::json!({}),
                },
            ],
        }
    }

    /// Write the configuration to a YAML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_yaml::to_string(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }

    /// Look up the config entry for a service by name.
    pub fn service(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.iter().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_browseruse_enabled() {
        let config = Config::default_config();
        let browseruse = config.service("browseruse").expect("browseruse entry");
        assert!(browseruse.enabled);
        assert_eq!(browseruse.config["max_sessions"], 5);
    }

    #[test]
    fn default_config_leaves_web_search_disabled() {
        let config = Config::default_config();
        assert!(!config.service("web_search").unwrap().enabled);
    }

    #[test]
    fn missing_file_falls_back_to_default() {
        let config = Config::load(Some(Path::new("/nonexistent/config.yaml"))).unwrap();
        assert_eq!(config.server.port, 9000);
        assert!(config.auth.localhost_bypass);
    }

    #[test]
    fn yaml_round_trip() {
        let config = Config::default_config();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.server.host, config.server.host);
        assert_eq!(parsed.services.len(), config.services.len());
        assert_eq!(
            parsed.auth.access_token_expire_minutes,
            config.auth.access_token_expire_minutes
        );
    }

    #[test]
    fn minimal_yaml_applies_defaults() {
        let yaml = "auth:\n  secret_key: test-secret\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.auth.algorithm, "HS256");
        assert!(config.auth.localhost_bypass);
        assert!(config.services.is_empty());
    }
}
