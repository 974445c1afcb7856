use crate::error::{GuardError, Result};
use crate::rate_limit::middleware::DegradeMode;
use crate::rate_limit::types::{LimitScope, RateLimitPolicy};
use axum::http::Method;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Main service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Counter store configuration
    #[serde(default)]
    pub store: StoreConfig,
    /// Behaviour when the counter store is unavailable
    #[serde(default)]
    pub degrade: DegradeMode,
    /// Guarded endpoints
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Counter store backend
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process counters, private to this instance
    #[default]
    Local,
    /// Redis counters, shared between instances
    Redis,
}

/// Counter store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Redis connection URL, required for the redis backend
    #[serde(default)]
    pub redis_url: Option<String>,
    /// Upper bound on a single store round-trip, in milliseconds
    #[serde(default = "default_store_timeout_ms")]
    pub timeout_ms: u64,
    /// Prefix for Redis counter keys
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// How often the local store purges expired counters, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

/// A guarded endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Route path (e.g., "/hello" or "/users/:id")
    pub path: String,
    /// Allowed HTTP methods (if empty, all methods allowed)
    #[serde(default)]
    pub methods: Vec<String>,
    /// Endpoint description
    #[serde(default)]
    pub description: String,
    /// Rate limit policy for this endpoint
    #[serde(default)]
    pub rate_limit: RateLimitPolicy,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_timeout() -> u64 {
    30
}

fn default_store_timeout_ms() -> u64 {
    500
}

fn default_key_prefix() -> String {
    "endpoint_guard:".to_string()
}

fn default_sweep_interval() -> u64 {
    60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            redis_url: None,
            timeout_ms: default_store_timeout_ms(),
            key_prefix: default_key_prefix(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl EndpointConfig {
    /// Parse the configured methods
    pub fn parsed_methods(&self) -> Result<Vec<Method>> {
        self.methods
            .iter()
            .map(|m| {
                let upper = m.to_uppercase();
                if !["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS"]
                    .contains(&upper.as_str())
                {
                    return Err(GuardError::Config(format!(
                        "Invalid HTTP method '{}' for endpoint: {}",
                        m, self.path
                    )));
                }
                Method::from_bytes(upper.as_bytes())
                    .map_err(|_| GuardError::Config(format!("Invalid HTTP method '{}'", m)))
            })
            .collect()
    }
}

impl GuardConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| GuardError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| GuardError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();

        for endpoint in &self.endpoints {
            if endpoint.path.is_empty() {
                return Err(GuardError::Config(
                    "Endpoint path cannot be empty".to_string(),
                ));
            }

            if !endpoint.path.starts_with('/') {
                return Err(GuardError::Config(format!(
                    "Endpoint path must start with '/': {}",
                    endpoint.path
                )));
            }

            if !seen.insert(endpoint.path.as_str()) {
                return Err(GuardError::Config(format!(
                    "Duplicate endpoint path: {}",
                    endpoint.path
                )));
            }

            endpoint.parsed_methods()?;
            endpoint.rate_limit.validate()?;
        }

        if self.store.backend == StoreBackend::Redis && self.store.redis_url.is_none() {
            return Err(GuardError::Config(
                "store.redis_url is required for the redis backend".to_string(),
            ));
        }

        if self.server.timeout_secs == 0 {
            return Err(GuardError::Config(
                "server.timeout_secs must be > 0".to_string(),
            ));
        }

        if self.store.timeout_ms == 0 {
            return Err(GuardError::Config(
                "store.timeout_ms must be > 0".to_string(),
            ));
        }

        if self.store.sweep_interval_secs == 0 {
            return Err(GuardError::Config(
                "store.sweep_interval_secs must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Configuration guarding `/hello` with 3 calls per 10 seconds per client
    pub fn default_config() -> Self {
        Self {
            server: ServerConfig::default(),
            store: StoreConfig::default(),
            degrade: DegradeMode::default(),
            endpoints: vec![EndpointConfig {
                path: "/hello".to_string(),
                methods: vec!["GET".to_string()],
                description: "Hello endpoint".to_string(),
                rate_limit: RateLimitPolicy::new(10, 3, LimitScope::PerClient),
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(path: &str) -> EndpointConfig {
        EndpointConfig {
            path: path.to_string(),
            methods: vec![],
            description: String::new(),
            rate_limit: RateLimitPolicy::default(),
        }
    }

    #[test]
    fn test_parse_valid_config() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 9090

store:
  backend: redis
  redis_url: "redis://localhost:6379"
  timeout_ms: 250

degrade: fail_open

endpoints:
  - path: "/hello"
    methods: ["GET"]
    rate_limit:
      window_secs: 10
      ceiling: 3
      scope: ip
  - path: "/orders/:id"
    rate_limit:
      identifier: orders
"#;

        let config = GuardConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.store.backend, StoreBackend::Redis);
        assert_eq!(config.store.timeout_ms, 250);
        assert_eq!(config.degrade, DegradeMode::FailOpen);
        assert_eq!(config.endpoints.len(), 2);
        assert_eq!(config.endpoints[0].rate_limit.scope, LimitScope::PerClient);
        assert_eq!(config.endpoints[1].rate_limit.identifier, "orders");
        assert_eq!(config.endpoints[1].rate_limit.ceiling, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_values() {
        let config = GuardConfig::from_yaml("endpoints: []").unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.timeout_secs, 30);
        assert_eq!(config.store.backend, StoreBackend::Local);
        assert_eq!(config.store.timeout_ms, 500);
        assert_eq!(config.degrade, DegradeMode::FailClosed);
    }

    #[test]
    fn test_endpoint_policy_defaults() {
        let yaml = r#"
endpoints:
  - path: "/hello"
"#;
        let config = GuardConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.endpoints[0].rate_limit, RateLimitPolicy::default());
    }

    #[test]
    fn test_validate_rejects_bad_endpoints() {
        let mut config = GuardConfig::default_config();
        config.endpoints = vec![endpoint("")];
        assert!(config.validate().is_err());

        config.endpoints = vec![endpoint("hello")];
        assert!(config.validate().is_err());

        config.endpoints = vec![endpoint("/a"), endpoint("/a")];
        assert!(config.validate().is_err());

        let mut bad_method = endpoint("/a");
        bad_method.methods = vec!["INVALID".to_string()];
        config.endpoints = vec![bad_method];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_invalid_policy() {
        let mut config = GuardConfig::default_config();
        config.endpoints[0].rate_limit.window_secs = 0;

        assert!(matches!(
            config.validate(),
            Err(GuardError::InvalidPolicy(_))
        ));
    }

    #[test]
    fn test_validate_requires_redis_url() {
        let mut config = GuardConfig::default_config();
        config.store.backend = StoreBackend::Redis;
        assert!(config.validate().is_err());

        config.store.redis_url = Some("redis://localhost:6379".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_timeouts() {
        let mut config = GuardConfig::default_config();
        config.server.timeout_secs = 0;
        assert!(matches!(config.validate(), Err(GuardError::Config(_))));

        let mut config = GuardConfig::default_config();
        config.store.timeout_ms = 0;
        assert!(matches!(config.validate(), Err(GuardError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_oversized_window_from_yaml() {
        let yaml = r#"
endpoints:
  - path: "/hello"
    rate_limit:
      window_secs: 18446744073709551615
      ceiling: 3
"#;
        let config = GuardConfig::from_yaml(yaml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(GuardError::InvalidPolicy(_))
        ));
    }

    #[test]
    fn test_parsed_methods() {
        let mut ep = endpoint("/a");
        ep.methods = vec!["get".to_string(), "POST".to_string()];
        assert_eq!(ep.parsed_methods().unwrap(), vec![Method::GET, Method::POST]);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(GuardConfig::default_config().validate().is_ok());
    }
}
