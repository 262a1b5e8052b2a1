//! Configuration management.

use serde::Deserialize;
use std::time::Duration;

/// Engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Namespace of every graph type this engine owns.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Replication transport behavior.
    #[serde(default)]
    pub replication: ReplicationConfig,

    /// Deploy-time seeding behavior.
    #[serde(default)]
    pub seeding: SeedingConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            replication: ReplicationConfig::default(),
            seeding: SeedingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from an optional `accessgraph` file layered
    /// with `ACCESSGRAPH_*` environment variables (`__` separates
    /// nesting, e.g. `ACCESSGRAPH_REPLICATION__ENABLED=false`).
    pub fn load() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::with_name("accessgraph").required(false))
            .add_source(config::Environment::with_prefix("ACCESSGRAPH").separator("__"))
            .build()?
            .try_deserialize()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplicationConfig {
    /// When false, dual writes are dropped instead of delivered; install
    /// a `NoopReplicator`.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Delivery attempts per event before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff between delivery attempts (milliseconds, linear).
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl ReplicationConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedingConfig {
    /// Maximum concurrent per-tenant seeding tasks.
    #[serde(default = "default_seed_workers")]
    pub max_workers: usize,
}

impl Default for SeedingConfig {
    fn default() -> Self {
        Self {
            max_workers: default_seed_workers(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Global log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json or pretty).
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

fn default_namespace() -> String {
    "rbac".to_string()
}

fn default_enabled() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    100
}

fn default_seed_workers() -> usize {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.namespace, "rbac");
        assert!(config.replication.enabled);
        assert_eq!(config.replication.max_attempts, 3);
        assert_eq!(config.seeding.max_workers, 8);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_partial_override() {
        let config: EngineConfig = serde_json::from_value(serde_json::json!({
            "replication": { "enabled": false },
            "logging": { "format": "json" }
        }))
        .unwrap();

        assert!(!config.replication.enabled);
        assert_eq!(config.logging.format, LogFormat::Json);
        // Untouched sections keep their defaults.
        assert_eq!(config.namespace, "rbac");
        assert_eq!(config.replication.max_attempts, 3);
    }

    #[test]
    fn test_retry_backoff_duration() {
        let config = ReplicationConfig {
            retry_backoff_ms: 250,
            ..Default::default()
        };
        assert_eq!(config.retry_backoff(), Duration::from_millis(250));
    }
}
