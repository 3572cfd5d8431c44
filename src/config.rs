//! Environment-driven configuration (spec.md §6).
//!
//! Process supervision and layered config-file loading are out of scope
//! (spec.md §1); this is the thin env-var-to-typed-struct plumbing every
//! binary still needs to start up, in the style of the teacher's own
//! environment-driven test helpers (`std::env::var().unwrap_or_else(...)`).

use snafu::ensure;

use crate::error::{ConfigError, InvalidValueSnafu};

fn env_string(var: &'static str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

fn env_opt_string(var: &'static str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.is_empty())
}

fn env_bool(var: &'static str, default: bool) -> bool {
    std::env::var(var)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

fn env_parsed<T: std::str::FromStr>(
    var: &'static str,
    default: T,
    kind: &'static str,
) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Err(_) => Ok(default),
        Ok(value) => value.parse::<T>().map_err(|_| {
            InvalidValueSnafu {
                var,
                kind,
                value: value.clone(),
            }
            .build()
        }),
    }
}

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub vhost: String,
    pub exchange: String,
    pub queue: String,
    pub dlx: String,
    pub dlq: String,
    pub routing_key: String,
    pub prefetch: u16,
    pub manual_dlx: bool,
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub host: String,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl SearchConfig {
    pub fn basic_auth(&self) -> Option<(String, String)> {
        match (&self.user, &self.password) {
            (Some(u), Some(p)) => Some((u.clone(), p.clone())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BulkConfig {
    pub enabled: bool,
    pub max_items: usize,
    pub max_interval_ms: u64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub broker: BrokerConfig,
    pub search: SearchConfig,
    pub bulk: BulkConfig,
    pub require_tenant: bool,
    pub default_tenant: Option<String>,
    pub schema_local_path: Option<String>,
    pub tenants_registry_path: String,
    pub host_tenant_map_path: String,
    pub metrics_port: u16,
    pub force_recreate: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let prefetch = env_parsed::<u16>("CONSUMER_PREFETCH", 5, "u16")?;
        ensure!(
            prefetch > 0,
            InvalidValueSnafu {
                var: "CONSUMER_PREFETCH",
                kind: "u16 > 0",
                value: prefetch.to_string(),
            }
        );

        Ok(Self {
            broker: BrokerConfig {
                host: env_string("RABBITMQ_HOST", "127.0.0.1"),
                port: env_parsed("RABBITMQ_PORT", 5672, "u16")?,
                user: env_string("RABBITMQ_USER", "guest"),
                password: env_string("RABBITMQ_PASSWORD", "guest"),
                vhost: env_string("RABBITMQ_VHOST", "/"),
                exchange: env_string("RABBITMQ_EXCHANGE", "logs_default"),
                queue: env_string("RABBITMQ_QUEUE", "nubla_logs_default"),
                dlx: env_string("RABBITMQ_DLX", "logs_default.dlx"),
                dlq: env_string("RABBITMQ_DLQ", "nubla_logs_default.dlq"),
                routing_key: env_string("RABBITMQ_ROUTING_KEY", "nubla.log.default"),
                prefetch,
                manual_dlx: env_bool("USE_MANUAL_DLX", true),
            },
            search: SearchConfig {
                host: env_string("OPENSEARCH_HOST", "localhost:9200"),
                user: env_opt_string("OS_USER"),
                password: env_opt_string("OS_PASS"),
            },
            bulk: BulkConfig {
                enabled: env_bool("USE_BULK", false),
                max_items: env_parsed("BULK_MAX_ITEMS", 500, "usize")?,
                max_interval_ms: env_parsed("BULK_MAX_INTERVAL_MS", 1000, "u64")?,
            },
            require_tenant: env_bool("REQUIRE_TENANT", false),
            default_tenant: env_opt_string("DEFAULT_TENANT_ID"),
            schema_local_path: env_opt_string("NCS_SCHEMA_LOCAL_PATH"),
            tenants_registry_path: env_string("TENANTS_REGISTRY_PATH", "config/tenants.json"),
            host_tenant_map_path: env_string(
                "HOST_TENANT_MAP_PATH",
                "config/host_tenant_map.json",
            ),
            metrics_port: env_parsed("METRICS_PORT", 9598, "u16")?,
            force_recreate: env_bool("FORCE_RECREATE", false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize the tests that
    // touch them so they don't race each other.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_when_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("CONSUMER_PREFETCH");
        let config = Config::from_env().unwrap();
        assert_eq!(config.broker.prefetch, 5);
        assert_eq!(config.bulk.max_items, 500);
        assert!(!config.bulk.enabled);
        assert!(config.broker.manual_dlx);
        assert!(!config.force_recreate);
        assert_eq!(config.host_tenant_map_path, "config/host_tenant_map.json");
        assert_eq!(config.default_tenant, None);
    }

    #[test]
    fn invalid_numeric_env_var_is_an_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("CONSUMER_PREFETCH", "not-a-number");
        let result = Config::from_env();
        std::env::remove_var("CONSUMER_PREFETCH");
        assert!(result.is_err());
    }

    #[test]
    fn zero_prefetch_is_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("CONSUMER_PREFETCH", "0");
        let result = Config::from_env();
        std::env::remove_var("CONSUMER_PREFETCH");
        assert!(result.is_err());
    }
}
