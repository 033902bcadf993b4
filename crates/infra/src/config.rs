//! Process configuration read from environment variables.
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `COURIER_STORAGE_BACKEND` | `memory` | `memory` or `postgres` |
//! | `DATABASE_URL` | - | required for `postgres` |
//! | `DATABASE_MAX_CONNECTIONS` | `10` | pool size |
//! | `COURIER_TRACKING_PREFIX` | `DEL` | 2-8 upper-case letters |
//! | `COURIER_STORAGE_TIMEOUT_MS` | unset | per repository call deadline |
//! | `COURIER_GUARD_UPDATE_TRANSITIONS` | `true` | enforce the graph on updates |
//! | `COURIER_GUARD_DRIVER_ASSIGNMENT` | `false` | reject assignment on closed orders |
//! | `COURIER_LOG_FORMAT` | `json` | `json` or `pretty` |

use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use courier_observability::LogFormat;
use courier_orders::{DEFAULT_TRACKING_PREFIX, EngineConfig, validate_prefix};

pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(var: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            var,
            reason: reason.into(),
        }
    }
}

/// Where orders are stored.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "postgres" => Ok(Self::Postgres),
            other => Err(format!("unknown backend '{other}' (expected 'memory' or 'postgres')")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub storage_backend: StorageBackend,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub tracking_prefix: String,
    pub storage_timeout_ms: Option<u64>,
    pub guard_update_transitions: bool,
    pub guard_driver_assignment: bool,
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            storage_backend: StorageBackend::Memory,
            database_url: None,
            database_max_connections: DEFAULT_MAX_CONNECTIONS,
            tracking_prefix: engine.tracking_prefix,
            storage_timeout_ms: engine.storage_timeout_ms,
            guard_update_transitions: engine.guard_update_transitions,
            guard_driver_assignment: engine.guard_driver_assignment,
            log_format: LogFormat::default(),
        }
    }
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let storage_backend = match get("COURIER_STORAGE_BACKEND") {
            Some(v) => v
                .parse()
                .map_err(|reason: String| ConfigError::invalid("COURIER_STORAGE_BACKEND", reason))?,
            None => defaults.storage_backend,
        };

        let database_url = get("DATABASE_URL");
        if storage_backend == StorageBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let database_max_connections = match get("DATABASE_MAX_CONNECTIONS") {
            Some(v) => {
                let n: u32 = parse_number("DATABASE_MAX_CONNECTIONS", &v)?;
                if n == 0 {
                    return Err(ConfigError::invalid(
                        "DATABASE_MAX_CONNECTIONS",
                        "must be at least 1",
                    ));
                }
                n
            }
            None => defaults.database_max_connections,
        };

        let tracking_prefix = get("COURIER_TRACKING_PREFIX")
            .map(|v| v.trim().to_string())
            .unwrap_or_else(|| DEFAULT_TRACKING_PREFIX.to_string());
        validate_prefix(&tracking_prefix)
            .map_err(|e| ConfigError::invalid("COURIER_TRACKING_PREFIX", e.to_string()))?;

        let storage_timeout_ms = get("COURIER_STORAGE_TIMEOUT_MS")
            .map(|v| parse_number("COURIER_STORAGE_TIMEOUT_MS", &v))
            .transpose()?;

        let guard_update_transitions = get("COURIER_GUARD_UPDATE_TRANSITIONS")
            .map(|v| parse_bool("COURIER_GUARD_UPDATE_TRANSITIONS", &v))
            .transpose()?
            .unwrap_or(defaults.guard_update_transitions);

        let guard_driver_assignment = get("COURIER_GUARD_DRIVER_ASSIGNMENT")
            .map(|v| parse_bool("COURIER_GUARD_DRIVER_ASSIGNMENT", &v))
            .transpose()?
            .unwrap_or(defaults.guard_driver_assignment);

        let log_format = match get("COURIER_LOG_FORMAT") {
            Some(v) => v
                .parse()
                .map_err(|e: courier_observability::UnknownLogFormat| {
                    ConfigError::invalid("COURIER_LOG_FORMAT", e.to_string())
                })?,
            None => defaults.log_format,
        };

        Ok(Self {
            storage_backend,
            database_url,
            database_max_connections,
            tracking_prefix,
            storage_timeout_ms,
            guard_update_transitions,
            guard_driver_assignment,
            log_format,
        })
    }

    /// Engine settings carried by this configuration.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            tracking_prefix: self.tracking_prefix.clone(),
            storage_timeout_ms: self.storage_timeout_ms,
            guard_update_transitions: self.guard_update_transitions,
            guard_driver_assignment: self.guard_driver_assignment,
        }
    }
}

fn parse_number<T: FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: core::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::invalid(var, e.to_string()))
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::invalid(var, format!("'{other}' is not a boolean"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.engine_config(), EngineConfig::default());
    }

    #[test]
    fn reads_every_variable() {
        let config = AppConfig::from_lookup(lookup(&[
            ("COURIER_STORAGE_BACKEND", "postgres"),
            ("DATABASE_URL", "postgres://localhost/courier"),
            ("DATABASE_MAX_CONNECTIONS", "4"),
            ("COURIER_TRACKING_PREFIX", "SHIP"),
            ("COURIER_STORAGE_TIMEOUT_MS", "1500"),
            ("COURIER_GUARD_UPDATE_TRANSITIONS", "false"),
            ("COURIER_GUARD_DRIVER_ASSIGNMENT", "yes"),
            ("COURIER_LOG_FORMAT", "pretty"),
        ]))
        .unwrap();

        assert_eq!(config.storage_backend, StorageBackend::Postgres);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/courier"));
        assert_eq!(config.database_max_connections, 4);
        assert_eq!(config.log_format, LogFormat::Pretty);

        let engine = config.engine_config();
        assert_eq!(engine.tracking_prefix, "SHIP");
        assert_eq!(engine.storage_timeout_ms, Some(1500));
        assert!(!engine.guard_update_transitions);
        assert!(engine.guard_driver_assignment);
    }

    #[test]
    fn postgres_backend_requires_database_url() {
        let err = AppConfig::from_lookup(lookup(&[("COURIER_STORAGE_BACKEND", "postgres")]))
            .unwrap_err();
        assert_eq!(err, ConfigError::Missing("DATABASE_URL"));
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config = AppConfig::from_lookup(lookup(&[
            ("COURIER_TRACKING_PREFIX", "  "),
            ("COURIER_STORAGE_TIMEOUT_MS", ""),
        ]))
        .unwrap();
        assert_eq!(config.tracking_prefix, "DEL");
        assert_eq!(config.storage_timeout_ms, None);
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let cases = [
            ("COURIER_STORAGE_BACKEND", "sqlite"),
            ("DATABASE_MAX_CONNECTIONS", "0"),
            ("DATABASE_MAX_CONNECTIONS", "many"),
            ("COURIER_TRACKING_PREFIX", "del"),
            ("COURIER_TRACKING_PREFIX", "TOOLONGPREFIX"),
            ("COURIER_STORAGE_TIMEOUT_MS", "-5"),
            ("COURIER_GUARD_UPDATE_TRANSITIONS", "maybe"),
            ("COURIER_LOG_FORMAT", "xml"),
        ];

        for (var, value) in cases {
            match AppConfig::from_lookup(lookup(&[(var, value)])) {
                Err(ConfigError::Invalid { var: reported, .. }) => assert_eq!(reported, var),
                other => panic!("{var}={value}: expected invalid, got {other:?}"),
            }
        }
    }
}
