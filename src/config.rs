//! Runtime configuration.
//!
//! Configuration is read once from environment variables (after loading a
//! `.env` file if present). Every key is optional: missing values fall back
//! to defaults, malformed values are reported as errors.
//!
//! # Environment Variables
//!
//! - `TASKBOARD_TASKS_COLLECTION`: task collection name (default: `tasks`)
//! - `TASKBOARD_CONTACTS_COLLECTION`: contact collection name (default: `users`)
//! - `TASKBOARD_DAILY_LIMITS_COLLECTION`: per-day counter collection (default: `daily_limits`)
//! - `TASKBOARD_DAILY_SUBMISSION_LIMIT`: external submissions per day (default: `10`)
//! - `TASKBOARD_SUBTASK_DEBOUNCE_MS`: subtask toggle debounce window (default: `300`, `0` disables)
//! - `TASKBOARD_LOG_FORMAT`: `pretty` (default) | `json`
//! - `TASKBOARD_STORE_*`: fail injection for the in-memory store
//!   (see [`FailInjectionConfig::from_lookup`])

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::infrastructure::fail_injection::FailInjectionConfig;
use crate::infrastructure::store::CollectionName;
use crate::sync::daily_limit::DEFAULT_DAILY_LIMIT;

/// Prefix for the in-memory store's fail injection variables.
pub const STORE_FAULTS_PREFIX: &str = "TASKBOARD_STORE";

// =============================================================================
// Errors
// =============================================================================

/// Error type for environment variable parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvParseError {
    /// The variable is set but does not parse.
    #[error("Invalid value for {name}: {message} (got '{value}')")]
    InvalidValue {
        /// Variable name.
        name: String,
        /// Parser error message.
        message: String,
        /// Actual value.
        value: String,
    },
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Environment parsing error.
    #[error("Environment parsing error: {0}")]
    EnvParseError(#[from] EnvParseError),

    /// Failure rate out of range.
    #[error("Invalid failure rate: must be 0.0-1.0, got {0}")]
    InvalidFailureRate(f64),

    /// Timeout rate out of range.
    #[error("Invalid timeout rate: must be 0.0-1.0, got {0}")]
    InvalidTimeoutRate(f64),

    /// Latency range with its bounds inverted.
    #[error("Invalid latency range: min ({min}) > max ({max})")]
    InvalidLatencyRange {
        /// Lower bound in milliseconds.
        min: u64,
        /// Upper bound in milliseconds.
        max: u64,
    },

    /// A collection name is blank.
    #[error("Collection name for {0} must not be empty")]
    EmptyCollectionName(String),
}

// =============================================================================
// Parsing Helpers
// =============================================================================

/// Parses a variable through `lookup`.
///
/// Returns the default value if the variable is not set or blank.
/// Returns an error if the variable is set but contains an invalid value.
pub(crate) fn parse_var<T, L>(lookup: &L, name: &str, default: T) -> Result<T, EnvParseError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    L: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(name) else {
        return Ok(default);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(default);
    }
    trimmed
        .parse()
        .map_err(|error: T::Err| EnvParseError::InvalidValue {
            name: name.to_string(),
            message: error.to_string(),
            value: value.clone(),
        })
}

/// Reads a variable from the process environment.
pub(crate) fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

// =============================================================================
// Log Format
// =============================================================================

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("expected 'pretty' or 'json', got '{other}'")),
        }
    }
}

// =============================================================================
// Sync Config
// =============================================================================

/// Configuration for a [`Board`](crate::board::Board).
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Collection holding tasks.
    pub tasks_collection: CollectionName,
    /// Collection holding contacts.
    pub contacts_collection: CollectionName,
    /// Collection holding the per-day submission counters.
    pub daily_limits_collection: CollectionName,
    /// Maximum external submissions per day.
    pub daily_submission_limit: u32,
    /// Window in which repeated toggles of the same subtask are ignored.
    pub subtask_debounce: Duration,
    /// Log output format.
    pub log_format: LogFormat,
    /// Fail injection for the in-memory store.
    pub store_faults: FailInjectionConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tasks_collection: CollectionName::new("tasks"),
            contacts_collection: CollectionName::new("users"),
            daily_limits_collection: CollectionName::new("daily_limits"),
            daily_submission_limit: DEFAULT_DAILY_LIMIT,
            subtask_debounce: Duration::from_millis(300),
            log_format: LogFormat::default(),
            store_faults: FailInjectionConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Loads configuration from the environment, reading `.env` first.
    ///
    /// # Errors
    ///
    /// Returns an error if any variable is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(&env_lookup)
    }

    /// Loads configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if any variable is malformed.
    pub fn from_lookup<L>(lookup: &L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let tasks_collection =
            collection_var(lookup, "TASKBOARD_TASKS_COLLECTION", defaults.tasks_collection)?;
        let contacts_collection = collection_var(
            lookup,
            "TASKBOARD_CONTACTS_COLLECTION",
            defaults.contacts_collection,
        )?;
        let daily_limits_collection = collection_var(
            lookup,
            "TASKBOARD_DAILY_LIMITS_COLLECTION",
            defaults.daily_limits_collection,
        )?;
        let daily_submission_limit = parse_var(
            lookup,
            "TASKBOARD_DAILY_SUBMISSION_LIMIT",
            defaults.daily_submission_limit,
        )?;
        let debounce_ms = parse_var(lookup, "TASKBOARD_SUBTASK_DEBOUNCE_MS", 300_u64)?;
        let log_format = parse_var(lookup, "TASKBOARD_LOG_FORMAT", defaults.log_format)?;
        let store_faults = FailInjectionConfig::from_lookup(STORE_FAULTS_PREFIX, lookup)?;

        Ok(Self {
            tasks_collection,
            contacts_collection,
            daily_limits_collection,
            daily_submission_limit,
            subtask_debounce: Duration::from_millis(debounce_ms),
            log_format,
            store_faults,
        })
    }
}

fn collection_var<L>(
    lookup: &L,
    name: &str,
    default: CollectionName,
) -> Result<CollectionName, ConfigError>
where
    L: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) if value.trim().is_empty() => {
            Err(ConfigError::EmptyCollectionName(name.to_string()))
        }
        Some(value) => Ok(CollectionName::new(value.trim())),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[rstest]
    fn test_defaults_when_nothing_is_set() {
        let config = SyncConfig::from_lookup(&lookup_from(&[])).unwrap();
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.tasks_collection.as_str(), "tasks");
        assert_eq!(config.contacts_collection.as_str(), "users");
        assert_eq!(config.daily_limits_collection.as_str(), "daily_limits");
        assert_eq!(config.daily_submission_limit, 10);
        assert_eq!(config.subtask_debounce, Duration::from_millis(300));
    }

    #[rstest]
    fn test_values_are_read() {
        let config = SyncConfig::from_lookup(&lookup_from(&[
            ("TASKBOARD_TASKS_COLLECTION", "board_tasks"),
            ("TASKBOARD_SUBTASK_DEBOUNCE_MS", "0"),
            ("TASKBOARD_DAILY_SUBMISSION_LIMIT", "3"),
            ("TASKBOARD_LOG_FORMAT", "JSON"),
            ("TASKBOARD_STORE_FAILURE_RATE", "0.25"),
        ]))
        .unwrap();
        assert_eq!(config.tasks_collection.as_str(), "board_tasks");
        assert_eq!(config.subtask_debounce, Duration::ZERO);
        assert_eq!(config.daily_submission_limit, 3);
        assert_eq!(config.log_format, LogFormat::Json);
        assert!((config.store_faults.failure_rate - 0.25).abs() < f64::EPSILON);
    }

    #[rstest]
    fn test_malformed_number_is_an_error() {
        let result = SyncConfig::from_lookup(&lookup_from(&[(
            "TASKBOARD_SUBTASK_DEBOUNCE_MS",
            "soon",
        )]));
        assert!(matches!(
            result,
            Err(ConfigError::EnvParseError(EnvParseError::InvalidValue { .. }))
        ));
    }

    #[rstest]
    fn test_invalid_fault_rate_is_an_error() {
        let result =
            SyncConfig::from_lookup(&lookup_from(&[("TASKBOARD_STORE_FAILURE_RATE", "3.0")]));
        assert_eq!(result, Err(ConfigError::InvalidFailureRate(3.0)));
    }

    #[rstest]
    fn test_blank_collection_is_an_error() {
        let result = SyncConfig::from_lookup(&lookup_from(&[("TASKBOARD_TASKS_COLLECTION", " ")]));
        assert!(matches!(result, Err(ConfigError::EmptyCollectionName(_))));
    }

    #[rstest]
    fn test_unknown_log_format_is_an_error() {
        let result = SyncConfig::from_lookup(&lookup_from(&[("TASKBOARD_LOG_FORMAT", "xml")]));
        assert!(result.is_err());
    }
}
