//! Service configuration
//!
//! All settings come from environment variables. Parsing goes through a
//! lookup function so the same code serves the process environment and
//! tests.
//!
//! | Variable | Default |
//! |---|---|
//! | `EVENT_SAVING_MODE` | `batch_or_timer` |
//! | `EVENT_SAVING_BATCH_SIZE` | `100` |
//! | `EVENT_SAVING_TIMER_PERIOD_MS` | `10000` |
//! | `DATA_STORAGE_TYPE` | `json_file` |
//! | `DATA_STORAGE_FILE_PATH` | `./user_event_stats.json` |
//! | `DATA_STORAGE_BATCH_SIZE` | `1000` |
//! | `POSTGRES_CONNECTION_STRING` | required for `postgres` |
//! | `EVENTS_INPUT` | stdin |

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::storage::default_file_path;

pub const EVENT_SAVING_MODE: &str = "EVENT_SAVING_MODE";
pub const EVENT_SAVING_BATCH_SIZE: &str = "EVENT_SAVING_BATCH_SIZE";
pub const EVENT_SAVING_TIMER_PERIOD_MS: &str = "EVENT_SAVING_TIMER_PERIOD_MS";
pub const DATA_STORAGE_TYPE: &str = "DATA_STORAGE_TYPE";
pub const DATA_STORAGE_FILE_PATH: &str = "DATA_STORAGE_FILE_PATH";
pub const DATA_STORAGE_BATCH_SIZE: &str = "DATA_STORAGE_BATCH_SIZE";
pub const POSTGRES_CONNECTION_STRING: &str = "POSTGRES_CONNECTION_STRING";
pub const EVENTS_INPUT: &str = "EVENTS_INPUT";

const DEFAULT_BATCH_SIZE: u64 = 100;
const DEFAULT_TIMER_PERIOD: Duration = Duration::from_secs(10);
const DEFAULT_STORAGE_BATCH_SIZE: usize = 1000;

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while assembling the configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required setting {0}")]
    Missing(&'static str),
    #[error("Invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Which triggers start a flush
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSavingMode {
    /// Flush every N events
    BatchBased,
    /// Flush on a fixed wall-clock period
    TimerBased,
    /// Both triggers are active
    BatchOrTimerBased,
}

impl EventSavingMode {
    pub fn batch_enabled(self) -> bool {
        matches!(self, Self::BatchBased | Self::BatchOrTimerBased)
    }

    pub fn timer_enabled(self) -> bool {
        matches!(self, Self::TimerBased | Self::BatchOrTimerBased)
    }
}

impl FromStr for EventSavingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "batch" | "batchbased" => Ok(Self::BatchBased),
            "timer" | "timerbased" => Ok(Self::TimerBased),
            "batchortimer" | "batchortimerbased" | "both" => Ok(Self::BatchOrTimerBased),
            _ => Err("expected batch, timer or batch_or_timer".to_string()),
        }
    }
}

impl fmt::Display for EventSavingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BatchBased => "batch",
            Self::TimerBased => "timer",
            Self::BatchOrTimerBased => "batch_or_timer",
        };
        f.write_str(name)
    }
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    JsonFile,
    Postgres,
}

impl FromStr for StorageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "jsonfile" | "json" => Ok(Self::JsonFile),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            _ => Err("expected json_file or postgres".to_string()),
        }
    }
}

/// Lowercase and drop separators so `BatchOrTimerBased` == `batch_or_timer`
fn normalize(s: &str) -> String {
    s.trim()
        .chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Flush trigger settings
///
/// A disabled trigger carries `None`; at least one trigger is always set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushOptions {
    pub mode: EventSavingMode,
    /// Flush after every `batch_size` events
    pub batch_size: Option<u64>,
    /// Flush every `timer_period`
    pub timer_period: Option<Duration>,
}

impl FlushOptions {
    /// Batch trigger only
    pub fn batch(batch_size: u64) -> Self {
        Self {
            mode: EventSavingMode::BatchBased,
            batch_size: Some(batch_size),
            timer_period: None,
        }
    }

    /// Timer trigger only
    pub fn timer(period: Duration) -> Self {
        Self {
            mode: EventSavingMode::TimerBased,
            batch_size: None,
            timer_period: Some(period),
        }
    }

    /// Both triggers
    pub fn batch_or_timer(batch_size: u64, period: Duration) -> Self {
        Self {
            mode: EventSavingMode::BatchOrTimerBased,
            batch_size: Some(batch_size),
            timer_period: Some(period),
        }
    }
}

impl Default for FlushOptions {
    fn default() -> Self {
        Self::batch_or_timer(DEFAULT_BATCH_SIZE, DEFAULT_TIMER_PERIOD)
    }
}

/// Storage settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub storage_type: StorageType,
    /// JSON file path (json_file backend)
    pub file_path: PathBuf,
    /// Connection string (postgres backend)
    pub postgres_url: Option<String>,
    /// Rows per upsert statement (postgres backend)
    pub batch_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: StorageType::JsonFile,
            file_path: default_file_path(),
            postgres_url: None,
            batch_size: DEFAULT_STORAGE_BATCH_SIZE,
        }
    }
}

/// Full service configuration
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppConfig {
    pub flush: FlushOptions,
    pub storage: StorageConfig,
    /// Transport input file; `None` reads stdin
    pub input: Option<PathBuf>,
}

impl AppConfig {
    /// Load from the process environment
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load using `lookup` to resolve variables
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mode = match get(EVENT_SAVING_MODE) {
            Some(raw) => raw
                .parse::<EventSavingMode>()
                .map_err(|reason| ConfigError::invalid(EVENT_SAVING_MODE, &raw, reason))?,
            None => EventSavingMode::BatchOrTimerBased,
        };

        let batch_size = if mode.batch_enabled() {
            let size = match get(EVENT_SAVING_BATCH_SIZE) {
                Some(raw) => parse_positive(EVENT_SAVING_BATCH_SIZE, &raw)?,
                None => DEFAULT_BATCH_SIZE,
            };
            Some(size)
        } else {
            None
        };

        let timer_period = if mode.timer_enabled() {
            let period = match get(EVENT_SAVING_TIMER_PERIOD_MS) {
                Some(raw) => Duration::from_millis(parse_positive(EVENT_SAVING_TIMER_PERIOD_MS, &raw)?),
                None => DEFAULT_TIMER_PERIOD,
            };
            Some(period)
        } else {
            None
        };

        let storage_type = match get(DATA_STORAGE_TYPE) {
            Some(raw) => raw
                .parse::<StorageType>()
                .map_err(|reason| ConfigError::invalid(DATA_STORAGE_TYPE, &raw, reason))?,
            None => StorageType::JsonFile,
        };

        let postgres_url = get(POSTGRES_CONNECTION_STRING);
        if storage_type == StorageType::Postgres && postgres_url.is_none() {
            return Err(ConfigError::Missing(POSTGRES_CONNECTION_STRING));
        }

        let storage = StorageConfig {
            storage_type,
            file_path: get(DATA_STORAGE_FILE_PATH)
                .map(PathBuf::from)
                .unwrap_or_else(default_file_path),
            postgres_url,
            batch_size: match get(DATA_STORAGE_BATCH_SIZE) {
                Some(raw) => parse_positive(DATA_STORAGE_BATCH_SIZE, &raw)? as usize,
                None => DEFAULT_STORAGE_BATCH_SIZE,
            },
        };

        let input = get(EVENTS_INPUT)
            .filter(|v| v.trim() != "-")
            .map(PathBuf::from);

        Ok(Self {
            flush: FlushOptions {
                mode,
                batch_size,
                timer_period,
            },
            storage,
            input,
        })
    }
}

fn parse_positive(key: &'static str, raw: &str) -> ConfigResult<u64> {
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError::invalid(key, raw, "must be greater than zero")),
        Ok(value) => Ok(value),
        Err(e) => Err(ConfigError::invalid(key, raw, e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> ConfigResult<AppConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();

        assert_eq!(config.flush, FlushOptions::default());
        assert_eq!(config.storage.storage_type, StorageType::JsonFile);
        assert!(config.input.is_none());
    }

    #[test]
    fn test_mode_names() {
        for (raw, mode) in [
            ("batch", EventSavingMode::BatchBased),
            ("BatchBased", EventSavingMode::BatchBased),
            ("TimerBased", EventSavingMode::TimerBased),
            ("batch_or_timer", EventSavingMode::BatchOrTimerBased),
            ("BatchOrTimerBased", EventSavingMode::BatchOrTimerBased),
        ] {
            assert_eq!(raw.parse::<EventSavingMode>().unwrap(), mode, "{}", raw);
        }
    }

    #[test]
    fn test_batch_mode_disables_timer() {
        let config = load(&[
            (EVENT_SAVING_MODE, "batch"),
            (EVENT_SAVING_BATCH_SIZE, "10"),
            (EVENT_SAVING_TIMER_PERIOD_MS, "500"),
        ])
        .unwrap();

        assert_eq!(config.flush, FlushOptions::batch(10));
    }

    #[test]
    fn test_timer_mode_reads_period() {
        let config = load(&[
            (EVENT_SAVING_MODE, "timer"),
            (EVENT_SAVING_TIMER_PERIOD_MS, "250"),
        ])
        .unwrap();

        assert_eq!(config.flush, FlushOptions::timer(Duration::from_millis(250)));
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        let err = load(&[(EVENT_SAVING_MODE, "none")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: EVENT_SAVING_MODE, .. }));
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let err = load(&[(EVENT_SAVING_MODE, "batch"), (EVENT_SAVING_BATCH_SIZE, "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: EVENT_SAVING_BATCH_SIZE, .. }));
    }

    #[test]
    fn test_zero_batch_size_ignored_when_batch_disabled() {
        let config = load(&[(EVENT_SAVING_MODE, "timer"), (EVENT_SAVING_BATCH_SIZE, "0")]).unwrap();
        assert_eq!(config.flush.batch_size, None);
    }

    #[test]
    fn test_postgres_requires_connection_string() {
        let err = load(&[(DATA_STORAGE_TYPE, "Postgres")]).unwrap_err();
        assert_eq!(err, ConfigError::Missing(POSTGRES_CONNECTION_STRING));

        let config = load(&[
            (DATA_STORAGE_TYPE, "postgres"),
            (POSTGRES_CONNECTION_STRING, "postgres://localhost/stats"),
            (DATA_STORAGE_BATCH_SIZE, "250"),
        ])
        .unwrap();
        assert_eq!(config.storage.storage_type, StorageType::Postgres);
        assert_eq!(config.storage.batch_size, 250);
    }

    #[test]
    fn test_input_path_and_stdin_marker() {
        let config = load(&[(EVENTS_INPUT, "events.jsonl")]).unwrap();
        assert_eq!(config.input, Some(PathBuf::from("events.jsonl")));

        let config = load(&[(EVENTS_INPUT, "-")]).unwrap();
        assert!(config.input.is_none());
    }
}
