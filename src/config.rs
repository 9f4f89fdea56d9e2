use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::engine::EngineConfig;
use crate::limits::*;
use crate::model::{BusinessHours, ModelError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}: cannot parse {value:?}")]
    Malformed { var: &'static str, value: String },
    #[error("{var}: {reason}")]
    OutOfRange { var: &'static str, reason: String },
    #[error("business hours: {0}")]
    Hours(#[from] ModelError),
}

/// Server settings, read from `SLOTKEEPER_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub engine: EngineConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset keys take their default; set
    /// but malformed keys are an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = EngineConfig::default();

        let open_hour = parse(&lookup, "SLOTKEEPER_OPEN_HOUR")?.unwrap_or(defaults.business_hours.open_hour);
        let close_hour =
            parse(&lookup, "SLOTKEEPER_CLOSE_HOUR")?.unwrap_or(defaults.business_hours.close_hour);
        let business_hours = BusinessHours::new(open_hour, close_hour)?;

        let horizon_days = parse(&lookup, "SLOTKEEPER_HORIZON_DAYS")?.unwrap_or(defaults.horizon_days);
        if horizon_days > MAX_HORIZON_DAYS {
            return Err(ConfigError::OutOfRange {
                var: "SLOTKEEPER_HORIZON_DAYS",
                reason: format!("at most {MAX_HORIZON_DAYS}"),
            });
        }
        let max_alternatives =
            parse(&lookup, "SLOTKEEPER_MAX_ALTERNATIVES")?.unwrap_or(defaults.max_alternatives);
        if max_alternatives > MAX_ALTERNATIVES {
            return Err(ConfigError::OutOfRange {
                var: "SLOTKEEPER_MAX_ALTERNATIVES",
                reason: format!("at most {MAX_ALTERNATIVES}"),
            });
        }
        let step_minutes = parse(&lookup, "SLOTKEEPER_STEP_MINUTES")?.unwrap_or(defaults.step_minutes);
        if step_minutes < MIN_STEP_MINUTES {
            return Err(ConfigError::OutOfRange {
                var: "SLOTKEEPER_STEP_MINUTES",
                reason: format!("at least {MIN_STEP_MINUTES}"),
            });
        }
        let lookback_minutes =
            parse(&lookup, "SLOTKEEPER_LOOKBACK_MINUTES")?.unwrap_or(defaults.lookback_minutes);
        if lookback_minutes < MAX_DURATION_MINUTES {
            // Anything shorter can miss a long booking that started earlier.
            return Err(ConfigError::OutOfRange {
                var: "SLOTKEEPER_LOOKBACK_MINUTES",
                reason: format!("at least {MAX_DURATION_MINUTES}"),
            });
        }
        let query_timeout = parse(&lookup, "SLOTKEEPER_QUERY_TIMEOUT_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.query_timeout);

        Ok(Self {
            bind: lookup("SLOTKEEPER_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse(&lookup, "SLOTKEEPER_PORT")?.unwrap_or(7450),
            data_dir: lookup("SLOTKEEPER_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data")),
            max_connections: parse(&lookup, "SLOTKEEPER_MAX_CONNECTIONS")?.unwrap_or(256),
            compact_threshold: parse(&lookup, "SLOTKEEPER_COMPACT_THRESHOLD")?.unwrap_or(1000),
            metrics_port: parse(&lookup, "SLOTKEEPER_METRICS_PORT")?,
            engine: EngineConfig {
                business_hours,
                horizon_days,
                max_alternatives,
                step_minutes,
                lookback_minutes,
                query_timeout,
            },
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("slotkeeper.wal")
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Malformed { var, value }),
    }
}
