//! Configuration validation.
//!
//! Validates the `[database]` and `[engine]` sections before any command
//! touches storage or evaluates an indicator.

use crate::domain::error::TacalcError;
use crate::domain::timeframe::{TimeUnit, Timeframe};
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_BASE_TIMEFRAME: &str = "1m";
pub const DEFAULT_LOOKBACK: i64 = 500;

/// Engine settings resolved from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub base_timeframe: Timeframe,
    pub default_lookback: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            base_timeframe: Timeframe::new(1, TimeUnit::Minute),
            default_lookback: DEFAULT_LOOKBACK as usize,
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, TacalcError> {
        validate_engine_config(config)?;
        let base_timeframe = base_timeframe(config)?;
        let default_lookback = config.get_int("engine", "default_lookback", DEFAULT_LOOKBACK);
        Ok(Self {
            base_timeframe,
            default_lookback: default_lookback as usize,
        })
    }
}

pub fn validate_engine_config(config: &dyn ConfigPort) -> Result<(), TacalcError> {
    validate_backend(config)?;
    validate_base_timeframe(config)?;
    validate_lookback(config)?;
    Ok(())
}

fn validate_backend(config: &dyn ConfigPort) -> Result<(), TacalcError> {
    let backend = config.get_string_or("database", "backend", "sqlite");
    match backend.as_str() {
        "sqlite" | "postgres" => Ok(()),
        other => Err(TacalcError::ConfigInvalid {
            section: "database".to_string(),
            key: "backend".to_string(),
            reason: format!("unknown backend '{}', expected sqlite or postgres", other),
        }),
    }
}

fn base_timeframe(config: &dyn ConfigPort) -> Result<Timeframe, TacalcError> {
    let label = config.get_string_or("engine", "base_timeframe", DEFAULT_BASE_TIMEFRAME);
    label
        .parse::<Timeframe>()
        .map_err(|e| TacalcError::ConfigInvalid {
            section: "engine".to_string(),
            key: "base_timeframe".to_string(),
            reason: e.to_string(),
        })
}

fn validate_base_timeframe(config: &dyn ConfigPort) -> Result<(), TacalcError> {
    let tf = base_timeframe(config)?;
    if tf.fixed_duration().is_none() {
        return Err(TacalcError::ConfigInvalid {
            section: "engine".to_string(),
            key: "base_timeframe".to_string(),
            reason: "base_timeframe must have a fixed length (not months)".to_string(),
        });
    }
    Ok(())
}

fn validate_lookback(config: &dyn ConfigPort) -> Result<(), TacalcError> {
    let value = config.get_int("engine", "default_lookback", DEFAULT_LOOKBACK);
    if value <= 0 {
        return Err(TacalcError::ConfigInvalid {
            section: "engine".to_string(),
            key: "default_lookback".to_string(),
            reason: "default_lookback must be positive".to_string(),
        });
    }
    Ok(())
}
