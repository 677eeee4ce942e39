//! Scheduler configuration.
//!
//! Three knobs control the scheduler:
//!
//! - `interval`: seconds of travel a tool may sit unused before it is cooled
//!   off and later pre-heated (0 disables idle scheduling)
//! - `dock_interval`: seconds before a tool change at which a docked tool is
//!   heated back to its print temperature
//! - `dock_delta`: degrees a tool drops while docked
//!
//! Docking is active only when both `dock_interval` and `dock_delta` are
//! positive. Values can come from a JSON file and be overridden per run.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::Celsius;

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration for thermal scheduling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Idle time (seconds) after which an unused tool is cooled off.
    pub interval: f64,
    /// Pre-heat time (seconds) for a docked tool before it is picked up.
    pub dock_interval: f64,
    /// Temperature drop while docked (degrees).
    pub dock_delta: Celsius,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: 120.0,
            dock_interval: 10.0,
            dock_delta: 10,
        }
    }
}

impl SchedulerConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the idle interval.
    pub fn with_interval(mut self, seconds: f64) -> Self {
        self.interval = seconds;
        self
    }

    /// Set the dock pre-heat interval.
    pub fn with_dock_interval(mut self, seconds: f64) -> Self {
        self.dock_interval = seconds;
        self
    }

    /// Set the docked temperature drop.
    pub fn with_dock_delta(mut self, degrees: Celsius) -> Self {
        self.dock_delta = degrees;
        self
    }

    /// Disable docking.
    pub fn without_docking(mut self) -> Self {
        self.dock_interval = 0.0;
        self.dock_delta = 0;
        self
    }

    /// Whether idle cool/heat scheduling is active.
    pub fn idle_enabled(&self) -> bool {
        self.interval > 0.0
    }

    /// Whether dock cool/heat scheduling is active.
    pub fn docking_enabled(&self) -> bool {
        self.dock_interval > 0.0 && self.dock_delta > 0
    }

    /// Reject negative or non-finite values.
    pub fn validate(&self) -> ConfigResult<()> {
        for (name, value) in [("interval", self.interval), ("dock_interval", self.dock_interval)] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{} must be a non-negative number of seconds, got {}",
                    name, value
                )));
            }
        }
        if self.dock_delta < 0 {
            return Err(ConfigError::Invalid(format!(
                "dock_delta must be non-negative, got {}",
                self.dock_delta
            )));
        }
        Ok(())
    }

    /// Load a config from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse a config from a JSON string. Missing fields take their defaults.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to a JSON string.
    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
