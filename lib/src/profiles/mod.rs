//! Thermal profiles read from the slicer's configuration header.
//!
//! PrusaSlicer-style slicers append their configuration to the end of the
//! program as comment lines:
//!
//! ```text
//! ; temperature = 215,240
//! ; first_layer_temperature = 220,245
//! ; max_fan_speed = 100,40
//! ```
//!
//! Multi-valued settings carry one entry per tool. The header is scanned from
//! the last line backwards until every required setting has been seen, and the
//! values are collected into a [`ThermalProfileTable`] indexed by tool id.
//!
//! ## Example
//!
//! ```rust,ignore
//! use toolheat::profiles::ThermalProfileTable;
//!
//! let table = ThermalProfileTable::from_header(program.lines())?;
//! let t1 = table.get(1)?;
//! println!("T1 prints at {}", t1.target_temperature(3));
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{Celsius, ToolId};

/// Error type for profile operations.
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("Missing slicer variable in configuration header: {0}")]
    MissingVariable(String),

    #[error("Invalid slicer variable {name}: {reason}")]
    InvalidVariable { name: String, reason: String },

    #[error("Tool T{tool} is not described by the configuration header ({tool_count} tools)")]
    UnknownTool { tool: ToolId, tool_count: usize },
}

pub type ProfileResult<T> = Result<T, ProfileError>;

// ============================================================================
// Header variable names
// ============================================================================

const TEMPERATURE: &str = "temperature";
const FIRST_LAYER_TEMPERATURE: &str = "first_layer_temperature";
const MIN_FAN_SPEED: &str = "min_fan_speed";
const MAX_FAN_SPEED: &str = "max_fan_speed";
const FULL_FAN_SPEED_LAYER: &str = "full_fan_speed_layer";
const DISABLE_FAN_FIRST_LAYERS: &str = "disable_fan_first_layers";
const FAN_ALWAYS_ON: &str = "fan_always_on";

/// Settings that must be present in the header.
pub const REQUIRED_VARIABLES: [&str; 7] = [
    TEMPERATURE,
    FIRST_LAYER_TEMPERATURE,
    MIN_FAN_SPEED,
    MAX_FAN_SPEED,
    FULL_FAN_SPEED_LAYER,
    DISABLE_FAN_FIRST_LAYERS,
    FAN_ALWAYS_ON,
];

// ============================================================================
// Profiles
// ============================================================================

/// Thermal settings of one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThermalProfile {
    /// Nozzle temperature after the first layer.
    pub temperature: Celsius,

    /// Nozzle temperature on the first layer.
    pub first_layer_temperature: Celsius,

    /// Minimum part fan speed (percent).
    pub min_fan_speed: f64,

    /// Maximum part fan speed (percent).
    pub max_fan_speed: f64,

    /// Layer at which the fan reaches its maximum speed.
    pub full_fan_speed_layer: u32,

    /// Number of initial layers printed with the fan off.
    pub disable_fan_first_layers: u32,

    /// Whether the slicer keeps this tool's fan running.
    pub fan_always_on: bool,
}

impl ThermalProfile {
    /// Temperature the tool should print at on the given layer.
    ///
    /// Layer numbers are 1-based; layer 1 uses the first layer temperature.
    pub fn target_temperature(&self, layer: u32) -> Celsius {
        if layer == 1 {
            self.first_layer_temperature
        } else {
            self.temperature
        }
    }

    /// Fraction of the maximum fan speed to use on a layer.
    ///
    /// Returns `None` while the fan is still disabled. The fraction ramps
    /// linearly from the first enabled layer and is 1.0 from
    /// `full_fan_speed_layer` on.
    pub fn fan_ramp_factor(&self, layer: u32) -> Option<f64> {
        if layer <= self.disable_fan_first_layers {
            return None;
        }
        if layer >= self.full_fan_speed_layer {
            return Some(1.0);
        }

        let span = (self.full_fan_speed_layer - self.disable_fan_first_layers) as f64;
        let progress = (layer - self.disable_fan_first_layers) as f64;
        Some((progress / span).min(1.0))
    }

    /// Fan speed (percent) for a tool coming out of the dock on a layer.
    pub fn ramped_fan_speed(&self, layer: u32) -> Option<f64> {
        self.fan_ramp_factor(layer).map(|factor| self.max_fan_speed * factor)
    }
}

/// Thermal profiles of every tool, indexed by tool id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThermalProfileTable {
    profiles: Vec<ThermalProfile>,
}

impl ThermalProfileTable {
    /// Create a table from per-tool profiles.
    pub fn new(profiles: Vec<ThermalProfile>) -> Self {
        Self { profiles }
    }

    /// Parse the table from a program's configuration header.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError::MissingVariable` if a required setting never
    /// appears, and `ProfileError::InvalidVariable` if a setting has the wrong
    /// number of entries.
    pub fn from_header<S: AsRef<str>>(lines: &[S]) -> ProfileResult<Self> {
        let mut found: HashMap<&'static str, Vec<f64>> = HashMap::new();

        for line in lines.iter().rev() {
            if let Some((name, value)) = header_assignment(line.as_ref()) {
                if let Some(&required) = REQUIRED_VARIABLES.iter().find(|&&v| v == name) {
                    found
                        .entry(required)
                        .or_insert_with(|| numeric_values(value));
                }
            }

            if found.len() == REQUIRED_VARIABLES.len() {
                break;
            }
        }

        if let Some(missing) = REQUIRED_VARIABLES.iter().find(|v| !found.contains_key(*v)) {
            return Err(ProfileError::MissingVariable(missing.to_string()));
        }

        let tool_count = found[TEMPERATURE].len();
        if tool_count == 0 {
            return Err(ProfileError::InvalidVariable {
                name: TEMPERATURE.to_string(),
                reason: "no values".to_string(),
            });
        }

        let column = |name: &str| per_tool_values(name, &found[name], tool_count);

        let temperature = column(TEMPERATURE)?;
        let first_layer_temperature = column(FIRST_LAYER_TEMPERATURE)?;
        let min_fan_speed = column(MIN_FAN_SPEED)?;
        let max_fan_speed = column(MAX_FAN_SPEED)?;
        let full_fan_speed_layer = column(FULL_FAN_SPEED_LAYER)?;
        let disable_fan_first_layers = column(DISABLE_FAN_FIRST_LAYERS)?;
        let fan_always_on = column(FAN_ALWAYS_ON)?;

        let profiles = (0..tool_count)
            .map(|tool| ThermalProfile {
                temperature: temperature[tool].round() as Celsius,
                first_layer_temperature: first_layer_temperature[tool].round() as Celsius,
                min_fan_speed: min_fan_speed[tool],
                max_fan_speed: max_fan_speed[tool],
                full_fan_speed_layer: full_fan_speed_layer[tool].round() as u32,
                disable_fan_first_layers: disable_fan_first_layers[tool].round() as u32,
                fan_always_on: fan_always_on[tool] != 0.0,
            })
            .collect();

        Ok(Self { profiles })
    }

    /// Profile of a tool.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError::UnknownTool` if the header has no entry for it.
    pub fn get(&self, tool: ToolId) -> ProfileResult<&ThermalProfile> {
        self.profiles.get(tool).ok_or_else(|| ProfileError::UnknownTool {
            tool,
            tool_count: self.profiles.len(),
        })
    }

    /// Number of tools.
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Check if the table has no tools.
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Iterate over `(tool, profile)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (ToolId, &ThermalProfile)> {
        self.profiles.iter().enumerate()
    }
}

/// Split `; name = value` into its name and value.
fn header_assignment(line: &str) -> Option<(&str, &str)> {
    let rest = line.strip_prefix(';')?;
    let rest = rest.strip_prefix(char::is_whitespace)?;
    let (name, value) = rest.split_once('=')?;
    let name = name.strip_suffix(char::is_whitespace)?;
    if name.is_empty() || name.contains(char::is_whitespace) {
        return None;
    }
    Some((name, value))
}

/// Extract every unsigned decimal number from a header value.
///
/// Units and separators are ignored, so `40%,35%` yields `[40.0, 35.0]`.
fn numeric_values(value: &str) -> Vec<f64> {
    let bytes = value.as_bytes();
    let mut values = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }

        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i + 1 < bytes.len() && bytes[i] == b'.' && bytes[i + 1].is_ascii_digit() {
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
        }

        if let Ok(v) = value[start..i].parse() {
            values.push(v);
        }
    }

    values
}

/// Expand a setting to one value per tool; a single value applies to all.
fn per_tool_values(name: &str, values: &[f64], tool_count: usize) -> ProfileResult<Vec<f64>> {
    match values.len() {
        n if n == tool_count => Ok(values.to_vec()),
        1 => Ok(vec![values[0]; tool_count]),
        n => Err(ProfileError::InvalidVariable {
            name: name.to_string(),
            reason: format!("expected {} values, found {}", tool_count, n),
        }),
    }
}
