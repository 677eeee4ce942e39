//! Commands emitted by the scheduler.
//!
//! Every inserted line is produced by formatting a [`Command`]; nothing else in
//! the crate builds G-code text by hand.

use std::fmt;

use crate::{Celsius, ToolId};

/// Maximum value of the `S` parameter of `M106`.
const FAN_PWM_MAX: f64 = 255.0;

/// A line the scheduler can insert or rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Operator message shown in the printer console.
    Respond(String),
    /// `M104 S<temp> T<tool>`.
    SetTemperature { tool: ToolId, temperature: Celsius },
    /// `M106 S<pwm> T<tool>`.
    SetFan { tool: ToolId, pwm: u8 },
    /// `M104 T<tool> S0`.
    HeaterOff { tool: ToolId },
    /// `M106 T<tool> S0`.
    FanOff { tool: ToolId },
    /// Disable the extruder stepper that drives a tool.
    DisableExtruder { tool: ToolId },
}

impl Command {
    /// Message announcing a temperature change.
    pub fn cooling_message(tool: ToolId, temperature: Celsius) -> Self {
        Self::Respond(format!("Cooling T{} to {}", tool, temperature))
    }

    /// Message announcing a temperature change.
    pub fn heating_message(tool: ToolId, temperature: Celsius) -> Self {
        Self::Respond(format!("Heating T{} to {}", tool, temperature))
    }

    /// Full shutdown sequence for a tool that is never used again.
    pub fn shutdown(tool: ToolId) -> [Command; 4] {
        [
            Self::Respond(format!("Turning off T{}", tool)),
            Self::HeaterOff { tool },
            Self::FanOff { tool },
            Self::DisableExtruder { tool },
        ]
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Respond(message) => write!(f, "RESPOND TYPE=echo MSG=\"{}\"", message),
            Self::SetTemperature { tool, temperature } => {
                write!(f, "M104 S{} T{}", temperature, tool)
            }
            Self::SetFan { tool, pwm } => write!(f, "M106 S{} T{}", pwm, tool),
            Self::HeaterOff { tool } => write!(f, "M104 T{} S0", tool),
            Self::FanOff { tool } => write!(f, "M106 T{} S0", tool),
            // The first extruder has no numeric suffix.
            Self::DisableExtruder { tool: 0 } => {
                write!(f, "SET_STEPPER_ENABLE STEPPER=extruder ENABLE=0")
            }
            Self::DisableExtruder { tool } => {
                write!(f, "SET_STEPPER_ENABLE STEPPER=extruder{} ENABLE=0", tool)
            }
        }
    }
}

/// Convert a fan speed percentage into an `M106` PWM value.
pub fn fan_pwm(percent: f64) -> u8 {
    let pwm = (FAN_PWM_MAX * percent / 100.0).floor();
    pwm.clamp(0.0, FAN_PWM_MAX) as u8
}

/// Tool targeted by a heater (`M104`) line, in either parameter order.
pub fn heater_target(line: &str) -> Option<ToolId> {
    let mut parts = line.split_whitespace();
    if parts.next()? != "M104" {
        return None;
    }
    parts.find_map(super::classifier::parse_tool_change)
}
