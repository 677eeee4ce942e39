//! G-code line handling.
//!
//! - [`classifier`]: turns raw lines into typed events
//! - [`commands`]: the commands this crate emits
//! - [`program`]: the line buffer that is read, edited and written back

pub mod classifier;
pub mod commands;
pub mod program;

pub use classifier::{
    classify_line, parse_layer_change, parse_move, parse_temp_change, parse_tool_change, Event,
    EventKind, MotionState, MoveEvent, MoveParams,
};
pub use commands::{fan_pwm, heater_target, Command};
pub use program::GCodeProgram;
