//! # toolheat
//!
//! Post-processor for multi-tool ("toolchanger") G-code that schedules tool
//! heater and part-cooling fan commands around tool changes.
//!
//! A toolchanger carries one tool at a time while the others sit docked with
//! their heaters still on. This crate reads the program a slicer produced,
//! builds a line-indexed timeline of moves, tool changes, layer markers and
//! temperature directives, and inserts commands that:
//!
//! - cool tools that will sit idle longer than a configured interval, and heat
//!   them again early enough to be ready when they are picked up
//! - drop a docked tool by a small delta and bring it back before it is needed
//! - shut tools off once they are never used again
//!
//! ## Pipeline
//!
//! ```text
//! lines -> classifier -> timeline -> preemptive control (per tool change)
//!                                 -> reactive control (after the pass)
//!                                 -> insertion merge -> lines
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use toolheat::{postprocess, GCodeProgram, SchedulerConfig};
//!
//! let program = GCodeProgram::read_from_file("print.gcode")?;
//! let processed = postprocess(&program, &SchedulerConfig::default())?;
//! processed.program.write_to_file("print.gcode")?;
//! ```

pub mod cli;
pub mod config;
pub mod gcode;
pub mod profiles;
pub mod schedule;
pub mod timeline;

pub use config::{ConfigError, SchedulerConfig};
pub use gcode::{classify_line, Command, Event, EventKind, GCodeProgram, MotionState, MoveEvent};
pub use profiles::{ProfileError, ThermalProfile, ThermalProfileTable};
pub use schedule::{
    find_threshold_line, merge_insertions, Collision, Insertion, LineRewrite, PrintStart,
    ScheduleError, SchedulePlan, ScheduleReport, SetTempLog, ThermalScheduler,
};
pub use timeline::{Timeline, TimelineError, ToolChange, ToolChangeIndex};

pub use cli::{run, run_from_env};

/// Tool number as written in `T<n>` lines.
pub type ToolId = usize;

/// Zero-based index of a line in the original program.
pub type LineIndex = usize;

/// Temperature in whole degrees Celsius.
pub type Celsius = i32;

/// Crate-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Profile(#[from] ProfileError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

impl Error {
    /// Process exit code for the command-line front end.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Io(_) | Self::Json(_) => 1,
            Self::Config(_) => 2,
            Self::Profile(_) => 3,
            Self::Schedule(_) => 4,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Result of running the whole pipeline over a program.
#[derive(Debug, Clone)]
pub struct PostProcessed {
    /// The program with every insertion and rewrite applied.
    pub program: GCodeProgram,
    /// The plan that produced it.
    pub plan: SchedulePlan,
}

/// Parse the thermal profile table from the program header, schedule every
/// tool change and merge the result back into the program.
///
/// Nothing is returned unless the whole run succeeds, so a caller never sees a
/// partially edited program.
pub fn postprocess(program: &GCodeProgram, config: &SchedulerConfig) -> Result<PostProcessed> {
    config.validate()?;

    let profiles = ThermalProfileTable::from_header(program.lines())?;
    tracing::debug!(tools = profiles.len(), "parsed thermal profile table");

    let plan = ThermalScheduler::new(config.clone(), profiles).run(program.lines())?;
    let program = plan.apply(program);

    Ok(PostProcessed { program, plan })
}
