//! Thermal scheduling engine.
//!
//! [`ThermalScheduler`] owns every piece of mutable state of a run: the
//! timeline, the tool change index, the log of commanded temperatures and the
//! growing list of insertions. A run is strictly sequential:
//!
//! 1. Lines are classified in order. Until the first tool change only tool
//!    selection is looked for; that change defines the initial tool and the
//!    print start line.
//! 2. Every later tool change runs preemptive control immediately, so each
//!    decision sees the insertions and commanded temperatures of the earlier
//!    ones.
//! 3. Once the whole program is known, reactive control shuts off tools that
//!    are never used again and reconciles in-source heater directives.
//! 4. The resulting [`SchedulePlan`] is merged back into the program.

mod insertion;
mod preemptive;
mod reactive;

pub use insertion::{find_collisions, merge_insertions, Collision, Insertion, InsertionList, LineRewrite};

use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::gcode::{classify_line, parse_tool_change, Command, Event, EventKind, GCodeProgram, MotionState};
use crate::profiles::{ProfileError, ThermalProfileTable};
use crate::timeline::{Timeline, TimelineError, ToolChangeIndex};
use crate::{Celsius, LineIndex, ToolId};

/// Scheduling errors. All of them abort the run.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// Not enough travel before a tool change to pre-heat the docked tool.
    #[error(
        "Dock interval is too high: only {available:.1}s of travel before T{tool} is selected \
         at line {}, need more than {required:.1}s",
        .line + 1
    )]
    DockIntervalInfeasible {
        line: LineIndex,
        tool: ToolId,
        available: f64,
        required: f64,
    },

    #[error(transparent)]
    Profile(#[from] ProfileError),

    #[error(transparent)]
    Timeline(#[from] TimelineError),
}

pub type ScheduleResult<T> = Result<T, ScheduleError>;

/// Select the line after which heating must start.
///
/// Walks `moves` (oldest first, as `(line, seconds)`) from the newest one back,
/// and returns the latest line whose strictly later moves add up to more than
/// `threshold`. Returns `None` when no such line exists, which includes every
/// span whose total travel does not exceed the threshold.
pub fn find_threshold_line<I>(moves: I, threshold: f64) -> Option<LineIndex>
where
    I: IntoIterator<Item = (LineIndex, f64)>,
    I::IntoIter: DoubleEndedIterator,
{
    let mut later = 0.0;
    for (line, seconds) in moves.into_iter().rev() {
        if later > threshold {
            return Some(line);
        }
        later += seconds;
    }
    None
}

/// Temperatures the scheduler commanded, per tool and insertion anchor.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SetTempLog {
    temps: BTreeMap<ToolId, BTreeMap<LineIndex, Celsius>>,
}

impl SetTempLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a commanded temperature. A later command at the same anchor
    /// replaces the earlier one, matching the order the lines are inserted in.
    pub fn record(&mut self, tool: ToolId, anchor: LineIndex, temperature: Celsius) {
        self.temps.entry(tool).or_default().insert(anchor, temperature);
    }

    /// Latest `(anchor, temperature)` for `tool` anchored strictly before
    /// `line`, i.e. the command in effect when `line` executes.
    pub fn latest_before(&self, tool: ToolId, line: LineIndex) -> Option<(LineIndex, Celsius)> {
        self.temps
            .get(&tool)?
            .range(..line)
            .next_back()
            .map(|(&anchor, &temp)| (anchor, temp))
    }

    /// Every command for a tool, by anchor.
    pub fn for_tool(&self, tool: ToolId) -> impl Iterator<Item = (LineIndex, Celsius)> + '_ {
        self.temps
            .get(&tool)
            .into_iter()
            .flat_map(|log| log.iter().map(|(&a, &t)| (a, t)))
    }

    /// Total number of recorded commands.
    pub fn len(&self) -> usize {
        self.temps.values().map(BTreeMap::len).sum()
    }

    /// Check if nothing was commanded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Heater change requested by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HeaterChange {
    /// Idle tool off.
    Cool,
    /// Docked tool down by the dock delta.
    DockCool,
    /// Idle tool back up ahead of its next use.
    Heat,
    /// Docked tool back to print temperature.
    DockHeat,
}

/// Fan change requested by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FanChange {
    DockCool,
    DockHeat,
}

/// First tool change of the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PrintStart {
    pub line: LineIndex,
    pub tool: ToolId,
}

/// Summary of a scheduling run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScheduleReport {
    pub print_start: Option<PrintStart>,
    pub tools: Vec<ToolId>,
    pub tool_changes: usize,
    pub layers: u32,
    pub insertions: usize,
    pub rewrites: usize,
    pub collisions: Vec<Collision>,
}

/// Everything a run decided, ready to be merged into the program.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulePlan {
    pub insertions: Vec<Insertion>,
    pub rewrites: Vec<LineRewrite>,
    pub report: ScheduleReport,
}

impl SchedulePlan {
    /// Apply the plan to the program it was computed from.
    pub fn apply(&self, program: &GCodeProgram) -> GCodeProgram {
        merge_insertions(program, &self.insertions, &self.rewrites)
    }

    /// Check if the plan leaves the program unchanged.
    pub fn is_empty(&self) -> bool {
        self.insertions.is_empty() && self.rewrites.is_empty()
    }
}

/// Scheduler context for one run over one program.
#[derive(Debug)]
pub struct ThermalScheduler {
    config: SchedulerConfig,
    profiles: ThermalProfileTable,
    timeline: Timeline,
    tool_changes: ToolChangeIndex,
    set_temps: SetTempLog,
    insertions: InsertionList,
    rewrites: Vec<LineRewrite>,
    motion: MotionState,
    layer_number: u32,
    print_start: Option<PrintStart>,
}

impl ThermalScheduler {
    /// Create a scheduler for one program.
    pub fn new(config: SchedulerConfig, profiles: ThermalProfileTable) -> Self {
        Self {
            config,
            profiles,
            timeline: Timeline::new(),
            tool_changes: ToolChangeIndex::new(),
            set_temps: SetTempLog::new(),
            insertions: InsertionList::new(),
            rewrites: Vec::new(),
            motion: MotionState::new(),
            layer_number: 0,
            print_start: None,
        }
    }

    /// Process every line and finish the run.
    pub fn run<S: AsRef<str>>(mut self, lines: &[S]) -> ScheduleResult<SchedulePlan> {
        for (index, line) in lines.iter().enumerate() {
            self.process_line(index, line.as_ref())?;
        }
        self.finish()
    }

    /// Classify one line and run preemptive control if it is a tool change.
    ///
    /// Lines must be fed in order, each exactly once.
    pub fn process_line(&mut self, index: LineIndex, line: &str) -> ScheduleResult<()> {
        if self.print_start.is_none() {
            return self.seek_initial_tool(index, line);
        }

        let Some(event) = classify_line(line, index, &mut self.motion) else {
            return Ok(());
        };

        match event.kind {
            EventKind::Move(_) => self.timeline.push(event)?,
            EventKind::ToolChange { tool } => {
                self.profiles.get(tool)?;
                self.tool_changes.push(index, tool)?;
                self.timeline.push(event)?;
                self.preemptive_control(tool, index)?;
            }
            EventKind::LayerChange { height } => {
                self.layer_number += 1;
                debug!(line = index, layer = self.layer_number, height, "layer change");
                self.timeline.push(event)?;
            }
            EventKind::TempChange { .. } => {
                if self.config.docking_enabled() {
                    self.timeline.push(event)?;
                }
            }
        }

        Ok(())
    }

    /// Run reactive control and produce the plan.
    pub fn finish(mut self) -> ScheduleResult<SchedulePlan> {
        if self.print_start.is_none() {
            warn!("no tool change found, program left unchanged");
        }

        self.reactive_control()?;

        let insertions = self.insertions.into_vec();
        let collisions = find_collisions(&insertions);
        for collision in &collisions {
            warn!(
                anchor = collision.anchor_line,
                tool = collision.tool,
                superseded = %collision.superseded,
                effective = %collision.effective,
                "conflicting heater commands after the same line, the later one takes effect"
            );
        }

        let report = ScheduleReport {
            print_start: self.print_start,
            tools: self.tool_changes.tools(),
            tool_changes: self.tool_changes.len(),
            layers: self.layer_number,
            insertions: insertions.len(),
            rewrites: self.rewrites.len(),
            collisions,
        };
        info!(
            tool_changes = report.tool_changes,
            layers = report.layers,
            insertions = report.insertions,
            rewrites = report.rewrites,
            "scheduling finished"
        );

        Ok(SchedulePlan {
            insertions,
            rewrites: self.rewrites,
            report,
        })
    }

    /// The configuration of this run.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Events recorded so far.
    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// Tool changes recorded so far.
    pub fn tool_changes(&self) -> &ToolChangeIndex {
        &self.tool_changes
    }

    /// Temperatures commanded so far.
    pub fn set_temps(&self) -> &SetTempLog {
        &self.set_temps
    }

    /// Insertions scheduled so far, in production order.
    pub fn insertions(&self) -> &[Insertion] {
        self.insertions.as_slice()
    }

    /// Current layer number (1-based, 0 before the first layer marker).
    pub fn layer_number(&self) -> u32 {
        self.layer_number
    }

    /// The first tool change, once seen.
    pub fn print_start(&self) -> Option<PrintStart> {
        self.print_start
    }

    fn seek_initial_tool(&mut self, index: LineIndex, line: &str) -> ScheduleResult<()> {
        let Some(tool) = parse_tool_change(line.trim()) else {
            return Ok(());
        };

        self.profiles.get(tool)?;
        self.tool_changes.push(index, tool)?;
        self.timeline
            .push(Event::new(index, EventKind::ToolChange { tool }))?;
        self.print_start = Some(PrintStart { line: index, tool });
        info!(line = index + 1, tool, "print starts");
        Ok(())
    }

    fn initial_tool(&self) -> Option<ToolId> {
        self.print_start.map(|start| start.tool)
    }

    /// Insert a heater change for `tool` after line `anchor`.
    pub(crate) fn change_tool_temp(
        &mut self,
        tool: ToolId,
        anchor: LineIndex,
        change: HeaterChange,
    ) -> ScheduleResult<()> {
        let target = self.profiles.get(tool)?.target_temperature(self.layer_number);
        let delta = self.config.dock_delta;

        let temperature = match change {
            HeaterChange::Cool => 0,
            HeaterChange::DockCool => (target - delta).max(0),
            // Docking brings the tool the rest of the way up.
            HeaterChange::Heat if self.config.docking_enabled() => (target - delta).max(0),
            HeaterChange::Heat | HeaterChange::DockHeat => target,
        };

        let message = match change {
            HeaterChange::Cool | HeaterChange::DockCool => Command::cooling_message(tool, temperature),
            HeaterChange::Heat | HeaterChange::DockHeat => Command::heating_message(tool, temperature),
        };

        debug!(tool, anchor, temperature, ?change, "heater change");
        self.set_temps.record(tool, anchor, temperature);
        self.insertions.push(anchor, message.to_string());
        self.insertions.push(
            anchor,
            Command::SetTemperature { tool, temperature }.to_string(),
        );
        Ok(())
    }

    /// Insert a fan change for `tool` after line `anchor`.
    ///
    /// Nothing is inserted while the tool's fan is still disabled for the
    /// first layers.
    pub(crate) fn change_fan_speed(
        &mut self,
        tool: ToolId,
        anchor: LineIndex,
        change: FanChange,
    ) -> ScheduleResult<()> {
        let profile = self.profiles.get(tool)?;
        let Some(ramped) = profile.ramped_fan_speed(self.layer_number) else {
            return Ok(());
        };

        let percent = match change {
            FanChange::DockCool => 0.0,
            FanChange::DockHeat => ramped,
        };
        let pwm = crate::gcode::fan_pwm(percent);

        debug!(tool, anchor, pwm, ?change, "fan change");
        self.insertions
            .push(anchor, Command::SetFan { tool, pwm }.to_string());
        Ok(())
    }
}
