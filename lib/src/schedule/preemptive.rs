//! Preemptive control, run at every tool change during the forward pass.
//!
//! Two independent mechanisms, each switched on by the configuration:
//!
//! | Mechanism | Cools | Heats |
//! |---|---|---|
//! | Idle | a tool unused for more than `interval` seconds, to 0 | the same tool, `interval` seconds before it is picked up |
//! | Docking | the tool being put down, by `dock_delta` | the tool being picked up, `dock_interval` seconds ahead |
//!
//! Only travel recorded so far is considered, i.e. everything up to the tool
//! change being processed.

use tracing::debug;

use super::{find_threshold_line, FanChange, HeaterChange, ScheduleError, ScheduleResult, ThermalScheduler};
use crate::{LineIndex, ToolId};

impl ThermalScheduler {
    /// Schedule heater and fan changes for a switch to `tool` at `line`.
    pub(crate) fn preemptive_control(&mut self, tool: ToolId, line: LineIndex) -> ScheduleResult<()> {
        let reselected = self
            .tool_changes
            .previous_before(line)
            .is_some_and(|previous| previous.tool == tool);
        if reselected {
            // The tool keeps printing: no heater changes, but the dock
            // interval must still fit.
            debug!(line, tool, "tool reselected while active, nothing to schedule");
            if self.config.docking_enabled() {
                self.dock_heat_span(tool, line)?;
            }
            return Ok(());
        }

        if self.config.idle_enabled() {
            self.idle_control(tool, line)?;
        }
        if self.config.docking_enabled() {
            self.dock_control(tool, line)?;
        }
        Ok(())
    }

    /// Cool a tool that sat unused for longer than the idle interval, and heat
    /// it again ahead of this change.
    fn idle_control(&mut self, tool: ToolId, line: LineIndex) -> ScheduleResult<()> {
        let interval = self.config.interval;

        // `idle_from`: last time the tool was selected. `put_down`: the change
        // that replaced it, after which it sits idle.
        let (idle_from, put_down, cool_anchor) =
            match self.tool_changes.previous_occurrence(tool, line) {
                Some(previous) => {
                    let Some(next) = self.tool_changes.next_after(previous) else {
                        return Ok(());
                    };
                    (previous, next.line, next.line + 1)
                }
                None => {
                    let Some(start) = self.print_start else {
                        return Ok(());
                    };
                    if Some(tool) == self.initial_tool() {
                        return Ok(());
                    }
                    // Each tool gets its own slot after the print start line.
                    (start.line, start.line, start.line + 1 + tool)
                }
            };

        let idle = self.timeline.travel_time_between(Some(put_down), line);
        if idle > interval {
            debug!(tool, line, idle, "tool idle past interval, cooling");
            self.change_tool_temp(tool, cool_anchor, HeaterChange::Cool)?;
        }

        let heat_line = find_threshold_line(self.timeline.moves_between(Some(idle_from), line), interval);
        if let Some(heat_line) = heat_line {
            self.change_tool_temp(tool, heat_line, HeaterChange::Heat)?;
        }
        Ok(())
    }

    /// Drop the outgoing tool by the dock delta and bring the incoming tool
    /// back to its print temperature before it is picked up.
    fn dock_control(&mut self, tool: ToolId, line: LineIndex) -> ScheduleResult<()> {
        let anchor_before = line.saturating_sub(1);

        if let Some(previous) = self.tool_changes.previous_before(line) {
            self.change_tool_temp(previous.tool, anchor_before, HeaterChange::DockCool)?;
            if self.profiles.get(previous.tool)?.fan_always_on {
                self.change_fan_speed(previous.tool, anchor_before, FanChange::DockCool)?;
            }
        }

        let dock_interval = self.config.dock_interval;
        let since = self.dock_heat_span(tool, line)?;
        match find_threshold_line(self.timeline.moves_between(since, line), dock_interval) {
            Some(heat_line) => self.change_tool_temp(tool, heat_line, HeaterChange::DockHeat)?,
            None => debug!(tool, line, "no move leaves enough time to dock heat"),
        }

        if self.profiles.get(tool)?.fan_always_on {
            self.change_fan_speed(tool, line + 1, FanChange::DockHeat)?;
        }
        Ok(())
    }

    /// Start of the span `tool` can be dock heated in: its previous
    /// selection, or the start of the timeline.
    ///
    /// Fails when the span holds no more than `dock_interval` seconds of
    /// travel.
    fn dock_heat_span(&self, tool: ToolId, line: LineIndex) -> ScheduleResult<Option<LineIndex>> {
        let required = self.config.dock_interval;
        let since = self.tool_changes.previous_occurrence(tool, line);
        let available = self.timeline.travel_time_between(since, line);
        if available <= required {
            return Err(ScheduleError::DockIntervalInfeasible {
                line,
                tool,
                available,
                required,
            });
        }
        Ok(since)
    }
}
