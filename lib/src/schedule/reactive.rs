//! Reactive control, run once the whole program has been classified.

use tracing::debug;

use super::{LineRewrite, ScheduleResult, ThermalScheduler};
use crate::gcode::Command;

impl ThermalScheduler {
    pub(crate) fn reactive_control(&mut self) -> ScheduleResult<()> {
        self.shutdown_unused_tools();
        if self.config.docking_enabled() {
            self.reconcile_temperature_directives();
        }
        Ok(())
    }

    /// Turn off every tool after its last use.
    ///
    /// The tool selected by the final tool change is left alone; the print end
    /// sequence takes care of it.
    fn shutdown_unused_tools(&mut self) {
        let Some(last) = self.tool_changes.last() else {
            return;
        };

        for tool in self.tool_changes.tools() {
            if tool == last.tool {
                continue;
            }
            let next = self
                .tool_changes
                .last_occurrence(tool)
                .and_then(|line| self.tool_changes.next_after(line));
            let Some(next) = next else {
                continue;
            };

            debug!(tool, line = next.line, "tool no longer used, shutting down");
            for command in Command::shutdown(tool) {
                self.insertions.push(next.line, command.to_string());
            }
        }
    }

    /// Adjust heater directives written by the slicer so they do not undo
    /// the scheduler's own commands.
    ///
    /// A directive for a tool the scheduler turned off is forced to 0. A
    /// directive for a docked tool is replaced by the last commanded
    /// temperature minus the dock delta, whatever the slicer asked for.
    fn reconcile_temperature_directives(&mut self) {
        let delta = self.config.dock_delta;

        for event in self.timeline.iter() {
            let Some((temperature, tool)) = event.temp_change() else {
                continue;
            };
            let Some((_, commanded)) = self.set_temps.latest_before(tool, event.line) else {
                continue;
            };

            let reconciled = if commanded == 0 {
                0
            } else if self.tool_changes.active_tool_at(event.line) != Some(tool) {
                (commanded - delta).max(0)
            } else {
                continue;
            };

            debug!(line = event.line, tool, temperature, reconciled, "reconciling heater directive");
            self.rewrites.push(LineRewrite {
                line: event.line,
                text: Command::SetTemperature {
                    tool,
                    temperature: reconciled,
                }
                .to_string(),
            });
        }
    }
}
