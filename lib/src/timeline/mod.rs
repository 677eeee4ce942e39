//! Timeline of classified events.
//!
//! The [`Timeline`] is the authoritative record the scheduler reasons over: one
//! event per recognized line, in original line order. The [`ToolChangeIndex`]
//! is a secondary index of just the tool changes, answering "when was this tool
//! last selected" and "which change follows this line" without scanning every
//! event.
//!
//! Both structures only grow, and only with strictly increasing line indices.

use thiserror::Error;

use crate::gcode::Event;
use crate::{LineIndex, ToolId};

/// Timeline construction errors.
#[derive(Debug, Error)]
pub enum TimelineError {
    /// A line was recorded at or before the last recorded line.
    #[error("Line {line} recorded after line {last}; lines must be strictly increasing")]
    OutOfOrder { line: LineIndex, last: LineIndex },
}

pub type TimelineResult<T> = Result<T, TimelineError>;

/// Events of a program, ordered by line.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    events: Vec<Event>,
}

impl Timeline {
    /// Create an empty timeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event.
    ///
    /// # Errors
    ///
    /// Returns `TimelineError::OutOfOrder` unless the event's line comes after
    /// every recorded line.
    pub fn push(&mut self, event: Event) -> TimelineResult<()> {
        if let Some(last) = self.events.last() {
            if event.line <= last.line {
                return Err(TimelineError::OutOfOrder {
                    line: event.line,
                    last: last.line,
                });
            }
        }
        self.events.push(event);
        Ok(())
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// All events in line order.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Iterate over all events in line order.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    /// Event recorded for a line.
    pub fn get(&self, line: LineIndex) -> Option<&Event> {
        self.events
            .binary_search_by_key(&line, |e| e.line)
            .ok()
            .map(|i| &self.events[i])
    }

    /// Timed moves on lines in `(after, until]`, oldest first.
    ///
    /// `after = None` starts at the beginning of the timeline.
    pub fn moves_between(
        &self,
        after: Option<LineIndex>,
        until: LineIndex,
    ) -> impl DoubleEndedIterator<Item = (LineIndex, f64)> + '_ {
        let start = match after {
            Some(after) => self.events.partition_point(|e| e.line <= after),
            None => 0,
        };
        let end = self.events.partition_point(|e| e.line <= until);

        self.events[start..end.max(start)]
            .iter()
            .filter_map(|e| e.move_time().map(|t| (e.line, t)))
    }

    /// Total travel time on lines in `(after, until]`, in seconds.
    pub fn travel_time_between(&self, after: Option<LineIndex>, until: LineIndex) -> f64 {
        self.moves_between(after, until).map(|(_, t)| t).sum()
    }
}

/// A tool change: the line and the tool it selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolChange {
    pub line: LineIndex,
    pub tool: ToolId,
}

/// Ordered index of tool changes.
#[derive(Debug, Clone, Default)]
pub struct ToolChangeIndex {
    changes: Vec<ToolChange>,
}

impl ToolChangeIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a tool change.
    ///
    /// # Errors
    ///
    /// Returns `TimelineError::OutOfOrder` unless the line comes after every
    /// recorded change.
    pub fn push(&mut self, line: LineIndex, tool: ToolId) -> TimelineResult<()> {
        if let Some(last) = self.changes.last() {
            if line <= last.line {
                return Err(TimelineError::OutOfOrder {
                    line,
                    last: last.line,
                });
            }
        }
        self.changes.push(ToolChange { line, tool });
        Ok(())
    }

    /// Number of tool changes.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Check if no tool change has been recorded.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Iterate over tool changes in line order.
    pub fn iter(&self) -> impl Iterator<Item = &ToolChange> {
        self.changes.iter()
    }

    /// The first tool change, which starts the print.
    pub fn first(&self) -> Option<ToolChange> {
        self.changes.first().copied()
    }

    /// The last tool change recorded so far.
    pub fn last(&self) -> Option<ToolChange> {
        self.changes.last().copied()
    }

    /// Line of the latest change selecting `tool` strictly before `before`.
    pub fn previous_occurrence(&self, tool: ToolId, before: LineIndex) -> Option<LineIndex> {
        let end = self.changes.partition_point(|c| c.line < before);
        self.changes[..end]
            .iter()
            .rev()
            .find(|c| c.tool == tool)
            .map(|c| c.line)
    }

    /// Line of the last change selecting `tool`.
    pub fn last_occurrence(&self, tool: ToolId) -> Option<LineIndex> {
        self.changes
            .iter()
            .rev()
            .find(|c| c.tool == tool)
            .map(|c| c.line)
    }

    /// The change immediately following `line`.
    pub fn next_after(&self, line: LineIndex) -> Option<ToolChange> {
        let i = self.changes.partition_point(|c| c.line <= line);
        self.changes.get(i).copied()
    }

    /// The change immediately preceding `line`.
    pub fn previous_before(&self, line: LineIndex) -> Option<ToolChange> {
        let i = self.changes.partition_point(|c| c.line < line);
        i.checked_sub(1).map(|i| self.changes[i])
    }

    /// Tool that is active while `line` executes.
    pub fn active_tool_at(&self, line: LineIndex) -> Option<ToolId> {
        let i = self.changes.partition_point(|c| c.line <= line);
        i.checked_sub(1).map(|i| self.changes[i].tool)
    }

    /// Every tool selected at least once, in order of first selection.
    pub fn tools(&self) -> Vec<ToolId> {
        let mut tools = Vec::new();
        for change in &self.changes {
            if !tools.contains(&change.tool) {
                tools.push(change.tool);
            }
        }
        tools
    }
}
