//! Line classifier.
//!
//! Converts a raw G-code line into at most one typed [`Event`]. The only state
//! carried between lines is the [`MotionState`] (sticky feed rate and the last
//! known X/Y position), which callers thread through explicitly.
//!
//! # Recognized lines
//!
//! | Shape | Event |
//! |---|---|
//! | `G1 [X..] [Y..] [E..] [F..]` (parameters in that order) | [`EventKind::Move`] |
//! | `T<digit>` | [`EventKind::ToolChange`] |
//! | `;Z:<height>` | [`EventKind::LayerChange`] |
//! | `M104 S<temp> T<digit>` | [`EventKind::TempChange`] |
//!
//! Anything else is unrecognized and passes through untouched.

use crate::{Celsius, LineIndex, ToolId};

/// Linear move opcode.
const MOVE_OPCODE: &str = "G1";

/// Move parameters in the order the slicer writes them.
const MOVE_AXES: [char; 4] = ['X', 'Y', 'E', 'F'];

/// Prefix of layer marker comments.
const LAYER_PREFIX: &str = ";Z:";

/// Heater set opcode.
const HEATER_OPCODE: &str = "M104";

/// Motion state carried from one line to the next.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionState {
    /// Current feed rate in mm/min. Zero until the first `F` parameter.
    pub feed_rate: f64,
    /// Last known X position (mm).
    pub x: f64,
    /// Last known Y position (mm).
    pub y: f64,
}

impl MotionState {
    /// Create a motion state at the origin with no feed rate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a parsed move and return its travel time in seconds.
    ///
    /// The feed rate is updated first, then X and Y. A travel time is only
    /// produced when X or Y actually changed; a pure extrusion or feed rate
    /// line returns `None`, never `Some(0.0)`.
    pub fn apply(&mut self, params: &MoveParams) -> Option<f64> {
        if let Some(f) = params.f {
            self.feed_rate = f;
        }

        let mut dx = 0.0;
        if let Some(x) = params.x {
            dx = (x - self.x).abs();
            self.x = x;
        }

        let mut dy = 0.0;
        if let Some(y) = params.y {
            dy = (y - self.y).abs();
            self.y = y;
        }

        if dx <= 0.0 && dy <= 0.0 {
            return None;
        }

        if self.feed_rate <= 0.0 {
            tracing::debug!(dx, dy, "planar move before any feed rate, no travel time");
            return None;
        }

        let mm_per_second = self.feed_rate / 60.0;
        Some(dx.hypot(dy) / mm_per_second)
    }
}

/// Raw parameters of a `G1` line.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MoveParams {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub e: Option<f64>,
    pub f: Option<f64>,
}

/// A classified move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveEvent {
    /// Feed rate written on this line (mm/min), if any.
    pub feed_rate: Option<f64>,
    /// X written on this line, if any.
    pub x: Option<f64>,
    /// Y written on this line, if any.
    pub y: Option<f64>,
    /// E written on this line, if any.
    pub e: Option<f64>,
    /// Travel time in seconds, present only for planar displacement.
    pub move_time: Option<f64>,
}

/// The kind of a classified line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventKind {
    Move(MoveEvent),
    ToolChange { tool: ToolId },
    LayerChange { height: f64 },
    TempChange { temperature: Celsius, tool: ToolId },
}

/// A classified line, tagged with its index in the original program.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Event {
    pub line: LineIndex,
    pub kind: EventKind,
}

impl Event {
    /// Create an event.
    pub fn new(line: LineIndex, kind: EventKind) -> Self {
        Self { line, kind }
    }

    /// Travel time of a move event.
    pub fn move_time(&self) -> Option<f64> {
        match self.kind {
            EventKind::Move(mov) => mov.move_time,
            _ => None,
        }
    }

    /// Tool selected by a tool change event.
    pub fn tool_change(&self) -> Option<ToolId> {
        match self.kind {
            EventKind::ToolChange { tool } => Some(tool),
            _ => None,
        }
    }

    /// Temperature and tool of an in-source heater directive.
    pub fn temp_change(&self) -> Option<(Celsius, ToolId)> {
        match self.kind {
            EventKind::TempChange { temperature, tool } => Some((temperature, tool)),
            _ => None,
        }
    }
}

/// Classify one line, advancing `state` when the line is a move.
///
/// Moves are checked first since they make up most of a program.
pub fn classify_line(line: &str, index: LineIndex, state: &mut MotionState) -> Option<Event> {
    let line = line.trim();

    if let Some(params) = parse_move(line) {
        let move_time = state.apply(&params);
        let mov = MoveEvent {
            feed_rate: params.f,
            x: params.x,
            y: params.y,
            e: params.e,
            move_time,
        };
        return Some(Event::new(index, EventKind::Move(mov)));
    }

    if let Some(tool) = parse_tool_change(line) {
        return Some(Event::new(index, EventKind::ToolChange { tool }));
    }

    if let Some(height) = parse_layer_change(line) {
        return Some(Event::new(index, EventKind::LayerChange { height }));
    }

    if let Some((temperature, tool)) = parse_temp_change(line) {
        return Some(Event::new(index, EventKind::TempChange { temperature, tool }));
    }

    None
}

/// Parse a `G1` line whose parameters are a subset of X, Y, E, F in that order.
///
/// A trailing `;` comment is allowed. Any other parameter, a repeated or
/// out-of-order parameter, or an unparseable value makes the line not a move.
pub fn parse_move(line: &str) -> Option<MoveParams> {
    let code = match line.split_once(';') {
        Some((code, _)) => code,
        None => line,
    };

    let mut parts = code.split_whitespace();
    if parts.next()? != MOVE_OPCODE {
        return None;
    }

    let mut params = MoveParams::default();
    let mut next_axis = 0;

    for part in parts {
        let mut chars = part.chars();
        let axis = chars.next()?;
        let slot = MOVE_AXES.iter().position(|&a| a == axis)?;
        if slot < next_axis {
            return None;
        }

        let value: f64 = chars.as_str().parse().ok()?;
        if !value.is_finite() {
            return None;
        }

        match axis {
            'X' => params.x = Some(value),
            'Y' => params.y = Some(value),
            'E' => params.e = Some(value),
            _ => params.f = Some(value),
        }
        next_axis = slot + 1;
    }

    Some(params)
}

/// Parse a bare tool select line, `T0` through `T9`.
pub fn parse_tool_change(line: &str) -> Option<ToolId> {
    let digit = line.strip_prefix('T')?;
    let mut chars = digit.chars();
    let tool = chars.next()?.to_digit(10)?;
    if chars.next().is_some() {
        return None;
    }
    Some(tool as ToolId)
}

/// Parse a `;Z:<height>` layer marker.
pub fn parse_layer_change(line: &str) -> Option<f64> {
    let rest = line.strip_prefix(LAYER_PREFIX)?;
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(rest.len());
    rest[..end].parse().ok()
}

/// Parse an `M104 S<temp> T<digit>` heater directive.
pub fn parse_temp_change(line: &str) -> Option<(Celsius, ToolId)> {
    let mut parts = line.split_whitespace();
    if parts.next()? != HEATER_OPCODE {
        return None;
    }

    let digits = parts.next()?.strip_prefix('S')?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let temperature: Celsius = digits.parse().ok()?;

    let tool = parse_tool_change(parts.next()?)?;
    Some((temperature, tool))
}
