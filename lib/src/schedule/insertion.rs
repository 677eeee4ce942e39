//! Insertions, rewrites and the merge that applies them.
//!
//! An insertion is anchored to a line of the original program and lands
//! directly after it. Insertions are produced in decision order, not line
//! order, so the merge sorts them (stably) by target position before splicing
//! them in. Insertions sharing an anchor stay in the order they were produced,
//! which makes the later of two conflicting heater commands the one in effect.

use serde::Serialize;

use crate::gcode::{heater_target, GCodeProgram};
use crate::{LineIndex, ToolId};

/// A line to insert after `anchor_line`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Insertion {
    /// Index in the original program the line is inserted before.
    pub target_offset: LineIndex,
    /// Original line the insertion follows.
    pub anchor_line: LineIndex,
    /// Text of the inserted line, without terminator.
    pub text: String,
}

impl Insertion {
    /// Create an insertion landing right after `anchor_line`.
    pub fn after(anchor_line: LineIndex, text: impl Into<String>) -> Self {
        Self {
            target_offset: anchor_line + 1,
            anchor_line,
            text: text.into(),
        }
    }
}

/// Replacement text for an original line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineRewrite {
    pub line: LineIndex,
    pub text: String,
}

/// Insertions in the order they were produced.
#[derive(Debug, Clone, Default)]
pub struct InsertionList {
    insertions: Vec<Insertion>,
}

impl InsertionList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line to insert after `anchor`.
    pub fn push(&mut self, anchor: LineIndex, text: impl Into<String>) {
        let insertion = Insertion::after(anchor, text);
        tracing::debug!(anchor, text = %insertion.text, "insertion");
        self.insertions.push(insertion);
    }

    pub fn as_slice(&self) -> &[Insertion] {
        &self.insertions
    }

    pub fn into_vec(self) -> Vec<Insertion> {
        self.insertions
    }
}

/// Two heater commands for the same tool landing at the same position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Collision {
    pub anchor_line: LineIndex,
    pub tool: ToolId,
    /// Command that runs first and is immediately overridden.
    pub superseded: String,
    /// Command that stays in effect.
    pub effective: String,
}

/// Order in which insertions are merged: by target, production order on ties.
fn merge_order(insertions: &[Insertion]) -> Vec<&Insertion> {
    let mut ordered: Vec<&Insertion> = insertions.iter().collect();
    ordered.sort_by_key(|ins| ins.target_offset);
    ordered
}

/// Find heater commands that are overridden by a later command for the same
/// tool at the same position.
pub fn find_collisions(insertions: &[Insertion]) -> Vec<Collision> {
    let ordered = merge_order(insertions);
    let mut collisions = Vec::new();

    for group in ordered.chunk_by(|a, b| a.target_offset == b.target_offset) {
        let mut last_heater: Vec<(ToolId, &Insertion)> = Vec::new();

        for &insertion in group {
            let Some(tool) = heater_target(&insertion.text) else {
                continue;
            };

            match last_heater.iter_mut().find(|(t, _)| *t == tool) {
                Some(slot) => {
                    if slot.1.text != insertion.text {
                        collisions.push(Collision {
                            anchor_line: insertion.anchor_line,
                            tool,
                            superseded: slot.1.text.clone(),
                            effective: insertion.text.clone(),
                        });
                    }
                    slot.1 = insertion;
                }
                None => last_heater.push((tool, insertion)),
            }
        }
    }

    collisions
}

/// The `\r` a CRLF line carries before its `\n`.
fn carriage_return(line: &str) -> &'static str {
    if line.ends_with('\r') {
        "\r"
    } else {
        ""
    }
}

/// Apply rewrites and insertions to a program.
///
/// Rewrites replace original lines by index. Insertions are then spliced in
/// front of their target line; targets past the end of the program are
/// appended. Edited lines keep the line ending of the line they replace or
/// follow. With no insertions and no rewrites the result equals the input.
pub fn merge_insertions(
    program: &GCodeProgram,
    insertions: &[Insertion],
    rewrites: &[LineRewrite],
) -> GCodeProgram {
    let mut original: Vec<String> = program.lines().to_vec();
    for rewrite in rewrites {
        if let Some(line) = original.get_mut(rewrite.line) {
            *line = format!("{}{}", rewrite.text, carriage_return(line));
        }
    }

    let ordered = merge_order(insertions);
    let mut pending = ordered.into_iter().peekable();
    let mut merged = Vec::with_capacity(original.len() + insertions.len());

    // Ending of the line the next insertion follows.
    let mut ending = "";
    for (index, line) in original.into_iter().enumerate() {
        while let Some(insertion) = pending.next_if(|ins| ins.target_offset <= index) {
            merged.push(format!("{}{}", insertion.text, ending));
        }
        ending = carriage_return(&line);
        merged.push(line);
    }
    merged.extend(pending.map(|ins| format!("{}{}", ins.text, ending)));

    program.with_lines(merged)
}
