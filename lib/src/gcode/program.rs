//! G-code program buffer.
//!
//! A [`GCodeProgram`] holds the program as individual lines so that insertions
//! and rewrites can address the original line indices. Converting a program
//! back to text reproduces the input byte for byte when nothing was edited.

use crate::{Error, LineIndex, Result};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// A G-code program held as lines.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct GCodeProgram {
    /// Lines without their `\n` terminator.
    lines: Vec<String>,

    /// Whether the text ended with `\n`.
    trailing_newline: bool,
}

impl GCodeProgram {
    /// Create a new empty program.
    pub fn new() -> Self {
        Self {
            lines: Vec::new(),
            trailing_newline: false,
        }
    }

    /// Split program text into lines.
    ///
    /// Only `\n` separates lines; a `\r` before it stays part of the line so
    /// that the text can be reproduced exactly.
    pub fn from_string(content: &str) -> Self {
        if content.is_empty() {
            return Self::new();
        }

        let mut lines: Vec<String> = content.split('\n').map(str::to_string).collect();
        let trailing_newline = content.ends_with('\n');
        if trailing_newline {
            lines.pop();
        }

        Self {
            lines,
            trailing_newline,
        }
    }

    /// Rebuild a program from edited lines, keeping the terminator convention.
    pub(crate) fn with_lines(&self, lines: Vec<String>) -> Self {
        Self {
            lines,
            trailing_newline: self.trailing_newline,
        }
    }

    /// All lines, in order.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// A single line.
    pub fn line(&self, index: LineIndex) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }

    /// Number of lines.
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Check if the program has no lines.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Whether the text ends with a newline.
    pub fn has_trailing_newline(&self) -> bool {
        self.trailing_newline
    }

    /// Write the program to a file.
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path).map_err(Error::Io)?;
        let mut writer = BufWriter::new(file);
        write!(writer, "{}", self).map_err(Error::Io)?;
        writer.flush().map_err(Error::Io)?;
        Ok(())
    }

    /// Read a program from a file.
    pub fn read_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(Error::Io)?;
        Ok(Self::from_string(&content))
    }
}

impl fmt::Debug for GCodeProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GCodeProgram({} lines)", self.line_count())
    }
}

impl fmt::Display for GCodeProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            f.write_str(line)?;
        }
        if self.trailing_newline {
            f.write_str("\n")?;
        }
        Ok(())
    }
}

impl From<String> for GCodeProgram {
    fn from(content: String) -> Self {
        Self::from_string(&content)
    }
}

impl From<&str> for GCodeProgram {
    fn from(content: &str) -> Self {
        Self::from_string(content)
    }
}

impl From<GCodeProgram> for String {
    fn from(program: GCodeProgram) -> Self {
        program.to_string()
    }
}
