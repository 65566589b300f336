//! Byte offset <-> line/column conversion over module text.

use serde::{Deserialize, Serialize};
use std::fmt;
use tree_sitter::Node;

/// A half-open `[start, end)` byte range inside one module's source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: usize,
    pub end: usize,
}

impl Range {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Range covered by a syntax node.
    pub fn of(node: &Node) -> Self {
        Self::new(node.start_byte(), node.end_byte())
    }

    /// Returns true if `offset` falls inside the range.
    ///
    /// The end is inclusive so that a cursor placed directly after an
    /// identifier still selects it.
    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset <= self.end
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slice the range out of `source`, if it is in bounds.
    pub fn text<'a>(&self, source: &'a str) -> Option<&'a str> {
        source.get(self.start..self.end)
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Zero-based line and column (column counted in bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LineColumn {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for LineColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line + 1, self.column + 1)
    }
}

/// Line start table for one module's source text.
#[derive(Debug, Clone)]
pub struct PositionIndex {
    line_starts: Vec<usize>,
    len: usize,
}

impl PositionIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            source
                .bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );

        Self {
            line_starts,
            len: source.len(),
        }
    }

    /// Number of lines in the source (an empty source has one line).
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Convert a byte offset to a line/column pair.
    pub fn line_column(&self, offset: usize) -> LineColumn {
        let offset = offset.min(self.len);
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };

        LineColumn {
            line,
            column: offset - self.line_starts[line],
        }
    }

    /// Convert a line/column pair back to a byte offset, clamping to the
    /// end of the source.
    pub fn offset(&self, position: LineColumn) -> usize {
        match self.line_starts.get(position.line) {
            Some(start) => {
                let line_end = self
                    .line_starts
                    .get(position.line + 1)
                    .map(|next| next - 1)
                    .unwrap_or(self.len);
                (start + position.column).min(line_end)
            }
            None => self.len,
        }
    }

    /// Start and end of a range as line/column pairs.
    pub fn span(&self, range: Range) -> (LineColumn, LineColumn) {
        (self.line_column(range.start), self.line_column(range.end))
    }
}
