//! Line/offset mapping between original and instrumented source.
//!
//! The transformer records, for every line it emits, the original line it
//! was derived from (0 for synthetic tracker-call lines). Reports use the
//! map to annotate original source; the loader uses it to rewrite
//! positions of runtime errors raised inside instrumented chunks.

use serde::{Deserialize, Serialize};

/// One recorded line: byte offset of its start and its length, both in
/// the text it belongs to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct LineEntry {
    offset: u32,
    len: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMap {
    source_lines: Vec<LineEntry>,
    instrumented_lines: Vec<LineEntry>,
    /// Original line per instrumented line, 0 for synthetic lines.
    origins: Vec<u32>,
}

impl SourceMap {
    pub fn create() -> Self {
        Self::default()
    }

    /// Record the next original source line.
    pub fn add_source_line(&mut self, text: &str) {
        let offset = self
            .source_lines
            .last()
            .map(|l| l.offset + l.len + 1)
            .unwrap_or(0);
        self.source_lines.push(LineEntry {
            offset,
            len: text.len() as u32,
        });
    }

    /// Record the next emitted line. `original_line` is 1-based, 0 for
    /// synthetic tracker calls.
    pub fn add_instrumented_line(&mut self, text: &str, original_line: u32) {
        let offset = self
            .instrumented_lines
            .last()
            .map(|l| l.offset + l.len + 1)
            .unwrap_or(0);
        self.instrumented_lines.push(LineEntry {
            offset,
            len: text.len() as u32,
        });
        self.origins.push(original_line);
    }

    pub fn source_line_count(&self) -> u32 {
        self.source_lines.len() as u32
    }

    pub fn instrumented_line_count(&self) -> u32 {
        self.instrumented_lines.len() as u32
    }

    /// Map a 1-based instrumented line to its original line. Returns
    /// `Some(0)` for synthetic lines, `None` when out of range.
    pub fn map_line(&self, instrumented_line: u32) -> Option<u32> {
        if instrumented_line == 0 {
            return None;
        }
        self.origins.get(instrumented_line as usize - 1).copied()
    }

    /// Map a 0-based byte offset in the instrumented text to the
    /// corresponding offset in the original text. Synthetic lines map to
    /// `None`.
    pub fn map_position(&self, instrumented_offset: u32) -> Option<u32> {
        let idx = self
            .instrumented_lines
            .partition_point(|l| l.offset <= instrumented_offset)
            .checked_sub(1)?;
        let entry = self.instrumented_lines[idx];
        let origin = self.origins[idx];
        if origin == 0 {
            return None;
        }
        let source_entry = self.source_lines.get(origin as usize - 1)?;
        let column = (instrumented_offset - entry.offset).min(source_entry.len);
        Some(source_entry.offset + column)
    }

    /// Check internal consistency. Returns a list of violations; an empty
    /// list means the map is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut violations = Vec::new();

        if self.origins.len() != self.instrumented_lines.len() {
            violations.push(format!(
                "origin table has {} entries for {} instrumented lines",
                self.origins.len(),
                self.instrumented_lines.len()
            ));
        }

        let source_count = self.source_lines.len() as u32;
        let mut last_origin = 0u32;
        for (idx, &origin) in self.origins.iter().enumerate() {
            if origin == 0 {
                continue;
            }
            if origin > source_count {
                violations.push(format!(
                    "instrumented line {} maps to original line {} beyond source ({} lines)",
                    idx + 1,
                    origin,
                    source_count
                ));
            }
            if origin < last_origin {
                violations.push(format!(
                    "mapping not monotone: instrumented line {} maps to {} after {}",
                    idx + 1,
                    origin,
                    last_origin
                ));
            }
            last_origin = last_origin.max(origin);
        }

        if !self.source_lines.is_empty() && self.instrumented_lines.is_empty() {
            violations.push("no instrumented lines recorded for a non-empty source".to_string());
        }

        violations
    }
}
