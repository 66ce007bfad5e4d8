//! Aggregation: line classification and per-file / global summaries.

use serde::Serialize;

use crate::core::{FileRecord, LineKind};
use crate::parser::ast::CommentKind;
use crate::runtime::CoverageData;

/// Per-file or global coverage totals. Percentages are 100 when the
/// denominator is zero, so empty files never divide by zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Summary {
    pub total_lines: u32,
    pub executable_lines: u32,
    pub executed_lines: u32,
    pub covered_lines: u32,
    pub coverage_percent: f64,
    pub execution_percent: f64,
    pub total_functions: u32,
    pub executed_functions: u32,
    pub covered_functions: u32,
    pub function_coverage_percent: f64,
}

/// One file in the aggregated view, borrowing its record read-only.
pub struct FileEntry<'a> {
    pub file_id: &'a str,
    pub record: &'a FileRecord,
    /// Classification per line; index 0 is line 1.
    pub line_kinds: Vec<LineKind>,
    pub summary: Summary,
}

/// The aggregated read-only view every report generator consumes.
pub struct Aggregate<'a> {
    pub files: Vec<FileEntry<'a>>,
    pub totals: Summary,
}

/// Compute the aggregate over every registered file.
pub fn aggregate(data: &CoverageData) -> Aggregate<'_> {
    let mut files = Vec::new();
    for (file_id, record) in data.files() {
        let line_kinds = classify_lines(record);
        let summary = summarize_file(record, &line_kinds);
        files.push(FileEntry {
            file_id,
            record,
            line_kinds,
            summary,
        });
    }
    let totals = summarize_totals(&files);
    Aggregate { files, totals }
}

fn percent(numerator: u32, denominator: u32) -> f64 {
    if denominator == 0 {
        100.0
    } else {
        f64::from(numerator) / f64::from(denominator) * 100.0
    }
}

fn summarize_file(record: &FileRecord, kinds: &[LineKind]) -> Summary {
    let executable = kinds.iter().filter(|k| k.is_executable()).count() as u32;
    let mut executed = 0;
    let mut covered = 0;
    for (idx, kind) in kinds.iter().enumerate() {
        if !kind.is_executable() {
            continue;
        }
        let line = idx as u32 + 1;
        if let Some(rec) = record.lines.get(&line) {
            if rec.flags.executed() {
                executed += 1;
            }
            if rec.flags.covered() {
                covered += 1;
            }
        }
    }

    let total_functions = record.functions.len() as u32;
    let executed_functions = record.functions.values().filter(|f| f.executed).count() as u32;
    let covered_functions = record.functions.values().filter(|f| f.covered).count() as u32;

    Summary {
        total_lines: record.line_count,
        executable_lines: executable,
        executed_lines: executed,
        covered_lines: covered,
        coverage_percent: percent(covered, executable),
        execution_percent: percent(executed, executable),
        total_functions,
        executed_functions,
        covered_functions,
        function_coverage_percent: percent(covered_functions, total_functions),
    }
}

fn summarize_totals(files: &[FileEntry<'_>]) -> Summary {
    let mut totals = Summary::default();
    for entry in files {
        totals.total_lines += entry.summary.total_lines;
        totals.executable_lines += entry.summary.executable_lines;
        totals.executed_lines += entry.summary.executed_lines;
        totals.covered_lines += entry.summary.covered_lines;
        totals.total_functions += entry.summary.total_functions;
        totals.executed_functions += entry.summary.executed_functions;
        totals.covered_functions += entry.summary.covered_functions;
    }
    totals.coverage_percent = percent(totals.covered_lines, totals.executable_lines);
    totals.execution_percent = percent(totals.executed_lines, totals.executable_lines);
    totals.function_coverage_percent = percent(totals.covered_functions, totals.total_functions);
    totals
}

/// Classify every line of a file.
///
/// CODE comes straight from the instrumentation-time statement set. The
/// rest is derived from the original text: blank lines, comment-only
/// lines (including the interior of long comments), structural delimiter
/// lines, and finally the interior lines of multi-line statements, which
/// count as STRUCTURAL so they never inflate the executable total.
pub fn classify_lines(record: &FileRecord) -> Vec<LineKind> {
    let mut kinds = Vec::with_capacity(record.line_count as usize);
    for (idx, text) in record.source.lines().enumerate() {
        let line = idx as u32 + 1;
        let kind = if record.executable_lines.contains(&line) {
            LineKind::Code
        } else if text.trim().is_empty() {
            LineKind::Blank
        } else if is_comment_line(record, line, text) {
            LineKind::Comment
        } else {
            // Block delimiters (`end`, `else`, `until`, lone `do`) and the
            // interior lines of multi-line statements: visually present,
            // never executable.
            LineKind::Structural
        };
        kinds.push(kind);
    }
    kinds
}

fn is_comment_line(record: &FileRecord, line: u32, text: &str) -> bool {
    if text.trim_start().starts_with("--") {
        return true;
    }
    // Interior or closing lines of a long comment.
    record
        .comments
        .iter()
        .any(|c| c.kind == CommentKind::Long && line > c.line && line <= c.end_line)
}
