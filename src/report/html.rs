//! Self-contained three-state HTML report.
//!
//! One document, no external resources: embedded CSS renders every file's
//! source with per-line background colors (covered / executed-only /
//! not-covered / non-executable), per-line execution counts, a summary
//! panel with a file navigator, and an explicit legend.

use html_escape::encode_text;
use std::fmt::Write;

use crate::config::ReportConfig;
use crate::core::{LineKind, LineState};
use crate::report::aggregate::{Aggregate, FileEntry, Summary};

pub fn render(view: &Aggregate<'_>, config: &ReportConfig) -> String {
    let mut out = String::with_capacity(64 * 1024);
    let title = encode_text(&config.title);

    let _ = write!(
        out,
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n"
    );
    render_style(&mut out, config);
    let _ = writeln!(out, "</head>\n<body>");
    let _ = writeln!(out, "<h1>{title}</h1>");

    render_summary_panel(&mut out, view);
    render_legend(&mut out);
    for (index, entry) in view.files.iter().enumerate() {
        render_file(&mut out, index, entry);
    }

    let _ = writeln!(out, "</body>\n</html>");
    out
}

fn render_style(out: &mut String, config: &ReportConfig) {
    let colors = &config.colors;
    let _ = writeln!(
        out,
        "<style>\n\
         body {{ font-family: sans-serif; margin: 2em; background: #fcfcfc; color: #222; }}\n\
         table.source {{ border-collapse: collapse; width: 100%; font-family: monospace; font-size: 13px; }}\n\
         table.source td {{ padding: 0 0.6em; white-space: pre; }}\n\
         td.ln {{ text-align: right; color: #888; user-select: none; border-right: 1px solid #ddd; }}\n\
         td.count {{ text-align: right; color: #555; border-right: 1px solid #ddd; }}\n\
         tr.covered, span.lg-covered {{ background: {covered}; }}\n\
         tr.executed, span.lg-executed {{ background: {executed}; }}\n\
         tr.not-covered, span.lg-not-covered {{ background: {not_covered}; }}\n\
         tr.non-executable, span.lg-none {{ background: #f0f0f0; color: #999; }}\n\
         .panel {{ border: 1px solid #ddd; border-radius: 4px; padding: 1em; margin-bottom: 1.5em; background: #fff; }}\n\
         .legend span {{ display: inline-block; padding: 0.2em 0.8em; margin-right: 0.6em; border-radius: 3px; }}\n\
         .file {{ margin-top: 2em; }}\n\
         .file h2 {{ font-size: 1em; font-family: monospace; }}\n\
         .pct {{ font-weight: bold; }}\n\
         nav a {{ display: block; font-family: monospace; text-decoration: none; }}\n\
         </style>",
        covered = colors.covered,
        executed = colors.executed,
        not_covered = colors.not_covered,
    );
}

fn render_summary_panel(out: &mut String, view: &Aggregate<'_>) {
    let totals = &view.totals;
    let _ = writeln!(out, "<div class=\"panel\">");
    let _ = writeln!(out, "<h2>Summary</h2>");
    render_summary_line(out, totals);
    let _ = writeln!(
        out,
        "<p>{} file{} instrumented.</p>",
        view.files.len(),
        if view.files.len() == 1 { "" } else { "s" }
    );
    let _ = writeln!(out, "<nav>");
    for (index, entry) in view.files.iter().enumerate() {
        let _ = writeln!(
            out,
            "<a href=\"#file-{index}\">{} <span class=\"pct\">{:.1}%</span></a>",
            encode_text(&entry.record.file_path.display().to_string()),
            entry.summary.coverage_percent,
        );
    }
    let _ = writeln!(out, "</nav>");
    let _ = writeln!(out, "</div>");
}

fn render_summary_line(out: &mut String, summary: &Summary) {
    let _ = writeln!(
        out,
        "<p>Lines: <span class=\"pct\">{:.1}%</span> covered \
         ({} covered / {} executed / {} executable), \
         functions: {:.1}% ({} of {}).</p>",
        summary.coverage_percent,
        summary.covered_lines,
        summary.executed_lines,
        summary.executable_lines,
        summary.function_coverage_percent,
        summary.covered_functions,
        summary.total_functions,
    );
}

fn render_legend(out: &mut String) {
    let _ = writeln!(
        out,
        "<div class=\"panel legend\">\
         <strong>Legend:</strong> \
         <span class=\"lg-covered\">covered: executed and verified by a passing assertion</span>\
         <span class=\"lg-executed\">executed: ran but never verified</span>\
         <span class=\"lg-not-covered\">not covered: executable but never ran</span>\
         <span class=\"lg-none\">non-executable</span>\
         </div>"
    );
}

fn render_file(out: &mut String, index: usize, entry: &FileEntry<'_>) {
    let path_string = entry.record.file_path.display().to_string();
    let path = encode_text(&path_string);
    let _ = writeln!(out, "<div class=\"file\" id=\"file-{index}\">");
    let _ = writeln!(out, "<h2>{path}</h2>");
    render_summary_line(out, &entry.summary);
    let _ = writeln!(out, "<table class=\"source\">");
    for (idx, text) in entry.record.source.lines().enumerate() {
        let line = idx as u32 + 1;
        let kind = entry
            .line_kinds
            .get(idx)
            .copied()
            .unwrap_or(LineKind::Blank);
        let class = row_class(entry, line, kind);
        let count = entry.record.execution_count(line);
        let count_text = if count > 0 {
            count.to_string()
        } else {
            String::new()
        };
        let _ = writeln!(
            out,
            "<tr class=\"{class}\"><td class=\"ln\">{line}</td><td class=\"count\">{count_text}</td><td>{}</td></tr>",
            encode_text(text),
        );
    }
    let _ = writeln!(out, "</table>\n</div>");
}

fn row_class(entry: &FileEntry<'_>, line: u32, kind: LineKind) -> &'static str {
    if !kind.is_executable() {
        return "non-executable";
    }
    match entry.record.line_state(line) {
        LineState::Covered => "covered",
        LineState::Executed => "executed",
        LineState::NotCovered => "not-covered",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::SourceMap;
    use crate::report::aggregate;
    use crate::runtime::CoverageData;
    use std::collections::BTreeSet;
    use std::path::PathBuf;

    fn sample_view_data() -> CoverageData {
        let mut data = CoverageData::new();
        data.register_file(
            "/a.lua",
            PathBuf::from("/a.lua"),
            "local a = 1\nlocal b = 2\nlocal c = 3\n-- note\n".to_string(),
            SourceMap::create(),
            [1, 2, 3].into_iter().collect::<BTreeSet<u32>>(),
            Vec::new(),
            Vec::new(),
        );
        data.record_execution("/a.lua", 1);
        data.record_coverage("/a.lua", 1);
        data.record_execution("/a.lua", 2);
        data
    }

    #[test]
    fn renders_three_states_and_gray() {
        let data = sample_view_data();
        let view = aggregate::aggregate(&data);
        let html = render(&view, &ReportConfig::default());
        assert!(html.contains("<tr class=\"covered\">"));
        assert!(html.contains("<tr class=\"executed\">"));
        assert!(html.contains("<tr class=\"not-covered\">"));
        assert!(html.contains("<tr class=\"non-executable\">"));
    }

    #[test]
    fn uses_configured_palette_and_title() {
        let data = sample_view_data();
        let view = aggregate::aggregate(&data);
        let mut config = ReportConfig::default();
        config.title = "My <Suite>".to_string();
        config.colors.covered = "#123456".to_string();
        let html = render(&view, &config);
        assert!(html.contains("#123456"));
        assert!(html.contains("My &lt;Suite&gt;"), "title must be escaped");
        assert!(!html.contains("<script src="), "no external resources");
        assert!(!html.contains("http://"));
        assert!(!html.contains("https://"));
    }

    #[test]
    fn escapes_source_code() {
        let mut data = CoverageData::new();
        data.register_file(
            "/x.lua",
            PathBuf::from("/x.lua"),
            "local s = \"<b>&</b>\"\n".to_string(),
            SourceMap::create(),
            [1].into_iter().collect::<BTreeSet<u32>>(),
            Vec::new(),
            Vec::new(),
        );
        let view = aggregate::aggregate(&data);
        let html = render(&view, &ReportConfig::default());
        assert!(html.contains("&lt;b&gt;"));
    }

    #[test]
    fn shows_execution_counts() {
        let data = sample_view_data();
        let view = aggregate::aggregate(&data);
        let html = render(&view, &ReportConfig::default());
        assert!(html.contains("<td class=\"count\">1</td>"));
    }
}
