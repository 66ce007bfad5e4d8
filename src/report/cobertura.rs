//! Cobertura XML generator.
//!
//! Each file becomes one `<package>` with a single `<class>`; line
//! entries carry `hits` equal to the recorded execution count.

use chrono::Utc;
use html_escape::encode_double_quoted_attribute;
use std::fmt::Write;

use crate::report::aggregate::{Aggregate, FileEntry};

fn rate(numerator: u32, denominator: u32) -> String {
    if denominator == 0 {
        "1.0".to_string()
    } else {
        format!("{:.4}", f64::from(numerator) / f64::from(denominator))
    }
}

pub fn render(view: &Aggregate<'_>) -> String {
    let mut out = String::new();
    let w = &mut out;
    let _ = writeln!(w, "<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
    let _ = writeln!(
        w,
        "<coverage line-rate=\"{}\" lines-covered=\"{}\" lines-valid=\"{}\" timestamp=\"{}\" version=\"{}\">",
        rate(view.totals.covered_lines, view.totals.executable_lines),
        view.totals.covered_lines,
        view.totals.executable_lines,
        Utc::now().timestamp(),
        env!("CARGO_PKG_VERSION"),
    );
    let _ = writeln!(w, "  <sources><source>.</source></sources>");
    let _ = writeln!(w, "  <packages>");
    for entry in &view.files {
        render_package(w, entry);
    }
    let _ = writeln!(w, "  </packages>");
    let _ = writeln!(w, "</coverage>");
    out
}

fn render_package(w: &mut String, entry: &FileEntry<'_>) {
    let path = entry.record.file_path.display().to_string();
    let path = encode_double_quoted_attribute(&path);
    let line_rate = rate(entry.summary.covered_lines, entry.summary.executable_lines);
    let class_name = entry
        .record
        .file_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "chunk".to_string());
    let class_name = encode_double_quoted_attribute(&class_name);

    let _ = writeln!(w, "    <package name=\"{path}\" line-rate=\"{line_rate}\">");
    let _ = writeln!(w, "      <classes>");
    let _ = writeln!(
        w,
        "        <class name=\"{class_name}\" filename=\"{path}\" line-rate=\"{line_rate}\">"
    );

    let _ = writeln!(w, "          <methods>");
    let mut functions: Vec<_> = entry.record.functions.values().collect();
    functions.sort_by_key(|f| (f.start_line, f.name.clone()));
    for func in functions {
        let name = encode_double_quoted_attribute(&func.name);
        let method_rate = if func.covered { "1.0" } else { "0.0" };
        let _ = writeln!(
            w,
            "            <method name=\"{name}\" signature=\"\" line-rate=\"{method_rate}\">"
        );
        let _ = writeln!(
            w,
            "              <lines><line number=\"{}\" hits=\"{}\"/></lines>",
            func.start_line, func.execution_count
        );
        let _ = writeln!(w, "            </method>");
    }
    let _ = writeln!(w, "          </methods>");

    let _ = writeln!(w, "          <lines>");
    for (idx, kind) in entry.line_kinds.iter().enumerate() {
        if !kind.is_executable() {
            continue;
        }
        let line = idx as u32 + 1;
        let _ = writeln!(
            w,
            "            <line number=\"{line}\" hits=\"{}\"/>",
            entry.record.execution_count(line)
        );
    }
    let _ = writeln!(w, "          </lines>");

    let _ = writeln!(w, "        </class>");
    let _ = writeln!(w, "      </classes>");
    let _ = writeln!(w, "    </package>");
}
