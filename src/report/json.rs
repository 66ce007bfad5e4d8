//! JSON report generator.

use chrono::Utc;
use serde_json::{json, Map, Value};

use crate::core::errors::Result;
use crate::core::LineState;
use crate::report::aggregate::{Aggregate, FileEntry, Summary};

/// Encode a float, mapping non-finite values to their sentinel strings.
pub(crate) fn json_number(value: f64) -> Value {
    match serde_json::Number::from_f64(value) {
        Some(number) => Value::Number(number),
        None if value.is_nan() => Value::String("NaN".to_string()),
        None if value > 0.0 => Value::String("Infinity".to_string()),
        None => Value::String("-Infinity".to_string()),
    }
}

pub fn render(view: &Aggregate<'_>) -> Result<String> {
    let mut files = Map::new();
    for entry in &view.files {
        files.insert(
            entry.record.file_path.display().to_string(),
            file_json(entry),
        );
    }

    let root = json!({
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
        "summary": summary_json(&view.totals),
        "files": Value::Object(files),
    });
    Ok(serde_json::to_string_pretty(&root)?)
}

fn summary_json(summary: &Summary) -> Value {
    json!({
        "total_lines": summary.total_lines,
        "executable_lines": summary.executable_lines,
        "executed_lines": summary.executed_lines,
        "covered_lines": summary.covered_lines,
        "coverage_percent": json_number(summary.coverage_percent),
        "execution_percent": json_number(summary.execution_percent),
        "total_functions": summary.total_functions,
        "executed_functions": summary.executed_functions,
        "covered_functions": summary.covered_functions,
        "function_coverage_percent": json_number(summary.function_coverage_percent),
    })
}

fn file_json(entry: &FileEntry<'_>) -> Value {
    let mut lines = Map::new();
    for (idx, kind) in entry.line_kinds.iter().enumerate() {
        let line = idx as u32 + 1;
        let record = entry.record.lines.get(&line);
        let flags = record.map(|r| r.flags).unwrap_or_default();
        let status = if !kind.is_executable() {
            "NOT_EXECUTABLE"
        } else {
            match flags.state() {
                LineState::Covered => "COVERED",
                LineState::Executed => "EXECUTED",
                LineState::NotCovered => "NOT_COVERED",
            }
        };
        lines.insert(
            line.to_string(),
            json!({
                "execution_count": record.map(|r| r.execution_count).unwrap_or(0),
                "is_executable": kind.is_executable(),
                "is_executed": flags.executed(),
                "is_covered": flags.covered(),
                "status": status,
            }),
        );
    }

    let mut functions = Map::new();
    for (id, func) in &entry.record.functions {
        functions.insert(
            id.clone(),
            json!({
                "name": func.name,
                "kind": func.kind,
                "start_line": func.start_line,
                "end_line": func.end_line,
                "executed": func.executed,
                "covered": func.covered,
                "execution_count": func.execution_count,
            }),
        );
    }

    json!({
        "summary": summary_json(&entry.summary),
        "lines": Value::Object(lines),
        "functions": Value::Object(functions),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::SourceMap;
    use crate::report::aggregate;
    use crate::runtime::CoverageData;
    use std::collections::BTreeSet;
    use std::path::PathBuf;

    #[test]
    fn sentinel_strings_for_non_finite_numbers() {
        assert_eq!(json_number(f64::NAN), Value::String("NaN".into()));
        assert_eq!(
            json_number(f64::INFINITY),
            Value::String("Infinity".into())
        );
        assert_eq!(
            json_number(f64::NEG_INFINITY),
            Value::String("-Infinity".into())
        );
        assert_eq!(json_number(50.0), json!(50.0));
    }

    #[test]
    fn renders_line_states() {
        let mut data = CoverageData::new();
        data.register_file(
            "/a.lua",
            PathBuf::from("/a.lua"),
            "local a = 1\nlocal b = 2\n-- note\n".to_string(),
            SourceMap::create(),
            [1, 2].into_iter().collect::<BTreeSet<u32>>(),
            Vec::new(),
            Vec::new(),
        );
        data.record_execution("/a.lua", 1);
        data.record_execution("/a.lua", 2);
        data.record_coverage("/a.lua", 1);

        let view = aggregate::aggregate(&data);
        let text = render(&view).unwrap();
        let parsed: Value = serde_json::from_str(&text).unwrap();
        let lines = &parsed["files"]["/a.lua"]["lines"];
        assert_eq!(lines["1"]["status"], "COVERED");
        assert_eq!(lines["2"]["status"], "EXECUTED");
        assert_eq!(lines["3"]["status"], "NOT_EXECUTABLE");
        assert_eq!(lines["1"]["execution_count"], 1);
        assert_eq!(parsed["summary"]["covered_lines"], 1);
        assert!(parsed["timestamp"].is_string());
    }

    #[test]
    fn escapes_are_valid_json() {
        let mut data = CoverageData::new();
        data.register_file(
            "/q.lua",
            PathBuf::from("/q.lua"),
            "local s = \"a\\\"b\"\n".to_string(),
            SourceMap::create(),
            [1].into_iter().collect::<BTreeSet<u32>>(),
            Vec::new(),
            Vec::new(),
        );
        let view = aggregate::aggregate(&data);
        let text = render(&view).unwrap();
        serde_json::from_str::<Value>(&text).expect("output must be valid JSON");
    }
}
