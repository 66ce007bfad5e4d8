//! LCOV tracefile generator, emitted through `lcov::Record` values.

use lcov::Record;
use std::fmt::Write;

use crate::report::aggregate::Aggregate;

pub fn render(view: &Aggregate<'_>) -> String {
    let mut out = String::new();
    for entry in &view.files {
        let path = entry.record.file_path.display().to_string();
        let mut records = vec![
            Record::TestName { name: path.clone() },
            Record::SourceFile {
                path: entry.record.file_path.clone(),
            },
        ];

        let mut functions: Vec<_> = entry.record.functions.values().collect();
        functions.sort_by_key(|f| (f.start_line, f.name.clone()));
        for func in &functions {
            records.push(Record::FunctionName {
                name: func.name.clone(),
                start_line: func.start_line,
            });
        }
        for func in &functions {
            records.push(Record::FunctionData {
                name: func.name.clone(),
                count: func.execution_count,
            });
        }
        records.push(Record::FunctionsFound {
            found: entry.summary.total_functions,
        });
        records.push(Record::FunctionsHit {
            hit: entry.summary.executed_functions,
        });

        for (idx, kind) in entry.line_kinds.iter().enumerate() {
            if !kind.is_executable() {
                continue;
            }
            let line = idx as u32 + 1;
            records.push(Record::LineData {
                line,
                count: entry.record.execution_count(line),
                checksum: None,
            });
        }
        records.push(Record::LinesFound {
            found: entry.summary.executable_lines,
        });
        records.push(Record::LinesHit {
            hit: entry.summary.executed_lines,
        });
        records.push(Record::EndOfRecord);

        for record in records {
            writeln!(out, "{record}").expect("writing to a String cannot fail");
        }
    }
    out
}
