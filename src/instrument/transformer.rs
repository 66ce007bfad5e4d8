//! AST transformer: re-emits a parsed chunk as instrumented Lua source.
//!
//! Insertion policy:
//! - every trackable statement is preceded by a `__covmap.line` call on
//!   its own (synthetic) line;
//! - every function body starts with a `__covmap.enter` call carrying the
//!   function id `"{name}:{start}-{end}"`;
//! - every `if`/`elseif` arm re-tracks its header line on entry so arms
//!   are individually observable;
//! - statements calling `expect` or `assert` are lowered into a `do`
//!   block holding a to-be-closed guard from `__covmap.begin_assert`, so
//!   assertion exit runs on every path out of the statement.
//!
//! Original whitespace and comments are not preserved; the sourcemap
//! records the original line for every emitted line (0 for synthetic
//! tracker lines).

use std::collections::BTreeSet;

use crate::core::errors::{Error, Result};
use crate::core::{FunctionKind, FunctionRecord};
use crate::instrument::emit::{escape_string, is_identifier};
use crate::instrument::sourcemap::SourceMap;
use crate::parser::ast::{Block, Chunk, Expr, FuncBody, Stat, TableItem, UnOp};

/// First line of every instrumented source; re-instrumentation is refused
/// when it is present.
pub const SENTINEL: &str = "-- covmap: instrumented";

/// Result of instrumenting one file.
#[derive(Clone, Debug)]
pub struct Instrumented {
    pub source: String,
    pub sourcemap: SourceMap,
    /// Original lines holding at least one trackable statement.
    pub executable_lines: BTreeSet<u32>,
    pub functions: Vec<FunctionRecord>,
}

/// True when the source already carries the instrumentation sentinel.
pub fn is_instrumented(source: &str) -> bool {
    source.lines().next().map(|l| l.trim_end()) == Some(SENTINEL)
}

/// Instrument a parsed chunk. `file_id` is embedded into the emitted
/// prelude and passed to every tracker call.
pub fn instrument(chunk: &Chunk, source: &str, file_id: &str) -> Result<Instrumented> {
    if is_instrumented(source) {
        return Err(Error::instrumentation(
            file_id,
            "source is already instrumented",
        ));
    }

    let mut t = Transformer {
        out: String::with_capacity(source.len() * 2),
        current: String::new(),
        map: SourceMap::create(),
        executable: BTreeSet::new(),
        functions: Vec::new(),
        depth: 0,
        func_depth: 0,
        file_id: file_id.to_string(),
        max_origin: 0,
    };

    for line in source.lines() {
        t.map.add_source_line(line);
    }

    t.w(SENTINEL);
    t.nl(0);
    t.w(&format!("local __F = {}", escape_string(file_id)));
    t.nl(0);
    t.emit_block(&chunk.block)?;

    if !t.current.is_empty() {
        return Err(Error::instrumentation(
            file_id,
            "emitter finished with an unterminated line",
        ));
    }
    let violations = t.map.validate();
    if !violations.is_empty() {
        return Err(Error::instrumentation(
            file_id,
            format!("sourcemap invalid: {}", violations.join("; ")),
        ));
    }

    Ok(Instrumented {
        source: t.out,
        sourcemap: t.map,
        executable_lines: t.executable,
        functions: t.functions,
    })
}

struct Transformer {
    out: String,
    current: String,
    map: SourceMap,
    executable: BTreeSet<u32>,
    functions: Vec<FunctionRecord>,
    depth: usize,
    func_depth: usize,
    file_id: String,
    /// Highest original line flushed so far; keeps the mapping monotone
    /// when a closing delimiter is attributed to its construct.
    max_origin: u32,
}

impl Transformer {
    fn w(&mut self, text: &str) {
        if self.current.is_empty() && !text.is_empty() {
            for _ in 0..self.depth {
                self.current.push_str("  ");
            }
        }
        self.current.push_str(text);
    }

    /// Flush the current line, mapping it to `origin` (0 = synthetic).
    /// Closing fragments of multi-line constructs carry their construct's
    /// starting line; clamping to the furthest line already flushed keeps
    /// the mapping monotone non-decreasing.
    fn nl(&mut self, origin: u32) {
        let origin = if origin == 0 {
            0
        } else {
            let clamped = origin.max(self.max_origin);
            self.max_origin = clamped;
            clamped
        };
        self.map.add_instrumented_line(&self.current, origin);
        self.out.push_str(&self.current);
        self.out.push('\n');
        self.current.clear();
    }

    fn tracker_line(&mut self, text: String) {
        debug_assert!(self.current.is_empty(), "tracker call must start a line");
        self.w(&text);
        self.nl(0);
    }

    fn track_line_call(&mut self, line: u32) {
        self.executable.insert(line);
        self.tracker_line(format!("__covmap.line(__F, {line})"));
    }

    // ---- statements ----

    fn emit_block(&mut self, block: &Block) -> Result<()> {
        for stat in &block.stats {
            self.emit_stat(stat)?;
        }
        Ok(())
    }

    fn emit_stat(&mut self, stat: &Stat) -> Result<()> {
        match stat {
            Stat::Label { span, name } => {
                self.w(&format!("::{name}::"));
                self.nl(span.line);
                Ok(())
            }
            Stat::Do { span, body } => {
                self.w("do");
                self.nl(span.line);
                self.depth += 1;
                self.emit_block(body)?;
                self.depth -= 1;
                self.w("end");
                self.nl(span.line);
                Ok(())
            }
            Stat::Call { span, call } if is_assertion_call(call) => {
                let line = span.line;
                self.executable.insert(line);
                self.w("do");
                self.nl(line);
                self.depth += 1;
                self.tracker_line(format!(
                    "local __covmap_guard <close> = __covmap.begin_assert(__F, {line})"
                ));
                self.tracker_line(format!("__covmap.line(__F, {line})"));
                self.emit_expr(call)?;
                self.nl(line);
                self.depth -= 1;
                self.w("end");
                self.nl(line);
                Ok(())
            }
            tracked => {
                self.track_line_call(tracked.span().line);
                self.emit_plain_stat(tracked)
            }
        }
    }

    fn emit_plain_stat(&mut self, stat: &Stat) -> Result<()> {
        match stat {
            Stat::Set {
                span,
                targets,
                values,
            } => {
                if let [target] = targets.as_slice() {
                    if let [Expr::Function { func, .. }] = values.as_slice() {
                        if let Some(path) = target_path(target) {
                            return self.emit_function_stat(span.line, &path, func);
                        }
                    }
                }
                self.emit_expr_list(targets)?;
                self.w(" = ");
                self.emit_expr_list(values)?;
                self.nl(span.line);
                Ok(())
            }
            Stat::Local {
                span,
                names,
                values,
            } => {
                self.w("local ");
                for (i, name) in names.iter().enumerate() {
                    if i > 0 {
                        self.w(", ");
                    }
                    self.w(&name.name);
                    if let Some(attrib) = &name.attrib {
                        self.w(&format!(" <{attrib}>"));
                    }
                }
                if !values.is_empty() {
                    self.w(" = ");
                    if let ([name], [Expr::Function { func, .. }]) =
                        (names.as_slice(), values.as_slice())
                    {
                        // `local f = function() end` names the function
                        // from its binding.
                        self.emit_function_literal(
                            func,
                            name.name.clone(),
                            FunctionKind::Local,
                        )?;
                    } else {
                        self.emit_expr_list(values)?;
                    }
                }
                self.nl(span.line);
                Ok(())
            }
            Stat::LocalRec { span, name, func } => {
                let id = self.register_function(func, name.clone(), FunctionKind::Local);
                self.w(&format!("local function {name}({})", params_text(func, false)));
                self.nl(span.line);
                self.emit_func_body(func, &id)?;
                self.w("end");
                self.nl(func.end_line);
                Ok(())
            }
            Stat::While { span, cond, body } => {
                self.w("while ");
                self.emit_expr(cond)?;
                self.w(" do");
                self.nl(span.line);
                self.depth += 1;
                self.emit_block(body)?;
                self.depth -= 1;
                self.w("end");
                self.nl(span.line);
                Ok(())
            }
            Stat::Repeat { span, body, cond } => {
                self.w("repeat");
                self.nl(span.line);
                self.depth += 1;
                self.emit_block(body)?;
                self.depth -= 1;
                self.w("until ");
                self.emit_expr(cond)?;
                self.nl(span.line);
                Ok(())
            }
            Stat::If { span, arms, orelse } => {
                for (i, arm) in arms.iter().enumerate() {
                    self.w(if i == 0 { "if " } else { "elseif " });
                    self.emit_expr(&arm.cond)?;
                    self.w(" then");
                    self.nl(arm.span.line);
                    self.depth += 1;
                    self.track_line_call(arm.span.line);
                    self.emit_block(&arm.body)?;
                    self.depth -= 1;
                }
                if let Some(body) = orelse {
                    self.w("else");
                    self.nl(body.span.line);
                    self.depth += 1;
                    self.emit_block(body)?;
                    self.depth -= 1;
                }
                self.w("end");
                self.nl(span.line);
                Ok(())
            }
            Stat::ForNum {
                span,
                var,
                start,
                stop,
                step,
                body,
            } => {
                self.w(&format!("for {var} = "));
                self.emit_expr(start)?;
                self.w(", ");
                self.emit_expr(stop)?;
                if let Some(step) = step {
                    self.w(", ");
                    self.emit_expr(step)?;
                }
                self.w(" do");
                self.nl(span.line);
                self.depth += 1;
                self.emit_block(body)?;
                self.depth -= 1;
                self.w("end");
                self.nl(span.line);
                Ok(())
            }
            Stat::ForIn {
                span,
                names,
                exprs,
                body,
            } => {
                self.w(&format!("for {} in ", names.join(", ")));
                self.emit_expr_list(exprs)?;
                self.w(" do");
                self.nl(span.line);
                self.depth += 1;
                self.emit_block(body)?;
                self.depth -= 1;
                self.w("end");
                self.nl(span.line);
                Ok(())
            }
            Stat::Return { span, exprs } => {
                self.w("return");
                if !exprs.is_empty() {
                    self.w(" ");
                    self.emit_expr_list(exprs)?;
                }
                self.nl(span.line);
                Ok(())
            }
            Stat::Break { span } => {
                self.w("break");
                self.nl(span.line);
                Ok(())
            }
            Stat::Goto { span, label } => {
                self.w(&format!("goto {label}"));
                self.nl(span.line);
                Ok(())
            }
            Stat::Call { span, call } => {
                self.emit_expr(call)?;
                self.nl(span.line);
                Ok(())
            }
            Stat::Do { .. } | Stat::Label { .. } => Err(Error::instrumentation(
                &self.file_id,
                "untracked statement reached the tracked emitter",
            )),
        }
    }

    /// `function a.b:c(...)` statement forms.
    fn emit_function_stat(&mut self, line: u32, path: &TargetPath, func: &FuncBody) -> Result<()> {
        let name = path.segments.join(".");
        let kind = if path.segments.len() > 1 {
            FunctionKind::Method
        } else {
            FunctionKind::Global
        };
        let id = self.register_function(func, name, kind);

        let rendered = if func.implicit_self {
            let (last, init) = path
                .segments
                .split_last()
                .expect("target path is never empty");
            format!("{}:{last}", init.join("."))
        } else {
            path.segments.join(".")
        };
        self.w(&format!(
            "function {rendered}({})",
            params_text(func, false)
        ));
        self.nl(line);
        self.emit_func_body(func, &id)?;
        self.w("end");
        self.nl(func.end_line);
        Ok(())
    }

    fn register_function(&mut self, func: &FuncBody, name: String, kind: FunctionKind) -> String {
        let record = FunctionRecord {
            name,
            kind,
            start_line: func.span.line,
            end_line: func.end_line,
            executed: false,
            covered: false,
            execution_count: 0,
        };
        let id = record.id();
        self.functions.push(record);
        id
    }

    fn emit_func_body(&mut self, func: &FuncBody, id: &str) -> Result<()> {
        self.depth += 1;
        self.func_depth += 1;
        self.tracker_line(format!("__covmap.enter(__F, {})", escape_string(id)));
        self.emit_block(&func.body)?;
        self.func_depth -= 1;
        self.depth -= 1;
        Ok(())
    }

    fn emit_function_literal(
        &mut self,
        func: &FuncBody,
        name: String,
        kind: FunctionKind,
    ) -> Result<()> {
        let id = self.register_function(func, name, kind);
        self.w(&format!("function({})", params_text(func, func.implicit_self)));
        self.nl(func.span.line);
        self.emit_func_body(func, &id)?;
        self.w("end");
        Ok(())
    }

    // ---- expressions ----

    fn emit_expr_list(&mut self, exprs: &[Expr]) -> Result<()> {
        for (i, expr) in exprs.iter().enumerate() {
            if i > 0 {
                self.w(", ");
            }
            self.emit_expr(expr)?;
        }
        Ok(())
    }

    fn emit_expr(&mut self, expr: &Expr) -> Result<()> {
        match expr {
            Expr::Nil { .. } => {
                self.w("nil");
                Ok(())
            }
            Expr::True { .. } => {
                self.w("true");
                Ok(())
            }
            Expr::False { .. } => {
                self.w("false");
                Ok(())
            }
            Expr::Dots { .. } => {
                self.w("...");
                Ok(())
            }
            Expr::Number { repr, .. } => {
                self.w(repr);
                Ok(())
            }
            Expr::Str { value, .. } => {
                self.w(&escape_string(value));
                Ok(())
            }
            Expr::Id { name, .. } => {
                self.w(name);
                Ok(())
            }
            Expr::Paren { inner, .. } => {
                self.w("(");
                self.emit_expr(inner)?;
                self.w(")");
                Ok(())
            }
            Expr::Index { obj, key, .. } => {
                self.emit_prefix(obj)?;
                match key.as_ref() {
                    Expr::Str { value, .. } if is_identifier(value) => {
                        self.w(&format!(".{value}"));
                    }
                    other => {
                        self.w("[");
                        self.emit_expr(other)?;
                        self.w("]");
                    }
                }
                Ok(())
            }
            Expr::Call { func, args, .. } => {
                self.emit_prefix(func)?;
                self.w("(");
                self.emit_expr_list(args)?;
                self.w(")");
                Ok(())
            }
            Expr::Invoke {
                obj, method, args, ..
            } => {
                self.emit_prefix(obj)?;
                self.w(&format!(":{method}("));
                self.emit_expr_list(args)?;
                self.w(")");
                Ok(())
            }
            Expr::Table { items, .. } => {
                if items.is_empty() {
                    self.w("{}");
                    return Ok(());
                }
                self.w("{ ");
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.w(", ");
                    }
                    match item {
                        TableItem::Positional(value) => self.emit_expr(value)?,
                        TableItem::Named { key, value } => {
                            self.w(&format!("{key} = "));
                            self.emit_expr(value)?;
                        }
                        TableItem::Keyed { key, value } => {
                            self.w("[");
                            self.emit_expr(key)?;
                            self.w("] = ");
                            self.emit_expr(value)?;
                        }
                    }
                }
                self.w(" }");
                Ok(())
            }
            Expr::BinOp { op, lhs, rhs, .. } => {
                self.emit_expr(lhs)?;
                self.w(&format!(" {} ", op.as_str()));
                self.emit_expr(rhs)?;
                Ok(())
            }
            Expr::UnOp { op, operand, .. } => {
                match op {
                    UnOp::Not => self.w("not "),
                    UnOp::Len => self.w("#"),
                    UnOp::Neg => {
                        self.w("-");
                        if leftmost_char(operand) == Some('-') {
                            self.w(" ");
                        }
                    }
                    UnOp::BNot => {
                        self.w("~");
                        if leftmost_char(operand) == Some('~') {
                            self.w(" ");
                        }
                    }
                }
                self.emit_expr(operand)?;
                Ok(())
            }
            Expr::Function { func, .. } => {
                let kind = if self.func_depth > 0 {
                    FunctionKind::Closure
                } else {
                    FunctionKind::Anonymous
                };
                let name = format!("anonymous@{}", func.span.line);
                self.emit_function_literal(func, name, kind)
            }
        }
    }

    /// Emit an expression in prefix (callable / indexable) position,
    /// parenthesizing forms the grammar does not allow there.
    fn emit_prefix(&mut self, expr: &Expr) -> Result<()> {
        match expr {
            Expr::Id { .. }
            | Expr::Index { .. }
            | Expr::Call { .. }
            | Expr::Invoke { .. }
            | Expr::Paren { .. } => self.emit_expr(expr),
            other => {
                self.w("(");
                self.emit_expr(other)?;
                self.w(")");
                Ok(())
            }
        }
    }
}

fn params_text(func: &FuncBody, include_self: bool) -> String {
    let mut params = Vec::new();
    if include_self {
        params.push("self".to_string());
    }
    params.extend(func.params.iter().cloned());
    if func.is_vararg {
        params.push("...".to_string());
    }
    params.join(", ")
}

struct TargetPath {
    segments: Vec<String>,
}

/// Render an assignment target as a dotted path when every key is an
/// identifier string rooted at a plain name.
fn target_path(expr: &Expr) -> Option<TargetPath> {
    fn collect(expr: &Expr, segments: &mut Vec<String>) -> bool {
        match expr {
            Expr::Id { name, .. } => {
                segments.push(name.clone());
                true
            }
            Expr::Index { obj, key, .. } => {
                if !collect(obj, segments) {
                    return false;
                }
                match key.as_ref() {
                    Expr::Str { value, .. } if is_identifier(value) => {
                        segments.push(value.clone());
                        true
                    }
                    _ => false,
                }
            }
            _ => false,
        }
    }

    let mut segments = Vec::new();
    if collect(expr, &mut segments) {
        Some(TargetPath { segments })
    } else {
        None
    }
}

/// Leftmost character the expression will emit, for `- -x` style spacing.
fn leftmost_char(expr: &Expr) -> Option<char> {
    match expr {
        Expr::UnOp { op: UnOp::Neg, .. } => Some('-'),
        Expr::UnOp { op: UnOp::BNot, .. } => Some('~'),
        Expr::BinOp { lhs, .. } => leftmost_char(lhs),
        _ => None,
    }
}

/// True for statements of the form `expect(...)...` / `assert(...)...`.
fn is_assertion_call(call: &Expr) -> bool {
    matches!(root_callee_name(call), Some("expect") | Some("assert"))
}

fn root_callee_name(expr: &Expr) -> Option<&str> {
    match expr {
        Expr::Call { func, .. } => base_name(func),
        Expr::Invoke { obj, .. } => base_name(obj),
        _ => None,
    }
}

fn base_name(expr: &Expr) -> Option<&str> {
    match expr {
        Expr::Id { name, .. } => Some(name),
        Expr::Index { obj, .. } => base_name(obj),
        Expr::Call { func, .. } => base_name(func),
        Expr::Invoke { obj, .. } => base_name(obj),
        Expr::Paren { inner, .. } => base_name(inner),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use std::path::Path;

    fn instrument_source(source: &str) -> Instrumented {
        let chunk = parse(source, Path::new("test.lua")).expect("parse failure");
        instrument(&chunk, source, "/abs/test.lua").expect("instrument failure")
    }

    #[test]
    fn emits_sentinel_and_prelude() {
        let out = instrument_source("local a = 1\n");
        let mut lines = out.source.lines();
        assert_eq!(lines.next(), Some(SENTINEL));
        assert_eq!(lines.next(), Some("local __F = \"/abs/test.lua\""));
    }

    #[test]
    fn tracks_statements_with_original_lines() {
        let out = instrument_source("local a = 1\nlocal b = a + 1\n");
        assert!(out.source.contains("__covmap.line(__F, 1)"));
        assert!(out.source.contains("__covmap.line(__F, 2)"));
        assert_eq!(
            out.executable_lines.iter().copied().collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[test]
    fn refuses_already_instrumented_source() {
        let out = instrument_source("local a = 1\n");
        let chunk = parse(&out.source, Path::new("test.lua")).expect("instrumented reparse");
        let err = instrument(&chunk, &out.source, "/abs/test.lua").unwrap_err();
        assert!(matches!(err, Error::Instrumentation { .. }));
    }

    #[test]
    fn instrumented_output_reparses() {
        let source = "local function add(a, b)\n  return a + b\nend\nreturn add(2, 3)\n";
        let out = instrument_source(source);
        parse(&out.source, Path::new("instrumented.lua")).expect("instrumented source is valid Lua");
    }

    #[test]
    fn function_entry_is_tracked_with_id() {
        let out = instrument_source("local function add(a, b)\n  return a + b\nend\n");
        assert!(out.source.contains("__covmap.enter(__F, \"add:1-3\")"));
        assert_eq!(out.functions.len(), 1);
        assert_eq!(out.functions[0].name, "add");
        assert_eq!(out.functions[0].kind, FunctionKind::Local);
        assert_eq!(out.functions[0].start_line, 1);
        assert_eq!(out.functions[0].end_line, 3);
    }

    #[test]
    fn one_line_function_has_equal_start_and_end() {
        let out = instrument_source("function f() end\n");
        assert_eq!(out.functions[0].start_line, 1);
        assert_eq!(out.functions[0].end_line, 1);
        assert_eq!(out.functions[0].kind, FunctionKind::Global);
        assert!(out.executable_lines.contains(&1));
    }

    #[test]
    fn method_declarations_keep_colon_form() {
        let out = instrument_source("local M = {}\nfunction M:run(x)\n  return x\nend\n");
        assert!(out.source.contains("function M:run(x)"));
        let run = &out.functions[0];
        assert_eq!(run.name, "M.run");
        assert_eq!(run.kind, FunctionKind::Method);
    }

    #[test]
    fn dotted_assignment_names_are_best_effort_methods() {
        let out = instrument_source("a = {}\na.b = {}\na.b.c = function(x) return x end\n");
        let rec = out
            .functions
            .iter()
            .find(|f| f.name == "a.b.c")
            .expect("dotted function record");
        assert_eq!(rec.kind, FunctionKind::Method);
    }

    #[test]
    fn anonymous_and_closure_kinds() {
        let out = instrument_source(
            "local t = { cb = function() end }\nlocal function outer()\n  return function() end\nend\n",
        );
        let anon = out
            .functions
            .iter()
            .find(|f| f.name == "anonymous@1")
            .expect("anonymous record");
        assert_eq!(anon.kind, FunctionKind::Anonymous);
        let closure = out
            .functions
            .iter()
            .find(|f| f.name == "anonymous@3")
            .expect("closure record");
        assert_eq!(closure.kind, FunctionKind::Closure);
    }

    #[test]
    fn assertion_statements_get_close_guard() {
        let out = instrument_source("expect(1).to.equal(1)\n");
        assert!(out
            .source
            .contains("local __covmap_guard <close> = __covmap.begin_assert(__F, 1)"));
        // Guard block re-parses as valid 5.4.
        parse(&out.source, Path::new("g.lua")).expect("guarded source reparses");
    }

    #[test]
    fn assert_calls_are_wrapped_too() {
        let out = instrument_source("assert(x == nil)\n");
        assert!(out.source.contains("__covmap.begin_assert(__F, 1)"));
    }

    #[test]
    fn plain_calls_are_tracked_without_guard() {
        let out = instrument_source("print(\"hi\")\n");
        assert!(out.source.contains("__covmap.line(__F, 1)"));
        assert!(!out.source.contains("begin_assert"));
    }

    #[test]
    fn if_arms_are_individually_tracked() {
        let source = "if a then\n  x = 1\nelseif b then\n  x = 2\nelse\n  x = 3\nend\n";
        let out = instrument_source(source);
        // Outer statement track plus arm tracks for `if` and `elseif` lines.
        assert!(out.executable_lines.contains(&1));
        assert!(out.executable_lines.contains(&3));
        assert!(out.source.contains("__covmap.line(__F, 3)"));
    }

    #[test]
    fn structural_lines_are_not_executable() {
        let source = "local function f()\n  return 1\nend\n";
        let out = instrument_source(source);
        assert!(!out.executable_lines.contains(&3), "end line is structural");
    }

    #[test]
    fn sourcemap_maps_tracker_lines_to_zero() {
        let out = instrument_source("local a = 1\n");
        // Line 1 sentinel, line 2 prelude, line 3 tracker, line 4 statement.
        assert_eq!(out.sourcemap.map_line(1), Some(0));
        assert_eq!(out.sourcemap.map_line(3), Some(0));
        assert_eq!(out.sourcemap.map_line(4), Some(1));
    }

    #[test]
    fn string_escapes_round_trip() {
        let source = "local s = \"a\\n\\\"b\\\"\\t\"\n";
        let out = instrument_source(source);
        assert!(out.source.contains("local s = \"a\\n\\\"b\\\"\\t\""));
    }

    #[test]
    fn table_and_call_sugar_emit_canonically() {
        let out = instrument_source("f{1}\ng 'mod'\n");
        assert!(out.source.contains("f({ 1 })"));
        assert!(out.source.contains("g(\"mod\")"));
    }

    #[test]
    fn goto_and_labels_survive_instrumentation() {
        let source = "for i = 1, 3 do\n  if i == 2 then goto continue end\n  print(i)\n  ::continue::\nend\n";
        let out = instrument_source(source);
        parse(&out.source, Path::new("g.lua")).expect("emitted goto still resolves");
    }
}
