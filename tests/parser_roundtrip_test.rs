//! Property test: for generated valid Lua sources, the instrumented
//! output parses again (instrumented source is itself valid Lua) and the
//! sourcemap stays internally consistent.

use covmap::{instrument, parse};
use proptest::prelude::*;
use std::path::Path;

fn ident() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("a".to_string()),
        Just("b".to_string()),
        Just("foo".to_string()),
        Just("bar_1".to_string()),
        Just("x".to_string()),
    ]
}

fn literal() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("nil".to_string()),
        Just("true".to_string()),
        Just("false".to_string()),
        Just("0".to_string()),
        Just("42".to_string()),
        Just("3.5".to_string()),
        Just("0xFF".to_string()),
        Just("1e3".to_string()),
        Just("\"hi\"".to_string()),
        Just("'quoted \\\"inner\\\"'".to_string()),
        Just("[[long\nstring]]".to_string()),
        Just("{ 1, two = 2, [3] = \"three\" }".to_string()),
    ]
}

fn expr() -> impl Strategy<Value = String> {
    let leaf = prop_oneof![literal(), ident()];
    leaf.prop_recursive(3, 24, 3, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(l, r)| format!("({l} + {r})")),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| format!("({l} .. {r})")),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| format!("({l} == {r})")),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| format!("({l} and {r})")),
            inner.clone().prop_map(|e| format!("(not {e})")),
            inner.clone().prop_map(|e| format!("(-({e}))")),
            (ident(), inner.clone()).prop_map(|(f, e)| format!("{f}({e})")),
            (ident(), inner).prop_map(|(f, e)| format!("{f}:method({e})")),
        ]
    })
}

fn stat() -> impl Strategy<Value = String> {
    let simple = prop_oneof![
        (ident(), expr()).prop_map(|(n, e)| format!("local {n} = {e}")),
        (ident(), expr()).prop_map(|(n, e)| format!("{n} = {e}")),
        (ident(), expr()).prop_map(|(f, e)| format!("{f}({e})")),
        (ident(), expr()).prop_map(|(f, e)| format!("assert({f} == nil or {e})")),
        expr().prop_map(|e| format!("print({e})")),
    ];
    let body = prop::collection::vec(simple.clone(), 1..3);
    prop_oneof![
        simple.clone(),
        (expr(), body.clone()).prop_map(|(c, b)| format!(
            "if {c} then\n  {}\nend",
            b.join("\n  ")
        )),
        (expr(), body.clone()).prop_map(|(c, b)| format!(
            "if {c} then\n  {}\nelse\n  print(\"other\")\nend",
            b.join("\n  ")
        )),
        (ident(), body.clone()).prop_map(|(v, b)| format!(
            "for {v} = 1, 3 do\n  {}\nend",
            b.join("\n  ")
        )),
        (expr(), body.clone()).prop_map(|(c, b)| format!(
            "while {c} do\n  {}\n  break\nend",
            b.join("\n  ")
        )),
        (ident(), ident(), expr(), body).prop_map(|(f, p, e, b)| format!(
            "local function {f}({p})\n  {}\n  return {e}\nend",
            b.join("\n  ")
        )),
    ]
}

fn program() -> impl Strategy<Value = String> {
    (
        prop::collection::vec(stat(), 0..6),
        prop::option::of(expr()),
    )
        .prop_map(|(stats, ret)| {
            let mut out = stats.join("\n");
            if let Some(e) = ret {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(&format!("return {e}"));
            }
            out.push('\n');
            out
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn instrumented_source_is_valid_lua(source in program()) {
        let chunk = parse(&source, Path::new("gen.lua"))
            .expect("generator emits valid Lua");
        let instrumented = instrument(&chunk, &source, "/gen.lua")
            .expect("instrumentation succeeds on valid chunks");
        parse(&instrumented.source, Path::new("gen_instrumented.lua"))
            .expect("instrumented source must parse");
        prop_assert!(instrumented.sourcemap.validate().is_empty());
    }

    #[test]
    fn executable_lines_map_to_real_source_lines(source in program()) {
        let chunk = parse(&source, Path::new("gen.lua")).expect("valid Lua");
        let instrumented = instrument(&chunk, &source, "/gen.lua").expect("instrumentable");
        let line_count = source.lines().count() as u32;
        for &line in &instrumented.executable_lines {
            prop_assert!(line >= 1 && line <= line_count);
        }
    }
}
