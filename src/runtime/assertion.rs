//! Assertion hook: turns "assertion passed" into COVERED lines.
//!
//! Each known assertion global is replaced by a wrapper that snapshots
//! the executed set, invokes the original, and on success promotes the
//! newly executed lines. Failures propagate unchanged and promote
//! nothing. `expect` chains are continued through a proxy table whose
//! `__index` intercepts attribute access; every callable link repeats
//! the snapshot/diff/promote step under the same call-site attribution.
//!
//! Internal hook failures are logged and swallowed; the measured
//! assertion's own outcome is always honored.

use mlua::{Function, Lua, MultiValue, Table, Value};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fs;
use std::rc::Rc;

use crate::core::errors::{Error, Result};
use crate::core::AssertionRecord;
use crate::runtime::store::CoverageData;

/// Assertion entry points wrapped when present in the globals at install
/// time.
pub const ASSERTION_FUNCTIONS: &[&str] = &[
    "expect",
    "assert",
    "is_true",
    "is_false",
    "is_nil",
    "is_not_nil",
    "equals",
    "not_equals",
    "matches",
    "not_matches",
    "has_error",
    "has_no_error",
];

/// Raw-keyed marker a proxy uses to reach its real chain object.
const PROXY_TARGET_KEY: &str = "__covmap_target";

/// Deepest stack level inspected while attributing an assertion.
const MAX_WALK_DEPTH: i64 = 16;

/// Owns the name → (original, wrapper) mapping. Install and uninstall
/// are explicit; uninstall restores every original.
pub struct AssertionHook {
    data: Rc<RefCell<CoverageData>>,
    wrapped: Vec<(String, Function)>,
}

impl AssertionHook {
    pub fn new(data: Rc<RefCell<CoverageData>>) -> Self {
        Self {
            data,
            wrapped: Vec::new(),
        }
    }

    /// Wrap every assertion global currently present. Names absent from
    /// the global table are skipped.
    pub fn install(&mut self, lua: &Lua) -> Result<()> {
        if !self.wrapped.is_empty() {
            return Ok(());
        }
        for name in ASSERTION_FUNCTIONS {
            let Some(original) = lua
                .globals()
                .get::<Option<Function>>(*name)
                .ok()
                .flatten()
            else {
                continue;
            };
            let wrapper = make_wrapper(lua, name, original.clone(), self.data.clone())?;
            lua.globals().set(*name, wrapper)?;
            self.wrapped.push((name.to_string(), original));
        }
        Ok(())
    }

    /// Restore the wrapped originals.
    pub fn uninstall(&mut self, lua: &Lua) -> Result<()> {
        for (name, original) in self.wrapped.drain(..) {
            lua.globals().set(name.as_str(), original)?;
        }
        Ok(())
    }

    pub fn is_installed(&self) -> bool {
        !self.wrapped.is_empty()
    }

    pub fn wrapped_names(&self) -> impl Iterator<Item = &str> {
        self.wrapped.iter().map(|(name, _)| name.as_str())
    }
}

fn make_wrapper(
    lua: &Lua,
    name: &str,
    original: Function,
    data: Rc<RefCell<CoverageData>>,
) -> mlua::Result<Function> {
    let kind = name.to_string();
    lua.create_function(move |lua, args: MultiValue| {
        let before = snapshot_before(&data);
        let site = attribution_site(lua, &data);
        // A failure propagates unchanged; nothing is promoted.
        let values = original.call::<MultiValue>(args)?;
        if kind == "expect" {
            // `expect` only starts a chain; nothing has been verified
            // yet. Promotion happens when a chain link passes.
            return wrap_chain_values(lua, &data, &site, values);
        }
        promote_delta(&data, &kind, &site, &before);
        Ok(values)
    })
}

/// Snapshot to diff against. The `begin_assert` guard pushed by the
/// transformer snapshots before the assertion's arguments evaluate, so
/// lines executed while building the asserted value count toward the
/// delta; outside instrumented code, fall back to the current set.
fn snapshot_before(data: &Rc<RefCell<CoverageData>>) -> BTreeSet<String> {
    let store = data.borrow();
    match store.current_assertion() {
        Some(pending) => pending.snapshot.clone(),
        None => store.snapshot_executed(),
    }
}

/// Promote the lines executed since `before` and append the assertion
/// record. Never raises into the measured program.
fn promote_delta(
    data: &Rc<RefCell<CoverageData>>,
    kind: &str,
    site: &(String, u32),
    before: &BTreeSet<String>,
) {
    let mut store = data.borrow_mut();
    let newly = store.diff_executed(before);
    for (file_id, lines) in &newly {
        for line in lines {
            store.record_coverage(file_id, *line);
        }
    }
    store.append_assertion(AssertionRecord {
        test_file: site.0.clone(),
        test_line: site.1,
        assertion_kind: kind.to_string(),
        covered_lines: newly,
    });
}

/// Where this assertion lives in test source.
///
/// The in-flight assertion pushed by `begin_assert` carries the exact
/// static position, so it wins. The dynamic `debug.getinfo` walk is the
/// fallback for assertion calls that never passed through instrumented
/// code; "unknown" only remains when no Lua frame is found at all.
fn attribution_site(lua: &Lua, data: &Rc<RefCell<CoverageData>>) -> (String, u32) {
    if let Some(pending) = data.borrow().current_assertion() {
        return (pending.file.clone(), pending.line);
    }
    walk_stack(lua, data).unwrap_or_else(|| ("unknown".to_string(), 0))
}

fn walk_stack(lua: &Lua, data: &Rc<RefCell<CoverageData>>) -> Option<(String, u32)> {
    let debug: Table = lua.globals().get("debug").ok()?;
    let getinfo: Function = debug.get("getinfo").ok()?;

    let mut fallback: Option<(String, u32)> = None;
    for level in 1..=MAX_WALK_DEPTH {
        let info = match getinfo.call::<Option<Table>>((level, "Sl")) {
            Ok(Some(info)) => info,
            _ => break,
        };
        let what: String = info.get("what").unwrap_or_default();
        if what != "Lua" {
            continue;
        }
        let line: i64 = info.get("currentline").unwrap_or(-1);
        if line <= 0 {
            continue;
        }
        let source: String = info.get("source").unwrap_or_default();
        let file = source.strip_prefix('@').unwrap_or(&source).to_string();
        let (file, line) = remap_position(data, file, line as u32);
        if fallback.is_none() {
            fallback = Some((file.clone(), line));
        }
        if let Some(text) = source_line_text(data, &file, line) {
            if text.contains("expect(") || text.contains("assert(") {
                return Some((file, line));
            }
        }
    }
    fallback
}

/// Map an instrumented frame position back to the original line.
fn remap_position(data: &Rc<RefCell<CoverageData>>, file: String, line: u32) -> (String, u32) {
    let store = data.borrow();
    match store
        .get_file_data(&file)
        .and_then(|f| f.sourcemap.map_line(line))
    {
        Some(original) if original > 0 => (file, original),
        _ => (file, line),
    }
}

fn source_line_text(data: &Rc<RefCell<CoverageData>>, file: &str, line: u32) -> Option<String> {
    if line == 0 {
        return None;
    }
    let store = data.borrow();
    if let Some(record) = store.get_file_data(file) {
        return record
            .source
            .lines()
            .nth(line as usize - 1)
            .map(str::to_string);
    }
    drop(store);
    // Uninstrumented test files are read from disk, best effort.
    let contents = fs::read_to_string(file).ok()?;
    contents.lines().nth(line as usize - 1).map(str::to_string)
}

/// Wrap the first returned value in a chain proxy when it is a table.
fn wrap_chain_values(
    lua: &Lua,
    data: &Rc<RefCell<CoverageData>>,
    site: &(String, u32),
    values: MultiValue,
) -> mlua::Result<MultiValue> {
    let mut values: Vec<Value> = values.into_iter().collect();
    if let Some(Value::Table(chain)) = values.first().cloned() {
        match make_proxy(lua, data.clone(), site.clone(), chain) {
            Ok(proxy) => values[0] = Value::Table(proxy),
            // Hook failures never alter the assertion result; the chain
            // simply continues unproxied.
            Err(e) => log::warn!(
                "covmap: {}",
                Error::AssertionHook(format!("chain proxy creation failed: {e}"))
            ),
        }
    }
    Ok(MultiValue::from_iter(values))
}

fn make_proxy(
    lua: &Lua,
    data: Rc<RefCell<CoverageData>>,
    site: (String, u32),
    target: Table,
) -> mlua::Result<Table> {
    let proxy = lua.create_table()?;
    proxy.raw_set(PROXY_TARGET_KEY, target.clone())?;

    let mt = lua.create_table()?;
    mt.set(
        "__index",
        lua.create_function(move |lua, (_this, key): (Table, Value)| {
            chain_index(lua, &data, &site, &target, key)
        })?,
    )?;
    proxy.set_metatable(Some(mt));
    Ok(proxy)
}

/// Attribute lookup on a chain proxy: callables come back wrapped so the
/// next link keeps promoting; tables come back as nested proxies; plain
/// values pass through.
fn chain_index(
    lua: &Lua,
    data: &Rc<RefCell<CoverageData>>,
    site: &(String, u32),
    target: &Table,
    key: Value,
) -> mlua::Result<Value> {
    let kind = match &key {
        Value::String(s) => s.to_string_lossy().to_string(),
        _ => "chain".to_string(),
    };
    let raw: Value = target.get(key)?;
    match raw {
        Value::Function(f) => Ok(Value::Function(make_chain_method(
            lua,
            data.clone(),
            site.clone(),
            kind,
            f,
        )?)),
        Value::Table(sub) => Ok(Value::Table(make_proxy(
            lua,
            data.clone(),
            site.clone(),
            sub,
        )?)),
        other => Ok(other),
    }
}

fn make_chain_method(
    lua: &Lua,
    data: Rc<RefCell<CoverageData>>,
    site: (String, u32),
    kind: String,
    method: Function,
) -> mlua::Result<Function> {
    lua.create_function(move |lua, args: MultiValue| {
        let mut values: Vec<Value> = args.into_iter().collect();
        // Method-style calls pass the proxy as self; hand the real chain
        // object to the underlying assertion library instead.
        if let Some(Value::Table(first)) = values.first() {
            if let Ok(Value::Table(real)) = first.raw_get::<Value>(PROXY_TARGET_KEY) {
                values[0] = Value::Table(real);
            }
        }
        let before = snapshot_before(&data);
        let result = method.call::<MultiValue>(MultiValue::from_iter(values))?;
        promote_delta(&data, &kind, &site, &before);
        wrap_chain_values(lua, &data, &site, result)
    })
}
