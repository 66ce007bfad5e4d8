//! Runtime tracker: the `__covmap` global table instrumented code calls.
//!
//! Entry points never raise into the measured program; internal failures
//! are swallowed with a log entry. `begin_assert` returns a to-be-closed
//! guard whose `__close` metamethod ends the assertion extent, so release
//! is guaranteed on every exit path including errors.

use mlua::{Lua, MultiValue, Table, Value};
use std::cell::RefCell;
use std::rc::Rc;

use crate::runtime::store::CoverageData;

/// Name of the injected global; the only symbol generated code refers to.
pub const TRACKER_GLOBAL: &str = "__covmap";

/// Install the tracker table into the Lua globals.
pub fn install(lua: &Lua, data: Rc<RefCell<CoverageData>>) -> mlua::Result<()> {
    let tracker = lua.create_table()?;

    let store = data.clone();
    tracker.set(
        "line",
        lua.create_function(move |_, (file_id, line): (String, u32)| {
            store.borrow_mut().record_execution(&file_id, line);
            Ok(())
        })?,
    )?;

    let store = data.clone();
    tracker.set(
        "enter",
        lua.create_function(move |_, (file_id, function_id): (String, String)| {
            store.borrow_mut().record_function_entry(&file_id, &function_id);
            Ok(())
        })?,
    )?;

    // Reserved; function exits carry no data today.
    tracker.set(
        "exit",
        lua.create_function(|_, (_file_id, _function_id): (String, String)| Ok(()))?,
    )?;

    let store = data.clone();
    tracker.set(
        "branch",
        lua.create_function(move |_, (file_id, line): (String, u32)| {
            store.borrow_mut().record_execution(&file_id, line);
            Ok(())
        })?,
    )?;

    let store = data.clone();
    tracker.set(
        "begin_assert",
        lua.create_function(move |lua, (file_id, line): (String, u32)| {
            store.borrow_mut().begin_assertion(&file_id, line);
            make_guard(lua, store.clone())
        })?,
    )?;

    lua.globals().set(TRACKER_GLOBAL, tracker)?;
    Ok(())
}

/// Remove the tracker global.
pub fn uninstall(lua: &Lua) -> mlua::Result<()> {
    lua.globals().set(TRACKER_GLOBAL, Value::Nil)
}

pub fn is_installed(lua: &Lua) -> bool {
    matches!(
        lua.globals().get::<Value>(TRACKER_GLOBAL),
        Ok(Value::Table(_))
    )
}

/// Build the scoped cleanup handle returned by `begin_assert`.
fn make_guard(lua: &Lua, store: Rc<RefCell<CoverageData>>) -> mlua::Result<Table> {
    let guard = lua.create_table()?;
    let mt = lua.create_table()?;
    mt.set(
        "__close",
        lua.create_function(move |_, _: MultiValue| {
            store.borrow_mut().end_assertion();
            Ok(())
        })?,
    )?;
    guard.set_metatable(Some(mt));
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::path::PathBuf;

    fn data_with_file(file_id: &str, executable: &[u32]) -> Rc<RefCell<CoverageData>> {
        let mut data = CoverageData::new();
        data.register_file(
            file_id,
            PathBuf::from(file_id),
            "x = 1\ny = 2\n".to_string(),
            crate::instrument::SourceMap::create(),
            executable.iter().copied().collect::<BTreeSet<_>>(),
            Vec::new(),
            Vec::new(),
        );
        Rc::new(RefCell::new(data))
    }

    #[test]
    fn tracker_records_lines_from_lua() {
        let lua = Lua::new();
        let data = data_with_file("/a.lua", &[1, 2]);
        install(&lua, data.clone()).unwrap();
        lua.load("__covmap.line(\"/a.lua\", 1)\n__covmap.line(\"/a.lua\", 1)")
            .exec()
            .unwrap();
        let store = data.borrow();
        assert_eq!(store.get_file_data("/a.lua").unwrap().execution_count(1), 2);
    }

    #[test]
    fn guard_close_ends_assertion_even_on_error() {
        let lua = Lua::new();
        let data = data_with_file("/a.lua", &[1]);
        install(&lua, data.clone()).unwrap();
        let result = lua
            .load(
                "do\n  local g <close> = __covmap.begin_assert(\"/a.lua\", 1)\n  error(\"boom\")\nend",
            )
            .exec();
        assert!(result.is_err());
        assert!(
            data.borrow().current_assertion().is_none(),
            "guard must close on the error path"
        );
    }

    #[test]
    fn install_and_uninstall_toggle_global() {
        let lua = Lua::new();
        let data = data_with_file("/a.lua", &[1]);
        install(&lua, data).unwrap();
        assert!(is_installed(&lua));
        uninstall(&lua).unwrap();
        assert!(!is_installed(&lua));
    }
}
