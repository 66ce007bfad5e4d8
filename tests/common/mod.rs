// Test utilities for covmap integration tests
#![allow(dead_code)]

use covmap::config::CoverageConfig;
use covmap::controller::CoverageController;
use mlua::{Lua, Table};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A throwaway project directory with its own Lua search path.
pub struct TestProject {
    pub dir: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp project"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a file under the project root, creating parent directories.
    pub fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(&path, contents).expect("write fixture");
        path
    }

    /// The canonical file id a fixture gets once instrumented.
    pub fn file_id(&self, relative: &str) -> String {
        self.path()
            .join(relative)
            .canonicalize()
            .expect("fixture exists")
            .to_string_lossy()
            .into_owned()
    }

    /// A fresh Lua state whose `package.path` resolves modules from this
    /// project only.
    pub fn lua(&self) -> Lua {
        let lua = Lua::new();
        let package: Table = lua.globals().get("package").expect("package table");
        let root = self.path().display().to_string();
        package
            .set("path", format!("{root}/?.lua;{root}/?/init.lua"))
            .expect("set package.path");
        lua
    }

    /// Coverage config with reports pointed into the project directory.
    pub fn config(&self) -> CoverageConfig {
        let mut config = CoverageConfig::default();
        config.enabled = true;
        config.report.dir = self.path().join("coverage-reports");
        config
    }

    /// Start a controller with this project's config, with the minimal
    /// assertion library preloaded so the hook wraps it.
    pub fn start_coverage(&self, lua: &Lua) -> CoverageController {
        lua.load(ASSERTION_LIBRARY)
            .set_name("@assertions.lua")
            .exec()
            .expect("load assertion library");
        let mut controller = CoverageController::new(self.config());
        controller.start(lua).expect("start coverage");
        controller
    }
}

/// Minimal fluent assertion library in plain Lua. Loaded before
/// `start()` so the hook finds `expect` and friends in the globals.
pub const ASSERTION_LIBRARY: &str = r#"
local function fail(message)
  error(message, 2)
end

function expect(value)
  local chain = {}
  chain.to = chain
  chain.be = chain
  chain.and_to = chain
  function chain.equal(expected)
    if value ~= expected then
      fail("expected " .. tostring(expected) .. ", got " .. tostring(value))
    end
    return chain
  end
  function chain.a(type_name)
    if type(value) ~= type_name then
      fail("expected a " .. type_name .. ", got " .. type(value))
    end
    return chain
  end
  function chain.be_greater_than(threshold)
    if not (value > threshold) then
      fail("expected a value greater than " .. tostring(threshold))
    end
    return chain
  end
  function chain.truthy()
    if not value then
      fail("expected a truthy value")
    end
    return chain
  end
  return chain
end

function is_true(value)
  if value ~= true then
    fail("expected true, got " .. tostring(value))
  end
  return true
end
"#;
