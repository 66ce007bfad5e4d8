//! Coverage controller: lifecycle and wiring.
//!
//! Owns the configuration, the data store, and the module cache; installs
//! the tracker globals, the loader hook, and the assertion hook on
//! `start`, and removes them again on `stop`. Reports are attempted per
//! format independently; the run is only fully successful when every
//! requested format succeeded.

use mlua::{Lua, Value};
use std::cell::{Ref, RefCell};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::config::CoverageConfig;
use crate::core::errors::{Error, Result};
use crate::report::{self, Aggregate, ReportFormat, Summary};
use crate::runtime::{
    assertion::AssertionHook, cache::ModuleCache, loader::LoaderHook, tracker, CacheStats,
    CoverageData,
};

pub struct CoverageController {
    config: CoverageConfig,
    data: Rc<RefCell<CoverageData>>,
    cache: Rc<RefCell<ModuleCache>>,
    loader: Option<LoaderHook>,
    assertions: Option<AssertionHook>,
    active: bool,
    started: bool,
}

impl CoverageController {
    pub fn new(config: CoverageConfig) -> Self {
        let mut data = CoverageData::new();
        data.set_preserve_execution_counts(config.preserve_execution_counts);
        Self {
            config,
            data: Rc::new(RefCell::new(data)),
            cache: Rc::new(RefCell::new(ModuleCache::new())),
            loader: None,
            assertions: None,
            active: false,
            started: false,
        }
    }

    /// Validate options and install the tracker, loader hook, and
    /// assertion hook. Idempotent while active.
    pub fn start(&mut self, lua: &Lua) -> Result<()> {
        if self.active {
            return Ok(());
        }
        self.config.validate()?;

        tracker::install(lua, self.data.clone())?;

        let mut loader = LoaderHook::new(
            self.data.clone(),
            self.cache.clone(),
            self.config.file_filter()?,
            self.config.parse_options(),
        );
        loader.install(lua)?;
        self.loader = Some(loader);

        let mut assertions = AssertionHook::new(self.data.clone());
        assertions.install(lua)?;
        self.assertions = Some(assertions);

        self.active = true;
        self.started = true;
        log::debug!("covmap: coverage started");
        Ok(())
    }

    /// Uninstall both hooks and the tracker. Collected data stays
    /// available for aggregation and reports.
    pub fn stop(&mut self, lua: &Lua) -> Result<()> {
        if !self.active {
            return Err(Error::NotStarted);
        }
        if let Some(mut assertions) = self.assertions.take() {
            assertions.uninstall(lua)?;
        }
        if let Some(mut loader) = self.loader.take() {
            loader.uninstall(lua)?;
        }
        tracker::uninstall(lua)?;
        self.active = false;
        log::debug!("covmap: coverage stopped");
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Drop execution and coverage data; registered files stay.
    pub fn reset(&self) {
        self.data.borrow_mut().reset();
    }

    /// Drop everything, including registered files and cached modules.
    pub fn full_reset(&self) {
        self.data.borrow_mut().full_reset();
        self.cache.borrow_mut().reset();
    }

    /// Read-only view of the collected data.
    pub fn data(&self) -> Result<Ref<'_, CoverageData>> {
        if !self.started {
            return Err(Error::NotStarted);
        }
        Ok(self.data.borrow())
    }

    /// Run an entry file through the instrumentation pipeline. Requires
    /// an active session.
    pub fn run_file(&self, lua: &Lua, path: &Path) -> Result<Value> {
        let loader = self.loader.as_ref().ok_or(Error::NotStarted)?;
        loader.load_path(lua, path)
    }

    /// Rewrite instrumented positions in an error message back to
    /// original source positions.
    pub fn rewrite_error(&self, message: &str) -> String {
        self.data.borrow().rewrite_positions(message)
    }

    /// Generate every configured report format. One result per format;
    /// failures do not stop the remaining formats.
    pub fn write_reports(&self) -> Result<Vec<(ReportFormat, Result<PathBuf>)>> {
        if !self.started {
            return Err(Error::NotStarted);
        }
        let data = self.data.borrow();
        Ok(report::generate_reports(&data, &self.config.report))
    }

    /// Owned per-file summaries plus the global totals, for terminal
    /// output after the borrow ends.
    pub fn summaries(&self) -> Result<(Vec<(PathBuf, Summary)>, Summary)> {
        if !self.started {
            return Err(Error::NotStarted);
        }
        let data = self.data.borrow();
        let view: Aggregate<'_> = report::aggregate(&data);
        let files = view
            .files
            .iter()
            .map(|f| (f.record.file_path.clone(), f.summary))
            .collect();
        Ok((files, view.totals))
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.borrow().stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn enabled_config() -> CoverageConfig {
        CoverageConfig {
            enabled: true,
            ..CoverageConfig::default()
        }
    }

    #[test]
    fn start_and_stop_toggle_hooks() {
        let lua = Lua::new();
        let mut controller = CoverageController::new(enabled_config());
        assert!(!controller.is_active());
        controller.start(&lua).unwrap();
        assert!(controller.is_active());
        assert!(tracker::is_installed(&lua));
        controller.stop(&lua).unwrap();
        assert!(!controller.is_active());
        assert!(!tracker::is_installed(&lua));
    }

    #[test]
    fn stop_without_start_is_not_started() {
        let lua = Lua::new();
        let mut controller = CoverageController::new(enabled_config());
        assert!(matches!(controller.stop(&lua), Err(Error::NotStarted)));
    }

    #[test]
    fn data_before_start_is_not_started() {
        let controller = CoverageController::new(enabled_config());
        assert!(matches!(controller.data(), Err(Error::NotStarted)));
    }

    #[test]
    fn data_remains_available_after_stop() {
        let lua = Lua::new();
        let mut controller = CoverageController::new(enabled_config());
        controller.start(&lua).unwrap();
        controller.stop(&lua).unwrap();
        assert!(controller.data().is_ok());
    }

    #[test]
    fn invalid_config_fails_start() {
        let lua = Lua::new();
        let mut config = enabled_config();
        config.include = vec!["[".to_string()];
        let mut controller = CoverageController::new(config);
        assert!(matches!(
            controller.start(&lua),
            Err(Error::Configuration(_))
        ));
        assert!(!controller.is_active());
    }

    #[test]
    fn run_file_collects_coverage_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("script.lua");
        let mut f = std::fs::File::create(&script).unwrap();
        writeln!(f, "local x = 1").unwrap();
        writeln!(f, "return x + 1").unwrap();
        drop(f);

        let lua = Lua::new();
        let mut controller = CoverageController::new(enabled_config());
        controller.start(&lua).unwrap();
        let value = controller.run_file(&lua, &script).unwrap();
        assert!(matches!(value, Value::Integer(2)));
        controller.stop(&lua).unwrap();

        let (files, totals) = controller.summaries().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(totals.executable_lines, 2);
        assert_eq!(totals.executed_lines, 2);
    }

    #[test]
    fn reset_clears_collected_data() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("script.lua");
        std::fs::write(&script, "local x = 1\nreturn x\n").unwrap();

        let lua = Lua::new();
        let mut controller = CoverageController::new(enabled_config());
        controller.start(&lua).unwrap();
        controller.run_file(&lua, &script).unwrap();
        controller.reset();
        let (_, totals) = controller.summaries().unwrap();
        assert_eq!(totals.executed_lines, 0);
        assert_eq!(totals.executable_lines, 2, "registered files survive reset");
        controller.stop(&lua).unwrap();
    }
}
