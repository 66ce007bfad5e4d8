//! Module-load interception.
//!
//! A custom searcher is prepended to `package.searchers`. For every
//! `require`, it resolves the module to a file, applies the include /
//! exclude filter, and either hands back an instrumented loader or a
//! message string so the chain falls through to the stock searchers.
//! Parser failures are recoverable here: the file is skipped and the next
//! searcher reports the real syntax error from the original path.

use mlua::{Function, Lua, MultiValue, Table, Value};
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::core::errors::{Error, Result};
use crate::core::file_id_for;
use crate::instrument::{instrument, is_instrumented};
use crate::parser::{parse_with_options, ParseOptions};
use crate::runtime::cache::ModuleCache;
use crate::runtime::store::CoverageData;

/// Path prefixes probed before `package.path` templates.
const RESOLVE_PREFIXES: &[&str] = &["", "src/", "lib/"];
/// Extensions probed per prefix.
const RESOLVE_SUFFIXES: &[&str] = &[".lua", "/init.lua"];

/// Compiled include/exclude globs.
///
/// Matching uses literal separators, so `*` and `?` stop at `/` while
/// `**` crosses directories; all other metacharacters are literal.
#[derive(Clone, Debug)]
pub struct FileFilter {
    include: Vec<glob::Pattern>,
    exclude: Vec<glob::Pattern>,
}

impl FileFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            include: Self::compile(include)?,
            exclude: Self::compile(exclude)?,
        })
    }

    fn compile(globs: &[String]) -> Result<Vec<glob::Pattern>> {
        globs
            .iter()
            .map(|g| {
                glob::Pattern::new(g)
                    .map_err(|e| Error::Configuration(format!("invalid glob pattern '{g}': {e}")))
            })
            .collect()
    }

    /// Include is checked first (any match continues), then exclude (any
    /// match rejects).
    pub fn should_instrument(&self, path: &Path) -> bool {
        let text = path.to_string_lossy().replace('\\', "/");
        let options = glob::MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: false,
        };
        self.include.iter().any(|p| p.matches_with(&text, options))
            && !self.exclude.iter().any(|p| p.matches_with(&text, options))
    }
}

/// The installed loader hook.
pub struct LoaderHook {
    data: Rc<RefCell<CoverageData>>,
    cache: Rc<RefCell<ModuleCache>>,
    filter: Rc<FileFilter>,
    options: ParseOptions,
    searcher: Option<Function>,
}

impl LoaderHook {
    pub fn new(
        data: Rc<RefCell<CoverageData>>,
        cache: Rc<RefCell<ModuleCache>>,
        filter: FileFilter,
        options: ParseOptions,
    ) -> Self {
        Self {
            data,
            cache,
            filter: Rc::new(filter),
            options,
            searcher: None,
        }
    }

    /// Prepend our searcher to `package.searchers`.
    pub fn install(&mut self, lua: &Lua) -> Result<()> {
        if self.searcher.is_some() {
            return Ok(());
        }
        let data = self.data.clone();
        let cache = self.cache.clone();
        let filter = self.filter.clone();
        let options = self.options.clone();
        let searcher = lua.create_function(move |lua, name: String| {
            search(lua, &name, &data, &cache, &filter, &options)
        })?;

        let package: Table = lua.globals().get("package")?;
        let searchers: Table = package.get("searchers")?;
        searchers.raw_insert(1, searcher.clone())?;
        self.searcher = Some(searcher);
        Ok(())
    }

    /// Remove our searcher from the chain, by identity.
    pub fn uninstall(&mut self, lua: &Lua) -> Result<()> {
        let Some(searcher) = self.searcher.take() else {
            return Ok(());
        };
        let package: Table = lua.globals().get("package")?;
        let searchers: Table = package.get("searchers")?;
        let target = Value::Function(searcher);
        for i in 1..=searchers.raw_len() as i64 {
            let entry: Value = searchers.raw_get(i)?;
            if entry == target {
                searchers.raw_remove(i)?;
                break;
            }
        }
        Ok(())
    }

    pub fn is_installed(&self) -> bool {
        self.searcher.is_some()
    }

    pub fn should_instrument(&self, path: &Path) -> bool {
        self.filter.should_instrument(path)
    }

    /// Run a top-level entry file (the test script) through the same
    /// pipeline modules take. Files outside the filter run uninstrumented.
    pub fn load_path(&self, lua: &Lua, path: &Path) -> Result<Value> {
        let source = fs::read_to_string(path)
            .map_err(|e| Error::load(path, format!("failed to read source: {e}")))?;
        let canonical = canonicalize_lossy(path);
        let chunk_name = format!("@{}", canonical.display());

        if !self.filter.should_instrument(&canonical) || is_instrumented(&source) {
            let value = lua
                .load(&source)
                .set_name(chunk_name.as_str())
                .eval::<Value>()?;
            return Ok(value);
        }

        let file_id = file_id_for(&canonical);
        let chunk = match parse_with_options(&source, &canonical, &self.options) {
            Ok(chunk) => chunk,
            Err(e) if e.is_recoverable_parse_failure() => {
                log::debug!("covmap: {e}; running {} uninstrumented", canonical.display());
                let value = lua
                    .load(&source)
                    .set_name(chunk_name.as_str())
                    .eval::<Value>()?;
                return Ok(value);
            }
            Err(e) => return Err(e),
        };
        let instrumented = instrument(&chunk, &source, &file_id)?;
        self.data.borrow_mut().register_file(
            &file_id,
            canonical.clone(),
            source,
            instrumented.sourcemap,
            instrumented.executable_lines,
            chunk.comments,
            instrumented.functions,
        );
        let value = lua
            .load(&instrumented.source)
            .set_name(chunk_name.as_str())
            .eval::<Value>()?;
        Ok(value)
    }
}

fn canonicalize_lossy(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Resolve a module name to a file, probing fixed prefixes and
/// extensions before falling back to the host's `package.path` templates.
fn resolve_module(lua: &Lua, name: &str) -> Option<PathBuf> {
    let rel = name.replace('.', "/");
    for prefix in RESOLVE_PREFIXES {
        for suffix in RESOLVE_SUFFIXES {
            let candidate = PathBuf::from(format!("{prefix}{rel}{suffix}"));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }

    let package: Table = lua.globals().get("package").ok()?;
    let search_path: String = package.get("path").ok()?;
    for template in search_path.split(';') {
        if template.is_empty() {
            continue;
        }
        let candidate = PathBuf::from(template.replace('?', &rel));
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

fn not_found(lua: &Lua, message: String) -> mlua::Result<Value> {
    Ok(Value::String(lua.create_string(&message)?))
}

/// The searcher body: returns a loader function on success or a message
/// string so `require` consults the next searcher.
fn search(
    lua: &Lua,
    name: &str,
    data: &Rc<RefCell<CoverageData>>,
    cache: &Rc<RefCell<ModuleCache>>,
    filter: &FileFilter,
    options: &ParseOptions,
) -> mlua::Result<Value> {
    let Some(path) = resolve_module(lua, name) else {
        return not_found(lua, format!("\n\tcovmap: no file for module '{name}'"));
    };
    let path = canonicalize_lossy(&path);

    if !filter.should_instrument(&path) {
        log::debug!("covmap: {} excluded from instrumentation", path.display());
        return not_found(
            lua,
            format!(
                "\n\tcovmap: '{}' excluded from instrumentation",
                path.display()
            ),
        );
    }

    let file_id = file_id_for(&path);
    let cache_key = PathBuf::from(&file_id);
    if let Some(value) = cache.borrow_mut().get(&cache_key) {
        let loader = lua.create_function(move |_, _: MultiValue| Ok(value.clone()))?;
        return Ok(Value::Function(loader));
    }

    let source = match fs::read_to_string(&path) {
        Ok(source) => source,
        Err(e) => {
            return Err(mlua::Error::external(Error::load(
                &path,
                format!("failed to read source: {e}"),
            )));
        }
    };

    if is_instrumented(&source) {
        log::warn!(
            "covmap: {} is already instrumented, leaving it to the next loader",
            path.display()
        );
        return not_found(
            lua,
            format!("\n\tcovmap: '{}' already instrumented", path.display()),
        );
    }

    let chunk = match parse_with_options(&source, &path, options) {
        Ok(chunk) => chunk,
        Err(e) if e.is_recoverable_parse_failure() => {
            log::debug!("covmap: {e}; deferring to the next loader");
            return not_found(
                lua,
                format!("\n\tcovmap: could not instrument '{}': {e}", path.display()),
            );
        }
        Err(e) => return Err(mlua::Error::external(e)),
    };

    let instrumented = match instrument(&chunk, &source, &file_id) {
        Ok(instrumented) => instrumented,
        Err(e) => return Err(mlua::Error::external(e)),
    };

    data.borrow_mut().register_file(
        &file_id,
        path.clone(),
        source,
        instrumented.sourcemap,
        instrumented.executable_lines,
        chunk.comments,
        instrumented.functions,
    );

    // Compile and execute lazily, when `require` invokes the loader. The
    // chunk name keeps the original path so runtime errors point at it.
    let instrumented_source = instrumented.source;
    let chunk_name = format!("@{}", path.display());
    let cache = cache.clone();
    let loader = lua.create_function(move |lua, _: MultiValue| {
        let value = lua
            .load(&instrumented_source)
            .set_name(chunk_name.as_str())
            .eval::<Value>()?;
        cache.borrow_mut().add(&cache_key, value.clone());
        Ok(value)
    })?;
    Ok(Value::Function(loader))
}
