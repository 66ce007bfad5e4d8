//! covmap: instrumentation-based line coverage for Lua test suites.
//!
//! The engine parses Lua 5.3/5.4 source into a positioned AST, re-emits
//! it with tracking calls and a sourcemap, intercepts the host's module
//! loader so required files are instrumented on first load, correlates
//! passing assertions with the lines executed under them, and renders
//! HTML, JSON, LCOV, and Cobertura reports over a three-state
//! (covered / executed / not-covered) line model.

pub mod cli;
pub mod config;
pub mod controller;
pub mod core;
pub mod instrument;
pub mod parser;
pub mod report;
pub mod runtime;

// Re-export commonly used types
pub use crate::config::{CovmapConfig, CoverageConfig, ReportConfig};
pub use crate::controller::CoverageController;
pub use crate::core::{
    errors::{Error, Result},
    AssertionRecord, FileId, FileRecord, FunctionKind, FunctionRecord, LineKind, LineState,
};
pub use crate::instrument::{instrument, Instrumented, SourceMap};
pub use crate::parser::{parse, parse_with_options, ParseOptions};
pub use crate::report::{aggregate, generate_reports, Aggregate, ReportFormat, Summary};
pub use crate::runtime::{AssertionHook, CacheStats, CoverageData, FileFilter, LoaderHook, ModuleCache};
