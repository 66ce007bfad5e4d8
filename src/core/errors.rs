//! Shared error types for the coverage engine

use std::path::PathBuf;
use thiserror::Error;

/// Maximum source size the parser accepts, in bytes.
pub const MAX_SOURCE_BYTES: usize = 1024 * 1024;

/// Main error type for covmap operations
#[derive(Debug, Error)]
pub enum Error {
    /// Bad include/exclude pattern, report directory, or option value
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Input exceeds the parser's size cap
    #[error("Source too large: {file} is {size} bytes (limit {limit})")]
    SourceTooLarge {
        file: PathBuf,
        size: usize,
        limit: usize,
    },

    /// Parser wall-clock budget exhausted
    #[error("Parse timeout in {file} after {elapsed_ms} ms")]
    ParseTimeout { file: PathBuf, elapsed_ms: u64 },

    /// Syntax or semantic error from the Lua parser
    #[error("Parse error in {file}:{line}:{column}: {message}")]
    Parse {
        file: PathBuf,
        line: u32,
        column: u32,
        message: String,
    },

    /// Transformer invariant violation; fatal for the file only
    #[error("Instrumentation error in {file}: {message}")]
    Instrumentation { file: PathBuf, message: String },

    /// Read, compile, or execute failure while loading a module
    #[error("Load error for {file}: {message}")]
    Load { file: PathBuf, message: String },

    /// API call while the controller is inactive
    #[error("Coverage has not been started")]
    NotStarted,

    /// I/O failure or data inconsistency while generating a report
    #[error("Report error ({format}): {message}")]
    Report { format: String, message: String },

    /// Internal failure inside the assertion hook; never alters test outcomes
    #[error("Assertion hook error: {0}")]
    AssertionHook(String),

    /// IO errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Glob pattern errors
    #[error(transparent)]
    Pattern(#[from] glob::PatternError),

    /// Errors surfaced by the embedded Lua runtime
    #[error(transparent)]
    Lua(#[from] mlua::Error),
}

impl Error {
    /// Create a parse error with location
    pub fn parse(
        file: impl Into<PathBuf>,
        line: u32,
        column: u32,
        message: impl Into<String>,
    ) -> Self {
        Self::Parse {
            file: file.into(),
            line,
            column,
            message: message.into(),
        }
    }

    /// Create an instrumentation error for a file
    pub fn instrumentation(file: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Instrumentation {
            file: file.into(),
            message: message.into(),
        }
    }

    /// Create a load error for a file
    pub fn load(file: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Load {
            file: file.into(),
            message: message.into(),
        }
    }

    /// Create a report error for a format
    pub fn report(format: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Report {
            format: format.into(),
            message: message.into(),
        }
    }

    /// True for parser failures the loader recovers from by falling
    /// through to the next searcher.
    pub fn is_recoverable_parse_failure(&self) -> bool {
        matches!(
            self,
            Self::SourceTooLarge { .. } | Self::ParseTimeout { .. } | Self::Parse { .. }
        )
    }
}

/// Result type alias using our error type
pub type Result<T> = std::result::Result<T, Error>;
