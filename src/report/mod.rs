//! Report generation over the aggregated coverage view.
//!
//! Each generator renders to a string and is written atomically (temp
//! file, then rename) into the configured output directory. Formats are
//! attempted independently; one failure does not stop the others.

pub mod aggregate;
pub mod cobertura;
pub mod html;
pub mod json;
pub mod lcov;

pub use aggregate::{aggregate, classify_lines, Aggregate, FileEntry, Summary};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ReportConfig;
use crate::core::errors::{Error, Result};
use crate::runtime::CoverageData;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Self-contained three-state HTML document
    Html,
    /// Machine-readable JSON
    Json,
    /// LCOV tracefile
    Lcov,
    /// Cobertura XML
    Cobertura,
}

impl ReportFormat {
    pub fn file_name(self) -> &'static str {
        match self {
            ReportFormat::Html => "coverage.html",
            ReportFormat::Json => "coverage.json",
            ReportFormat::Lcov => "lcov.info",
            ReportFormat::Cobertura => "cobertura.xml",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReportFormat::Html => "html",
            ReportFormat::Json => "json",
            ReportFormat::Lcov => "lcov",
            ReportFormat::Cobertura => "cobertura",
        };
        f.write_str(name)
    }
}

/// Generate every configured format. Returns one result per format, in
/// configuration order.
pub fn generate_reports(
    data: &CoverageData,
    config: &ReportConfig,
) -> Vec<(ReportFormat, Result<PathBuf>)> {
    let view = aggregate(data);
    config
        .format
        .iter()
        .map(|&format| (format, generate_one(&view, format, config)))
        .collect()
}

fn generate_one(
    view: &Aggregate<'_>,
    format: ReportFormat,
    config: &ReportConfig,
) -> Result<PathBuf> {
    let contents = match format {
        ReportFormat::Html => html::render(view, config),
        ReportFormat::Json => json::render(view)?,
        ReportFormat::Lcov => lcov::render(view),
        ReportFormat::Cobertura => cobertura::render(view),
    };
    let path = config.dir.join(format.file_name());
    write_atomic(&path, &contents)
        .map_err(|e| Error::report(format.to_string(), e.to_string()))?;
    Ok(path)
}

/// Write via a sibling temp file and rename, creating the directory first.
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
