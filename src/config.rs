//! Configuration for the coverage engine.
//!
//! Loaded from `covmap.toml` and merged with CLI overrides. The config is
//! a value passed explicitly to the controller at start time; subsystems
//! borrow read-only views of it.

use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::errors::{Error, Result};
use crate::parser::ParseOptions;
use crate::report::ReportFormat;
use crate::runtime::FileFilter;

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "covmap.toml";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CovmapConfig {
    #[serde(default)]
    pub coverage: CoverageConfig,
}

/// The `coverage.*` key space.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CoverageConfig {
    /// Master switch.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Globs for files that may be instrumented.
    #[serde(default = "default_include")]
    pub include: Vec<String>,

    /// Globs for files that must not be instrumented.
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,

    /// Keep per-line hit counts across `reset()`.
    #[serde(default)]
    pub preserve_execution_counts: bool,

    /// Wall-clock budget for parsing a single file, in seconds.
    #[serde(default = "default_parse_timeout_secs")]
    pub parse_timeout_secs: u64,

    #[serde(default)]
    pub report: ReportConfig,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            include: default_include(),
            exclude: default_exclude(),
            preserve_execution_counts: false,
            parse_timeout_secs: default_parse_timeout_secs(),
            report: ReportConfig::default(),
        }
    }
}

/// The `coverage.report.*` key space.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Output directory for generated reports.
    #[serde(default = "default_report_dir")]
    pub dir: PathBuf,

    /// Formats to generate; accepts a single name or a list.
    #[serde(default = "default_formats", deserialize_with = "one_or_many")]
    pub format: Vec<ReportFormat>,

    /// Title of the HTML report.
    #[serde(default = "default_title")]
    pub title: String,

    #[serde(default)]
    pub colors: ColorConfig,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            dir: default_report_dir(),
            format: default_formats(),
            title: default_title(),
            colors: ColorConfig::default(),
        }
    }
}

/// HTML palette for the three line states.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ColorConfig {
    #[serde(default = "default_covered_color")]
    pub covered: String,
    #[serde(default = "default_executed_color")]
    pub executed: String,
    #[serde(default = "default_not_covered_color")]
    pub not_covered: String,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            covered: default_covered_color(),
            executed: default_executed_color(),
            not_covered: default_not_covered_color(),
        }
    }
}

fn default_enabled() -> bool {
    false
}

fn default_include() -> Vec<String> {
    vec!["**/*.lua".to_string()]
}

fn default_exclude() -> Vec<String> {
    vec![
        "**/vendor/**".to_string(),
        "**/.luarocks/**".to_string(),
        "**/coverage-reports/**".to_string(),
    ]
}

fn default_parse_timeout_secs() -> u64 {
    10
}

fn default_report_dir() -> PathBuf {
    PathBuf::from("./coverage-reports")
}

fn default_formats() -> Vec<ReportFormat> {
    vec![ReportFormat::Html]
}

fn default_title() -> String {
    "Coverage Report".to_string()
}

fn default_covered_color() -> String {
    "#c8f7c5".to_string()
}

fn default_executed_color() -> String {
    "#ffe0a3".to_string()
}

fn default_not_covered_color() -> String {
    "#f7c5c5".to_string()
}

/// `coverage.report.format` accepts `"html"` as well as `["html", "json"]`.
fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<ReportFormat>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(ReportFormat),
        Many(Vec<ReportFormat>),
    }
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(format) => vec![format],
        OneOrMany::Many(formats) => formats,
    })
}

impl CovmapConfig {
    /// Parse a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        toml::from_str(&contents)
            .map_err(|e| Error::Configuration(format!("cannot parse {}: {e}", path.display())))
    }

    /// Load `covmap.toml` from `dir` when present, defaults otherwise.
    pub fn load_or_default(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE_NAME);
        if path.is_file() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }
}

impl CoverageConfig {
    /// Check globs and report settings; called by the controller before
    /// any hook is installed.
    pub fn validate(&self) -> Result<()> {
        self.file_filter()?;
        if self.report.format.is_empty() {
            return Err(Error::Configuration(
                "at least one report format is required".to_string(),
            ));
        }
        if self.report.dir.as_os_str().is_empty() {
            return Err(Error::Configuration(
                "report directory must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn file_filter(&self) -> Result<FileFilter> {
        FileFilter::new(&self.include, &self.exclude)
    }

    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            timeout: Duration::from_secs(self.parse_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = CovmapConfig::default();
        assert!(!config.coverage.enabled);
        assert_eq!(config.coverage.include, vec!["**/*.lua"]);
        assert!(config
            .coverage
            .exclude
            .iter()
            .any(|g| g.contains("vendor")));
        assert_eq!(config.coverage.report.dir, PathBuf::from("./coverage-reports"));
        assert_eq!(config.coverage.report.format, vec![ReportFormat::Html]);
    }

    #[test]
    fn parses_single_format_string() {
        let config: CovmapConfig = toml::from_str(
            r#"
            [coverage]
            enabled = true

            [coverage.report]
            format = "lcov"
            "#,
        )
        .unwrap();
        assert_eq!(config.coverage.report.format, vec![ReportFormat::Lcov]);
    }

    #[test]
    fn parses_format_list_and_colors() {
        let config: CovmapConfig = toml::from_str(
            r##"
            [coverage.report]
            format = ["html", "cobertura"]

            [coverage.report.colors]
            covered = "#00ff00"
            "##,
        )
        .unwrap();
        assert_eq!(
            config.coverage.report.format,
            vec![ReportFormat::Html, ReportFormat::Cobertura]
        );
        assert_eq!(config.coverage.report.colors.covered, "#00ff00");
        assert_eq!(
            config.coverage.report.colors.executed,
            default_executed_color()
        );
    }

    #[test]
    fn validate_rejects_bad_globs() {
        let mut config = CoverageConfig::default();
        config.include = vec!["[".to_string()];
        assert!(matches!(
            config.validate(),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn validate_rejects_empty_format_list() {
        let mut config = CoverageConfig::default();
        config.report.format.clear();
        assert!(config.validate().is_err());
    }
}
