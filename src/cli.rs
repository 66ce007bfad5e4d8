//! CLI argument definitions and config merging.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::CovmapConfig;
use crate::report::ReportFormat;

#[derive(Parser, Debug)]
#[command(name = "covmap")]
#[command(about = "Instrumentation-based line coverage for Lua test suites", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a Lua entry script under coverage and generate reports
    Run {
        /// Entry script (a test file or suite runner)
        script: PathBuf,

        /// Enable coverage collection, overriding the config file
        #[arg(long)]
        coverage: bool,

        /// Report formats to generate
        #[arg(long, value_enum, value_delimiter = ',')]
        format: Option<Vec<ReportFormat>>,

        /// Output directory for reports
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Glob for files that may be instrumented (repeatable, overrides config)
        #[arg(long = "include")]
        include: Vec<String>,

        /// Glob for files that must not be instrumented (repeatable, overrides config)
        #[arg(long = "exclude")]
        exclude: Vec<String>,

        /// Configuration file (defaults to ./covmap.toml when present)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Title of the HTML report
        #[arg(long)]
        title: Option<String>,
    },
}

/// Merge CLI flags over the loaded configuration. Repeatable glob flags
/// replace the config lists entirely.
#[allow(clippy::too_many_arguments)]
pub fn apply_overrides(
    config: &mut CovmapConfig,
    coverage: bool,
    format: Option<Vec<ReportFormat>>,
    output: Option<PathBuf>,
    include: &[String],
    exclude: &[String],
    title: Option<String>,
) {
    if coverage {
        config.coverage.enabled = true;
    }
    if let Some(formats) = format {
        config.coverage.report.format = formats;
    }
    if let Some(dir) = output {
        config.coverage.report.dir = dir;
    }
    if !include.is_empty() {
        config.coverage.include = include.to_vec();
    }
    if !exclude.is_empty() {
        config.coverage.exclude = exclude.to_vec();
    }
    if let Some(title) = title {
        config.coverage.report.title = title;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run_with_formats() {
        let cli = Cli::parse_from([
            "covmap",
            "run",
            "tests/all.lua",
            "--coverage",
            "--format",
            "html,lcov",
            "--output",
            "out",
            "--include",
            "src/**/*.lua",
            "--include",
            "lib/**/*.lua",
        ]);
        let Commands::Run {
            script,
            coverage,
            format,
            output,
            include,
            ..
        } = cli.command;
        assert_eq!(script, PathBuf::from("tests/all.lua"));
        assert!(coverage);
        assert_eq!(
            format,
            Some(vec![ReportFormat::Html, ReportFormat::Lcov])
        );
        assert_eq!(output, Some(PathBuf::from("out")));
        assert_eq!(include.len(), 2);
    }

    #[test]
    fn overrides_replace_config_lists() {
        let mut config = CovmapConfig::default();
        apply_overrides(
            &mut config,
            true,
            Some(vec![ReportFormat::Json]),
            Some(PathBuf::from("reports")),
            &["only/*.lua".to_string()],
            &[],
            Some("Suite".to_string()),
        );
        assert!(config.coverage.enabled);
        assert_eq!(config.coverage.report.format, vec![ReportFormat::Json]);
        assert_eq!(config.coverage.report.dir, PathBuf::from("reports"));
        assert_eq!(config.coverage.include, vec!["only/*.lua"]);
        assert!(
            !config.coverage.exclude.is_empty(),
            "untouched lists keep their defaults"
        );
        assert_eq!(config.coverage.report.title, "Suite");
    }
}
