//! covmap CLI entry point.
//!
//! Parses arguments, loads configuration, runs the entry script under
//! coverage, prints a colored summary, and writes the requested reports.
//! Exit code is 0 only when the script and every report succeed.

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use covmap::cli::{apply_overrides, Cli, Commands};
use covmap::config::CovmapConfig;
use covmap::controller::CoverageController;
use covmap::report::Summary;
use mlua::Lua;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match dispatch(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {e:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn dispatch(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Run {
            script,
            coverage,
            format,
            output,
            include,
            exclude,
            config,
            title,
        } => {
            let mut loaded = load_config(config.as_deref())?;
            apply_overrides(
                &mut loaded,
                coverage,
                format,
                output,
                &include,
                &exclude,
                title,
            );
            handle_run(&script, loaded)
        }
    }
}

fn load_config(explicit: Option<&Path>) -> Result<CovmapConfig> {
    let config = match explicit {
        Some(path) => CovmapConfig::load(path)?,
        None => CovmapConfig::load_or_default(Path::new("."))?,
    };
    Ok(config)
}

fn handle_run(script: &Path, config: CovmapConfig) -> Result<ExitCode> {
    let lua = Lua::new();

    if !config.coverage.enabled {
        return run_plain(&lua, script);
    }

    let mut controller = CoverageController::new(config.coverage);
    controller.start(&lua)?;

    let script_ok = match controller.run_file(&lua, script) {
        Ok(_) => true,
        Err(e) => {
            let message = controller.rewrite_error(&e.to_string());
            eprintln!("{} {message}", "script failed:".red().bold());
            false
        }
    };

    controller.stop(&lua)?;

    let (files, totals) = controller.summaries()?;
    print_summary(&files, &totals);
    log::debug!("covmap: module cache {:?}", controller.cache_stats());

    let mut reports_ok = true;
    for (format, result) in controller.write_reports()? {
        match result {
            Ok(path) => println!("{} {} -> {}", "report:".bold(), format, path.display()),
            Err(e) => {
                reports_ok = false;
                eprintln!("{} {format}: {e}", "report failed:".red().bold());
            }
        }
    }

    if script_ok && reports_ok {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn run_plain(lua: &Lua, script: &Path) -> Result<ExitCode> {
    let source = std::fs::read_to_string(script)?;
    let chunk_name = format!("@{}", script.display());
    match lua.load(&source).set_name(chunk_name.as_str()).exec() {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            eprintln!("{} {e}", "script failed:".red().bold());
            Ok(ExitCode::FAILURE)
        }
    }
}

fn colorize_percent(percent: f64) -> colored::ColoredString {
    let text = format!("{percent:.1}%");
    if percent >= 80.0 {
        text.green()
    } else if percent >= 50.0 {
        text.yellow()
    } else {
        text.red()
    }
}

fn print_summary(files: &[(PathBuf, Summary)], totals: &Summary) {
    println!(
        "{} {} lines covered ({} covered / {} executed / {} executable)",
        "coverage:".bold(),
        colorize_percent(totals.coverage_percent),
        totals.covered_lines,
        totals.executed_lines,
        totals.executable_lines,
    );
    for (path, summary) in files {
        println!(
            "  {:>7}  {}  ({}/{})",
            colorize_percent(summary.coverage_percent).to_string(),
            path.display(),
            summary.covered_lines,
            summary.executable_lines,
        );
    }
}
