use std::env;
use std::path::Path;
use std::process::ExitCode;

use chrono::{Local, NaiveDateTime};
use tracing::{error, info, warn};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod domain;
mod locator;
mod report;
mod table;
mod writer;

#[cfg(test)]
mod fixtures;

use domain::{ReportConfig, ReportError};
use report::{ReportSummary, build_report};

pub enum RunOutcome {
    /// No file with the input suffix in the directory.
    NoInput,
    Report(Result<ReportSummary, ReportError>),
}

fn main() -> ExitCode {
    init_tracing();

    let dir = match env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("Error: cannot access working directory: {e}");
            return ExitCode::FAILURE;
        }
    };
    let config = ReportConfig::default();

    match run(&dir, &config, Local::now().naive_local()) {
        Ok(RunOutcome::NoInput) => {
            println!("No {} file found in the directory.", config.input_suffix);
            ExitCode::SUCCESS
        }
        Ok(RunOutcome::Report(Ok(summary))) => {
            println!(
                "File processed successfully! Output saved to '{}'.",
                summary.output.display()
            );
            ExitCode::SUCCESS
        }
        Ok(RunOutcome::Report(Err(e))) => {
            println!("Error processing the file: {e}");
            ExitCode::FAILURE
        }
        // Listing the directory failed; nothing sensible can be done.
        Err(e) => {
            error!("Locating input failed: {e:?}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(ErrorLayer::default())
        .init();
}

/// One pass: pick the newest input in `dir` and write its report next to it.
///
/// Only a failure to list `dir` is returned as `Err`; everything that goes
/// wrong while building the report is part of the outcome.
pub fn run(
    dir: &Path,
    config: &ReportConfig,
    now: NaiveDateTime,
) -> Result<RunOutcome, ReportError> {
    let Some(input) = locator::locate_latest(dir, &config.input_suffix)? else {
        warn!("No file ending with {} in {}", config.input_suffix, dir.display());
        return Ok(RunOutcome::NoInput);
    };
    println!("Most recent file found: {}", input.display());

    let output = dir.join(config.output_file_name(now));
    let result = build_report(&input, &output, config);
    match &result {
        Ok(summary) => info!(
            "Report for {} rows across {} sheets",
            summary.input_rows,
            summary.sheets.len()
        ),
        Err(e) => warn!("Report failed: {e:?}"),
    }
    Ok(RunOutcome::Report(result))
}
