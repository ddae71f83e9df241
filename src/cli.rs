//! Command-line interface module for ghostcleaner.
//!
//! This module handles all CLI-related functionality including:
//! - Argument parsing
//! - Rule file resolution
//! - Driving one run: load rules, scan, execute, report
//! - Mapping failures to exit codes

use crate::config::{self, ConfigError, Settings};
use crate::executor::{EXIT_OK, EXIT_PARTIAL_FAILURE, EXIT_USAGE, Executor, RunMode};
use crate::interrupt::Interrupt;
use crate::output::{ConsoleReporter, OutputFormatter, format_size};
use crate::scanner::{ScanError, ScanOptions, Scanner};
use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use log::{LevelFilter, debug, warn};
use std::path::PathBuf;

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "ghostcleaner",
    version,
    about = "Ghostcleaner - remove temporary and leftover files by rule",
    long_about = "Ghostcleaner - remove temporary and leftover files by rule.\n\n\
        Walks PATH and deletes every file matched by a `delete` rule. Rules are \
        read from ~/.ghostcleanerrc (or --config) and evaluated top to bottom; \
        the first matching rule decides. Use --dry-run to preview."
)]
pub struct Args {
    /// Directory to clean
    #[arg(value_name = "PATH", default_value = ".")]
    pub path: PathBuf,

    /// Report what would be deleted, touch nothing
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Suppress per-file lines (the summary is still printed)
    #[arg(short, long)]
    pub quiet: bool,

    /// Rule file [default: ~/.ghostcleanerrc]
    #[arg(short, long, value_name = "FILE", conflicts_with = "no_config")]
    pub config: Option<PathBuf>,

    /// Ignore any rule file and use the built-in rules only
    #[arg(long)]
    pub no_config: bool,

    /// Limit scan depth (overrides the rule file)
    #[arg(short = 'd', long, value_name = "N")]
    pub max_depth: Option<usize>,

    /// Follow symbolic links (overrides the rule file)
    #[arg(short = 'L', long)]
    pub follow_symlinks: bool,

    /// Print the effective rule set and exit
    #[arg(long)]
    pub list_rules: bool,

    /// Print the report as JSON instead of text
    #[arg(long)]
    pub json: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Raise log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Log level selected by the `-v` count.
    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    /// The rule file to load, or `None` for the built-in rules only.
    pub fn config_path(&self) -> Option<PathBuf> {
        if self.no_config {
            return None;
        }
        match &self.config {
            Some(path) => {
                if !path.exists() {
                    warn!(
                        "config file {} not found, using built-in rules",
                        path.display()
                    );
                }
                Some(path.clone())
            }
            None => config::default_config_path(),
        }
    }

    /// Scan options from the rule file, with command-line overrides applied.
    pub fn scan_options(&self, settings: &Settings) -> ScanOptions {
        ScanOptions {
            max_depth: self.max_depth.or(settings.max_depth),
            follow_symlinks: self.follow_symlinks || settings.follow_symlinks,
        }
    }

    pub fn mode(&self) -> RunMode {
        if self.dry_run {
            RunMode::DryRun
        } else {
            RunMode::Apply
        }
    }
}

/// Runs one cleanup and returns the process exit code.
///
/// # Errors
///
/// Returns an error if the rule file is invalid or the root cannot be
/// scanned. Nothing is deleted in either case. Use [`exit_code_for`] to map
/// the error to an exit code.
///
/// # Examples
///
/// ```no_run
/// use clap::Parser;
/// use ghostcleaner::cli::{Args, run};
///
/// let args = Args::parse_from(["ghostcleaner", "--dry-run", "/path/to/project"]);
/// match run(&args) {
///     Ok(code) => println!("finished with exit code {}", code),
///     Err(e) => eprintln!("Error: {}", e),
/// }
/// ```
pub fn run(args: &Args) -> Result<i32> {
    if args.no_color || args.json {
        colored::control::set_override(false);
    }

    let config_path = args.config_path();
    let (rules, settings) = config::load_rules(config_path.as_deref())?;

    if args.list_rules {
        OutputFormatter::rule_list(&rules);
        return Ok(EXIT_OK);
    }

    let interrupt = Interrupt::install().unwrap_or_else(|e| {
        warn!("could not install signal handlers: {}", e);
        Interrupt::new()
    });

    let mode = args.mode();
    let options = args.scan_options(&settings);
    debug!("run mode {:?}, {:?}", mode, options);

    if !args.quiet && !args.json {
        let message = format!("Cleaning {}", args.path.display());
        match mode {
            RunMode::DryRun => OutputFormatter::dry_run_notice(&message),
            RunMode::Apply => OutputFormatter::info(&message),
        }
    }

    let scan = Scanner::new(&args.path, &rules, options)
        .with_interrupt(interrupt.clone())
        .scan()?;

    if !args.quiet && !args.json {
        OutputFormatter::plain(&format!(
            "Found {} ({} reclaimable)",
            match scan.to_delete.len() {
                1 => "1 ghost".to_string(),
                n => format!("{} ghosts", n),
            },
            format_size(scan.reclaimable_bytes())
        ));
    }

    let executor = Executor::new(mode).with_interrupt(interrupt);

    if args.json {
        let report = executor.execute(scan);
        OutputFormatter::json_report(&report).context("could not serialize report")?;
        return Ok(report.exit_code());
    }

    let mut reporter = ConsoleReporter::new(args.quiet);
    if mode == RunMode::Apply {
        reporter = reporter.with_progress(scan.to_delete.len());
    }
    let report = executor.execute_with(scan, &mut reporter);
    reporter.finish();

    OutputFormatter::summary_table(&report.summary(), report.is_dry_run());
    OutputFormatter::closing(&report);

    Ok(report.exit_code())
}

/// Exit code for an error returned by [`run`].
pub fn exit_code_for(error: &anyhow::Error) -> i32 {
    if error.downcast_ref::<ConfigError>().is_some() || error.downcast_ref::<ScanError>().is_some()
    {
        EXIT_USAGE
    } else {
        EXIT_PARTIAL_FAILURE
    }
}
