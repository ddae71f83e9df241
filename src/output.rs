//! Output formatting and styling module.
//!
//! Provides a centralized interface for all CLI output: colored status lines,
//! the per-file reporter used while executing, the summary table and the JSON
//! report. Nothing else in the crate prints to the console.

use crate::executor::{ExecutionReport, Outcome, Reporter, Summary};
use crate::rules::{Action, EntryKind, RuleOrigin, RuleSet};
use crate::scanner::{Candidate, ScanWarning};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};

/// Manages all CLI output with consistent styling and formatting.
///
/// This struct provides methods for:
/// - Success messages (green with ✓)
/// - Error messages (red with ✗)
/// - Warning messages (yellow with ⚠)
/// - Info messages (cyan)
/// - Progress bars for deletions
/// - The run summary table
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use ghostcleaner::output::OutputFormatter;
    /// OutputFormatter::success("Deleted build/foo.tmp");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark, to stderr.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use ghostcleaner::output::OutputFormatter;
    /// OutputFormatter::error("Failed to delete locked.tmp: permission denied");
    /// ```
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning message in yellow with a warning symbol.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    /// Prints an info message in cyan.
    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    /// Prints a regular message without styling.
    pub fn plain(message: &str) {
        println!("{}", message);
    }

    /// Prints a section header.
    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Prints a dry-run notice message.
    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }

    /// Creates and returns a progress bar for deletions.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use ghostcleaner::output::OutputFormatter;
    /// let pb = OutputFormatter::create_progress_bar(100);
    /// pb.inc(1);
    /// pb.finish_and_clear();
    /// ```
    pub fn create_progress_bar(total: u64) -> ProgressBar {
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .expect("Invalid progress bar template")
                .progress_chars("█▓░"),
        );
        pb
    }

    /// Prints the summary table for a finished run.
    ///
    /// Always printed, including in quiet mode.
    pub fn summary_table(summary: &Summary, dry_run: bool) {
        Self::header(if dry_run { "DRY RUN SUMMARY" } else { "SUMMARY" });

        let mut rows: Vec<(&str, String)> = Vec::new();
        if dry_run {
            rows.push((
                "Would delete",
                format!(
                    "{} ({})",
                    count_files(summary.would_delete),
                    format_size(summary.bytes)
                )
                .green()
                .to_string(),
            ));
        } else {
            rows.push((
                "Deleted",
                format!(
                    "{} ({})",
                    count_files(summary.deleted),
                    format_size(summary.bytes)
                )
                .green()
                .to_string(),
            ));
            rows.push(("Failed", highlight_nonzero(summary.failed)));
        }
        if summary.skipped > 0 {
            rows.push(("Skipped", count_files(summary.skipped).yellow().to_string()));
        }
        rows.push(("Warnings", count_files(summary.warned)));
        rows.push(("Kept", count_files(summary.kept)));
        if summary.scan_failures > 0 {
            rows.push(("Unreadable", highlight_nonzero(summary.scan_failures)));
        }

        let width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
        println!("{}", "-".repeat(width + 24));
        for (label, value) in &rows {
            println!("{:<width$} | {}", label, value, width = width);
        }
        println!("{}", "-".repeat(width + 24));
    }

    /// Prints the closing line(s) after the summary.
    pub fn closing(report: &ExecutionReport) {
        let summary = report.summary();
        if report.interrupted {
            Self::warning("Interrupted. Remaining files were left untouched.");
        } else if report.is_dry_run() {
            Self::success("Dry run complete. No files were modified.");
            if summary.would_delete > 0 {
                Self::plain("Run again without --dry-run to delete these files.");
            }
        } else if summary.failed > 0 {
            Self::error("Some files could not be deleted. Please review errors above.");
        } else if summary.deleted == 0 {
            Self::success("No ghosts found.");
        } else {
            Self::success("Ghosts busted.");
        }
    }

    /// Prints the report as pretty JSON.
    pub fn json_report(report: &ExecutionReport) -> serde_json::Result<()> {
        #[derive(serde::Serialize)]
        struct JsonReport<'a> {
            summary: Summary,
            exit_code: i32,
            #[serde(flatten)]
            report: &'a ExecutionReport,
        }

        let json = serde_json::to_string_pretty(&JsonReport {
            summary: report.summary(),
            exit_code: report.exit_code(),
            report,
        })?;
        println!("{}", json);
        Ok(())
    }

    /// Prints the effective rule set in evaluation order.
    pub fn rule_list(rules: &RuleSet) {
        Self::header("RULES (first match wins)");
        if rules.is_empty() {
            Self::plain("  (none)");
            return;
        }
        for (i, rule) in rules.iter().enumerate() {
            let action = match rule.action {
                Action::Delete => "delete".red(),
                Action::Warn => "warn".yellow(),
                Action::Ignore => "ignore".dimmed(),
            };
            let origin = match rule.origin {
                RuleOrigin::User => "",
                RuleOrigin::Default => " (built-in)",
            };
            println!(
                "{:>3}. {:<6} {}{}",
                i + 1,
                action,
                rule.describe(),
                origin.dimmed()
            );
        }
    }
}

/// Prints per-file lines as the executor runs.
///
/// In quiet mode nothing is printed per file, but paths that could not be
/// scanned are still reported. The summary is printed separately by the
/// caller.
pub struct ConsoleReporter {
    quiet: bool,
    progress: Option<ProgressBar>,
}

impl ConsoleReporter {
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            progress: None,
        }
    }

    /// Shows a progress bar over `total` deletions.
    pub fn with_progress(mut self, total: usize) -> Self {
        if !self.quiet && total > 0 {
            self.progress = Some(OutputFormatter::create_progress_bar(total as u64));
        }
        self
    }

    pub fn finish(&mut self) {
        if let Some(pb) = self.progress.take() {
            pb.finish_and_clear();
        }
    }

    fn print(&self, f: impl FnOnce()) {
        if !self.quiet {
            self.print_always(f);
        }
    }

    fn print_always(&self, f: impl FnOnce()) {
        match &self.progress {
            Some(pb) => pb.suspend(f),
            None => f(),
        }
    }
}

impl Reporter for ConsoleReporter {
    fn on_outcome(&mut self, candidate: &Candidate, outcome: &Outcome) {
        let label = display_name(candidate);
        self.print(|| match outcome {
            Outcome::WouldDelete => OutputFormatter::dry_run_notice(&format!(
                "Would delete {} ({})",
                label,
                candidate.reason()
            )),
            Outcome::Deleted => OutputFormatter::success(&format!("Deleted {}", label)),
            Outcome::Skipped { reason } => {
                OutputFormatter::warning(&format!("Skipped {}: {}", label, reason))
            }
            Outcome::Failed { reason } => {
                OutputFormatter::error(&format!("Failed to delete {}: {}", label, reason))
            }
        });
        if let Some(pb) = &self.progress {
            pb.inc(1);
        }
    }

    fn on_warned(&mut self, candidate: &Candidate) {
        let label = display_name(candidate);
        self.print(|| {
            OutputFormatter::warning(&format!("Left in place {} ({})", label, candidate.reason()))
        });
    }

    /// Printed in quiet mode too.
    fn on_scan_failure(&mut self, warning: &ScanWarning) {
        self.print_always(|| {
            OutputFormatter::warning(&format!(
                "Could not scan {}: {}",
                warning.path.display(),
                warning.reason
            ))
        });
    }
}

fn display_name(candidate: &Candidate) -> String {
    if candidate.kind == EntryKind::Dir {
        format!("{}/", candidate.rel_path)
    } else {
        candidate.rel_path.clone()
    }
}

fn highlight_nonzero(count: usize) -> String {
    if count > 0 {
        count_files(count).red().to_string()
    } else {
        count_files(count)
    }
}

fn count_files(count: usize) -> String {
    format!("{} {}", count, if count == 1 { "file" } else { "files" })
}

/// Format byte count as human-readable string.
pub fn format_size(bytes: u64) -> String {
    if bytes >= 1_073_741_824 {
        format!("{:.2} GB", bytes as f64 / 1_073_741_824.0)
    } else if bytes >= 1_048_576 {
        format!("{:.2} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1_024 {
        format!("{:.2} KB", bytes as f64 / 1_024.0)
    } else {
        format!("{} B", bytes)
    }
}
