//! Acting on a scan result.
//!
//! In dry-run mode the executor only records what it would delete. In apply
//! mode it deletes each flagged candidate on its own; a failure is recorded
//! against that candidate and the run moves on to the next one.

use crate::interrupt::Interrupt;
use crate::rules::EntryKind;
use crate::scanner::{Candidate, ScanResult, ScanWarning};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use std::fs;
use std::io;

/// Exit code for a run that completed without failures.
pub const EXIT_OK: i32 = 0;
/// Exit code when a deletion failed or part of the tree was unreadable.
pub const EXIT_PARTIAL_FAILURE: i32 = 1;
/// Exit code for configuration or usage errors. Nothing was scanned.
pub const EXIT_USAGE: i32 = 2;
/// Exit code when the run was stopped by a signal.
pub const EXIT_INTERRUPTED: i32 = 130;

/// Whether the executor touches the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    DryRun,
    Apply,
}

/// What happened to one flagged candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Dry run: the candidate would have been deleted.
    WouldDelete,
    Deleted,
    /// Not attempted.
    Skipped { reason: String },
    Failed { reason: String },
}

/// A flagged candidate and its outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionEntry {
    pub candidate: Candidate,
    pub outcome: Outcome,
}

/// Receives per-candidate events while the executor runs.
pub trait Reporter {
    fn on_outcome(&mut self, _candidate: &Candidate, _outcome: &Outcome) {}

    fn on_warned(&mut self, _candidate: &Candidate) {}

    fn on_scan_failure(&mut self, _warning: &ScanWarning) {}
}

/// Reporter that discards every event.
#[derive(Debug, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {}

/// Aggregate counts of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub flagged: usize,
    pub deleted: usize,
    pub would_delete: usize,
    pub skipped: usize,
    pub failed: usize,
    pub warned: usize,
    pub kept: usize,
    pub scan_failures: usize,
    /// Bytes deleted, or that would be deleted in a dry run.
    pub bytes: u64,
}

/// Result of one execution.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub mode: RunMode,
    pub started_at: DateTime<Utc>,
    pub entries: Vec<ExecutionEntry>,
    pub warned: Vec<Candidate>,
    pub scan_failures: Vec<ScanWarning>,
    pub kept: usize,
    pub interrupted: bool,
}

impl ExecutionReport {
    pub fn is_dry_run(&self) -> bool {
        self.mode == RunMode::DryRun
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary {
            flagged: self.entries.len(),
            warned: self.warned.len(),
            kept: self.kept,
            scan_failures: self.scan_failures.len(),
            ..Summary::default()
        };
        for entry in &self.entries {
            match entry.outcome {
                Outcome::WouldDelete => {
                    summary.would_delete += 1;
                    summary.bytes += entry.candidate.size;
                }
                Outcome::Deleted => {
                    summary.deleted += 1;
                    summary.bytes += entry.candidate.size;
                }
                Outcome::Skipped { .. } => summary.skipped += 1,
                Outcome::Failed { .. } => summary.failed += 1,
            }
        }
        summary
    }

    /// Entries whose deletion failed.
    pub fn failures(&self) -> impl Iterator<Item = &ExecutionEntry> {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, Outcome::Failed { .. }))
    }

    /// Process exit code for this run.
    ///
    /// Non-zero when a deletion failed or the scan hit unreadable paths.
    /// Finding nothing to delete is a success.
    pub fn exit_code(&self) -> i32 {
        if self.interrupted {
            EXIT_INTERRUPTED
        } else if self.failures().next().is_some() || !self.scan_failures.is_empty() {
            EXIT_PARTIAL_FAILURE
        } else {
            EXIT_OK
        }
    }
}

/// Applies (or simulates) the deletions a scan asked for.
#[derive(Debug, Clone)]
pub struct Executor {
    mode: RunMode,
    interrupt: Option<Interrupt>,
}

impl Executor {
    pub fn new(mode: RunMode) -> Self {
        Self {
            mode,
            interrupt: None,
        }
    }

    /// Stop before the next deletion once `interrupt` is set.
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    /// Executes without reporting individual events.
    pub fn execute(&self, scan: ScanResult) -> ExecutionReport {
        self.execute_with(scan, &mut NullReporter)
    }

    /// Executes, pushing each event to `reporter` as it happens.
    ///
    /// Every flagged candidate ends up in the report exactly once.
    pub fn execute_with(&self, scan: ScanResult, reporter: &mut dyn Reporter) -> ExecutionReport {
        let started_at = Utc::now();

        for warning in &scan.failures {
            reporter.on_scan_failure(warning);
        }

        let warned: Vec<Candidate> = scan.warned().cloned().collect();
        for candidate in &warned {
            reporter.on_warned(candidate);
        }

        let mut interrupted = self.is_interrupted();
        let mut entries = Vec::with_capacity(scan.to_delete.len());

        for candidate in scan.to_delete {
            if !interrupted && self.is_interrupted() {
                warn!("interrupted, skipping remaining candidates");
                interrupted = true;
            }

            let outcome = if interrupted {
                Outcome::Skipped {
                    reason: "interrupted".to_string(),
                }
            } else {
                match self.mode {
                    RunMode::DryRun => Outcome::WouldDelete,
                    RunMode::Apply => match delete_candidate(&candidate) {
                        Ok(()) => {
                            info!("deleted {}", candidate.path.display());
                            Outcome::Deleted
                        }
                        Err(reason) => {
                            warn!("failed to delete {}: {}", candidate.path.display(), reason);
                            Outcome::Failed { reason }
                        }
                    },
                }
            };

            reporter.on_outcome(&candidate, &outcome);
            entries.push(ExecutionEntry { candidate, outcome });
        }

        let report = ExecutionReport {
            mode: self.mode,
            started_at,
            entries,
            warned,
            scan_failures: scan.failures,
            kept: scan.kept.len(),
            interrupted,
        };
        debug!("execution finished: {:?}", report.summary());
        report
    }

    fn is_interrupted(&self) -> bool {
        self.interrupt.as_ref().is_some_and(Interrupt::is_set)
    }
}

/// Deletes one candidate. Directories flagged by a directory rule are removed
/// with their contents; everything else is unlinked. A symlink is always
/// unlinked, even when the walk followed it to a directory.
fn delete_candidate(candidate: &Candidate) -> Result<(), String> {
    let metadata = fs::symlink_metadata(&candidate.path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => "no longer exists".to_string(),
        _ => describe_io_error(&e),
    })?;
    let file_type = metadata.file_type();

    let result = match candidate.kind {
        _ if file_type.is_symlink() => fs::remove_file(&candidate.path),
        EntryKind::Dir if file_type.is_dir() => fs::remove_dir_all(&candidate.path),
        EntryKind::Dir => return Err("no longer a directory".to_string()),
        EntryKind::File | EntryKind::Symlink => fs::remove_file(&candidate.path),
    };

    result.map_err(|e| describe_io_error(&e))
}

fn describe_io_error(err: &io::Error) -> String {
    match err.kind() {
        io::ErrorKind::PermissionDenied => "permission denied".to_string(),
        io::ErrorKind::NotFound => "no longer exists".to_string(),
        _ => err.to_string(),
    }
}
