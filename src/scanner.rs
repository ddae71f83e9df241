//! Directory walking and classification.
//!
//! The scanner walks a tree depth-first, in file-name order, and checks every
//! entry against a [`RuleSet`]. Files that match nothing are kept. Directories
//! only show up in the result when a directory rule matches them, and a
//! directory flagged for deletion or ignored is not descended into.

use crate::interrupt::Interrupt;
use crate::rules::{Action, EntryKind, EntryView, RuleSet};
use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, trace, warn};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

/// Options controlling the walk.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOptions {
    /// Maximum depth below the root; `Some(1)` only looks at direct children.
    pub max_depth: Option<usize>,
    /// Follow symbolic links. Off by default so the walk cannot leave the tree
    /// or loop forever.
    pub follow_symlinks: bool,
}

/// Fatal scan errors. Problems with individual entries are [`ScanWarning`]s.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("cannot scan {}: {source}", .path.display())]
    InvalidRoot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot scan {}: not a directory", .path.display())]
    NotADirectory { path: PathBuf },
}

/// An entry that could not be read during the walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanWarning {
    pub path: PathBuf,
    pub reason: String,
}

/// The rule that decided a candidate's fate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchedRule {
    /// Position in the rule set.
    pub index: usize,
    pub action: Action,
    pub description: String,
}

/// A discovered filesystem entry and its classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub path: PathBuf,
    /// Path relative to the scan root, `/`-separated.
    pub rel_path: String,
    pub kind: EntryKind,
    /// Size in bytes. For directories flagged for deletion, the size of
    /// everything below them.
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub rule: Option<MatchedRule>,
}

impl Candidate {
    pub fn action(&self) -> Option<Action> {
        self.rule.as_ref().map(|r| r.action)
    }

    pub fn is_flagged(&self) -> bool {
        self.action() == Some(Action::Delete)
    }

    /// Why the candidate was classified the way it was.
    pub fn reason(&self) -> String {
        match &self.rule {
            Some(rule) => format!("matched {} {}", rule.action.as_str(), rule.description),
            None => "no rule matched".to_string(),
        }
    }
}

/// One item produced by the walk.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    Candidate(Candidate),
    Failure(ScanWarning),
}

/// Classified entries of one scan, in walk order.
///
/// Every candidate in `to_delete` matched a rule whose action is
/// [`Action::Delete`]. Everything else that was examined is in `kept`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanResult {
    pub to_delete: Vec<Candidate>,
    pub kept: Vec<Candidate>,
    pub failures: Vec<ScanWarning>,
}

impl ScanResult {
    pub fn push(&mut self, event: ScanEvent) {
        match event {
            ScanEvent::Candidate(candidate) if candidate.is_flagged() => {
                self.to_delete.push(candidate);
            }
            ScanEvent::Candidate(candidate) => self.kept.push(candidate),
            ScanEvent::Failure(warning) => self.failures.push(warning),
        }
    }

    /// Kept candidates that matched a `warn` rule.
    pub fn warned(&self) -> impl Iterator<Item = &Candidate> {
        self.kept
            .iter()
            .filter(|c| c.action() == Some(Action::Warn))
    }

    /// Total size of everything flagged for deletion.
    pub fn reclaimable_bytes(&self) -> u64 {
        self.to_delete.iter().map(|c| c.size).sum()
    }
}

impl FromIterator<ScanEvent> for ScanResult {
    fn from_iter<I: IntoIterator<Item = ScanEvent>>(iter: I) -> Self {
        let mut result = ScanResult::default();
        for event in iter {
            result.push(event);
        }
        result
    }
}

/// Walks one directory tree against a rule set.
#[derive(Debug)]
pub struct Scanner<'a> {
    root: PathBuf,
    rules: &'a RuleSet,
    options: ScanOptions,
    interrupt: Option<Interrupt>,
}

impl<'a> Scanner<'a> {
    pub fn new(root: impl Into<PathBuf>, rules: &'a RuleSet, options: ScanOptions) -> Self {
        Self {
            root: root.into(),
            rules,
            options,
            interrupt: None,
        }
    }

    /// Stop yielding entries once `interrupt` is set.
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    /// Starts a fresh, lazy walk of the tree.
    ///
    /// # Errors
    ///
    /// Fails if the root cannot be read or is not a directory.
    pub fn walk(&self) -> Result<ScanIter<'_>, ScanError> {
        let metadata = fs::metadata(&self.root).map_err(|e| ScanError::InvalidRoot {
            path: self.root.clone(),
            source: e,
        })?;
        if !metadata.is_dir() {
            return Err(ScanError::NotADirectory {
                path: self.root.clone(),
            });
        }

        let mut walker = WalkDir::new(&self.root)
            .follow_links(self.options.follow_symlinks)
            .sort_by_file_name();
        if let Some(depth) = self.options.max_depth {
            walker = walker.max_depth(depth);
        }

        debug!(
            "scanning {} (max depth {:?}, follow symlinks: {})",
            self.root.display(),
            self.options.max_depth,
            self.options.follow_symlinks
        );

        Ok(ScanIter {
            inner: walker.into_iter(),
            root: &self.root,
            rules: self.rules,
            interrupt: self.interrupt.as_ref(),
            now: Utc::now(),
        })
    }

    /// Walks the whole tree and collects the result.
    pub fn scan(&self) -> Result<ScanResult, ScanError> {
        let result: ScanResult = self.walk()?.collect();
        debug!(
            "scan finished: {} flagged, {} kept, {} unreadable",
            result.to_delete.len(),
            result.kept.len(),
            result.failures.len()
        );
        Ok(result)
    }
}

/// Lazy iterator over the classified entries of one walk.
pub struct ScanIter<'a> {
    inner: walkdir::IntoIter,
    root: &'a Path,
    rules: &'a RuleSet,
    interrupt: Option<&'a Interrupt>,
    now: DateTime<Utc>,
}

impl Iterator for ScanIter<'_> {
    type Item = ScanEvent;

    fn next(&mut self) -> Option<ScanEvent> {
        loop {
            if self.interrupt.is_some_and(Interrupt::is_set) {
                debug!("scan interrupted");
                return None;
            }

            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    let warning = walk_warning(&err, self.root);
                    warn!("skipping {}: {}", warning.path.display(), warning.reason);
                    return Some(ScanEvent::Failure(warning));
                }
            };

            if entry.depth() == 0 {
                continue;
            }

            match self.classify(&entry) {
                Ok(Some(candidate)) => {
                    if candidate.kind == EntryKind::Dir
                        && matches!(candidate.action(), Some(Action::Delete | Action::Ignore))
                    {
                        self.inner.skip_current_dir();
                    }
                    return Some(ScanEvent::Candidate(candidate));
                }
                Ok(None) => continue,
                Err(warning) => {
                    warn!("skipping {}: {}", warning.path.display(), warning.reason);
                    return Some(ScanEvent::Failure(warning));
                }
            }
        }
    }
}

impl ScanIter<'_> {
    /// Classifies one entry. Returns `Ok(None)` for directories no rule
    /// targets.
    fn classify(&self, entry: &DirEntry) -> Result<Option<Candidate>, ScanWarning> {
        let path = entry.path();
        let file_type = entry.file_type();
        let kind = if file_type.is_dir() {
            EntryKind::Dir
        } else if file_type.is_symlink() {
            EntryKind::Symlink
        } else {
            EntryKind::File
        };

        let metadata = entry.metadata().map_err(|e| walk_warning(&e, self.root))?;
        let modified = metadata.modified().ok().map(DateTime::<Utc>::from);
        let age = modified.map(|m| (self.now - m).max(TimeDelta::zero()));

        let name = entry.file_name().to_string_lossy();
        let rel_path = relative_path(self.root, path);

        let mut view = EntryView {
            name: &name,
            rel_path: &rel_path,
            kind,
            size: if kind == EntryKind::Dir { 0 } else { metadata.len() },
            age,
        };

        if kind == EntryKind::Dir && self.needs_dir_size(&view) {
            view.size = dir_size(path);
        }

        let Some((index, rule)) = self.rules.first_match(&view) else {
            if kind == EntryKind::Dir {
                return Ok(None);
            }
            trace!("{}: no rule matched", rel_path);
            return Ok(Some(Candidate {
                path: path.to_path_buf(),
                rel_path: rel_path.clone(),
                kind,
                size: view.size,
                modified,
                rule: None,
            }));
        };

        trace!("{}: matched rule #{} ({})", rel_path, index + 1, rule);

        let size = if kind == EntryKind::Dir && rule.action == Action::Delete && view.size == 0 {
            dir_size(path)
        } else {
            view.size
        };

        Ok(Some(Candidate {
            path: path.to_path_buf(),
            rel_path: rel_path.clone(),
            kind,
            size,
            modified,
            rule: Some(MatchedRule {
                index,
                action: rule.action,
                description: rule.describe(),
            }),
        }))
    }

    /// Directory size thresholds are measured against the recursive size,
    /// which is only computed when a sized directory rule could match.
    fn needs_dir_size(&self, view: &EntryView<'_>) -> bool {
        self.rules.iter().any(|rule| {
            rule.min_size.is_some() && rule.target.admits(EntryKind::Dir) && rule.matcher.matches(view)
        })
    }
}

/// `path` relative to `root`, with `/` separators.
fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative.to_string_lossy().replace('\\', "/")
}

fn walk_warning(err: &walkdir::Error, root: &Path) -> ScanWarning {
    let path = err.path().unwrap_or(root).to_path_buf();
    let reason = if let Some(ancestor) = err.loop_ancestor() {
        format!("filesystem loop back to {}", ancestor.display())
    } else if let Some(io_err) = err.io_error() {
        match io_err.kind() {
            io::ErrorKind::PermissionDenied => "permission denied".to_string(),
            io::ErrorKind::NotFound => "vanished during scan".to_string(),
            _ => io_err.to_string(),
        }
    } else {
        err.to_string()
    };
    ScanWarning { path, reason }
}

/// Total size of the regular files below `path`. Unreadable entries count as
/// zero.
pub fn dir_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}
