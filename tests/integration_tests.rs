/// Integration tests for ghostcleaner
///
/// These tests simulate real-world usage scenarios, testing the complete
/// pipeline from rule file to deleted files.
///
/// Test categories:
/// 1. Basic cleanup workflows
/// 2. Dry-run mode verification
/// 3. Rule files and merging with the built-in rules
/// 4. Directory rules
/// 5. Failures, interruption and edge cases
use filetime::{FileTime, set_file_mtime};
use ghostcleaner::config::{self, ConfigError, GhostConfig};
use ghostcleaner::executor::{EXIT_INTERRUPTED, EXIT_OK, EXIT_PARTIAL_FAILURE, Outcome};
use ghostcleaner::rules::{Action, EntryKind};
use ghostcleaner::{ExecutionReport, Executor, Interrupt, RunMode, ScanOptions, Scanner};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

// ============================================================================
// Test Utilities
// ============================================================================

const DAY: u64 = 24 * 60 * 60;

/// A test fixture that sets up a temporary directory to clean and an
/// optional rule file next to it.
struct TestFixture {
    temp_dir: TempDir,
    config_dir: TempDir,
}

impl TestFixture {
    /// Create a new test fixture with a temporary directory.
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config_dir = TempDir::new().expect("Failed to create config directory");
        TestFixture {
            temp_dir,
            config_dir,
        }
    }

    /// Get the path to the directory being cleaned.
    fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Create a file with content, creating parent directories as needed.
    fn create_file(&self, name: &str, content: &[u8]) -> PathBuf {
        let file_path = self.path().join(name);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        let mut file = File::create(&file_path).expect("Failed to create file");
        file.write_all(content)
            .expect("Failed to write file content");
        file_path
    }

    /// Create a file whose modification time is `days` in the past.
    fn create_old_file(&self, name: &str, days: u64) -> PathBuf {
        let path = self.create_file(name, b"stale");
        self.backdate(name, days);
        path
    }

    /// Create a subdirectory in the test directory.
    fn create_subdir(&self, name: &str) {
        let dir_path = self.path().join(name);
        fs::create_dir_all(&dir_path).expect("Failed to create subdirectory");
    }

    fn backdate(&self, rel_path: &str, days: u64) {
        let when = SystemTime::now() - Duration::from_secs(days * DAY);
        set_file_mtime(self.path().join(rel_path), FileTime::from_system_time(when))
            .expect("Failed to set mtime");
    }

    /// Write a rule file and return its path.
    fn write_config(&self, content: &str) -> PathBuf {
        let path = self.config_dir.path().join(".ghostcleanerrc");
        fs::write(&path, content).expect("Failed to write config");
        path
    }

    /// Scan and execute with the rules from `config` (built-in rules if
    /// `None`).
    fn run(&self, config: Option<&Path>, mode: RunMode) -> ExecutionReport {
        let (rules, settings) = config::load_rules(config).expect("Failed to load rules");
        let options = ScanOptions {
            max_depth: settings.max_depth,
            follow_symlinks: settings.follow_symlinks,
        };
        let scan = Scanner::new(self.path(), &rules, options)
            .scan()
            .expect("Scan failed");
        Executor::new(mode).execute(scan)
    }

    fn assert_exists(&self, rel_path: &str) {
        let path = self.path().join(rel_path);
        assert!(path.exists(), "Should exist: {}", path.display());
    }

    fn assert_not_exists(&self, rel_path: &str) {
        let path = self.path().join(rel_path);
        assert!(!path.exists(), "Should not exist: {}", path.display());
    }
}

fn rel_paths(report: &ExecutionReport) -> Vec<&str> {
    report
        .entries
        .iter()
        .map(|e| e.candidate.rel_path.as_str())
        .collect()
}

// ============================================================================
// Test Suite 1: Basic Cleanup
// ============================================================================

#[test]
fn test_clean_empty_directory() {
    let fixture = TestFixture::new();

    let report = fixture.run(None, RunMode::Apply);

    assert!(report.entries.is_empty());
    let summary = report.summary();
    assert_eq!(summary.deleted, 0);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.kept, 0);
    assert_eq!(report.exit_code(), EXIT_OK);
}

#[test]
fn test_old_temp_file_is_deleted() {
    let fixture = TestFixture::new();
    fixture.create_old_file("foo.tmp", 10);

    let report = fixture.run(None, RunMode::Apply);

    assert_eq!(rel_paths(&report), vec!["foo.tmp"]);
    assert_eq!(report.entries[0].outcome, Outcome::Deleted);
    fixture.assert_not_exists("foo.tmp");
    assert_eq!(report.exit_code(), EXIT_OK);
}

#[test]
fn test_fresh_temp_file_is_kept() {
    let fixture = TestFixture::new();
    fixture.create_file("foo.tmp", b"fresh");

    let report = fixture.run(None, RunMode::Apply);

    assert!(report.entries.is_empty());
    assert_eq!(report.kept, 1);
    fixture.assert_exists("foo.tmp");
}

#[test]
fn test_unmatched_files_are_untouched() {
    let fixture = TestFixture::new();
    fixture.create_old_file("src/main.rs", 30);
    fixture.create_old_file("README.md", 30);
    fixture.create_old_file("src/lib.rs.orig", 30);

    let report = fixture.run(None, RunMode::Apply);

    assert_eq!(rel_paths(&report), vec!["src/lib.rs.orig"]);
    fixture.assert_exists("src/main.rs");
    fixture.assert_exists("README.md");
    fixture.assert_not_exists("src/lib.rs.orig");
}

#[test]
fn test_vcs_and_dependency_dirs_are_skipped() {
    let fixture = TestFixture::new();
    fixture.create_old_file(".git/objects/pack.tmp", 30);
    fixture.create_old_file("node_modules/pkg/index.orig", 30);
    fixture.create_old_file("stale.bak", 30);

    let report = fixture.run(None, RunMode::Apply);

    assert_eq!(rel_paths(&report), vec!["stale.bak"]);
    fixture.assert_exists(".git/objects/pack.tmp");
    fixture.assert_exists("node_modules/pkg/index.orig");
}

#[test]
fn test_warn_rule_leaves_file_in_place() {
    let fixture = TestFixture::new();
    fixture.create_file(".main.rs.swp", b"swap");

    let report = fixture.run(None, RunMode::Apply);

    assert!(report.entries.is_empty());
    assert_eq!(report.warned.len(), 1);
    assert_eq!(report.warned[0].rel_path, ".main.rs.swp");
    fixture.assert_exists(".main.rs.swp");
    assert_eq!(report.exit_code(), EXIT_OK);
}

// ============================================================================
// Test Suite 2: Dry-Run Mode
// ============================================================================

#[test]
fn test_dry_run_touches_nothing() {
    let fixture = TestFixture::new();
    fixture.create_old_file("foo.tmp", 10);
    fixture.create_file("notes.orig", b"conflict");

    let report = fixture.run(None, RunMode::DryRun);

    assert!(report.is_dry_run());
    assert_eq!(rel_paths(&report), vec!["foo.tmp", "notes.orig"]);
    assert!(
        report
            .entries
            .iter()
            .all(|e| e.outcome == Outcome::WouldDelete)
    );
    assert_eq!(report.summary().would_delete, 2);
    assert_eq!(report.summary().bytes, 5 + 8);
    fixture.assert_exists("foo.tmp");
    fixture.assert_exists("notes.orig");
}

#[test]
fn test_dry_run_is_idempotent() {
    let fixture = TestFixture::new();
    fixture.create_old_file("a.tmp", 10);
    fixture.create_old_file("nested/b.bak", 10);
    fixture.create_file("c.txt", b"keep");

    let first = fixture.run(None, RunMode::DryRun);
    let second = fixture.run(None, RunMode::DryRun);

    assert_eq!(first.entries, second.entries);
    assert_eq!(first.kept, second.kept);
}

#[test]
fn test_dry_run_matches_apply() {
    let fixture = TestFixture::new();
    fixture.create_old_file("a.tmp", 10);
    fixture.create_file("b.rej", b"hunk");
    fixture.create_file("keep.txt", b"keep");

    let planned: Vec<String> = rel_paths(&fixture.run(None, RunMode::DryRun))
        .into_iter()
        .map(String::from)
        .collect();
    let applied = fixture.run(None, RunMode::Apply);

    assert_eq!(rel_paths(&applied), planned);
    fixture.assert_not_exists("a.tmp");
    fixture.assert_not_exists("b.rej");
    fixture.assert_exists("keep.txt");
}

// ============================================================================
// Test Suite 3: Rule Files
// ============================================================================

#[test]
fn test_malformed_config_fails_before_scan() {
    let fixture = TestFixture::new();
    fixture.create_old_file("foo.tmp", 10);
    let config = fixture.write_config("[[rule]\nglob = \"*.tmp\"\n");

    let err = config::load_rules(Some(&config)).unwrap_err();

    assert!(matches!(err, ConfigError::Invalid { .. }));
    fixture.assert_exists("foo.tmp");
}

#[test]
fn test_invalid_threshold_is_rejected() {
    let fixture = TestFixture::new();
    let config = fixture.write_config(
        r#"
[[rule]]
glob = "*.tmp"
older_than = "a while"
action = "delete"
"#,
    );

    let err = config::load_rules(Some(&config)).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidAge { rule: 1, .. }));
}

#[test]
fn test_missing_config_uses_builtin_rules() {
    let fixture = TestFixture::new();
    fixture.create_old_file("foo.tmp", 10);
    let missing = fixture.config_dir.path().join("nope.toml");

    let report = fixture.run(Some(&missing), RunMode::Apply);

    assert_eq!(rel_paths(&report), vec!["foo.tmp"]);
}

#[test]
fn test_user_rule_overrides_default() {
    let fixture = TestFixture::new();
    fixture.create_old_file("foo.tmp", 10);
    let config = fixture.write_config(
        r#"
[[rule]]
glob = "*.tmp"
action = "ignore"
"#,
    );

    let report = fixture.run(Some(&config), RunMode::Apply);

    assert!(report.entries.is_empty());
    fixture.assert_exists("foo.tmp");
}

#[test]
fn test_user_rules_come_before_defaults() {
    let fixture = TestFixture::new();
    fixture.create_file("keep.orig", b"precious");
    fixture.create_file("junk.orig", b"junk");
    let config = fixture.write_config(
        r#"
[[rule]]
glob = "keep.orig"
action = "ignore"
"#,
    );

    let report = fixture.run(Some(&config), RunMode::Apply);

    assert_eq!(rel_paths(&report), vec!["junk.orig"]);
    fixture.assert_exists("keep.orig");
}

#[test]
fn test_duplicate_user_rule_last_value_wins() {
    let config = GhostConfig::parse(
        r#"
[settings]
use_defaults = false

[[rule]]
extension = "log"
action = "delete"

[[rule]]
glob = "*.cache"
action = "delete"

[[rule]]
extension = "LOG"
action = "warn"
"#,
        Path::new("test"),
    )
    .unwrap();

    let rules = config.into_rule_set().unwrap();

    assert_eq!(rules.len(), 2);
    let first = rules.get(0).unwrap();
    assert_eq!(first.matcher.source(), "log");
    assert_eq!(first.action, Action::Warn);
}

#[test]
fn test_use_defaults_false_disables_builtin_rules() {
    let fixture = TestFixture::new();
    fixture.create_old_file("foo.tmp", 10);
    fixture.create_file("build.cache", b"cache");
    let config = fixture.write_config(
        r#"
[settings]
use_defaults = false

[[rule]]
extension = "cache"
action = "delete"
"#,
    );

    let report = fixture.run(Some(&config), RunMode::Apply);

    assert_eq!(rel_paths(&report), vec!["build.cache"]);
    fixture.assert_exists("foo.tmp");
}

#[test]
fn test_regex_rule_on_path() {
    let fixture = TestFixture::new();
    fixture.create_file("logs/2024-01-01.txt", b"old log");
    fixture.create_file("docs/2024-01-01.txt", b"keep");
    let config = fixture.write_config(
        r#"
[[rule]]
regex = '^logs/\d{4}-\d{2}-\d{2}\.txt$'
match_path = true
action = "delete"
"#,
    );

    let report = fixture.run(Some(&config), RunMode::Apply);

    assert_eq!(rel_paths(&report), vec!["logs/2024-01-01.txt"]);
    fixture.assert_exists("docs/2024-01-01.txt");
}

#[test]
fn test_size_threshold() {
    let fixture = TestFixture::new();
    fixture.create_file("small.dump", &[0u8; 100]);
    fixture.create_file("large.dump", &[0u8; 4096]);
    let config = fixture.write_config(
        r#"
[[rule]]
extension = "dump"
larger_than = "2KB"
action = "delete"
"#,
    );

    let report = fixture.run(Some(&config), RunMode::Apply);

    assert_eq!(rel_paths(&report), vec!["large.dump"]);
    assert_eq!(report.summary().bytes, 4096);
    fixture.assert_exists("small.dump");
}

#[test]
fn test_max_depth_from_settings() {
    let fixture = TestFixture::new();
    fixture.create_file("top.orig", b"x");
    fixture.create_file("a/b/deep.orig", b"x");
    let config = fixture.write_config(
        r#"
[settings]
max_depth = 1
"#,
    );

    let report = fixture.run(Some(&config), RunMode::Apply);

    assert_eq!(rel_paths(&report), vec!["top.orig"]);
    fixture.assert_exists("a/b/deep.orig");
}

// ============================================================================
// Test Suite 4: Directory Rules
// ============================================================================

#[test]
fn test_directory_not_deleted_by_file_rule() {
    let fixture = TestFixture::new();
    fixture.create_file("cache.tmp/inner.txt", b"keep");
    fixture.backdate("cache.tmp", 10);

    let report = fixture.run(None, RunMode::Apply);

    assert!(report.entries.is_empty());
    fixture.assert_exists("cache.tmp/inner.txt");
}

#[test]
fn test_directory_rule_deletes_whole_tree() {
    let fixture = TestFixture::new();
    fixture.create_file("target/debug/app", &[0u8; 10]);
    fixture.create_file("target/debug/app.tmp", &[0u8; 20]);
    fixture.create_file("src/main.rs", b"fn main() {}");
    let config = fixture.write_config(
        r#"
[[rule]]
glob = "target"
target = "dir"
action = "delete"
"#,
    );

    let report = fixture.run(Some(&config), RunMode::Apply);

    assert_eq!(rel_paths(&report), vec!["target"]);
    assert_eq!(report.entries[0].candidate.kind, EntryKind::Dir);
    assert_eq!(report.entries[0].candidate.size, 30);
    assert_eq!(report.entries[0].outcome, Outcome::Deleted);
    fixture.assert_not_exists("target");
    fixture.assert_exists("src/main.rs");
}

#[test]
fn test_ignored_directory_is_not_descended() {
    let fixture = TestFixture::new();
    fixture.create_subdir("vendor");
    fixture.create_file("vendor/patch.orig", b"upstream");
    let config = fixture.write_config(
        r#"
[[rule]]
glob = "vendor"
target = "dir"
action = "ignore"
"#,
    );

    let report = fixture.run(Some(&config), RunMode::Apply);

    assert!(report.entries.is_empty());
    fixture.assert_exists("vendor/patch.orig");
}

#[cfg(unix)]
#[test]
fn test_unfollowed_symlink_delete_removes_link_only() {
    let fixture = TestFixture::new();
    let outside = TempDir::new().expect("Failed to create temp directory");
    let target = outside.path().join("real.txt");
    fs::write(&target, "precious").unwrap();
    std::os::unix::fs::symlink(&target, fixture.path().join("link.tmp")).unwrap();
    let config = fixture.write_config(
        r#"
[[rule]]
glob = "*.tmp"
action = "delete"
"#,
    );

    let report = fixture.run(Some(&config), RunMode::Apply);

    assert_eq!(rel_paths(&report), vec!["link.tmp"]);
    assert_eq!(report.entries[0].candidate.kind, EntryKind::Symlink);
    assert_eq!(report.entries[0].outcome, Outcome::Deleted);
    assert!(fs::symlink_metadata(fixture.path().join("link.tmp")).is_err());
    assert!(target.exists());
}

#[cfg(unix)]
#[test]
fn test_followed_directory_symlink_removes_link_only() {
    let fixture = TestFixture::new();
    let outside = TempDir::new().expect("Failed to create temp directory");
    fs::write(outside.path().join("data.txt"), "precious").unwrap();
    std::os::unix::fs::symlink(outside.path(), fixture.path().join("cache")).unwrap();
    let config = fixture.write_config(
        r#"
[settings]
follow_symlinks = true

[[rule]]
glob = "cache"
target = "dir"
action = "delete"
"#,
    );

    let report = fixture.run(Some(&config), RunMode::Apply);

    assert_eq!(rel_paths(&report), vec!["cache"]);
    assert_eq!(report.entries[0].outcome, Outcome::Deleted);
    assert!(fs::symlink_metadata(fixture.path().join("cache")).is_err());
    assert!(outside.path().join("data.txt").exists());
    assert_eq!(report.exit_code(), EXIT_OK);
}

// ============================================================================
// Test Suite 5: Failures and Edge Cases
// ============================================================================

#[cfg(unix)]
#[test]
fn test_permission_denied_is_reported_and_run_continues() {
    use std::os::unix::fs::PermissionsExt;

    let fixture = TestFixture::new();
    fixture.create_old_file("locked/locked.tmp", 10);
    fixture.create_old_file("other.tmp", 10);

    let locked_dir = fixture.path().join("locked");
    fs::set_permissions(&locked_dir, fs::Permissions::from_mode(0o555)).unwrap();

    // Privileged users can still write to the directory.
    if File::create(locked_dir.join("probe")).is_ok() {
        fs::set_permissions(&locked_dir, fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let report = fixture.run(None, RunMode::Apply);
    fs::set_permissions(&locked_dir, fs::Permissions::from_mode(0o755)).unwrap();

    let summary = report.summary();
    assert_eq!(summary.deleted, 1);
    assert_eq!(summary.failed, 1);

    let failure = report.failures().next().unwrap();
    assert_eq!(failure.candidate.rel_path, "locked/locked.tmp");
    assert!(matches!(failure.outcome, Outcome::Failed { .. }));
    assert_eq!(report.exit_code(), EXIT_PARTIAL_FAILURE);

    fixture.assert_exists("locked/locked.tmp");
    fixture.assert_not_exists("other.tmp");
}

#[test]
fn test_interrupt_before_execution_skips_everything() {
    let fixture = TestFixture::new();
    fixture.create_old_file("a.tmp", 10);
    fixture.create_old_file("b.tmp", 10);

    let (rules, _) = config::load_rules(None).unwrap();
    let scan = Scanner::new(fixture.path(), &rules, ScanOptions::default())
        .scan()
        .unwrap();
    let interrupt = Interrupt::new();
    interrupt.trigger();

    let report = Executor::new(RunMode::Apply)
        .with_interrupt(interrupt)
        .execute(scan);

    assert!(report.interrupted);
    assert_eq!(report.entries.len(), 2);
    assert!(
        report
            .entries
            .iter()
            .all(|e| matches!(e.outcome, Outcome::Skipped { .. }))
    );
    assert_eq!(report.exit_code(), EXIT_INTERRUPTED);
    fixture.assert_exists("a.tmp");
    fixture.assert_exists("b.tmp");
}

#[test]
fn test_file_vanished_before_deletion() {
    let fixture = TestFixture::new();
    let path = fixture.create_old_file("gone.tmp", 10);

    let (rules, _) = config::load_rules(None).unwrap();
    let scan = Scanner::new(fixture.path(), &rules, ScanOptions::default())
        .scan()
        .unwrap();
    fs::remove_file(&path).unwrap();

    let report = Executor::new(RunMode::Apply).execute(scan);

    assert_eq!(
        report.entries[0].outcome,
        Outcome::Failed {
            reason: "no longer exists".to_string()
        }
    );
    assert_eq!(report.exit_code(), EXIT_PARTIAL_FAILURE);
}

#[test]
fn test_special_characters_in_filenames() {
    let fixture = TestFixture::new();
    fixture.create_file("my file (copy).orig", b"x");
    fixture.create_file("résumé.rej", b"x");

    let report = fixture.run(None, RunMode::Apply);

    assert_eq!(report.summary().deleted, 2);
    fixture.assert_not_exists("my file (copy).orig");
    fixture.assert_not_exists("résumé.rej");
}

#[test]
fn test_report_serializes_to_json() {
    let fixture = TestFixture::new();
    fixture.create_file("x.orig", b"x");

    let report = fixture.run(None, RunMode::DryRun);
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["mode"], "dry_run");
    assert_eq!(json["entries"][0]["candidate"]["rel_path"], "x.orig");
    assert_eq!(json["entries"][0]["outcome"]["status"], "would_delete");
}

#[test]
fn test_example_rule_file_is_valid() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("example.ghostcleanerrc");

    let (rules, settings) = config::load_rules(Some(&path)).expect("example should load");

    assert!(settings.use_defaults);
    let bak = rules
        .iter()
        .filter(|r| r.matcher.source() == "*.bak")
        .collect::<Vec<_>>();
    assert_eq!(bak.len(), 1);
    assert_eq!(bak[0].describe(), "*.bak older than 30d");
}
