//! ghostcleaner - rule-driven removal of temporary and leftover files
//!
//! This library provides an ordered rule engine (glob, regex and extension
//! matchers with age and size thresholds), a directory scanner that
//! classifies every entry against the rules, and an executor that deletes
//! flagged entries or simulates doing so. Rules come from a TOML file,
//! `~/.ghostcleanerrc` by default, merged with a set of built-in defaults.

pub mod cli;
pub mod config;
pub mod executor;
pub mod interrupt;
pub mod output;
pub mod rules;
pub mod scanner;

pub use config::{ConfigError, GhostConfig, Settings, load_rules};
pub use executor::{ExecutionReport, Executor, Outcome, Reporter, RunMode, Summary};
pub use interrupt::Interrupt;
pub use rules::{Action, Matcher, Rule, RuleSet, Target};
pub use scanner::{Candidate, ScanError, ScanOptions, ScanResult, ScanWarning, Scanner};

pub use cli::{Args, run};
