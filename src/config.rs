//! Rule file loading and compilation.
//!
//! Rules live in a TOML file, `~/.ghostcleanerrc` by default. Each `[[rule]]`
//! table names exactly one matcher (`glob`, `regex` or `extension`), optional
//! thresholds and an action. Loaded rules are merged with the built-in
//! defaults into a [`RuleSet`].
//!
//! # Configuration File Format
//!
//! ```toml
//! [settings]
//! use_defaults = true
//! max_depth = 32
//! follow_symlinks = false
//!
//! [[rule]]
//! glob = "*.tmp"
//! older_than = "7d"
//! action = "delete"
//!
//! [[rule]]
//! regex = '^core\.\d+$'
//! larger_than = "10MB"
//! action = "warn"
//!
//! [[rule]]
//! glob = "target"
//! target = "dir"
//! action = "ignore"
//! ```

use crate::rules::{Action, Matcher, Rule, RuleOrigin, RuleSet, Target};
use chrono::TimeDelta;
use log::{debug, info, warn};
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the per-user rule file in the home directory.
pub const CONFIG_FILE_NAME: &str = ".ghostcleanerrc";

/// Rules that apply unless `use_defaults = false`.
const BUILTIN_RULES: &str = r#"
[[rule]]
glob = ".git"
target = "dir"
action = "ignore"

[[rule]]
glob = "node_modules"
target = "dir"
action = "ignore"

[[rule]]
glob = "*.tmp"
older_than = "7d"
action = "delete"

[[rule]]
glob = "*.temp"
older_than = "7d"
action = "delete"

[[rule]]
glob = "*.bak"
older_than = "7d"
action = "delete"

[[rule]]
glob = "*~"
older_than = "1d"
action = "delete"

[[rule]]
glob = "*.orig"
action = "delete"

[[rule]]
glob = "*.rej"
action = "delete"

[[rule]]
glob = ".DS_Store"
action = "delete"

[[rule]]
glob = "Thumbs.db"
action = "delete"

[[rule]]
glob = "*.swp"
action = "warn"

[[rule]]
glob = "*.swo"
action = "warn"

[[rule]]
glob = "*.log"
larger_than = "10MB"
action = "warn"
"#;

/// Errors raised while loading or compiling a rule file.
///
/// Any of these aborts the run before the filesystem is scanned.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config file {}: {message}", .path.display())]
    Invalid { path: PathBuf, message: String },
    #[error("rule #{rule}: expected exactly one of `glob`, `regex` or `extension`")]
    AmbiguousMatcher { rule: usize },
    #[error("rule #{rule}: `match_path` only applies to `regex` rules")]
    MatchPathWithoutRegex { rule: usize },
    #[error("rule #{rule}: invalid glob pattern '{pattern}': {reason}")]
    InvalidGlob {
        rule: usize,
        pattern: String,
        reason: String,
    },
    #[error("rule #{rule}: invalid regex pattern '{pattern}': {reason}")]
    InvalidRegex {
        rule: usize,
        pattern: String,
        reason: String,
    },
    #[error("rule #{rule}: invalid age '{value}' (expected e.g. 30m, 12h, 7d or 2w)")]
    InvalidAge { rule: usize, value: String },
    #[error("rule #{rule}: invalid size '{value}' (expected e.g. 512KB, 10MB or 1GB)")]
    InvalidSize { rule: usize, value: String },
}

/// Top-level layout of a rule file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GhostConfig {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default, rename = "rule")]
    pub rules: Vec<RuleConfig>,
}

/// The `[settings]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Append the built-in rules after the user's rules.
    #[serde(default = "default_use_defaults")]
    pub use_defaults: bool,
    /// Maximum scan depth below the root.
    #[serde(default)]
    pub max_depth: Option<usize>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_use_defaults() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            use_defaults: true,
            max_depth: None,
            follow_symlinks: false,
        }
    }
}

/// One `[[rule]]` table, before compilation.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    #[serde(default)]
    pub glob: Option<String>,
    #[serde(default)]
    pub regex: Option<String>,
    #[serde(default)]
    pub extension: Option<String>,
    /// Match `regex` against the relative path instead of the file name.
    /// Rejected on `glob` and `extension` rules.
    #[serde(default)]
    pub match_path: bool,
    #[serde(default)]
    pub older_than: Option<String>,
    #[serde(default)]
    pub larger_than: Option<String>,
    #[serde(default)]
    pub target: Target,
    pub action: Action,
}

impl RuleConfig {
    fn compile(&self, number: usize, origin: RuleOrigin) -> Result<Rule, ConfigError> {
        let matcher = match (&self.glob, &self.regex, &self.extension) {
            (Some(pattern), None, None) => {
                Matcher::glob(pattern).map_err(|e| ConfigError::InvalidGlob {
                    rule: number,
                    pattern: pattern.clone(),
                    reason: e.msg.to_string(),
                })?
            }
            (None, Some(pattern), None) => {
                Matcher::regex(pattern, self.match_path).map_err(|e| ConfigError::InvalidRegex {
                    rule: number,
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })?
            }
            (None, None, Some(ext)) if !ext.trim_start_matches('.').is_empty() => {
                Matcher::extension(ext)
            }
            _ => return Err(ConfigError::AmbiguousMatcher { rule: number }),
        };
        if self.match_path && self.regex.is_none() {
            return Err(ConfigError::MatchPathWithoutRegex { rule: number });
        }

        let mut rule = Rule::new(matcher, self.action)
            .target(self.target)
            .origin(origin);

        if let Some(value) = &self.older_than {
            let age = parse_age(value).ok_or_else(|| ConfigError::InvalidAge {
                rule: number,
                value: value.clone(),
            })?;
            rule = rule.older_than(age);
        }

        if let Some(value) = &self.larger_than {
            let size = parse_size(value).ok_or_else(|| ConfigError::InvalidSize {
                rule: number,
                value: value.clone(),
            })?;
            rule = rule.larger_than(size);
        }

        Ok(rule)
    }
}

impl GhostConfig {
    /// Loads a rule file.
    ///
    /// A missing path or a path that does not exist yields an empty config,
    /// which compiles to the built-in defaults. This is not an error.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` if the file exists but cannot be read and
    /// `ConfigError::Invalid` if it is not a valid rule file.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = config_path else {
            debug!("no config file given, using built-in rules");
            return Ok(Self::default());
        };

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("{} not found, using built-in rules", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        };

        info!("loading rules from {}", path.display());
        Self::parse(&content, path)
    }

    /// Parses rule file contents. `origin` is only used in error messages.
    pub fn parse(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Invalid {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Compiles user rules and merges them with the built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if any matcher or threshold is invalid.
    pub fn into_rule_set(self) -> Result<RuleSet, ConfigError> {
        let user = self
            .rules
            .iter()
            .enumerate()
            .map(|(i, rule)| rule.compile(i + 1, RuleOrigin::User))
            .collect::<Result<Vec<_>, _>>()?;

        let defaults = if self.settings.use_defaults {
            builtin_rules()?
        } else {
            debug!("built-in rules disabled by config");
            Vec::new()
        };

        let rule_set = RuleSet::merge(user, defaults);
        debug!("effective rule set has {} rules", rule_set.len());
        Ok(rule_set)
    }
}

/// The built-in rules, compiled.
pub fn builtin_rules() -> Result<Vec<Rule>, ConfigError> {
    let config = GhostConfig::parse(BUILTIN_RULES, Path::new("<built-in rules>"))?;
    config
        .rules
        .iter()
        .enumerate()
        .map(|(i, rule)| rule.compile(i + 1, RuleOrigin::Default))
        .collect()
}

/// Loads and compiles the rule set for one run.
///
/// Returns the settings alongside the rules so the caller can apply
/// `max_depth` and `follow_symlinks`.
pub fn load_rules(config_path: Option<&Path>) -> Result<(RuleSet, Settings), ConfigError> {
    let config = GhostConfig::load(config_path)?;
    let settings = config.settings.clone();
    Ok((config.into_rule_set()?, settings))
}

/// Default location of the rule file, if a home directory is known.
pub fn default_config_path() -> Option<PathBuf> {
    match dirs::home_dir() {
        Some(home) => Some(home.join(CONFIG_FILE_NAME)),
        None => {
            warn!("could not determine home directory, skipping {}", CONFIG_FILE_NAME);
            None
        }
    }
}

/// Parses an age such as `45s`, `30m`, `12h`, `7d` or `2w`. A bare number
/// means days.
pub fn parse_age(s: &str) -> Option<TimeDelta> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (num_str, unit) = s.split_at(split);
    let num: i64 = num_str.parse().ok()?;

    let seconds_per_unit: i64 = match unit.trim() {
        "s" => 1,
        "m" => 60,
        "h" => 3_600,
        "" | "d" => 86_400,
        "w" => 604_800,
        _ => return None,
    };

    TimeDelta::try_seconds(num.checked_mul(seconds_per_unit)?)
}

/// Formats an age with the largest unit that divides it evenly.
pub fn format_age(age: TimeDelta) -> String {
    let secs = age.num_seconds();
    match secs {
        0 => "0s".to_string(),
        s if s % 604_800 == 0 => format!("{}w", s / 604_800),
        s if s % 86_400 == 0 => format!("{}d", s / 86_400),
        s if s % 3_600 == 0 => format!("{}h", s / 3_600),
        s if s % 60 == 0 => format!("{}m", s / 60),
        s => format!("{}s", s),
    }
}

/// Parses a size such as `512`, `100KB`, `1.5MB` or `2GB` into bytes.
/// Multiples are binary and the unit is case-insensitive.
pub fn parse_size(s: &str) -> Option<u64> {
    let s = s.trim();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (num_str, unit) = s.split_at(split);

    let multiplier: u64 = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" => 1_024,
        "M" | "MB" => 1_048_576,
        "G" | "GB" => 1_073_741_824,
        _ => return None,
    };

    let num: f64 = num_str.parse().ok()?;
    if !num.is_finite() || num < 0.0 {
        return None;
    }

    Some((num * multiplier as f64) as u64)
}
