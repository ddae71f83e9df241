//! Compiled cleanup rules and the ordered rule set.
//!
//! A [`Rule`] pairs a [`Matcher`] with optional age and size thresholds, the
//! kind of entry it targets and the [`Action`] to take. Rules are evaluated in
//! order and the first one that applies decides the fate of an entry.
//!
//! Rules are built by [`crate::config`]; this module only knows how to match
//! them and how to merge user rules with the built-in defaults.

use chrono::TimeDelta;
use glob::{MatchOptions, Pattern};
use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// What to do with an entry matched by a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Flag the entry for deletion.
    Delete,
    /// Keep the entry but report it.
    Warn,
    /// Keep the entry silently. Ignored directories are not descended into.
    Ignore,
}

impl Action {
    /// Lowercase tag as it appears in the config file.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Delete => "delete",
            Action::Warn => "warn",
            Action::Ignore => "ignore",
        }
    }
}

/// Kind of filesystem entry a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// Regular files and symlinks.
    #[default]
    File,
    /// Directories only.
    Dir,
    /// Anything.
    Any,
}

impl Target {
    /// Whether an entry of `kind` can be matched by a rule with this target.
    pub fn admits(&self, kind: EntryKind) -> bool {
        match self {
            Target::File => matches!(kind, EntryKind::File | EntryKind::Symlink),
            Target::Dir => kind == EntryKind::Dir,
            Target::Any => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Target::File => "file",
            Target::Dir => "dir",
            Target::Any => "any",
        }
    }
}

/// Kind of a discovered filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
    /// A symlink that was not followed.
    Symlink,
}

/// The view of an entry that rules are evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct EntryView<'a> {
    /// Final path component.
    pub name: &'a str,
    /// Path relative to the scan root, `/`-separated.
    pub rel_path: &'a str,
    pub kind: EntryKind,
    pub size: u64,
    /// Time since last modification, if known.
    pub age: Option<TimeDelta>,
}

/// Discriminant of a [`Matcher`], used in [`MatcherKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatcherKind {
    Glob,
    Regex,
    Extension,
}

/// A compiled name or path matcher.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Shell glob. Matched against the relative path when the pattern contains
    /// a `/`, against the file name otherwise.
    Glob {
        source: String,
        pattern: Pattern,
        on_path: bool,
    },
    /// Regular expression against the file name, or the relative path when
    /// `on_path` is set.
    Regex {
        source: String,
        regex: Regex,
        on_path: bool,
    },
    /// Case-insensitive final extension, stored lowercase without the dot.
    Extension(String),
}

const GLOB_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

impl Matcher {
    /// Compiles a glob matcher.
    pub fn glob(source: &str) -> Result<Self, glob::PatternError> {
        let on_path = source.contains('/');
        let normalized = if on_path {
            source.trim_start_matches("./").trim_start_matches('/')
        } else {
            source
        };
        Ok(Matcher::Glob {
            source: normalized.to_string(),
            pattern: Pattern::new(normalized)?,
            on_path,
        })
    }

    /// Compiles a regex matcher.
    pub fn regex(source: &str, on_path: bool) -> Result<Self, regex::Error> {
        Ok(Matcher::Regex {
            source: source.to_string(),
            regex: Regex::new(source)?,
            on_path,
        })
    }

    /// Builds an extension matcher. A leading dot is ignored.
    pub fn extension(ext: &str) -> Self {
        Matcher::Extension(ext.trim_start_matches('.').to_ascii_lowercase())
    }

    pub fn kind(&self) -> MatcherKind {
        match self {
            Matcher::Glob { .. } => MatcherKind::Glob,
            Matcher::Regex { .. } => MatcherKind::Regex,
            Matcher::Extension(_) => MatcherKind::Extension,
        }
    }

    /// Pattern text after normalization.
    pub fn source(&self) -> &str {
        match self {
            Matcher::Glob { source, .. } | Matcher::Regex { source, .. } => source,
            Matcher::Extension(ext) => ext,
        }
    }

    fn on_path(&self) -> bool {
        match self {
            Matcher::Glob { on_path, .. } | Matcher::Regex { on_path, .. } => *on_path,
            Matcher::Extension(_) => false,
        }
    }

    pub fn matches(&self, entry: &EntryView<'_>) -> bool {
        match self {
            Matcher::Glob {
                pattern, on_path, ..
            } => {
                let subject = if *on_path { entry.rel_path } else { entry.name };
                pattern.matches_with(subject, GLOB_OPTIONS)
            }
            Matcher::Regex { regex, on_path, .. } => {
                let subject = if *on_path { entry.rel_path } else { entry.name };
                regex.is_match(subject)
            }
            Matcher::Extension(ext) => Path::new(entry.name)
                .extension()
                .is_some_and(|e| e.to_string_lossy().eq_ignore_ascii_case(ext)),
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Glob { source, .. } => write!(f, "{}", source),
            Matcher::Regex {
                source, on_path, ..
            } => {
                let scope = if *on_path { "path" } else { "name" };
                write!(f, "/{}/ ({})", source, scope)
            }
            Matcher::Extension(ext) => write!(f, ".{}", ext),
        }
    }
}

/// Identity of a rule for merge purposes. Two rules with equal keys are
/// considered the same rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatcherKey {
    pub kind: MatcherKind,
    pub pattern: String,
    pub on_path: bool,
    pub target: Target,
}

/// Where a rule came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleOrigin {
    User,
    Default,
}

/// A single compiled cleanup rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pub matcher: Matcher,
    pub min_age: Option<TimeDelta>,
    pub min_size: Option<u64>,
    pub target: Target,
    pub action: Action,
    pub origin: RuleOrigin,
}

impl Rule {
    pub fn new(matcher: Matcher, action: Action) -> Self {
        Self {
            matcher,
            min_age: None,
            min_size: None,
            target: Target::File,
            action,
            origin: RuleOrigin::User,
        }
    }

    pub fn older_than(mut self, age: TimeDelta) -> Self {
        self.min_age = Some(age);
        self
    }

    pub fn larger_than(mut self, bytes: u64) -> Self {
        self.min_size = Some(bytes);
        self
    }

    pub fn target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    pub fn origin(mut self, origin: RuleOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn key(&self) -> MatcherKey {
        MatcherKey {
            kind: self.matcher.kind(),
            pattern: self.matcher.source().to_string(),
            on_path: self.matcher.on_path(),
            target: self.target,
        }
    }

    /// Whether this rule's target, matcher and thresholds all hold for `entry`.
    ///
    /// An entry whose age is unknown never satisfies an age threshold.
    pub fn applies_to(&self, entry: &EntryView<'_>) -> bool {
        if !self.target.admits(entry.kind) || !self.matcher.matches(entry) {
            return false;
        }
        if let Some(min_age) = self.min_age {
            match entry.age {
                Some(age) if age >= min_age => {}
                _ => return false,
            }
        }
        if let Some(min_size) = self.min_size
            && entry.size < min_size
        {
            return false;
        }
        true
    }

    /// Short description used in reports, e.g. `*.tmp older than 7d`.
    pub fn describe(&self) -> String {
        let mut text = self.matcher.to_string();
        if self.target != Target::File {
            text.push_str(&format!(" [{}]", self.target.as_str()));
        }
        if let Some(age) = self.min_age {
            text.push_str(&format!(" older than {}", crate::config::format_age(age)));
        }
        if let Some(size) = self.min_size {
            text.push_str(&format!(
                " larger than {}",
                crate::output::format_size(size)
            ));
        }
        text
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.action.as_str(), self.describe())
    }
}

/// Ordered rules, user rules first. No two rules share a [`MatcherKey`].
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Merges user rules with defaults.
    ///
    /// A repeated user rule keeps the position of its first occurrence and the
    /// value of its last. A user rule with the same key as a default removes
    /// that default. Remaining defaults are evaluated after every user rule.
    pub fn merge(user: Vec<Rule>, defaults: Vec<Rule>) -> Self {
        let mut rules: Vec<Rule> = Vec::with_capacity(user.len() + defaults.len());
        let mut positions: HashMap<MatcherKey, usize> = HashMap::new();

        for rule in user {
            let key = rule.key();
            if let Some(&index) = positions.get(&key) {
                debug!("rule '{}' replaces earlier rule '{}'", rule, rules[index]);
                rules[index] = rule;
            } else {
                positions.insert(key, rules.len());
                rules.push(rule);
            }
        }

        for rule in defaults {
            let key = rule.key();
            if positions.contains_key(&key) {
                debug!("user rule overrides built-in rule '{}'", rule);
                continue;
            }
            positions.insert(key, rules.len());
            rules.push(rule);
        }

        Self { rules }
    }

    /// First rule that applies to `entry`, with its index.
    pub fn first_match(&self, entry: &EntryView<'_>) -> Option<(usize, &Rule)> {
        self.rules
            .iter()
            .enumerate()
            .find(|(_, rule)| rule.applies_to(entry))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Rule> {
        self.rules.get(index)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
