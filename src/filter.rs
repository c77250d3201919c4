//! Relevance filtering
//!
//! A [`RuleSet`] is an ordered list of rules. The first rule whose matcher
//! fires decides a file's fate; files no rule matches get the default
//! verdict. Filtering never reorders files and is idempotent: running the
//! output through the same rule set again returns it unchanged.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::ProcessingConfig;
use crate::error::{AtlasError, Result};
use crate::loader::SourceFile;

/// Outcome of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// Keep the file
    Accept,
    /// Drop the file
    Reject,
}

/// What a rule looks at
#[derive(Debug, Clone, PartialEq)]
pub enum Matcher {
    /// Any parent directory has this exact name
    Directory(String),
    /// Lower-case extension including the dot, e.g. `.rs`
    Extension(String),
    /// Exact file name
    FileName(String),
    /// Lower-case file name contains the fragment
    NameContains(String),
    /// Lower-case path contains the fragment
    PathContains(String),
    /// Relative path matches the glob
    Glob(glob::Pattern),
    /// File is larger than this many bytes
    SizeAbove(u64),
    /// File content looked binary
    Binary,
}

impl Matcher {
    /// Compiles a glob matcher
    pub fn glob(pattern: &str) -> Result<Self> {
        if pattern.trim().is_empty() {
            return Err(AtlasError::Filter("glob pattern is empty".into()));
        }
        glob::Pattern::new(pattern)
            .map(Matcher::Glob)
            .map_err(|e| AtlasError::Filter(format!("invalid glob '{}': {}", pattern, e)))
    }

    fn check(&self) -> Result<()> {
        let empty = |what: &str| Err(AtlasError::Filter(format!("{} pattern is empty", what)));
        match self {
            Matcher::Directory(s) if s.trim_matches('/').is_empty() => empty("directory"),
            Matcher::Extension(s) if s.trim_start_matches('.').is_empty() => empty("extension"),
            Matcher::FileName(s) if s.is_empty() => empty("file name"),
            Matcher::NameContains(s) | Matcher::PathContains(s) if s.is_empty() => empty("fragment"),
            Matcher::Glob(p) if p.as_str().is_empty() => empty("glob"),
            Matcher::SizeAbove(0) => Err(AtlasError::Filter("size threshold must be greater than zero".into())),
            _ => Ok(()),
        }
    }

    /// Checks whether the matcher fires for `file`
    pub fn matches(&self, file: &SourceFile) -> bool {
        match self {
            Matcher::Directory(dir) => {
                let dir = dir.trim_matches('/');
                file.parent_dirs().any(|d| d == dir)
            }
            Matcher::Extension(ext) => {
                let ext = ext.to_lowercase();
                let ext = if ext.starts_with('.') { ext } else { format!(".{}", ext) };
                file.extension() == ext
            }
            Matcher::FileName(name) => file.file_name() == name,
            Matcher::NameContains(fragment) => file.file_name().to_lowercase().contains(fragment.as_str()),
            Matcher::PathContains(fragment) => file.path.to_lowercase().contains(fragment.as_str()),
            Matcher::Glob(pattern) => pattern.matches(&file.path),
            Matcher::SizeAbove(limit) => file.size > *limit,
            Matcher::Binary => file.binary,
        }
    }
}

/// A matcher paired with the verdict it produces
#[derive(Debug, Clone, PartialEq)]
pub struct FilterRule {
    /// Condition
    pub matcher: Matcher,
    /// Verdict when the condition holds
    pub verdict: Verdict,
}

impl FilterRule {
    /// Builds a rule, rejecting empty patterns and zero thresholds
    pub fn new(matcher: Matcher, verdict: Verdict) -> Result<Self> {
        matcher.check()?;
        Ok(Self { matcher, verdict })
    }
}

/// Stricter rules used for repositories above a size threshold
#[derive(Debug, Clone, PartialEq)]
struct AggressiveTier {
    threshold: u64,
    rules: Vec<FilterRule>,
    default: Verdict,
}

/// Ordered filter rules
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSet {
    rules: Vec<FilterRule>,
    default: Verdict,
    aggressive: Option<AggressiveTier>,
    max_included_bytes: Option<u64>,
}

impl RuleSet {
    /// Creates an empty rule set with the given default verdict
    pub fn new(default: Verdict) -> Self {
        Self {
            rules: Vec::new(),
            default,
            aggressive: None,
            max_included_bytes: None,
        }
    }

    /// Appends a rule
    pub fn rule(mut self, matcher: Matcher, verdict: Verdict) -> Result<Self> {
        self.rules.push(FilterRule::new(matcher, verdict)?);
        Ok(self)
    }

    /// Appends a reject rule
    pub fn reject(self, matcher: Matcher) -> Result<Self> {
        self.rule(matcher, Verdict::Reject)
    }

    /// Appends an accept rule
    pub fn accept(self, matcher: Matcher) -> Result<Self> {
        self.rule(matcher, Verdict::Accept)
    }

    /// Adds a tier evaluated before the base rules once the input is larger than `threshold` bytes
    ///
    /// In that tier a reject (or the tier default) drops the file and an accept hands it on
    /// to the base rules, so the tier can only ever remove more files.
    pub fn with_aggressive_tier(mut self, threshold: u64, rules: Vec<FilterRule>, default: Verdict) -> Result<Self> {
        if threshold == 0 {
            return Err(AtlasError::Filter("large repository threshold must be greater than zero".into()));
        }
        self.aggressive = Some(AggressiveTier { threshold, rules, default });
        Ok(self)
    }

    /// Caps the summed size of accepted files
    pub fn with_max_included_bytes(mut self, cap: Option<u64>) -> Result<Self> {
        if cap == Some(0) {
            return Err(AtlasError::Filter("included byte cap must be greater than zero".into()));
        }
        self.max_included_bytes = cap;
        Ok(self)
    }

    /// Builds the default rule set from configuration
    pub fn from_config(config: &ProcessingConfig) -> Result<Self> {
        let mut set = RuleSet::new(Verdict::Reject);
        for dir in &config.blocked_dirs {
            set = set.reject(Matcher::Directory(dir.clone()))?;
        }
        for name in &config.blocked_files {
            set = set.reject(Matcher::FileName(name.clone()))?;
        }
        for fragment in &config.test_file_patterns {
            set = set.reject(Matcher::NameContains(fragment.to_lowercase()))?;
        }
        for pattern in &config.excluded_globs {
            set = set.reject(Matcher::glob(pattern)?)?;
        }
        set = set
            .reject(Matcher::Binary)?
            .reject(Matcher::SizeAbove(config.max_file_size))?;
        for name in &config.allowed_files {
            set = set.accept(Matcher::FileName(name.clone()))?;
        }
        for ext in &config.allowed_extensions {
            set = set.accept(Matcher::Extension(ext.to_lowercase()))?;
        }

        let mut tier = Vec::new();
        for fragment in &config.aggressive_skip_patterns {
            tier.push(FilterRule::new(Matcher::PathContains(fragment.to_lowercase()), Verdict::Reject)?);
        }
        for name in &config.allowed_files {
            tier.push(FilterRule::new(Matcher::FileName(name.clone()), Verdict::Accept)?);
        }
        for ext in &config.core_extensions {
            tier.push(FilterRule::new(Matcher::Extension(ext.to_lowercase()), Verdict::Accept)?);
        }

        set.with_aggressive_tier(config.large_repo_threshold, tier, Verdict::Reject)?
            .with_max_included_bytes(config.max_included_bytes)
    }

    /// Base rules that reject before any rule can accept
    fn leading_rejects(&self) -> impl Iterator<Item = &Matcher> {
        self.rules
            .iter()
            .take_while(|r| r.verdict == Verdict::Reject)
            .map(|r| &r.matcher)
    }

    /// Directory names whose files are rejected whatever they contain
    pub fn pruned_dirs(&self) -> Vec<String> {
        self.leading_rejects()
            .filter_map(|m| match m {
                Matcher::Directory(dir) => Some(dir.trim_matches('/').to_string()),
                _ => None,
            })
            .collect()
    }

    /// Size above which every file is rejected whatever it contains
    pub fn size_cutoff(&self) -> Option<u64> {
        self.leading_rejects()
            .filter_map(|m| match m {
                Matcher::SizeAbove(limit) => Some(*limit),
                _ => None,
            })
            .min()
    }

    /// Verdict of the base rules for one file
    pub fn evaluate(&self, file: &SourceFile) -> Verdict {
        first_match(&self.rules, file).unwrap_or(self.default)
    }

    fn evaluate_aggressive(&self, tier: &AggressiveTier, file: &SourceFile) -> Verdict {
        match first_match(&tier.rules, file).unwrap_or(tier.default) {
            Verdict::Accept => self.evaluate(file),
            Verdict::Reject => Verdict::Reject,
        }
    }

    /// Returns the accepted files in their original order
    pub fn filter(&self, files: &[SourceFile]) -> Vec<SourceFile> {
        let total: u64 = files.iter().map(|f| f.size).sum();
        let tier = self.aggressive.as_ref().filter(|t| total > t.threshold);
        if tier.is_some() {
            info!("Repository is {} bytes, applying aggressive filtering", total);
        }

        let mut kept = Vec::new();
        let mut included: u64 = 0;
        for file in files {
            let verdict = match tier {
                Some(tier) => self.evaluate_aggressive(tier, file),
                None => self.evaluate(file),
            };
            if verdict == Verdict::Reject {
                continue;
            }
            if let Some(cap) = self.max_included_bytes {
                if included + file.size > cap {
                    debug!("Skipping {}: included byte cap of {} reached", file.path, cap);
                    continue;
                }
            }
            included += file.size;
            kept.push(file.clone());
        }

        info!("Filter kept {} of {} files ({} bytes)", kept.len(), files.len(), included);
        kept
    }
}

fn first_match(rules: &[FilterRule], file: &SourceFile) -> Option<Verdict> {
    rules.iter().find(|r| r.matcher.matches(file)).map(|r| r.verdict)
}
