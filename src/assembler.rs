//! Prompt context assembly
//!
//! Filtered files are framed as `<file name="PATH">` blocks and appended in
//! priority order until the byte budget binds. Inclusion is all-or-nothing per
//! file, so the model never sees half a file.

use std::cmp::Ordering;
use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::loader::SourceFile;

static BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").expect("static regex"));

const PRIORITY_DIRS: &[&str] = &["src", "lib", "core", "app", "pkg"];
const MANIFESTS: &[&str] = &[
    "Cargo.toml", "package.json", "pyproject.toml", "setup.py", "go.mod",
    "pom.xml", "build.gradle", "Dockerfile", "Makefile",
];
const ENTRY_STEMS: &[&str] = &["main", "app", "index", "server", "cli"];

/// Counters reported alongside the assembled text
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingStats {
    /// Files whose text made it into the context
    pub files_processed: usize,
    /// Files that were empty after cleaning or did not fit
    pub files_skipped: usize,
    /// Length of the assembled text in bytes
    pub total_characters: usize,
    /// Rough token count, a quarter of the byte length
    pub estimated_tokens: usize,
}

/// Signals that the budget bound and files were left out
///
/// This is a warning, not a failure: the pipeline carries on with what fit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("context budget of {budget} bytes exceeded; {} file(s) dropped, starting with {}", .dropped.len(), .dropped.first().map(String::as_str).unwrap_or("-"))]
pub struct BudgetExceeded {
    /// Configured budget in bytes
    pub budget: usize,
    /// Paths that did not fit, in priority order
    pub dropped: Vec<String>,
}

/// The text handed to the model for one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssembledContext {
    /// Concatenated file blocks
    pub text: String,
    /// Paths in the order their blocks appear in `text`
    pub included_paths: Vec<String>,
    /// Paths left out because the budget bound
    pub dropped_paths: Vec<String>,
    /// Whether any file was left out for lack of room
    pub truncated: bool,
    /// Budget the text was built against
    pub budget: usize,
    /// Counters
    pub stats: ProcessingStats,
}

impl AssembledContext {
    /// The truncation warning, if the budget bound
    pub fn budget_warning(&self) -> Option<BudgetExceeded> {
        self.truncated.then(|| BudgetExceeded {
            budget: self.budget,
            dropped: self.dropped_paths.clone(),
        })
    }

    /// Checks whether nothing at all made it into the context
    pub fn is_empty(&self) -> bool {
        self.included_paths.is_empty()
    }
}

/// Normalizes whitespace: trailing spaces go, long blank runs shrink to two blank lines
pub fn clean_content(content: &str) -> String {
    let collapsed = BLANK_RUNS.replace_all(content, "\n\n\n");
    let lines: Vec<&str> = collapsed.split('\n').map(str::trim_end).collect();
    lines.join("\n").trim().to_string()
}

fn frame(path: &str, cleaned: &str) -> String {
    format!("<file name=\"{}\">\n{}\n</file>\n\n", path, cleaned)
}

/// Bytes a file occupies in the context, or `None` if it is empty after cleaning
pub fn framed_len(file: &SourceFile) -> Option<usize> {
    let cleaned = clean_content(&file.content);
    (!cleaned.is_empty()).then(|| frame(&file.path, &cleaned).len())
}

/// Priority tier: 0 for entry points and manifests, 1 for core source directories, 2 otherwise
pub fn priority_tier(file: &SourceFile) -> u8 {
    let name = file.file_name();
    if file.depth() <= 1 {
        let stem = name.split('.').next().unwrap_or(name).to_lowercase();
        let entry = name.to_lowercase().starts_with("readme")
            || MANIFESTS.contains(&name)
            || name == "lib.rs"
            || name == "mod.rs"
            || (name.contains('.') && ENTRY_STEMS.contains(&stem.as_str()));
        if entry {
            return 0;
        }
    }
    let in_core_dir = file
        .parent_dirs()
        .next()
        .map(|top| PRIORITY_DIRS.contains(&top.to_lowercase().as_str()))
        .unwrap_or(false);
    if in_core_dir {
        1
    } else {
        2
    }
}

fn compare_priority(a: &SourceFile, b: &SourceFile) -> Ordering {
    (priority_tier(a), a.depth(), &a.path).cmp(&(priority_tier(b), b.depth(), &b.path))
}

/// Builds the context for `files`, never exceeding `budget` bytes
///
/// The budget covers the framed text: each file costs its content plus its
/// `<file name="...">` header and closing tag (see [`framed_len`]). Files
/// whose framed sizes sum to at most `budget` are never truncated; raw
/// content sizes alone can fit while the framed total does not.
pub fn assemble(files: &[SourceFile], budget: usize) -> AssembledContext {
    let mut ordered: Vec<&SourceFile> = files.iter().collect();
    ordered.sort_by(|a, b| compare_priority(a, b));

    let mut text = String::new();
    let mut included_paths = Vec::new();
    let mut dropped_paths = Vec::new();
    let mut stats = ProcessingStats::default();

    for file in ordered {
        let cleaned = clean_content(&file.content);
        if cleaned.is_empty() {
            stats.files_skipped += 1;
            continue;
        }
        if !dropped_paths.is_empty() {
            dropped_paths.push(file.path.clone());
            stats.files_skipped += 1;
            continue;
        }

        let entry = frame(&file.path, &cleaned);
        if text.len() + entry.len() > budget {
            dropped_paths.push(file.path.clone());
            stats.files_skipped += 1;
            continue;
        }
        text.push_str(&entry);
        included_paths.push(file.path.clone());
        stats.files_processed += 1;
    }

    stats.total_characters = text.len();
    stats.estimated_tokens = text.len() / 4;
    let truncated = !dropped_paths.is_empty();

    let context = AssembledContext {
        text,
        included_paths,
        dropped_paths,
        truncated,
        budget,
        stats,
    };
    if let Some(warning) = context.budget_warning() {
        warn!("{}", warning);
    }
    info!(
        "Assembled {} files, {} chars (~{} tokens)",
        context.stats.files_processed, context.stats.total_characters, context.stats.estimated_tokens
    );
    context
}
