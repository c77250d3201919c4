use std::time::Duration;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};

use crate::history::DiagramRecord;
use crate::pipeline::{AnalysisReport, SummaryReport};

/// Prints the banner shown before interactive commands.
pub fn print_banner() {
    println!("{}", "CodeAtlas".bold().green());
    println!("{}", "Architecture diagrams, summaries and answers for any codebase".bright_blue());
    println!("{}\n", "=============================================================".bright_yellow());
}

/// Helper to print an info message.
pub fn print_info(message: &str) {
    println!("{}", message.green());
}

/// Helper to print a warning message.
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "[WARN]".yellow().bold(), message.yellow());
}

/// Helper to print an error message.
pub fn print_error(message: &str) {
    eprintln!("{} {}", "[ERROR]".red().bold(), message.red());
}

/// Spinner shown while a long step runs
pub fn spinner(message: impl Into<String>) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.into());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// Prints the outcome of an analysis, with the DOT source last so it can be piped
pub fn print_analysis(report: &AnalysisReport) {
    eprintln!(
        "{} {} with {}: {} nodes, {} edges from {} files",
        "[OK]".green().bold(),
        report.repo_name.bold(),
        report.model,
        report.diagram.node_count(),
        report.diagram.edge_count(),
        report.stats.files_processed
    );
    if let Some(warning) = &report.budget_warning {
        print_warning(warning);
    }
    if let Some(saved) = &report.saved {
        eprintln!("{} saved as {}", "[OK]".green().bold(), saved.id.bright_white());
    }
    eprintln!("\n{}\n", report.summary);
    println!("{}", report.diagram.raw_text);
}

/// Prints a summary and its warning, if any
pub fn print_summary(report: &SummaryReport) {
    if let Some(warning) = &report.budget_warning {
        print_warning(warning);
    }
    println!("{}", report.summary);
}

/// Prints the diagram history as a table
pub fn print_history(records: &[DiagramRecord]) {
    if records.is_empty() {
        print_info("No saved diagrams yet.");
        return;
    }
    println!(
        "{:<19}  {:<30}  {:>5}  {:>5}  {}",
        "Created".bold(),
        "Repository".bold(),
        "Nodes".bold(),
        "Edges".bold(),
        "Id".bold()
    );
    for record in records {
        println!(
            "{:<19}  {:<30}  {:>5}  {:>5}  {}",
            record.created_at.format("%Y-%m-%d %H:%M:%S"),
            truncate(&record.repo_name, 30),
            record.node_count,
            record.edge_count,
            record.id.dimmed()
        );
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let mut short: String = text.chars().take(max.saturating_sub(1)).collect();
        short.push('…');
        short
    }
}
