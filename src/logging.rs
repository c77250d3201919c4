use crate::error::{AtlasError, Result};
use env_logger::{Builder, Env};
use log::{self, LevelFilter};
use chrono::Local;
use colored::Colorize;
use std::io::Write;

/// Initializes the application's logging system with the specified log level
///
/// Valid log levels are: error, warn, info, debug, trace. `RUST_LOG` wins when set.
pub fn init(log_level: &str) -> Result<()> {
    let env = Env::default()
        .filter_or("RUST_LOG", log_level)
        .write_style_or("RUST_LOG_STYLE", "auto");

    Builder::from_env(env)
        .format(|buf, record| writeln!(buf, "{}", format_log(record)))
        .try_init()
        .map_err(|e| AtlasError::Config(format!("Logger already initialized: {}", e)))
}

/// Formats a log record as `[timestamp] LEVEL [target] message`
pub fn format_log(record: &log::Record) -> String {
    let level = match record.level() {
        log::Level::Error => "ERROR".red().bold(),
        log::Level::Warn => "WARN ".yellow().bold(),
        log::Level::Info => "INFO ".cyan().bold(),
        log::Level::Debug => "DEBUG".blue().bold(),
        log::Level::Trace => "TRACE".normal(),
    };

    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
    let target = if !record.target().is_empty() {
        record.target()
    } else {
        record.module_path().unwrap_or("unknown")
    };

    format!("[{}] {} [{}] {}", timestamp, level, target, record.args())
}

/// Parses a log level string into a LevelFilter
///
/// Returns the corresponding LevelFilter, defaulting to Info for invalid strings
pub fn parse_log_level(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

/// Picks the log level from the verbosity flags
pub fn level_for(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}
