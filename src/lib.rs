#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![warn(clippy::all)]

//! CodeAtlas turns a code repository into a validated architecture diagram,
//! a prose summary and a chat context.
//!
//! ## Pipeline
//! - [`loader`] fetches a GitHub archive, unpacks a ZIP or walks a directory
//! - [`filter`] keeps the files worth showing a model
//! - [`assembler`] packs them into a byte-budgeted context
//! - [`analyzer`] asks the model and [`diagram`] validates what comes back
//!
//! ## Usage
//! ```rust,ignore
//! use codeatlas::{AtlasConfig, CodeAtlas, RepoRef};
//!
//! async fn example() -> codeatlas::Result<()> {
//!     let atlas = CodeAtlas::new(AtlasConfig::load()?)?;
//!     let repo = RepoRef::parse("https://github.com/tokio-rs/mini-redis")?;
//!     let report = atlas.analyze(&repo).await?;
//!     println!("{}", report.diagram.raw_text);
//!     Ok(())
//! }
//! ```

/// Model calls for diagrams, summaries, chat and narration
pub mod analyzer;
/// HTTP service routes
pub mod api;
/// Budgeted context assembly
pub mod assembler;
/// Terminal output helpers
pub mod cli;
/// Configuration module for the application
pub mod config;
/// Diagram extraction, validation, layout and rendering
pub mod diagram;
/// Error handling types and utilities
pub mod error;
/// Relevance filtering of repository files
pub mod filter;
/// Saved diagrams and their metadata
pub mod history;
/// Model backends
pub mod llm;
/// Repository loading
pub mod loader;
/// Logging configuration and utilities
pub mod logging;
/// MCP tool server
pub mod mcp;
/// End-to-end analysis
pub mod pipeline;
/// Prompt templates
pub mod prompts;
/// Utilities (path normalization, timeouts)
pub mod utils;
/// Text-to-speech narration
pub mod voice;

// Re-export common types
pub use assembler::{assemble, AssembledContext, BudgetExceeded, ProcessingStats};
pub use config::AtlasConfig;
pub use diagram::{validate, DiagramError, DiagramLimits, DiagramSpec};
pub use error::{AtlasError, Result};
pub use filter::{Matcher, RuleSet, Verdict};
pub use history::{DiagramRecord, HistoryStore};
pub use loader::{RepoRef, RepositoryLoader, SourceFile};
pub use pipeline::{AnalysisReport, CodeAtlas, SummaryReport};
