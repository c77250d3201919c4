use std::io;
use std::time::Duration;
use thiserror::Error;
use async_openai::error::OpenAIError;

use crate::diagram::DiagramError;

/// Custom result type alias for the application
pub type Result<T> = std::result::Result<T, AtlasError>;

/// Errors that can occur while analysing a repository
#[derive(Debug, Error)]
pub enum AtlasError {
    /// The repository could not be fetched from its host
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// The supplied source is unusable: a malformed, unsafe or oversized archive,
    /// a missing path, or no files at all
    #[error("Fetch error: {0}")]
    InvalidSource(String),

    /// The filter rule set is misconfigured
    #[error("Filter error: {0}")]
    Filter(String),

    /// The model returned a diagram that cannot be rendered
    #[error("Invalid diagram: {0}")]
    InvalidDiagram(#[from] DiagramError),

    /// The diagram renderer failed
    #[error("Render error: {0}")]
    Render(String),

    /// Text-to-speech failed
    #[error("Synthesis error: {0}")]
    Synthesis(String),

    /// An external call did not finish in time
    #[error("{operation} timed out after {}s", .after.as_secs())]
    Timeout {
        /// Name of the operation that was cut off
        operation: String,
        /// Configured limit that was hit
        after: Duration,
    },

    /// The model call failed or returned nothing usable
    #[error("Model error: {0}")]
    Model(String),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Input validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Saved diagram history could not be read or written
    #[error("History error: {0}")]
    History(String),

    /// I/O errors
    #[error("IO error: {0}")]
    IO(#[from] io::Error),

    /// HTTP request/response errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing/serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// ZIP file processing errors
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Directory traversal errors
    #[error("Walkdir error: {0}")]
    Walkdir(#[from] walkdir::Error),

    /// URL parsing errors
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// OpenAI API errors
    #[error("OpenAI error: {0}")]
    OpenAI(String),
}

impl From<OpenAIError> for AtlasError {
    fn from(error: OpenAIError) -> Self {
        AtlasError::OpenAI(error.to_string())
    }
}

impl AtlasError {
    /// Builds a timeout error for the named operation
    pub fn timeout(operation: &str, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.to_string(),
            after,
        }
    }

    /// Short machine-readable name of the error kind, used by the HTTP and MCP surfaces
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fetch(_) | Self::InvalidSource(_) | Self::Zip(_) | Self::Walkdir(_) | Self::UrlParse(_) => "fetch_error",
            Self::Filter(_) => "filter_error",
            Self::InvalidDiagram(_) => "invalid_diagram",
            Self::Render(_) => "render_error",
            Self::Synthesis(_) => "synthesis_error",
            Self::Timeout { .. } => "timeout",
            Self::Model(_) | Self::OpenAI(_) => "model_error",
            Self::Config(_) => "config_error",
            Self::Validation(_) => "validation_error",
            Self::History(_) => "history_error",
            Self::IO(_) | Self::Http(_) | Self::Json(_) => "internal_error",
        }
    }

    /// Checks if this error is transient, i.e. the same request may succeed later
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Http(_) | Self::IO(_) | Self::Model(_) | Self::OpenAI(_)
        )
    }

    /// Checks if this error is fatal and should terminate processing
    pub fn is_fatal(&self) -> bool {
        !self.is_transient()
    }
}
