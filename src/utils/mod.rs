//! Small helpers shared across the pipeline stages

pub mod path;
pub mod timeout;

pub use path::{normalize_user_input_path, sanitize_file_component};
pub use timeout::with_timeout;
