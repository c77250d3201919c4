use std::future::Future;
use std::time::Duration;
use log::warn;

use crate::error::{AtlasError, Result};

/// Runs `fut` with a deadline, mapping expiry to [`AtlasError::Timeout`]
///
/// Dropping the future on expiry cancels the underlying I/O.
pub async fn with_timeout<T, F>(operation: &str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!("{} exceeded its {:?} limit", operation, limit);
            Err(AtlasError::timeout(operation, limit))
        }
    }
}
