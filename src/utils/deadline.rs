use std::future::Future;
use std::time::Duration;

use crate::error::RelayError;

/// Bounds a single backend call. A stalled lock store, order store, or cache
/// must never hang a request; expiry is reported as a transient fault like
/// any other backend error.
pub async fn bounded<T, F>(limit: Duration, what: &str, fut: F) -> Result<T, RelayError>
where
    F: Future<Output = Result<T, RelayError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(RelayError::transient(anyhow::anyhow!(
            "{what} timed out after {limit:?}"
        ))),
    }
}
