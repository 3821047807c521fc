//! Per-call store timeouts.

use std::{future::Future, time::Duration};

use ddcc_core::StoreError;

/// Run one store call, converting an elapsed deadline into
/// [`StoreError::Timeout`].
pub(crate) async fn within<T, E>(
  limit: Duration,
  call: impl Future<Output = Result<T, E>>,
) -> Result<T, E>
where
  E: From<StoreError>,
{
  match tokio::time::timeout(limit, call).await {
    Ok(result) => result,
    Err(_) => Err(StoreError::Timeout.into()),
  }
}
