//! Install-time bulk population of a bucket.

use futures::{stream, TryStreamExt};
use std::collections::HashSet;
use tracing::{debug, info};

use crate::cache::{BucketHandle, CacheStorage};
use crate::error::CacheError;
use crate::http::Request;
use crate::network::Network;

/// Fetch every resource and store it under its own key.
///
/// Up to `concurrency` fetches run at once and each response is stored as
/// soon as it arrives. A transport failure or a non-2xx status on any
/// resource fails the whole operation; entries stored before the failure
/// are left in place.
///
/// Resources sharing a cache key are fetched once. Returns the number of
/// distinct entries stored.
pub async fn populate<S, N>(
  bucket: &BucketHandle<S>,
  network: &N,
  resources: &[Request],
  concurrency: usize,
) -> Result<usize, CacheError>
where
  S: CacheStorage,
  N: Network + ?Sized,
{
  let mut seen = HashSet::new();
  let unique: Vec<&Request> = resources
    .iter()
    .filter(|request| seen.insert(request.key()))
    .collect();

  stream::iter(unique.iter().copied().map(Ok::<_, CacheError>))
    .try_for_each_concurrent(concurrency.max(1), |request| async move {
      let response =
        network
          .fetch(request)
          .await
          .map_err(|e| CacheError::PreloadPopulationFailure {
            resource: request.url.to_string(),
            reason: e.to_string(),
          })?;

      if !response.is_ok() {
        return Err(CacheError::PreloadPopulationFailure {
          resource: request.url.to_string(),
          reason: format!("unexpected status {}", response.status),
        });
      }

      bucket.store(request, response)?;
      debug!(url = %request.url, "preloaded");
      Ok(())
    })
    .await?;

  info!(
    bucket = bucket.name(),
    count = unique.len(),
    "cache populated"
  );
  Ok(unique.len())
}
