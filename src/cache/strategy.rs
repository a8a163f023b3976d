//! Cache-first request resolution with preload and offline fallback.

use reqwest::Method;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::bucket::BucketHandle;
use super::storage::{CacheStorage, StoredResponse};
use super::traits::{PreloadResponse, Resolution};
use super::writer::BackgroundWriter;
use crate::http::{Request, Response};
use crate::network::Network;

/// Resolves intercepted requests against one bucket.
///
/// The strategy never fails: every request resolves to some response.
pub struct CacheFirst<S: CacheStorage, N: Network> {
  bucket: BucketHandle<S>,
  network: Arc<N>,
  writer: BackgroundWriter,
}

impl<S: CacheStorage, N: Network> CacheFirst<S, N> {
  pub fn new(bucket: BucketHandle<S>, network: Arc<N>, writer: BackgroundWriter) -> Self {
    Self {
      bucket,
      network,
      writer,
    }
  }

  #[cfg(test)]
  pub fn bucket(&self) -> &BucketHandle<S> {
    &self.bucket
  }

  pub fn writer(&self) -> &BackgroundWriter {
    &self.writer
  }

  /// Resolve `request`.
  ///
  /// 1. Cache hit - return it, no preload or network work
  /// 2. Preload response present - store a duplicate, return it
  /// 3. Network fetch succeeds (any status) - store a duplicate, return it
  /// 4. Transport failure - return the cached fallback resource
  /// 5. No fallback - return a synthesized 408
  ///
  /// Steps 2 and 3 only store responses to GET requests.
  pub async fn resolve(
    &self,
    request: &Request,
    preload: Option<PreloadResponse>,
    fallback: &Request,
  ) -> Resolution {
    if let Some(stored) = self.cached(request) {
      debug!(url = %request.url, "cache hit");
      return Resolution::from_cache(stored.response, stored.stored_at);
    }

    if let Some(preload) = preload {
      if let Some(response) = preload.await {
        info!(url = %request.url, status = response.status, "using preload response");
        self.remember(request, &response);
        return Resolution::from_preload(response);
      }
    }

    match self.network.fetch(request).await {
      Ok(response) => {
        debug!(url = %request.url, status = response.status, "served from network");
        self.remember(request, &response);
        Resolution::from_network(response)
      }
      Err(error) => {
        warn!(url = %request.url, error = %error, "network unavailable, trying fallback");

        match self.cached(fallback) {
          Some(stored) => Resolution::fallback(stored.response, stored.stored_at),
          None => Resolution::synthesized(),
        }
      }
    }
  }

  /// Queue a copy of `response` for storage. Only GET responses are kept.
  fn remember(&self, request: &Request, response: &Response) {
    if request.method == Method::GET {
      self.writer.enqueue(request.clone(), response.duplicate());
    } else {
      debug!(method = %request.method, url = %request.url, "not caching non-GET response");
    }
  }

  /// Bucket lookup where a read failure counts as a miss.
  fn cached(&self, request: &Request) -> Option<StoredResponse> {
    match self.bucket.lookup(request) {
      Ok(stored) => stored,
      Err(error) => {
        warn!(url = %request.url, error = %error, "cache read failed");
        None
      }
    }
  }
}
