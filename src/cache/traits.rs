//! Core types shared by the resolution strategy and its callers.

use chrono::{DateTime, Utc};
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::http::Response;

/// A response the host may have started fetching before routing the request.
///
/// Resolves to `None` when the host did not preload anything.
pub type PreloadResponse = Pin<Box<dyn Future<Output = Option<Response>> + Send>>;

/// Wrap a future into a [`PreloadResponse`].
pub fn preload<F>(future: F) -> PreloadResponse
where
  F: Future<Output = Option<Response>> + Send + 'static,
{
  Box::pin(future)
}

/// Result of resolving one request, including where the response came from.
#[derive(Debug)]
pub struct Resolution {
  /// The response handed back to the interception point
  pub response: Response,
  /// Which step of the strategy produced it
  pub source: ResolutionSource,
  /// When the data was cached (if from cache)
  pub stored_at: Option<DateTime<Utc>>,
}

impl Resolution {
  pub fn from_cache(response: Response, stored_at: DateTime<Utc>) -> Self {
    Self {
      response,
      source: ResolutionSource::Cache,
      stored_at: Some(stored_at),
    }
  }

  pub fn from_preload(response: Response) -> Self {
    Self {
      response,
      source: ResolutionSource::Preload,
      stored_at: None,
    }
  }

  pub fn from_network(response: Response) -> Self {
    Self {
      response,
      source: ResolutionSource::Network,
      stored_at: None,
    }
  }

  /// Offline mode - network unavailable, serving the fallback resource.
  pub fn fallback(response: Response, stored_at: DateTime<Utc>) -> Self {
    Self {
      response,
      source: ResolutionSource::Fallback,
      stored_at: Some(stored_at),
    }
  }

  /// Nothing could answer; serve the plain-text 408.
  pub fn synthesized() -> Self {
    Self {
      response: Response::network_error(),
      source: ResolutionSource::Synthesized,
      stored_at: None,
    }
  }
}

/// Indicates which step of the strategy answered a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
  /// Entry found in the active bucket
  Cache,
  /// Host-supplied preload response
  Preload,
  /// Fresh network fetch
  Network,
  /// Offline fallback resource from the bucket
  Fallback,
  /// Synthesized network error response
  Synthesized,
}

impl fmt::Display for ResolutionSource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Self::Cache => "cache",
      Self::Preload => "preload",
      Self::Network => "network",
      Self::Fallback => "fallback",
      Self::Synthesized => "synthesized",
    };
    f.write_str(name)
  }
}
