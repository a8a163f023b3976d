//! Error taxonomy for the cache, the preloader and the network layer.

use thiserror::Error;

/// Errors raised by the cache store, the bulk preloader and the lifecycle.
#[derive(Debug, Error)]
pub enum CacheError {
  /// The storage backend could not be opened or refused access.
  #[error("cache storage unavailable: {0}")]
  StorageUnavailable(String),

  /// Reading an entry failed.
  #[error("failed to read from bucket {bucket}: {reason}")]
  StorageRead { bucket: String, reason: String },

  /// Writing an entry failed. Swallowed on the request path.
  #[error("failed to store {key} in bucket {bucket}: {reason}")]
  StorageWrite {
    bucket: String,
    key: String,
    reason: String,
  },

  /// One manifest resource could not be fetched during install.
  #[error("failed to preload {resource}: {reason}")]
  PreloadPopulationFailure { resource: String, reason: String },

  /// A stored response could not be (de)serialized.
  #[error("malformed stored response: {0}")]
  Serialization(#[from] serde_json::Error),
}

/// A connectivity-level failure, as opposed to an HTTP error status.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
  #[error("connection to {url} failed: {reason}")]
  Connect { url: String, reason: String },

  #[error("request to {url} timed out")]
  Timeout { url: String },

  #[error("failed to fetch {url}: {reason}")]
  Other { url: String, reason: String },
}

/// Failures reported by the host platform.
#[derive(Debug, Error)]
pub enum HostError {
  #[error("host platform error: {0}")]
  Platform(String),
}
