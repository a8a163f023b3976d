//! Versioned bucket naming and the handle used to read and write a bucket.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use super::storage::{CacheStorage, StoredResponse};
use crate::error::CacheError;
use crate::http::{Request, Response};

/// A version-qualified bucket name, rendered as `namespace-version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketName {
  namespace: String,
  version: u32,
}

impl BucketName {
  pub fn new(namespace: impl Into<String>, version: u32) -> Self {
    Self {
      namespace: namespace.into(),
      version,
    }
  }

  /// Parse `namespace-version`. The namespace itself may contain dashes.
  pub fn parse(name: &str) -> Option<Self> {
    let (namespace, version) = name.rsplit_once('-')?;
    if namespace.is_empty() {
      return None;
    }
    let version = version.parse().ok()?;
    Some(Self::new(namespace, version))
  }

  pub fn namespace(&self) -> &str {
    &self.namespace
  }

  pub fn version(&self) -> u32 {
    self.version
  }
}

impl fmt::Display for BucketName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}-{}", self.namespace, self.version)
  }
}

/// Entry point to the storage backend. Cheap to clone.
pub struct CacheStore<S: CacheStorage> {
  storage: Arc<S>,
}

impl<S: CacheStorage> CacheStore<S> {
  pub fn new(storage: S) -> Self {
    Self {
      storage: Arc::new(storage),
    }
  }

  /// Open a bucket, creating it if absent. Safe to call repeatedly.
  pub fn open(&self, name: &BucketName) -> Result<BucketHandle<S>, CacheError> {
    let name = name.to_string();
    self.storage.create_bucket(&name)?;
    debug!(bucket = %name, "opened cache bucket");

    Ok(BucketHandle {
      storage: Arc::clone(&self.storage),
      name,
    })
  }

  /// Names of every bucket in the backend, including abandoned versions.
  pub fn buckets(&self) -> Result<Vec<String>, CacheError> {
    self.storage.bucket_names()
  }

  pub fn delete_bucket(&self, name: &str) -> Result<bool, CacheError> {
    self.storage.delete_bucket(name)
  }

  /// Delete buckets of the same namespace whose version differs from `active`.
  ///
  /// Buckets that do not parse as `namespace-version` are left alone.
  pub fn purge_stale(&self, active: &BucketName) -> Result<Vec<String>, CacheError> {
    let mut purged = Vec::new();

    for name in self.buckets()? {
      let stale = BucketName::parse(&name)
        .is_some_and(|b| b.namespace() == active.namespace() && b.version() != active.version());

      if stale && self.delete_bucket(&name)? {
        info!(bucket = %name, "purged stale cache bucket");
        purged.push(name);
      }
    }

    Ok(purged)
  }
}

impl<S: CacheStorage> Clone for CacheStore<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
    }
  }
}

/// An opened bucket. Every read and write goes through a handle.
pub struct BucketHandle<S: CacheStorage> {
  storage: Arc<S>,
  name: String,
}

impl<S: CacheStorage> BucketHandle<S> {
  pub fn name(&self) -> &str {
    &self.name
  }

  /// Look up the entry for `request`. Never mutates the bucket.
  pub fn lookup(&self, request: &Request) -> Result<Option<StoredResponse>, CacheError> {
    self.storage.get(&self.name, &request.key())
  }

  /// Upsert the entry for `request`, taking ownership of the response.
  pub fn store(&self, request: &Request, response: Response) -> Result<(), CacheError> {
    self.storage.put(&self.name, &request.key(), response)
  }

  /// Readable keys of all entries.
  pub fn keys(&self) -> Result<Vec<String>, CacheError> {
    self.storage.keys(&self.name)
  }

  pub fn len(&self) -> Result<usize, CacheError> {
    Ok(self.keys()?.len())
  }
}

impl<S: CacheStorage> Clone for BucketHandle<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      name: self.name.clone(),
    }
  }
}
