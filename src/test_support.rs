//! Scripted collaborators shared by the unit tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use url::Url;

use crate::cache::{CacheStorage, CacheStore, SqliteStorage, StoredResponse};
use crate::error::{CacheError, HostError, TransportError};
use crate::http::{Request, RequestKey, Response};
use crate::lifecycle::HostPlatform;
use crate::network::Network;

pub const ORIGIN: &str = "https://example.org/";

pub fn origin() -> Url {
  Url::parse(ORIGIN).unwrap()
}

/// GET request for `path` under [`ORIGIN`].
pub fn request(path: &str) -> Request {
  Request::get(origin().join(path).unwrap())
}

pub fn memory_store() -> CacheStore<SqliteStorage> {
  CacheStore::new(SqliteStorage::open_in_memory().unwrap())
}

enum Route {
  Respond { status: u16, body: Vec<u8> },
  Fail,
}

/// Network double answering from a per-URL script.
///
/// Unscripted URLs fail with a connection error, as if offline.
#[derive(Default)]
pub struct MockNetwork {
  routes: Mutex<HashMap<String, Route>>,
  calls: Mutex<Vec<String>>,
}

impl MockNetwork {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn respond(&self, path: &str, status: u16, body: &str) {
    self.routes.lock().unwrap().insert(
      request(path).url.to_string(),
      Route::Respond {
        status,
        body: body.as_bytes().to_vec(),
      },
    );
  }

  pub fn fail(&self, path: &str) {
    self
      .routes
      .lock()
      .unwrap()
      .insert(request(path).url.to_string(), Route::Fail);
  }

  /// URLs fetched so far, in order.
  pub fn calls(&self) -> Vec<String> {
    self.calls.lock().unwrap().clone()
  }
}

#[async_trait]
impl Network for MockNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response, TransportError> {
    let url = request.url.to_string();
    self.calls.lock().unwrap().push(url.clone());

    match self.routes.lock().unwrap().get(&url) {
      Some(Route::Respond { status, body }) => Ok(
        Response::new(*status)
          .with_header("Content-Type", "text/plain")
          .with_body(body.clone()),
      ),
      Some(Route::Fail) | None => Err(TransportError::Connect {
        url,
        reason: "connection refused".to_string(),
      }),
    }
  }
}

/// Storage whose writes always fail. Reads and bucket management work.
pub struct FailingStorage {
  inner: SqliteStorage,
}

impl FailingStorage {
  pub fn new() -> Self {
    Self {
      inner: SqliteStorage::open_in_memory().unwrap(),
    }
  }
}

impl CacheStorage for FailingStorage {
  fn create_bucket(&self, bucket: &str) -> Result<(), CacheError> {
    self.inner.create_bucket(bucket)
  }

  fn bucket_names(&self) -> Result<Vec<String>, CacheError> {
    self.inner.bucket_names()
  }

  fn delete_bucket(&self, bucket: &str) -> Result<bool, CacheError> {
    self.inner.delete_bucket(bucket)
  }

  fn get(&self, bucket: &str, key: &RequestKey) -> Result<Option<StoredResponse>, CacheError> {
    self.inner.get(bucket, key)
  }

  fn put(&self, bucket: &str, key: &RequestKey, _response: Response) -> Result<(), CacheError> {
    Err(CacheError::StorageWrite {
      bucket: bucket.to_string(),
      key: key.to_string(),
      reason: "disk full".to_string(),
    })
  }

  fn keys(&self, bucket: &str) -> Result<Vec<String>, CacheError> {
    self.inner.keys(bucket)
  }
}

/// Host double recording lifecycle signals.
pub struct MockHost {
  supports_preload: bool,
  fail_enable: bool,
  preload_enabled: AtomicBool,
  skip_waiting_calls: AtomicUsize,
}

impl MockHost {
  pub fn new(supports_preload: bool) -> Self {
    Self {
      supports_preload,
      fail_enable: false,
      preload_enabled: AtomicBool::new(false),
      skip_waiting_calls: AtomicUsize::new(0),
    }
  }

  /// A host that advertises navigation preload but fails to enable it.
  pub fn broken_preload() -> Self {
    Self {
      fail_enable: true,
      ..Self::new(true)
    }
  }

  pub fn preload_enabled(&self) -> bool {
    self.preload_enabled.load(Ordering::SeqCst)
  }

  pub fn skip_waiting_calls(&self) -> usize {
    self.skip_waiting_calls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl HostPlatform for MockHost {
  fn supports_navigation_preload(&self) -> bool {
    self.supports_preload
  }

  async fn enable_navigation_preload(&self) -> Result<(), HostError> {
    if self.fail_enable {
      return Err(HostError::Platform("preload manager busy".to_string()));
    }
    self.preload_enabled.store(true, Ordering::SeqCst);
    Ok(())
  }

  fn skip_waiting(&self) {
    self.skip_waiting_calls.fetch_add(1, Ordering::SeqCst);
  }
}
