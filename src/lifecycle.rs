//! Install / activate / fetch handling.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::cache::{
  log_failures, BackgroundWriter, BucketName, CacheFirst, CacheStorage, CacheStore,
  PreloadResponse, Resolution,
};
use crate::error::{CacheError, HostError};
use crate::http::Request;
use crate::network::Network;
use crate::preload;

/// Capabilities of the platform hosting the agent.
#[async_trait]
pub trait HostPlatform: Send + Sync {
  /// Whether the host can start navigation fetches ahead of routing.
  fn supports_navigation_preload(&self) -> bool;

  async fn enable_navigation_preload(&self) -> Result<(), HostError>;

  /// Take control of already-open clients without waiting for a reload.
  fn skip_waiting(&self);
}

/// Everything the lifecycle needs from configuration.
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
  pub bucket: BucketName,
  pub manifest: Vec<Request>,
  pub fallback: Request,
  pub navigation_preload: bool,
  /// Delete other versions of the bucket on activation
  pub purge_stale_buckets: bool,
  pub preload_concurrency: usize,
}

/// Reacts to host lifecycle events against one versioned bucket.
pub struct Lifecycle<S: CacheStorage, N: Network, H: HostPlatform> {
  settings: LifecycleSettings,
  store: CacheStore<S>,
  network: Arc<N>,
  host: Arc<H>,
  strategy: OnceCell<CacheFirst<S, N>>,
}

impl<S, N, H> Lifecycle<S, N, H>
where
  S: CacheStorage + 'static,
  N: Network + 'static,
  H: HostPlatform,
{
  pub fn new(
    settings: LifecycleSettings,
    store: CacheStore<S>,
    network: Arc<N>,
    host: Arc<H>,
  ) -> Self {
    Self {
      settings,
      store,
      network,
      host,
      strategy: OnceCell::new(),
    }
  }

  /// Populate the bucket from the manifest.
  ///
  /// Signals skip-waiting first. Fails if storage is unavailable or any
  /// manifest resource cannot be fetched; the host should retry later.
  pub async fn install(&self) -> Result<usize, CacheError> {
    self.host.skip_waiting();

    let bucket = self.store.open(&self.settings.bucket)?;
    info!(
      bucket = bucket.name(),
      resources = self.settings.manifest.len(),
      "installing"
    );

    let count = preload::populate(
      &bucket,
      self.network.as_ref(),
      &self.settings.manifest,
      self.settings.preload_concurrency,
    )
    .await
    .inspect_err(|e| error!(error = %e, "install failed"))?;

    Ok(count)
  }

  /// Enable navigation preload if possible; optionally purge stale buckets.
  pub async fn activate(&self) -> Result<(), CacheError> {
    if self.settings.purge_stale_buckets {
      let purged = self.store.purge_stale(&self.settings.bucket)?;
      if !purged.is_empty() {
        info!(count = purged.len(), "purged stale buckets");
      }
    }

    if self.settings.navigation_preload {
      if self.host.supports_navigation_preload() {
        match self.host.enable_navigation_preload().await {
          Ok(()) => info!("navigation preload enabled"),
          Err(e) => warn!(error = %e, "failed to enable navigation preload"),
        }
      } else {
        debug!("navigation preload not supported by host");
      }
    }

    Ok(())
  }

  /// Resolve one intercepted request. Always produces a response.
  ///
  /// Every request goes through the strategy, whatever its method or origin.
  pub async fn fetch(&self, request: Request, preload: Option<PreloadResponse>) -> Resolution {
    match self.strategy().await {
      Ok(strategy) => {
        strategy
          .resolve(&request, preload, &self.settings.fallback)
          .await
      }
      Err(e) => {
        error!(error = %e, "cache unavailable, passing through");
        self.pass_through(&request).await
      }
    }
  }

  /// Wait for all queued background cache writes to land.
  pub async fn flush(&self) {
    if let Some(strategy) = self.strategy.get() {
      strategy.writer().flush().await;
    }
  }

  /// Open the bucket and start the background writer on first use.
  async fn strategy(&self) -> Result<&CacheFirst<S, N>, CacheError> {
    self
      .strategy
      .get_or_try_init(|| async {
        let bucket = self.store.open(&self.settings.bucket)?;
        let (writer, failures) = BackgroundWriter::spawn(bucket.clone());
        log_failures(failures);
        Ok::<_, CacheError>(CacheFirst::new(bucket, Arc::clone(&self.network), writer))
      })
      .await
  }

  /// Plain network fetch for when the bucket cannot be opened.
  async fn pass_through(&self, request: &Request) -> Resolution {
    match self.network.fetch(request).await {
      Ok(response) => Resolution::from_network(response),
      Err(e) => {
        warn!(url = %request.url, error = %e, "network unavailable");
        Resolution::synthesized()
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{preload, ResolutionSource, SqliteStorage};
  use crate::http::Response;
  use crate::test_support::{memory_store, request, MockHost, MockNetwork};
  use reqwest::Method;
  use url::Url;

  fn settings(manifest: &[&str]) -> LifecycleSettings {
    LifecycleSettings {
      bucket: BucketName::new("demo", 2),
      manifest: manifest.iter().map(|p| request(p)).collect(),
      fallback: request("/offline.html"),
      navigation_preload: true,
      purge_stale_buckets: false,
      preload_concurrency: 4,
    }
  }

  fn build(
    settings: LifecycleSettings,
    network: Arc<MockNetwork>,
    host: Arc<MockHost>,
  ) -> (
    Lifecycle<SqliteStorage, MockNetwork, MockHost>,
    CacheStore<SqliteStorage>,
  ) {
    let store = memory_store();
    (
      Lifecycle::new(settings, store.clone(), network, host),
      store,
    )
  }

  #[tokio::test]
  async fn test_install_populates_and_skips_waiting() {
    let network = Arc::new(MockNetwork::new());
    network.respond("/app.js", 200, "js");
    network.respond("/offline.html", 200, "offline");
    let host = Arc::new(MockHost::new(true));
    let (lifecycle, store) = build(
      settings(&["/app.js", "/offline.html"]),
      network,
      host.clone(),
    );

    assert_eq!(lifecycle.install().await.unwrap(), 2);
    assert_eq!(host.skip_waiting_calls(), 1);

    let bucket = store.open(&BucketName::new("demo", 2)).unwrap();
    assert_eq!(bucket.len().unwrap(), 2);
  }

  #[tokio::test]
  async fn test_install_fails_when_a_resource_is_unreachable() {
    let network = Arc::new(MockNetwork::new());
    network.respond("/app.js", 200, "js");
    let host = Arc::new(MockHost::new(true));
    let (lifecycle, _store) = build(settings(&["/app.js", "/down.css"]), network, host);

    let err = lifecycle.install().await.unwrap_err();
    assert!(matches!(err, CacheError::PreloadPopulationFailure { .. }));
  }

  #[tokio::test]
  async fn test_activate_enables_navigation_preload() {
    let host = Arc::new(MockHost::new(true));
    let (lifecycle, _store) = build(settings(&[]), Arc::new(MockNetwork::new()), host.clone());

    lifecycle.activate().await.unwrap();
    assert!(host.preload_enabled());
  }

  #[tokio::test]
  async fn test_activate_tolerates_missing_or_broken_preload() {
    let unsupported = Arc::new(MockHost::new(false));
    let (lifecycle, _store) = build(
      settings(&[]),
      Arc::new(MockNetwork::new()),
      unsupported.clone(),
    );
    lifecycle.activate().await.unwrap();
    assert!(!unsupported.preload_enabled());

    let broken = Arc::new(MockHost::broken_preload());
    let (lifecycle, _store) = build(settings(&[]), Arc::new(MockNetwork::new()), broken);
    assert!(lifecycle.activate().await.is_ok());
  }

  #[tokio::test]
  async fn test_activate_purges_only_when_configured() {
    let network = Arc::new(MockNetwork::new());
    let host = Arc::new(MockHost::new(false));

    let (keep, store) = build(settings(&[]), network.clone(), host.clone());
    store.open(&BucketName::new("demo", 1)).unwrap();
    keep.activate().await.unwrap();
    assert_eq!(store.buckets().unwrap(), vec!["demo-1".to_string()]);

    let mut purging = settings(&[]);
    purging.purge_stale_buckets = true;
    let (purge, store) = build(purging, network, host);
    store.open(&BucketName::new("demo", 1)).unwrap();
    store.open(&BucketName::new("demo", 2)).unwrap();
    purge.activate().await.unwrap();
    assert_eq!(store.buckets().unwrap(), vec!["demo-2".to_string()]);
  }

  #[tokio::test]
  async fn test_fetch_serves_offline_fallback_after_install() {
    let network = Arc::new(MockNetwork::new());
    network.respond("/offline.html", 200, "<p>offline</p>");
    let host = Arc::new(MockHost::new(true));
    let (lifecycle, _store) = build(settings(&["/offline.html"]), network, host);

    lifecycle.install().await.unwrap();
    let resolution = lifecycle.fetch(request("/missing.png"), None).await;

    assert_eq!(resolution.source, ResolutionSource::Fallback);
    assert_eq!(resolution.response.body, b"<p>offline</p>");
  }

  #[tokio::test]
  async fn test_fetch_uses_preload_and_caches_it() {
    let network = Arc::new(MockNetwork::new());
    let host = Arc::new(MockHost::new(true));
    let (lifecycle, store) = build(settings(&[]), network.clone(), host);

    let resolution = lifecycle
      .fetch(
        request("/post/1"),
        Some(preload(async { Some(Response::new(200).with_body("post")) })),
      )
      .await;
    assert_eq!(resolution.source, ResolutionSource::Preload);
    assert!(network.calls().is_empty());

    lifecycle.flush().await;
    let bucket = store.open(&BucketName::new("demo", 2)).unwrap();
    assert!(bucket.lookup(&request("/post/1")).unwrap().is_some());
  }

  #[tokio::test]
  async fn test_installed_page_is_served_from_cache_offline() {
    let network = Arc::new(MockNetwork::new());
    network.respond("/templates/offline.html", 200, "offline");
    let host = Arc::new(MockHost::new(true));
    let mut settings = settings(&["/templates/offline.html"]);
    settings.fallback = request("/templates/offline.html");
    let (lifecycle, _store) = build(settings, network.clone(), host);

    lifecycle.install().await.unwrap();
    network.fail("/templates/offline.html");
    let calls = network.calls().len();

    let resolution = lifecycle
      .fetch(request("/templates/offline.html"), None)
      .await;
    assert_eq!(resolution.source, ResolutionSource::Cache);
    assert_eq!(resolution.response.body, b"offline");
    assert_eq!(network.calls().len(), calls);
  }

  #[tokio::test]
  async fn test_cross_origin_get_offline_serves_fallback() {
    let network = Arc::new(MockNetwork::new());
    network.respond("/offline.html", 200, "offline");
    let host = Arc::new(MockHost::new(true));
    let (lifecycle, _store) = build(settings(&["/offline.html"]), network, host);
    lifecycle.install().await.unwrap();

    let foreign = Request::get(Url::parse("https://cdn.example.com/lib.js").unwrap());
    let resolution = lifecycle.fetch(foreign, None).await;
    assert_eq!(resolution.source, ResolutionSource::Fallback);
    assert_eq!(resolution.response.body, b"offline");
  }

  #[tokio::test]
  async fn test_post_offline_serves_fallback() {
    let network = Arc::new(MockNetwork::new());
    network.respond("/offline.html", 200, "offline");
    let host = Arc::new(MockHost::new(true));
    let (lifecycle, _store) = build(settings(&["/offline.html"]), network, host);
    lifecycle.install().await.unwrap();

    let post = request("/form").with_method(Method::POST);
    let resolution = lifecycle.fetch(post, None).await;
    assert_eq!(resolution.source, ResolutionSource::Fallback);
    assert_eq!(resolution.response.body, b"offline");
  }

  #[tokio::test]
  async fn test_post_response_is_not_stored() {
    let network = Arc::new(MockNetwork::new());
    network.respond("/form", 200, "posted");
    let host = Arc::new(MockHost::new(true));
    let (lifecycle, store) = build(settings(&[]), network.clone(), host);

    let post = request("/form").with_method(Method::POST);
    let first = lifecycle.fetch(post.clone(), None).await;
    assert_eq!(first.source, ResolutionSource::Network);

    lifecycle.flush().await;
    let bucket = store.open(&BucketName::new("demo", 2)).unwrap();
    assert!(bucket.keys().unwrap().is_empty());

    let second = lifecycle.fetch(post, None).await;
    assert_eq!(second.source, ResolutionSource::Network);
    assert_eq!(network.calls().len(), 2);
  }
}
