//! Host platform used when the agent is driven from the command line.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

use crate::cache::{preload, PreloadResponse};
use crate::error::HostError;
use crate::http::Request;
use crate::lifecycle::HostPlatform;
use crate::network::Network;

/// In-process host. Supports navigation preload by starting the network
/// fetch for navigations before they are routed to the agent.
#[derive(Default)]
pub struct LocalHost {
  preload_enabled: AtomicBool,
}

impl LocalHost {
  pub fn new() -> Self {
    Self::default()
  }

  /// Start a speculative fetch for a navigation, if preload is enabled.
  pub fn preload_for<N>(&self, request: &Request, network: Arc<N>) -> Option<PreloadResponse>
  where
    N: Network + 'static,
  {
    if !self.preload_enabled.load(Ordering::SeqCst) {
      return None;
    }

    let request = request.clone();
    let speculative = tokio::spawn(async move { network.fetch(&request).await.ok() });
    Some(preload(async move { speculative.await.ok().flatten() }))
  }
}

#[async_trait]
impl HostPlatform for LocalHost {
  fn supports_navigation_preload(&self) -> bool {
    true
  }

  async fn enable_navigation_preload(&self) -> Result<(), HostError> {
    self.preload_enabled.store(true, Ordering::SeqCst);
    Ok(())
  }

  fn skip_waiting(&self) {
    info!("skip waiting: taking control of open clients");
  }
}
