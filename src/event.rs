use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::cache::{CacheStorage, PreloadResponse, Resolution};
use crate::error::CacheError;
use crate::http::Request;
use crate::lifecycle::{HostPlatform, Lifecycle};
use crate::network::Network;

/// Events delivered by the host platform
pub enum HostEvent {
  /// Populate the cache; `done` is the host's wait-until window
  Install {
    done: oneshot::Sender<Result<usize, CacheError>>,
  },
  /// Activation-time setup
  Activate {
    done: oneshot::Sender<Result<(), CacheError>>,
  },
  /// An intercepted request
  Fetch(FetchEvent),
}

/// An intercepted request awaiting its response
pub struct FetchEvent {
  pub request: Request,
  /// Response the host started fetching ahead of routing, if any
  pub preload: Option<PreloadResponse>,
  pub respond_with: oneshot::Sender<Resolution>,
}

/// Host-side handle that delivers events to the dispatcher
#[derive(Clone)]
pub struct EventHandler {
  tx: mpsc::UnboundedSender<HostEvent>,
}

impl EventHandler {
  /// Spawn the dispatcher. Each event runs in its own task.
  pub fn spawn<S, N, H>(lifecycle: Arc<Lifecycle<S, N, H>>) -> (Self, JoinHandle<()>)
  where
    S: CacheStorage + 'static,
    N: Network + 'static,
    H: HostPlatform + 'static,
  {
    let (tx, mut rx) = mpsc::unbounded_channel::<HostEvent>();

    let dispatcher = tokio::spawn(async move {
      while let Some(event) = rx.recv().await {
        let lifecycle = Arc::clone(&lifecycle);
        tokio::spawn(async move {
          match event {
            HostEvent::Install { done } => {
              let _ = done.send(lifecycle.install().await);
            }
            HostEvent::Activate { done } => {
              let _ = done.send(lifecycle.activate().await);
            }
            HostEvent::Fetch(fetch) => {
              let resolution = lifecycle.fetch(fetch.request, fetch.preload).await;
              // The host may have abandoned the request; the work still counts.
              if fetch.respond_with.send(resolution).is_err() {
                debug!("fetch event abandoned before response");
              }
            }
          }
        });
      }
    });

    (Self { tx }, dispatcher)
  }

  /// Send an install event and wait for it to settle
  pub async fn install(&self) -> Result<usize> {
    let (done, rx) = oneshot::channel();
    self.send(HostEvent::Install { done })?;
    Ok(rx.await.map_err(|_| eyre!("install event dropped"))??)
  }

  /// Send an activate event and wait for it to settle
  pub async fn activate(&self) -> Result<()> {
    let (done, rx) = oneshot::channel();
    self.send(HostEvent::Activate { done })?;
    Ok(rx.await.map_err(|_| eyre!("activate event dropped"))??)
  }

  /// Send a fetch event and wait for its response
  pub async fn fetch(&self, request: Request, preload: Option<PreloadResponse>) -> Result<Resolution> {
    let (respond_with, rx) = oneshot::channel();
    self.send(HostEvent::Fetch(FetchEvent {
      request,
      preload,
      respond_with,
    }))?;
    rx.await.map_err(|_| eyre!("fetch event dropped"))
  }

  fn send(&self, event: HostEvent) -> Result<()> {
    self
      .tx
      .send(event)
      .map_err(|_| eyre!("event dispatcher stopped"))
  }
}
