//! Fire-and-forget cache writes.
//!
//! The resolution strategy must never wait on storage. Writes are queued on
//! an unbounded channel and applied by a single background task; failures
//! are reported on a separate channel that is drained independently.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::bucket::BucketHandle;
use super::storage::CacheStorage;
use crate::error::CacheError;
use crate::http::{Request, Response};

enum WriteJob {
  Store { request: Request, response: Response },
  Flush(oneshot::Sender<()>),
}

/// A cache write that did not land.
#[derive(Debug)]
pub struct WriteFailure {
  pub bucket: String,
  pub key: String,
  pub error: CacheError,
}

/// Handle to the background writer task. Cheap to clone.
#[derive(Clone)]
pub struct BackgroundWriter {
  tx: mpsc::UnboundedSender<WriteJob>,
}

impl BackgroundWriter {
  /// Spawn the writer task for `bucket`.
  ///
  /// Returns the writer handle and the receiving end of its error channel.
  pub fn spawn<S>(bucket: BucketHandle<S>) -> (Self, mpsc::UnboundedReceiver<WriteFailure>)
  where
    S: CacheStorage + 'static,
  {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (err_tx, err_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
      while let Some(job) = rx.recv().await {
        match job {
          WriteJob::Store { request, response } => {
            let key = request.key();
            match bucket.store(&request, response) {
              Ok(()) => debug!(bucket = bucket.name(), key = %key, "cached response"),
              Err(error) => {
                // Nobody listening is fine; the failure is dropped.
                let _ = err_tx.send(WriteFailure {
                  bucket: bucket.name().to_string(),
                  key: key.to_string(),
                  error,
                });
              }
            }
          }
          WriteJob::Flush(done) => {
            let _ = done.send(());
          }
        }
      }
    });

    (Self { tx }, err_rx)
  }

  /// Queue `response` to be stored under `request`. Returns immediately.
  pub fn enqueue(&self, request: Request, response: Response) {
    if self.tx.send(WriteJob::Store { request, response }).is_err() {
      warn!("cache writer stopped, dropping write");
    }
  }

  /// Wait until every write queued before this call has been applied.
  pub async fn flush(&self) {
    let (done_tx, done_rx) = oneshot::channel();
    if self.tx.send(WriteJob::Flush(done_tx)).is_ok() {
      let _ = done_rx.await;
    }
  }
}

/// Spawn a task that logs every write failure.
pub fn log_failures(mut failures: mpsc::UnboundedReceiver<WriteFailure>) -> JoinHandle<()> {
  tokio::spawn(async move {
    while let Some(failure) = failures.recv().await {
      warn!(
        bucket = %failure.bucket,
        key = %failure.key,
        error = %failure.error,
        "background cache write failed"
      );
    }
  })
}
