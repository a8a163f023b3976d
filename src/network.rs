//! Network access for the strategy and the preloader.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::error::TransportError;
use crate::http::{Request, Response};

/// Issues requests over the network.
///
/// Any HTTP status counts as a successful fetch. Only connectivity-level
/// problems are reported as [`TransportError`].
#[async_trait]
pub trait Network: Send + Sync {
  async fn fetch(&self, request: &Request) -> Result<Response, TransportError>;
}

/// [`Network`] backed by a `reqwest` client.
#[derive(Clone)]
pub struct HttpNetwork {
  client: reqwest::Client,
}

impl HttpNetwork {
  pub fn new(timeout: Duration) -> Result<Self, TransportError> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .user_agent(concat!("swcache/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| TransportError::Other {
        url: String::new(),
        reason: format!("failed to build http client: {}", e),
      })?;

    Ok(Self { client })
  }
}

#[async_trait]
impl Network for HttpNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response, TransportError> {
    let url = request.url.to_string();

    let mut builder = self
      .client
      .request(request.method.clone(), request.url.clone());
    for (name, value) in &request.headers {
      builder = builder.header(name, value);
    }

    let response = builder.send().await.map_err(|e| classify(&url, e))?;

    let status = response.status();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();

    let body = response.bytes().await.map_err(|e| classify(&url, e))?;
    debug!(url = %url, status = status.as_u16(), bytes = body.len(), "fetched");

    Ok(Response {
      status: status.as_u16(),
      status_text: status.canonical_reason().unwrap_or_default().to_string(),
      headers,
      body: body.to_vec(),
    })
  }
}

/// Map a `reqwest` error onto the transport taxonomy.
fn classify(url: &str, error: reqwest::Error) -> TransportError {
  if error.is_timeout() {
    TransportError::Timeout {
      url: url.to_string(),
    }
  } else if error.is_connect() {
    TransportError::Connect {
      url: url.to_string(),
      reason: error.to_string(),
    }
  } else {
    TransportError::Other {
      url: url.to_string(),
      reason: error.to_string(),
    }
  }
}
