//! Relay access seam for the monitor loop.

use async_trait::async_trait;

use crate::api::models::{FetchEnvelope, FetchRequest};
use crate::error::{AppError, Result};

/// How the monitor reaches the fetch relay.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Submit a request and return the relay's envelope. Err means the relay
    /// itself was unreachable; a refused upstream is a failure envelope.
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchEnvelope>;
}

/// Production fetcher: POSTs to a running relay endpoint.
pub struct RelayClient {
    endpoint: String,
    client: reqwest::Client,
}

impl RelayClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        RelayClient {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Fetcher for RelayClient {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchEnvelope> {
        tracing::debug!("POST {} for {}", self.endpoint, request.url);

        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::FetchError(format!("Relay request failed: {}", e)))?;

        // Failure envelopes ride on non-2xx statuses; the body tells the story
        // either way.
        response
            .json::<FetchEnvelope>()
            .await
            .map_err(|e| AppError::ParseError(format!("Invalid relay response: {}", e)))
    }
}
