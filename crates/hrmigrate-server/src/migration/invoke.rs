//! Invocation channel between the dispatcher and the validate/load stage
//!
//! An invocation never fails from the dispatcher's point of view: whatever
//! happens is folded into a status code and a body, which end up verbatim in
//! the audit log.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::pipeline::{BatchRequest, Pipeline};

/// Route served by `hrmigrate-server` for remote invocations
pub const BATCHES_PATH: &str = "/api/v1/batches";

/// Per-request timeout for remote invocations
pub const DEFAULT_INVOKE_TIMEOUT_SECS: u64 = 300;

/// Status recorded when the request never produced an HTTP response
pub const TRANSPORT_FAILURE_STATUS: u16 = 0;

#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Invalid endpoint '{0}': expected an http(s) URL")]
    InvalidEndpoint(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationResponse {
    pub status: u16,
    pub body: String,
}

impl InvocationResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait BatchInvoker: Send + Sync {
    async fn invoke(&self, request: BatchRequest) -> InvocationResponse;
}

/// Runs the pipeline in-process
#[derive(Clone)]
pub struct LocalInvoker {
    pipeline: Pipeline,
}

impl LocalInvoker {
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl BatchInvoker for LocalInvoker {
    async fn invoke(&self, request: BatchRequest) -> InvocationResponse {
        let outcome = match self.pipeline.process(request).await {
            Ok(outcome) => outcome,
            Err(e) => return InvocationResponse::new(500, e.to_string()),
        };

        match serde_json::to_string(&outcome) {
            Ok(body) => InvocationResponse::new(200, body),
            Err(e) => InvocationResponse::new(500, e.to_string()),
        }
    }
}

/// Posts batches as JSON to a remote `hrmigrate-server`
#[derive(Clone)]
pub struct HttpInvoker {
    client: Client,
    url: String,
}

impl HttpInvoker {
    pub fn new(endpoint: &str) -> Result<Self, InvokeError> {
        Self::with_timeout(endpoint, Duration::from_secs(DEFAULT_INVOKE_TIMEOUT_SECS))
    }

    pub fn with_timeout(endpoint: &str, timeout: Duration) -> Result<Self, InvokeError> {
        let base = endpoint.trim_end_matches('/');
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(InvokeError::InvalidEndpoint(endpoint.to_string()));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            url: format!("{}{}", base, BATCHES_PATH),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl BatchInvoker for HttpInvoker {
    async fn invoke(&self, request: BatchRequest) -> InvocationResponse {
        let batch_id = request.batch_id;

        let response = match self.client.post(&self.url).json(&request).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(batch_id, error = %e, "Invocation transport failure");
                return InvocationResponse::new(TRANSPORT_FAILURE_STATUS, e.to_string());
            },
        };

        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => format!("failed to read response body: {e}"),
        };

        debug!(batch_id, status, "Invocation completed");
        InvocationResponse::new(status, body)
    }
}
