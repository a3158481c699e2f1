//! # Forwarder Module
//!
//! Delivers telemetry records to the tracking server over HTTP.
//!
//! Each record becomes exactly one `POST` with a JSON body:
//!
//! ```text
//! {"node_id": 1, "latitude": -6.2, "longitude": 106.8}
//! ```
//!
//! Delivery is fire-and-forget: a failed request is reported to the caller
//! and the record is dropped. Nothing is retried or queued.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::ForwarderConfig;
use crate::error::Result;
use crate::telemetry::TelemetryRecord;

/// Body of the update request sent to the server
#[derive(Debug, Serialize, PartialEq)]
pub struct UpdateRequest<'a> {
    pub node_id: u32,
    pub latitude: &'a Value,
    pub longitude: &'a Value,
}

/// Outcome of one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendResult {
    /// Server answered 200
    Delivered,
    /// Server answered with any other status code
    HttpError(u16),
    /// No response (DNS, refused connection, TLS, timeout)
    TransportError(String),
}

/// Sends one record somewhere
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Forward: Send + Sync {
    async fn forward(&self, record: &TelemetryRecord) -> SendResult;
}

/// Forwards records to a fixed URL with a fixed node id
#[derive(Debug, Clone)]
pub struct HttpForwarder {
    client: Client,
    url: String,
    node_id: u32,
}

impl HttpForwarder {
    /// Build the forwarder and its HTTP client
    ///
    /// No request timeout is set unless `timeout_ms` is configured.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be constructed (e.g. no TLS backend)
    pub fn new(config: &ForwarderConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            url: config.url.clone(),
            node_id: config.node_id,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn node_id(&self) -> u32 {
        self.node_id
    }

    /// Payload for `record`
    pub fn request_for<'a>(&self, record: &'a TelemetryRecord) -> UpdateRequest<'a> {
        UpdateRequest {
            node_id: self.node_id,
            latitude: &record.latitude,
            longitude: &record.longitude,
        }
    }
}

#[async_trait]
impl Forward for HttpForwarder {
    async fn forward(&self, record: &TelemetryRecord) -> SendResult {
        let payload = self.request_for(record);
        debug!("POST {} {:?}", self.url, payload);

        match self.client.post(&self.url).json(&payload).send().await {
            Ok(response) if response.status() == StatusCode::OK => SendResult::Delivered,
            Ok(response) => SendResult::HttpError(response.status().as_u16()),
            Err(e) => SendResult::TransportError(error_chain(&e)),
        }
    }
}

/// Render an error with all of its sources
///
/// reqwest's top-level message only names the URL; the cause (refused, DNS,
/// timeout) sits further down the chain.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
