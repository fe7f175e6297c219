//! HTTP client posting chunks to the collection endpoint.

use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Name of the multipart field carrying the chunk.
pub const CHUNK_FIELD: &str = "chunk";

/// A single upload attempt failed.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The HTTP client could not be built
    #[error("Upload client error: {0}")]
    Client(String),

    /// Network/transport error
    #[error("Upload network error: {0}")]
    Network(String),

    /// Server returned a non-2xx response
    #[error("Upload server error ({status}): {message}")]
    Status { status: u16, message: String },

    /// Server returned 2xx but the body was not JSON
    #[error("Upload response was not JSON: {0}")]
    InvalidResponse(String),
}

impl UploadError {
    /// HTTP status code, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            UploadError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The upstream provider is temporarily blocking traffic.
    pub fn is_forbidden(&self) -> bool {
        self.status() == Some(StatusCode::FORBIDDEN.as_u16())
    }
}

/// Posts serialized chunks as `multipart/form-data`.
#[derive(Debug, Clone)]
pub struct UploadClient {
    client: reqwest::Client,
}

impl UploadClient {
    /// Create a new upload client with the given per-request timeout.
    pub fn new(request_timeout: Duration) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| UploadError::Client(e.to_string()))?;

        Ok(Self { client })
    }

    /// POST one chunk. Success is a 2xx response with a JSON body, which is
    /// returned as-is.
    pub async fn post_chunk(
        &self,
        endpoint: &str,
        chunk: Bytes,
    ) -> Result<serde_json::Value, UploadError> {
        let len = chunk.len() as u64;
        let part = Part::stream_with_length(Body::from(chunk), len)
            .file_name("chunk.bin")
            .mime_str("application/octet-stream")
            .map_err(|e| UploadError::Client(e.to_string()))?;
        let form = Form::new().part(CHUNK_FIELD, part);

        let response = self
            .client
            .post(endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(UploadError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| UploadError::InvalidResponse(e.to_string()))?;

        debug!(endpoint, bytes = len, "Chunk accepted");
        Ok(body)
    }
}
