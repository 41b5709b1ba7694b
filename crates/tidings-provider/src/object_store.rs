// SPDX-FileCopyrightText: 2026 Tidings Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP-backed object store.
//!
//! Uploads with a plain PUT to `{endpoint}/{path}` and treats that same
//! URL as the public address of the object. Works against any
//! S3-compatible or plain blob endpoint that accepts anonymous or
//! pre-signed-by-proxy PUTs.

use std::time::Duration;

use async_trait::async_trait;
use tidings_core::{ObjectStore, TidingsError};
use tracing::debug;

/// Blob store client speaking plain HTTP PUT.
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpObjectStore {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, TidingsError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TidingsError::ObjectStore {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, TidingsError> {
        let url = format!("{}/{path}", self.endpoint);
        let response = self
            .client
            .put(&url)
            .header("content-type", content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| TidingsError::ObjectStore {
                message: format!("upload request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TidingsError::ObjectStore {
                message: format!("upload to {url} returned {status}"),
                source: None,
            });
        }
        debug!(url, "object uploaded");
        Ok(url)
    }
}
