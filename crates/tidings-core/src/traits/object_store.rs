// SPDX-FileCopyrightText: 2026 Tidings Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Upload contract for durable object storage.

use async_trait::async_trait;

use crate::error::TidingsError;

/// Durable object storage collaborator.
///
/// Only the upload contract is part of this engine; the storage itself is
/// an external system.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload `bytes` at `path` and return the public URL.
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, TidingsError>;
}
