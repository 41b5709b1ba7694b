// SPDX-FileCopyrightText: 2026 Tidings Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client trait for the remote messaging gateway.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TidingsError;
use crate::types::RemoteChat;

/// Client for the WhatsApp gateway's polling API.
///
/// All calls are blocking I/O from the caller's perspective. Callers that
/// treat a result as non-essential (profile pictures, media payloads) must
/// degrade gracefully instead of propagating the error.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Provision or re-connect the remote session for an instance.
    ///
    /// Returns the pairing QR credential when the gateway issued one.
    async fn connect_instance(&self, instance: &str) -> Result<Option<String>, TidingsError>;

    /// Current remote connection state string (provider vocabulary).
    async fn connection_state(&self, instance: &str) -> Result<String, TidingsError>;

    /// Tear down the remote session.
    async fn logout_instance(&self, instance: &str) -> Result<(), TidingsError>;

    /// List up to `limit` remote threads, most recently active first.
    async fn list_chats(&self, instance: &str, limit: u32)
        -> Result<Vec<RemoteChat>, TidingsError>;

    /// List up to `limit` most recent raw message payloads for one thread.
    async fn list_messages(
        &self,
        instance: &str,
        remote_jid: &str,
        limit: u32,
    ) -> Result<Vec<Value>, TidingsError>;

    /// Fetch the avatar URL for one remote contact, if any.
    async fn profile_picture_url(
        &self,
        instance: &str,
        remote_jid: &str,
    ) -> Result<Option<String>, TidingsError>;

    /// Download the binary payload of a media message.
    ///
    /// The gateway returns either raw base64 or a data-URL-wrapped string.
    async fn download_media(&self, instance: &str, message: &Value)
        -> Result<String, TidingsError>;
}
