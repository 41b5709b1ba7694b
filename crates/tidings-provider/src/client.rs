// SPDX-FileCopyrightText: 2026 Tidings Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Evolution-style WhatsApp gateway.
//!
//! The gateway authenticates with an `apikey` header and is loose about
//! response shapes, so every read here probes a couple of known locations
//! before giving up.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::{Value, json};
use tidings_core::{ProviderClient, RemoteChat, TidingsError, normalize_unix_seconds};
use tracing::debug;

/// Client for the gateway's REST API.
#[derive(Debug, Clone)]
pub struct EvolutionClient {
    client: reqwest::Client,
    base_url: String,
}

impl EvolutionClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, TidingsError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(api_key)
                .map_err(|e| TidingsError::Config(format!("invalid api key header value: {e}")))?,
        );
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| TidingsError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get(&self, path: &str) -> Result<Value, TidingsError> {
        let url = format!("{}{path}", self.base_url);
        let response = self.client.get(&url).send().await.map_err(request_err)?;
        read_json(response).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, TidingsError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(request_err)?;
        read_json(response).await
    }

    async fn delete(&self, path: &str) -> Result<(), TidingsError> {
        let url = format!("{}{path}", self.base_url);
        let response = self.client.delete(&url).send().await.map_err(request_err)?;
        if !response.status().is_success() {
            return Err(status_err(response.status()));
        }
        Ok(())
    }
}

fn request_err(e: reqwest::Error) -> TidingsError {
    TidingsError::Provider {
        message: format!("gateway request failed: {e}"),
        source: Some(Box::new(e)),
    }
}

fn status_err(status: reqwest::StatusCode) -> TidingsError {
    TidingsError::Provider {
        message: format!("gateway returned {status}"),
        source: None,
    }
}

async fn read_json(response: reqwest::Response) -> Result<Value, TidingsError> {
    let status = response.status();
    if !status.is_success() {
        return Err(status_err(status));
    }
    response.json().await.map_err(|e| TidingsError::Provider {
        message: format!("gateway returned invalid JSON: {e}"),
        source: Some(Box::new(e)),
    })
}

fn string_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut current = value;
    for key in path {
        current = current.get(key)?;
    }
    current.as_str().filter(|s| !s.is_empty())
}

/// QR payload locations vary by gateway version.
fn resolve_qr(body: &Value) -> Option<String> {
    string_at(body, &["base64"])
        .or_else(|| string_at(body, &["qrcode", "base64"]))
        .or_else(|| string_at(body, &["code"]))
        .map(str::to_string)
}

fn chat_from_value(chat: &Value) -> Option<RemoteChat> {
    let remote_jid = string_at(chat, &["remoteJid"])
        .or_else(|| string_at(chat, &["id"]))?
        .to_string();
    let ts = chat
        .get("lastMsgTimestamp")
        .or_else(|| chat.get("updatedAt"))
        .and_then(|v| match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        })
        .map(normalize_unix_seconds);
    Some(RemoteChat {
        remote_jid,
        display_name: string_at(chat, &["pushName"])
            .or_else(|| string_at(chat, &["name"]))
            .map(str::to_string),
        last_message_ts: ts,
        is_group: chat.get("isGroup").and_then(Value::as_bool),
        is_broadcast: chat.get("isBroadcast").and_then(Value::as_bool),
    })
}

#[async_trait]
impl ProviderClient for EvolutionClient {
    async fn connect_instance(&self, instance: &str) -> Result<Option<String>, TidingsError> {
        let body = self.get(&format!("/instance/connect/{instance}")).await?;
        Ok(resolve_qr(&body))
    }

    async fn connection_state(&self, instance: &str) -> Result<String, TidingsError> {
        let body = self
            .get(&format!("/instance/connectionState/{instance}"))
            .await?;
        let state = string_at(&body, &["instance", "state"])
            .or_else(|| string_at(&body, &["state"]))
            .ok_or_else(|| TidingsError::Provider {
                message: "connection state response without state field".to_string(),
                source: None,
            })?;
        Ok(state.to_string())
    }

    async fn logout_instance(&self, instance: &str) -> Result<(), TidingsError> {
        self.delete(&format!("/instance/logout/{instance}")).await
    }

    async fn list_chats(
        &self,
        instance: &str,
        limit: u32,
    ) -> Result<Vec<RemoteChat>, TidingsError> {
        let body = self
            .post(&format!("/chat/findChats/{instance}"), json!({"limit": limit}))
            .await?;
        let records = body
            .as_array()
            .or_else(|| body.get("chats").and_then(Value::as_array))
            .cloned()
            .unwrap_or_default();
        let chats: Vec<RemoteChat> = records
            .iter()
            .filter_map(chat_from_value)
            .take(limit as usize)
            .collect();
        debug!(instance, count = chats.len(), "listed remote chats");
        Ok(chats)
    }

    async fn list_messages(
        &self,
        instance: &str,
        remote_jid: &str,
        limit: u32,
    ) -> Result<Vec<Value>, TidingsError> {
        let body = self
            .post(
                &format!("/chat/findMessages/{instance}"),
                json!({
                    "where": {"key": {"remoteJid": remote_jid}},
                    "limit": limit
                }),
            )
            .await?;
        let records = body
            .get("messages")
            .and_then(|m| m.get("records"))
            .and_then(Value::as_array)
            .or_else(|| body.get("records").and_then(Value::as_array))
            .or_else(|| body.as_array())
            .cloned()
            .unwrap_or_default();
        Ok(records.into_iter().take(limit as usize).collect())
    }

    async fn profile_picture_url(
        &self,
        instance: &str,
        remote_jid: &str,
    ) -> Result<Option<String>, TidingsError> {
        let body = self
            .post(
                &format!("/chat/fetchProfilePictureUrl/{instance}"),
                json!({"number": remote_jid}),
            )
            .await?;
        Ok(string_at(&body, &["profilePictureUrl"]).map(str::to_string))
    }

    async fn download_media(
        &self,
        instance: &str,
        message: &Value,
    ) -> Result<String, TidingsError> {
        let body = self
            .post(
                &format!("/chat/getBase64FromMediaMessage/{instance}"),
                json!({"message": message}),
            )
            .await?;
        string_at(&body, &["base64"])
            .map(str::to_string)
            .ok_or_else(|| TidingsError::Provider {
                message: "media response without base64 payload".to_string(),
                source: None,
            })
    }
}
