// SPDX-FileCopyrightText: 2026 Tidings Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook payload probing.
//!
//! The gateway does not guarantee one consistent payload shape: event kind
//! and instance name may sit at the top level or under a `data` wrapper,
//! message batches arrive under varying keys, and timestamps come in
//! seconds or milliseconds. Everything here is first-match-wins probing
//! over `serde_json::Value`.

use serde_json::Value;
use tidings_core::normalize_unix_seconds;

/// Normalized webhook event kinds the processor dispatches on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    QrcodeUpdated,
    ConnectionUpdate,
    MessagesUpsert,
    MessagesUpdate,
    MessagesDelete,
    /// Structurally recognizable but not one of ours. Carries the
    /// normalized kind string for the event log.
    Other(String),
}

impl EventKind {
    /// Parse a raw kind string, tolerating both `MESSAGES_UPSERT` and
    /// `messages.upsert` spellings.
    pub fn parse(raw: &str) -> EventKind {
        let normalized = raw.trim().to_ascii_lowercase().replace('_', ".");
        match normalized.as_str() {
            "qrcode.updated" => EventKind::QrcodeUpdated,
            "connection.update" => EventKind::ConnectionUpdate,
            "messages.upsert" | "send.message" => EventKind::MessagesUpsert,
            "messages.update" => EventKind::MessagesUpdate,
            "messages.delete" => EventKind::MessagesDelete,
            _ => EventKind::Other(normalized),
        }
    }

    /// Event-log label for this kind.
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::QrcodeUpdated => "qrcode.updated",
            EventKind::ConnectionUpdate => "connection.update",
            EventKind::MessagesUpsert => "messages.upsert",
            EventKind::MessagesUpdate => "messages.update",
            EventKind::MessagesDelete => "messages.delete",
            EventKind::Other(kind) => kind,
        }
    }
}

fn string_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut current = value;
    for key in path {
        current = current.get(key)?;
    }
    current.as_str().filter(|s| !s.is_empty())
}

/// Extract the raw event kind string from any of the known payload shapes.
pub fn resolve_event_kind(payload: &Value) -> Option<EventKind> {
    string_at(payload, &["event"])
        .or_else(|| string_at(payload, &["data", "event"]))
        .or_else(|| string_at(payload, &["type"]))
        .map(EventKind::parse)
}

/// Extract the instance name from any of the known payload shapes.
pub fn resolve_instance_name(payload: &Value) -> Option<String> {
    string_at(payload, &["instance"])
        .or_else(|| string_at(payload, &["instance", "instanceName"]))
        .or_else(|| string_at(payload, &["instanceName"]))
        .or_else(|| string_at(payload, &["data", "instance"]))
        .or_else(|| string_at(payload, &["data", "instanceName"]))
        .map(str::to_string)
}

/// Normalize the payload's message batch to a flat list of items.
///
/// Upsert payloads batch items under `data.messages`, as a bare array
/// under `data`, or as a single message object carrying a `key`.
pub fn message_items(payload: &Value) -> Vec<Value> {
    let data = payload.get("data").unwrap_or(payload);

    if let Some(items) = data.get("messages").and_then(Value::as_array) {
        return items.clone();
    }
    if let Some(items) = data.as_array() {
        return items.clone();
    }
    if data.get("key").is_some() {
        return vec![data.clone()];
    }
    Vec::new()
}

/// Provider-assigned external message identifier.
pub fn resolve_external_id(item: &Value) -> Option<String> {
    string_at(item, &["key", "id"])
        .or_else(|| string_at(item, &["keyId"]))
        .or_else(|| string_at(item, &["id"]))
        .map(str::to_string)
}

/// Raw (unnormalized) remote address of the message's thread.
pub fn resolve_remote_jid(item: &Value) -> Option<&str> {
    string_at(item, &["key", "remoteJid"])
        .or_else(|| string_at(item, &["remoteJid"]))
        .or_else(|| string_at(item, &["jid"]))
}

/// Direction flag: true when the instance owner sent the message.
pub fn resolve_from_me(item: &Value) -> bool {
    item.get("key")
        .and_then(|k| k.get("fromMe"))
        .or_else(|| item.get("fromMe"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Contact display name, when the payload carried one.
pub fn resolve_push_name(item: &Value) -> Option<&str> {
    string_at(item, &["pushName"])
}

/// Message timestamp normalized to unix seconds.
///
/// Accepts numeric and stringified timestamps; falls back to `default`
/// when the payload carries none.
pub fn resolve_timestamp(item: &Value, default: i64) -> i64 {
    let raw = item
        .get("messageTimestamp")
        .or_else(|| item.get("timestamp"));
    let ts = match raw {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.parse::<i64>().ok(),
        _ => None,
    };
    ts.map(normalize_unix_seconds).unwrap_or(default)
}

/// Text content: plain conversation body, extended text, or media caption.
pub fn resolve_text_content(item: &Value) -> Option<String> {
    let message = item.get("message")?;
    string_at(message, &["conversation"])
        .or_else(|| string_at(message, &["extendedTextMessage", "text"]))
        .or_else(|| string_at(message, &["imageMessage", "caption"]))
        .or_else(|| string_at(message, &["videoMessage", "caption"]))
        .or_else(|| string_at(message, &["documentMessage", "caption"]))
        .map(str::to_string)
}
