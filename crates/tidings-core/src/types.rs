// SPDX-FileCopyrightText: 2026 Tidings Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common domain types shared across the Tidings engine.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Connection lifecycle status of a messaging instance.
///
/// Transitions are owned exclusively by the instance state machine:
/// `connecting -> connected`, `connecting -> disconnected`,
/// `connected -> disconnected`, and any state `-> error`. Nothing leaves
/// `error` without an explicit reconnect request.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

/// A normalized connection signal derived from provider webhook events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionSignal {
    /// A pairing QR credential was issued; carries the QR payload.
    QrIssued(String),
    /// The remote session opened successfully.
    Opened,
    /// The remote session closed.
    Closed,
    /// The remote session was refused (bad credentials, logged out elsewhere).
    Refused,
}

/// Message direction relative to the instance owner.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Content type of a stored message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    Image,
    Audio,
    Video,
    Document,
    Other,
}

/// Inferred marketing source of a conversation.
///
/// May be upgraded from `Unknown` once, never downgraded.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MarketingSource {
    Unknown,
    Organic,
    AdAttributed,
}

/// One messaging-gateway session belonging to a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    /// Identity name, unique across the store. Used to route webhook events.
    pub name: String,
    pub tenant_id: Option<String>,
    pub status: InstanceStatus,
    /// Transient pairing credential. Present only while `connecting`;
    /// cleared the instant the status becomes `connected`.
    pub qr_code: Option<String>,
    pub last_activity_at: Option<i64>,
    pub last_webhook_at: Option<i64>,
    pub last_webhook_event: Option<String>,
    pub last_error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One append-only entry in an instance's event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceEvent {
    pub id: i64,
    pub instance_id: String,
    pub event: String,
    /// Raw payload snapshot, JSON-encoded.
    pub payload: Option<String>,
    pub created_at: i64,
}

/// One thread with one remote contact, scoped to one instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub instance_id: String,
    /// Normalized remote contact address; unique per instance.
    pub remote_jid: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub last_message_preview: Option<String>,
    /// Unix seconds of the most recent observed message. Monotonic:
    /// reconciliation never moves it backwards.
    pub last_message_at: i64,
    pub unread_count: i64,
    pub marketing_source: MarketingSource,
    pub ad_click_id: Option<String>,
    pub ad_source_id: Option<String>,
    pub ad_source_type: Option<String>,
    pub ad_show_attribution: Option<bool>,
    pub pinned: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Media descriptor attached to a stored message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDescriptor {
    pub mime_type: Option<String>,
    pub file_name: Option<String>,
    pub size_bytes: Option<i64>,
    /// Durable object-storage URL, when the media pipeline succeeded.
    pub url: Option<String>,
}

/// Classifier output for a message's text content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub intent: String,
    pub sentiment: String,
    pub keywords: Vec<String>,
}

/// One immutable chat message.
///
/// `external_id` is the provider-assigned identifier and the idempotency
/// key: at most one stored message per id, regardless of ingestion path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub instance_id: String,
    pub external_id: String,
    pub remote_jid: String,
    pub direction: Direction,
    pub status: Option<String>,
    pub content_type: ContentType,
    pub content: Option<String>,
    pub media: Option<MediaDescriptor>,
    pub classification: Option<Classification>,
    /// Provider message timestamp, normalized to unix seconds.
    pub message_ts: i64,
    pub created_at: i64,
}

/// Ad-click attribution facts recovered from a raw message payload.
///
/// Merged into the owning conversation write-once-if-absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributionFacts {
    pub ad_click_id: Option<String>,
    pub source_id: Option<String>,
    pub source_type: Option<String>,
    pub show_attribution: Option<bool>,
}

impl AttributionFacts {
    /// True when any of the captured facts indicates a paid-ad origin.
    pub fn is_meta_ads(&self) -> bool {
        self.ad_click_id.is_some()
            || self.show_attribution == Some(true)
            || self.source_type.as_deref() == Some("ad")
    }

    /// True when nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.ad_click_id.is_none()
            && self.source_id.is_none()
            && self.source_type.is_none()
            && self.show_attribution.is_none()
    }
}

/// One remote thread as reported by the provider's chat listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteChat {
    pub remote_jid: String,
    pub display_name: Option<String>,
    /// Last-activity timestamp, normalized to unix seconds.
    pub last_message_ts: Option<i64>,
    /// Provider-supplied group hint, when present.
    pub is_group: Option<bool>,
    /// Provider-supplied broadcast hint, when present.
    pub is_broadcast: Option<bool>,
}

/// Current unix time in seconds.
pub fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Normalize a provider timestamp to unix seconds.
///
/// The gateway emits some timestamps in seconds and others in milliseconds.
/// Values above 100_000_000_000 (year 5138 in seconds) are treated as
/// milliseconds.
pub fn normalize_unix_seconds(ts: i64) -> i64 {
    if ts > 100_000_000_000 { ts / 1000 } else { ts }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            InstanceStatus::Connecting,
            InstanceStatus::Connected,
            InstanceStatus::Disconnected,
            InstanceStatus::Error,
        ] {
            let parsed = InstanceStatus::from_str(&status.to_string()).unwrap();
            assert_eq!(status, parsed);
        }
        assert_eq!(InstanceStatus::Connected.to_string(), "connected");
    }

    #[test]
    fn marketing_source_serializes_snake_case() {
        assert_eq!(MarketingSource::AdAttributed.to_string(), "ad_attributed");
        assert_eq!(
            MarketingSource::from_str("ad_attributed").unwrap(),
            MarketingSource::AdAttributed
        );
    }

    #[test]
    fn attribution_is_meta_ads_rules() {
        assert!(!AttributionFacts::default().is_meta_ads());
        assert!(AttributionFacts {
            ad_click_id: Some("abc".into()),
            ..Default::default()
        }
        .is_meta_ads());
        assert!(AttributionFacts {
            show_attribution: Some(true),
            ..Default::default()
        }
        .is_meta_ads());
        assert!(AttributionFacts {
            source_type: Some("ad".into()),
            ..Default::default()
        }
        .is_meta_ads());
        assert!(!AttributionFacts {
            source_type: Some("post".into()),
            show_attribution: Some(false),
            ..Default::default()
        }
        .is_meta_ads());
    }

    #[test]
    fn millisecond_and_second_timestamps_normalize_identically() {
        let seconds = 1_726_000_000i64;
        assert_eq!(normalize_unix_seconds(seconds), seconds);
        assert_eq!(normalize_unix_seconds(seconds * 1000), seconds);
    }
}
