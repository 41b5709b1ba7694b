// SPDX-FileCopyrightText: 2026 Tidings Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook event processor: the single entry point for push-driven state
//! changes.
//!
//! The contract with the gateway is absorb-everything: whatever happens
//! inside, the HTTP layer answers 200. Unroutable events and unknown
//! instances are ignored at debug level; internal failures are logged and
//! swallowed so provider retries do not amplify duplicates.

use serde_json::Value;
use tidings_core::{ConnectionSignal, Instance, InstanceStatus, now_unix};
use tidings_storage::queries::{instances, messages};
use tracing::{debug, warn};

use crate::event::{self, EventKind};
use crate::ingest::{IngestContext, ingest_items};
use crate::lifecycle;

/// Outcome of one webhook delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The event was routed to a handler.
    Processed,
    /// The event was unroutable or referenced an unknown instance.
    Ignored,
}

/// Handle one raw webhook payload. Never fails: internal errors are
/// logged and absorbed.
pub async fn handle_event(ctx: &IngestContext, payload: Value) -> Outcome {
    let Some(kind) = event::resolve_event_kind(&payload) else {
        debug!("webhook without event kind ignored");
        return Outcome::Ignored;
    };
    let Some(name) = event::resolve_instance_name(&payload) else {
        debug!(kind = kind.as_str(), "webhook without instance name ignored");
        return Outcome::Ignored;
    };

    let instance = match instances::get_instance_by_name(&ctx.db, &name).await {
        Ok(Some(instance)) => instance,
        Ok(None) => {
            // An event for a session we no longer track.
            debug!(instance = %name, kind = kind.as_str(), "event for unknown instance ignored");
            return Outcome::Ignored;
        }
        Err(e) => {
            warn!(instance = %name, error = %e, "instance lookup failed");
            return Outcome::Processed;
        }
    };

    let result = dispatch(ctx, &instance, &kind, &payload).await;
    match result {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(instance = %name, kind = kind.as_str(), error = %e, "webhook handling failed");
            Outcome::Processed
        }
    }
}

async fn dispatch(
    ctx: &IngestContext,
    instance: &Instance,
    kind: &EventKind,
    payload: &Value,
) -> Result<Outcome, tidings_core::TidingsError> {
    let now = now_unix();
    let snapshot = Some(payload.to_string());

    match kind {
        EventKind::QrcodeUpdated => {
            let Some(qr) = resolve_qr(payload) else {
                debug!(instance = %instance.name, "qr event without credential ignored");
                return Ok(Outcome::Ignored);
            };
            lifecycle::apply_connection_signal(
                &ctx.db,
                instance,
                &ConnectionSignal::QrIssued(qr),
                snapshot,
                now,
            )
            .await?;
            Ok(Outcome::Processed)
        }
        EventKind::ConnectionUpdate => {
            let Some(signal) = resolve_connection_signal(payload) else {
                debug!(instance = %instance.name, "connection update without state ignored");
                return Ok(Outcome::Ignored);
            };
            let fires_connected = signal == ConnectionSignal::Opened;
            let status =
                lifecycle::apply_connection_signal(&ctx.db, instance, &signal, snapshot, now)
                    .await?;
            if fires_connected && status == InstanceStatus::Connected {
                if let Some(updated) =
                    instances::get_instance_by_name(&ctx.db, &instance.name).await?
                {
                    for hook in &ctx.hooks {
                        hook.on_instance_connected(&updated).await;
                    }
                }
            }
            Ok(Outcome::Processed)
        }
        EventKind::MessagesUpsert => {
            let items = event::message_items(payload);
            if items.is_empty() {
                debug!(instance = %instance.name, "upsert without message items ignored");
                return Ok(Outcome::Ignored);
            }
            ingest_items(ctx, instance, &items).await?;
            Ok(Outcome::Processed)
        }
        EventKind::MessagesUpdate => {
            for item in event::message_items(payload) {
                let Some(external_id) = event::resolve_external_id(&item) else {
                    continue;
                };
                let Some(status) = item.get("status").and_then(Value::as_str) else {
                    continue;
                };
                let edited = event::resolve_text_content(&item);
                let patched = messages::update_status(
                    &ctx.db,
                    &external_id,
                    status,
                    edited.as_deref(),
                )
                .await?;
                if !patched {
                    // Message not ingested yet; a later sync pass heals it.
                    debug!(instance = %instance.name, external_id, "status update for unknown message");
                }
            }
            Ok(Outcome::Processed)
        }
        EventKind::MessagesDelete => {
            for item in event::message_items(payload) {
                if let Some(external_id) = event::resolve_external_id(&item) {
                    messages::delete_by_external_id(&ctx.db, &external_id).await?;
                }
            }
            Ok(Outcome::Processed)
        }
        EventKind::Other(label) => {
            // Structurally recognizable but not ours: log it, no state change.
            instances::append_event(&ctx.db, &instance.id, label, snapshot, now).await?;
            Ok(Outcome::Ignored)
        }
    }
}

fn resolve_qr(payload: &Value) -> Option<String> {
    let data = payload.get("data").unwrap_or(payload);
    data.get("qrcode")
        .and_then(|q| q.get("base64"))
        .or_else(|| data.get("base64"))
        .or_else(|| data.get("qrcode").filter(|q| q.is_string()))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Map provider connection states and status reasons onto signals.
///
/// `open` means the session is up. A close carrying 401/403/440 means the
/// credential was rejected or the session was taken over elsewhere.
fn resolve_connection_signal(payload: &Value) -> Option<ConnectionSignal> {
    let data = payload.get("data").unwrap_or(payload);
    let state = data
        .get("state")
        .or_else(|| data.get("connection"))
        .and_then(Value::as_str)?;

    match state {
        "open" => Some(ConnectionSignal::Opened),
        "close" | "closed" => {
            let reason = data
                .get("statusReason")
                .or_else(|| data.get("lastDisconnect").and_then(|d| d.get("statusCode")))
                .and_then(Value::as_i64);
            match reason {
                Some(401) | Some(403) | Some(440) => Some(ConnectionSignal::Refused),
                _ => Some(ConnectionSignal::Closed),
            }
        }
        "refused" => Some(ConnectionSignal::Refused),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use serde_json::json;
    use tempfile::tempdir;
    use tidings_core::Instance;
    use tidings_storage::Database;
    use tidings_test_utils::{MockProviderClient, RecordingHook};

    use crate::classify::KeywordClassifier;

    async fn setup() -> (IngestContext, Arc<RecordingHook>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Arc::new(
            Database::open(dir.path().join("test.db").to_str().unwrap())
                .await
                .unwrap(),
        );
        let now = now_unix();
        let instance = Instance {
            id: "inst-1".to_string(),
            name: "crm".to_string(),
            tenant_id: None,
            status: InstanceStatus::Connecting,
            qr_code: None,
            last_activity_at: None,
            last_webhook_at: None,
            last_webhook_event: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        };
        instances::create_instance(&db, &instance).await.unwrap();

        let hook = Arc::new(RecordingHook::new());
        let ctx = IngestContext {
            db,
            provider: Arc::new(MockProviderClient::new()),
            object_store: None,
            classifier: Arc::new(KeywordClassifier),
            hooks: vec![hook.clone()],
            media_namespace: "tidings".to_string(),
        };
        (ctx, hook, dir)
    }

    #[tokio::test]
    async fn unroutable_and_unknown_instance_events_are_ignored() {
        let (ctx, _hook, _dir) = setup().await;

        assert_eq!(
            handle_event(&ctx, json!({"instance": "crm"})).await,
            Outcome::Ignored
        );
        assert_eq!(
            handle_event(&ctx, json!({"event": "messages.upsert"})).await,
            Outcome::Ignored
        );
        assert_eq!(
            handle_event(
                &ctx,
                json!({"event": "messages.upsert", "instance": "not-tracked"})
            )
            .await,
            Outcome::Ignored
        );
    }

    #[tokio::test]
    async fn qr_event_stores_credential() {
        let (ctx, _hook, _dir) = setup().await;
        let outcome = handle_event(
            &ctx,
            json!({
                "event": "QRCODE_UPDATED",
                "instance": "crm",
                "data": {"qrcode": {"base64": "data:image/png;base64,AAA"}}
            }),
        )
        .await;
        assert_eq!(outcome, Outcome::Processed);

        let instance = instances::get_instance_by_name(&ctx.db, "crm")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(instance.status, InstanceStatus::Connecting);
        assert_eq!(instance.qr_code.as_deref(), Some("data:image/png;base64,AAA"));
    }

    #[tokio::test]
    async fn open_connects_and_fires_hook() {
        let (ctx, hook, _dir) = setup().await;
        let outcome = handle_event(
            &ctx,
            json!({"event": "connection.update", "instance": "crm", "data": {"state": "open"}}),
        )
        .await;
        assert_eq!(outcome, Outcome::Processed);

        let instance = instances::get_instance_by_name(&ctx.db, "crm")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(instance.status, InstanceStatus::Connected);
        assert_eq!(hook.connected.lock().unwrap().as_slice(), ["crm"]);
    }

    #[tokio::test]
    async fn close_reason_codes_map_to_refused() {
        let (ctx, _hook, _dir) = setup().await;
        for (reason, expected) in [
            (Some(401), ConnectionSignal::Refused),
            (Some(440), ConnectionSignal::Refused),
            (Some(500), ConnectionSignal::Closed),
            (None, ConnectionSignal::Closed),
        ] {
            let mut data = json!({"state": "close"});
            if let Some(code) = reason {
                data["statusReason"] = json!(code);
            }
            let payload = json!({"event": "connection.update", "instance": "crm", "data": data});
            assert_eq!(resolve_connection_signal(&payload), Some(expected.clone()));
            assert_eq!(handle_event(&ctx, payload).await, Outcome::Processed);
        }
        let instance = instances::get_instance_by_name(&ctx.db, "crm")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(instance.status, InstanceStatus::Disconnected);
    }

    #[tokio::test]
    async fn upsert_update_delete_round_trip() {
        let (ctx, _hook, _dir) = setup().await;
        let upsert = json!({
            "event": "messages.upsert",
            "instance": "crm",
            "data": {
                "key": {"remoteJid": "555@s.whatsapp.net", "fromMe": false, "id": "MSG-1"},
                "message": {"conversation": "hello"},
                "messageTimestamp": 1000
            }
        });
        assert_eq!(handle_event(&ctx, upsert).await, Outcome::Processed);
        assert!(messages::message_exists(&ctx.db, "MSG-1").await.unwrap());

        let update = json!({
            "event": "messages.update",
            "instance": "crm",
            "data": {"key": {"id": "MSG-1"}, "status": "READ"}
        });
        assert_eq!(handle_event(&ctx, update).await, Outcome::Processed);
        let msg = messages::get_by_external_id(&ctx.db, "MSG-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg.status.as_deref(), Some("READ"));

        // Update for a message never ingested is absorbed.
        let orphan_update = json!({
            "event": "messages.update",
            "instance": "crm",
            "data": {"key": {"id": "MSG-404"}, "status": "READ"}
        });
        assert_eq!(handle_event(&ctx, orphan_update).await, Outcome::Processed);

        let delete = json!({
            "event": "messages.delete",
            "instance": "crm",
            "data": {"key": {"id": "MSG-1"}}
        });
        assert_eq!(handle_event(&ctx, delete).await, Outcome::Processed);
        assert!(!messages::message_exists(&ctx.db, "MSG-1").await.unwrap());
    }

    #[tokio::test]
    async fn unknown_kind_logs_without_state_change() {
        let (ctx, _hook, _dir) = setup().await;
        let outcome = handle_event(
            &ctx,
            json!({"event": "CONTACTS_UPDATE", "instance": "crm", "data": {}}),
        )
        .await;
        assert_eq!(outcome, Outcome::Ignored);

        let instance = instances::get_instance_by_name(&ctx.db, "crm")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(instance.status, InstanceStatus::Connecting, "no state change");
        let events = instances::list_events(&ctx.db, "inst-1", 10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "contacts.update");
    }
}
