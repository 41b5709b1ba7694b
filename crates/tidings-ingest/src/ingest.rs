// SPDX-FileCopyrightText: 2026 Tidings Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The message ingestion algorithm, shared verbatim by the webhook and
//! reconciliation paths.
//!
//! Per-item contract: malformed items are skipped and their siblings still
//! process; a duplicate external id skips the rest of that item before any
//! side effect (no re-classification, no counter increment, no hook). The
//! unique constraint on `messages.external_id` backs the check under
//! concurrency, so a losing racer is a quiet no-op as well.

use std::sync::Arc;

use serde_json::Value;
use tidings_core::{
    ContentType, Direction, EngineHook, Instance, MediaDescriptor, Message, MessageClassifier,
    ObjectStore, ProviderClient, now_unix,
};
use tidings_core::TidingsError;
use tidings_storage::Database;
use tidings_storage::queries::{conversations, conversations::ConversationObservation, instances, messages};
use tracing::debug;

use crate::{attribution, event, jid, media};

/// Shared collaborators for the ingestion paths.
///
/// The object store is optional: when absent, the media pipeline is
/// skipped entirely and audio messages persist without a URL.
#[derive(Clone)]
pub struct IngestContext {
    pub db: Arc<Database>,
    pub provider: Arc<dyn ProviderClient>,
    pub object_store: Option<Arc<dyn ObjectStore>>,
    pub classifier: Arc<dyn MessageClassifier>,
    pub hooks: Vec<Arc<dyn EngineHook>>,
    pub media_namespace: String,
}

fn content_type_for(item: &Value) -> ContentType {
    if let Some(message) = item.get("message") {
        if message.get("audioMessage").is_some() {
            return ContentType::Audio;
        }
        if message.get("imageMessage").is_some() {
            return ContentType::Image;
        }
        if message.get("videoMessage").is_some() {
            return ContentType::Video;
        }
        if message.get("documentMessage").is_some() {
            return ContentType::Document;
        }
        if message.get("conversation").is_some() || message.get("extendedTextMessage").is_some() {
            return ContentType::Text;
        }
    }
    // Fall back to the provider's type hint string.
    match item.get("messageType").and_then(Value::as_str) {
        Some("conversation") | Some("extendedTextMessage") | Some("text") => ContentType::Text,
        Some("audioMessage") | Some("audio") => ContentType::Audio,
        Some("imageMessage") | Some("image") => ContentType::Image,
        Some("videoMessage") | Some("video") => ContentType::Video,
        Some("documentMessage") | Some("document") => ContentType::Document,
        _ => ContentType::Other,
    }
}

fn media_descriptor_for(item: &Value, content_type: ContentType, url: Option<String>) -> Option<MediaDescriptor> {
    if content_type == ContentType::Text || content_type == ContentType::Other {
        return None;
    }
    let sub_key = match content_type {
        ContentType::Audio => "audioMessage",
        ContentType::Image => "imageMessage",
        ContentType::Video => "videoMessage",
        ContentType::Document => "documentMessage",
        _ => return None,
    };
    let sub = item.get("message").and_then(|m| m.get(sub_key));
    Some(MediaDescriptor {
        mime_type: sub
            .and_then(|s| s.get("mimetype"))
            .and_then(Value::as_str)
            .map(str::to_string),
        file_name: sub
            .and_then(|s| s.get("fileName"))
            .and_then(Value::as_str)
            .map(str::to_string),
        size_bytes: sub
            .and_then(|s| s.get("fileLength"))
            .and_then(|v| match v {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.parse().ok(),
                _ => None,
            }),
        url,
    })
}

/// Ingest a batch of raw message items for one instance.
///
/// Items process in payload order, so within one conversation stored
/// order follows batch order. Returns the number of newly created
/// messages.
pub async fn ingest_items(
    ctx: &IngestContext,
    instance: &Instance,
    items: &[Value],
) -> Result<usize, TidingsError> {
    let mut created = 0usize;

    for item in items {
        // Steps 1-2: candidate address, normalized and filtered.
        let Some(raw_jid) = event::resolve_remote_jid(item) else {
            debug!(instance = %instance.name, "item without remote address skipped");
            continue;
        };
        let Some(remote_jid) = jid::normalize_remote_jid(raw_jid) else {
            debug!(instance = %instance.name, jid = raw_jid, "non-individual address skipped");
            continue;
        };

        // Step 3: external identifier.
        let Some(external_id) = event::resolve_external_id(item) else {
            debug!(instance = %instance.name, "item without external id skipped");
            continue;
        };

        // Step 4: idempotency check before any side effect.
        if messages::message_exists(&ctx.db, &external_id).await? {
            debug!(instance = %instance.name, external_id, "duplicate message skipped");
            continue;
        }

        let now = now_unix();
        let message_ts = event::resolve_timestamp(item, now);
        let push_name = event::resolve_push_name(item);

        // Step 5: find-or-create the conversation, seeded from the
        // message's own timestamp.
        let conversation = conversations::find_or_create(
            &ctx.db,
            &instance.id,
            &remote_jid,
            push_name,
            message_ts,
            now,
        )
        .await?;

        // Step 6: attribution facts from the raw payload.
        let facts = attribution::extract(item);

        // Steps 7-8: text content, classification, content type.
        let content = event::resolve_text_content(item);
        let classification = content.as_deref().map(|text| ctx.classifier.classify(text));
        let content_type = content_type_for(item);

        // Step 9: best-effort audio retrieval.
        let media_url = match (&ctx.object_store, content_type) {
            (Some(store), ContentType::Audio) => {
                media::retrieve_audio(
                    ctx.provider.as_ref(),
                    store.as_ref(),
                    &ctx.media_namespace,
                    &instance.name,
                    &external_id,
                    item,
                )
                .await
            }
            _ => None,
        };
        let media = media_descriptor_for(item, content_type, media_url);

        let direction = if event::resolve_from_me(item) {
            Direction::Outbound
        } else {
            Direction::Inbound
        };

        // Step 10: persist. A false return means another writer won the
        // race since step 4; treat it exactly like the duplicate skip.
        let message = Message {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation.id.clone(),
            instance_id: instance.id.clone(),
            external_id: external_id.clone(),
            remote_jid: remote_jid.clone(),
            direction,
            status: item
                .get("status")
                .and_then(Value::as_str)
                .map(str::to_string),
            content_type,
            content: content.clone(),
            media,
            classification,
            message_ts,
            created_at: now,
        };
        if !messages::insert_message_if_absent(&ctx.db, &message).await? {
            debug!(instance = %instance.name, external_id, "lost insert race, skipped");
            continue;
        }

        // Step 11: fold the observation into the conversation.
        let observation = ConversationObservation {
            preview: content,
            message_ts,
            inbound: direction == Direction::Inbound,
            display_name: push_name.map(str::to_string),
            attribution: if facts.is_empty() { None } else { Some(facts) },
        };
        conversations::apply_observation(&ctx.db, &conversation.id, &observation, now).await?;

        created += 1;

        // Downstream triggers fire once per newly created message.
        if !ctx.hooks.is_empty() {
            let updated = conversations::get_conversation(&ctx.db, &conversation.id)
                .await?
                .unwrap_or(conversation);
            for hook in &ctx.hooks {
                hook.on_message_created(&updated, &message).await;
            }
        }
    }

    if created > 0 {
        instances::touch_activity(&ctx.db, &instance.id, now_unix()).await?;
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;
    use tidings_core::{InstanceStatus, MarketingSource};
    use tidings_test_utils::{FixedClassifier, MemoryObjectStore, MockProviderClient, RecordingHook};

    use crate::classify::KeywordClassifier;

    async fn setup() -> (IngestContext, Instance, Arc<RecordingHook>, tempfile::TempDir) {
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
            status: InstanceStatus::Connected,
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
        (ctx, instance, hook, dir)
    }

    fn text_item(external_id: &str, jid: &str, text: &str, ts: i64) -> Value {
        json!({
            "key": {"remoteJid": jid, "fromMe": false, "id": external_id},
            "pushName": "Alice",
            "message": {"conversation": text},
            "messageTimestamp": ts
        })
    }

    #[tokio::test]
    async fn triple_delivery_stores_one_message() {
        let (ctx, instance, hook, _dir) = setup().await;
        let item = text_item("MSG-1", "555@s.whatsapp.net", "hello there", 1000);

        for _ in 0..3 {
            ingest_items(&ctx, &instance, std::slice::from_ref(&item))
                .await
                .unwrap();
        }

        let conversation = conversations::get_by_remote_jid(&ctx.db, "inst-1", "555@s.whatsapp.net")
            .await
            .unwrap()
            .unwrap();
        let stored = messages::list_for_conversation(&ctx.db, &conversation.id, 10)
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].external_id, "MSG-1");
        assert_eq!(conversation.unread_count, 1, "unread counted once");
        assert_eq!(hook.created_count(), 1, "hook fired only for the create");
    }

    #[tokio::test]
    async fn group_and_broadcast_items_never_ingest() {
        let (ctx, instance, _hook, _dir) = setup().await;
        let items = vec![
            text_item("G-1", "12036@g.us", "group chatter", 1000),
            text_item("B-1", "status@broadcast", "status", 1000),
            text_item("OK-1", "555@s.whatsapp.net", "real", 1000),
        ];
        let created = ingest_items(&ctx, &instance, &items).await.unwrap();
        assert_eq!(created, 1);
        assert!(!messages::message_exists(&ctx.db, "G-1").await.unwrap());
        assert!(!messages::message_exists(&ctx.db, "B-1").await.unwrap());
    }

    #[tokio::test]
    async fn malformed_items_skip_but_siblings_process() {
        let (ctx, instance, _hook, _dir) = setup().await;
        let items = vec![
            json!({"message": {"conversation": "no key at all"}}),
            json!({"key": {"remoteJid": "555@s.whatsapp.net"}, "message": {"conversation": "no id"}}),
            text_item("OK-1", "555@s.whatsapp.net", "fine", 1000),
        ];
        let created = ingest_items(&ctx, &instance, &items).await.unwrap();
        assert_eq!(created, 1);
    }

    #[tokio::test]
    async fn attribution_merges_write_once() {
        let (ctx, instance, _hook, _dir) = setup().await;
        let mut ad_item = text_item("AD-1", "555@s.whatsapp.net", "saw your ad", 1000);
        ad_item["message"]["extendedTextMessage"] = json!({
            "text": "saw your ad",
            "contextInfo": {"externalAdReply": {"ctwaClid": "abc123", "sourceType": "ad"}}
        });
        ingest_items(&ctx, &instance, std::slice::from_ref(&ad_item))
            .await
            .unwrap();

        // Later organic message must not disturb the captured facts.
        let plain = text_item("ORG-1", "555@s.whatsapp.net", "hello again", 2000);
        ingest_items(&ctx, &instance, std::slice::from_ref(&plain))
            .await
            .unwrap();

        let conversation = conversations::get_by_remote_jid(&ctx.db, "inst-1", "555@s.whatsapp.net")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conversation.ad_click_id.as_deref(), Some("abc123"));
        assert_eq!(conversation.marketing_source, MarketingSource::AdAttributed);
    }

    #[tokio::test]
    async fn outbound_messages_do_not_increment_unread() {
        let (ctx, instance, _hook, _dir) = setup().await;
        let item = json!({
            "key": {"remoteJid": "555@s.whatsapp.net", "fromMe": true, "id": "OUT-1"},
            "message": {"conversation": "our reply"},
            "messageTimestamp": 1000
        });
        ingest_items(&ctx, &instance, std::slice::from_ref(&item))
            .await
            .unwrap();

        let conversation = conversations::get_by_remote_jid(&ctx.db, "inst-1", "555@s.whatsapp.net")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conversation.unread_count, 0);

        let stored = messages::get_by_external_id(&ctx.db, "OUT-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.direction, Direction::Outbound);
    }

    #[tokio::test]
    async fn audio_with_unreachable_store_still_persists() {
        let (mut ctx, instance, _hook, _dir) = setup().await;
        ctx.provider = Arc::new(MockProviderClient::new().with_media_body("dm9pY2U="));
        ctx.object_store = Some(Arc::new(MemoryObjectStore::failing()));

        let item = json!({
            "key": {"remoteJid": "555@s.whatsapp.net", "fromMe": false, "id": "AUDIO-1"},
            "message": {"audioMessage": {"mimetype": "audio/ogg; codecs=opus", "seconds": 6}},
            "messageTimestamp": 1000
        });
        let created = ingest_items(&ctx, &instance, std::slice::from_ref(&item))
            .await
            .unwrap();
        assert_eq!(created, 1);

        let stored = messages::get_by_external_id(&ctx.db, "AUDIO-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.content_type, ContentType::Audio);
        let media = stored.media.unwrap();
        assert!(media.url.is_none(), "upload failed, no URL");
        assert_eq!(media.mime_type.as_deref(), Some("audio/ogg; codecs=opus"));
    }

    #[tokio::test]
    async fn audio_with_working_store_gets_a_url() {
        let (mut ctx, instance, _hook, _dir) = setup().await;
        ctx.provider = Arc::new(MockProviderClient::new().with_media_body("dm9pY2U="));
        ctx.object_store = Some(Arc::new(MemoryObjectStore::new()));

        let item = json!({
            "key": {"remoteJid": "555@s.whatsapp.net", "fromMe": false, "id": "AUDIO-2"},
            "message": {"audioMessage": {"mimetype": "audio/ogg"}},
            "messageTimestamp": 1000
        });
        ingest_items(&ctx, &instance, std::slice::from_ref(&item))
            .await
            .unwrap();

        let stored = messages::get_by_external_id(&ctx.db, "AUDIO-2")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            stored.media.unwrap().url.as_deref(),
            Some("https://cdn.test/tidings/crm/audio/AUDIO-2.ogg")
        );
    }

    #[tokio::test]
    async fn recency_is_monotonic_across_out_of_order_batches() {
        let (ctx, instance, _hook, _dir) = setup().await;
        let newer = text_item("NEW", "555@s.whatsapp.net", "newest", 5000);
        let older = text_item("OLD", "555@s.whatsapp.net", "backfilled", 1000);

        ingest_items(&ctx, &instance, std::slice::from_ref(&newer))
            .await
            .unwrap();
        ingest_items(&ctx, &instance, std::slice::from_ref(&older))
            .await
            .unwrap();

        let conversation = conversations::get_by_remote_jid(&ctx.db, "inst-1", "555@s.whatsapp.net")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conversation.last_message_at, 5000);
        assert_eq!(conversation.last_message_preview.as_deref(), Some("newest"));
    }

    #[tokio::test]
    async fn classifier_output_rides_along() {
        let (ctx, instance, _hook, _dir) = setup().await;
        let item = text_item("C-1", "555@s.whatsapp.net", "how much is the plan?", 1000);
        ingest_items(&ctx, &instance, std::slice::from_ref(&item))
            .await
            .unwrap();

        let stored = messages::get_by_external_id(&ctx.db, "C-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.classification.unwrap().intent, "purchase_intent");
    }

    #[tokio::test]
    async fn classifier_is_swappable_through_the_context() {
        let (mut ctx, instance, _hook, _dir) = setup().await;
        ctx.classifier = Arc::new(FixedClassifier);

        let item = text_item("F-1", "555@s.whatsapp.net", "how much is the plan?", 1000);
        ingest_items(&ctx, &instance, std::slice::from_ref(&item))
            .await
            .unwrap();

        let stored = messages::get_by_external_id(&ctx.db, "F-1")
            .await
            .unwrap()
            .unwrap();
        let classification = stored.classification.unwrap();
        assert_eq!(classification.intent, "other");
        assert!(classification.keywords.is_empty());
    }
}
