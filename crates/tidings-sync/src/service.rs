// SPDX-FileCopyrightText: 2026 Tidings Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pull-based reconciliation against the remote gateway.
//!
//! Two modes per instance: a full backfill when nothing is stored locally
//! yet, and a recent catch-up otherwise. Both replay every fetched item
//! through the shared ingestion algorithm, so a sync pass can never
//! duplicate what a webhook already delivered.

use std::time::Duration;

use tidings_config::model::SyncConfig;
use tidings_core::{Instance, RemoteChat, TidingsError, now_unix};
use tidings_ingest::{IngestContext, ingest_items, jid};
use tidings_storage::queries::conversations;
use tracing::{debug, info, warn};

use crate::lease::SyncLeases;

/// Which reconciliation mode a pass ran in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Full,
    Recent,
}

/// Counters from one reconciliation pass.
#[derive(Debug, Default, Clone)]
pub struct SyncReport {
    pub mode: Option<SyncMode>,
    pub chats_listed: usize,
    pub chats_skipped: usize,
    pub chats_synced: usize,
    pub messages_created: usize,
}

/// Reconciliation sync service. Cheap to clone; shares the lease registry.
#[derive(Clone)]
pub struct SyncService {
    ctx: IngestContext,
    leases: SyncLeases,
    config: SyncConfig,
}

impl SyncService {
    pub fn new(ctx: IngestContext, config: SyncConfig) -> Self {
        let leases = SyncLeases::new(Duration::from_secs(config.lease_ttl_secs));
        Self { ctx, leases, config }
    }

    /// Run one reconciliation pass for an instance.
    ///
    /// Returns `None` when another pass already holds the instance's
    /// lease. All provider failures are absorbed: a listing failure aborts
    /// the pass, a per-thread failure only skips that thread.
    pub async fn sync_instance(&self, instance: &Instance) -> Option<SyncReport> {
        let _guard = match self.leases.try_acquire(&instance.id) {
            Some(guard) => guard,
            None => {
                debug!(instance = %instance.name, "sync already in progress, skipped");
                return None;
            }
        };

        let mut report = SyncReport::default();

        let local_count = match conversations::count_for_instance(&self.ctx.db, &instance.id).await
        {
            Ok(count) => count,
            Err(e) => {
                warn!(instance = %instance.name, error = %e, "conversation count failed");
                return Some(report);
            }
        };
        let (mode, chat_limit, message_limit) = if local_count == 0 {
            (
                SyncMode::Full,
                self.config.initial_chat_limit,
                self.config.initial_message_limit,
            )
        } else {
            (
                SyncMode::Recent,
                self.config.recent_chat_limit,
                self.config.recent_message_limit,
            )
        };
        report.mode = Some(mode);

        let chats = match self.ctx.provider.list_chats(&instance.name, chat_limit).await {
            Ok(chats) => chats,
            Err(e) => {
                // A dead listing aborts this pass only; the next trigger
                // retries from scratch.
                warn!(instance = %instance.name, error = %e, "chat listing failed, pass aborted");
                return Some(report);
            }
        };
        report.chats_listed = chats.len();

        let timeout = Duration::from_secs(self.config.chat_timeout_secs);
        for chat in &chats {
            let outcome = match tokio::time::timeout(
                timeout,
                self.sync_chat(instance, chat, mode, message_limit),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(TidingsError::Timeout { duration: timeout }),
            };
            match outcome {
                Ok(Some(created)) => {
                    report.chats_synced += 1;
                    report.messages_created += created;
                }
                Ok(None) => report.chats_skipped += 1,
                Err(e) => {
                    warn!(instance = %instance.name, jid = %chat.remote_jid, error = %e,
                          "thread sync failed, continuing");
                }
            }
        }

        info!(
            instance = %instance.name,
            mode = ?mode,
            listed = report.chats_listed,
            skipped = report.chats_skipped,
            synced = report.chats_synced,
            created = report.messages_created,
            "reconciliation pass finished"
        );
        Some(report)
    }

    /// Sync one remote thread. `Ok(None)` means the thread was filtered or
    /// short-circuited without any message fetch.
    async fn sync_chat(
        &self,
        instance: &Instance,
        chat: &RemoteChat,
        mode: SyncMode,
        message_limit: u32,
    ) -> Result<Option<usize>, TidingsError> {
        // Same filtering rules as the webhook path, plus the provider's
        // own group/broadcast hints when present.
        if chat.is_group == Some(true) || chat.is_broadcast == Some(true) {
            return Ok(None);
        }
        let Some(remote_jid) = jid::normalize_remote_jid(&chat.remote_jid) else {
            return Ok(None);
        };

        // Monotonic short-circuit, checked before any message fetch: a
        // thread whose local recency already covers the remote's reported
        // activity costs nothing.
        if mode == SyncMode::Recent {
            if let (Some(remote_ts), Ok(Some(local))) = (
                chat.last_message_ts,
                conversations::get_by_remote_jid(&self.ctx.db, &instance.id, &remote_jid).await,
            ) {
                if local.last_message_at >= remote_ts {
                    return Ok(None);
                }
            }
        }

        let items = self
            .ctx
            .provider
            .list_messages(&instance.name, &remote_jid, message_limit)
            .await?;
        let created = ingest_items(&self.ctx, instance, &items).await?;

        self.refresh_avatar(instance, &remote_jid).await;

        Ok(Some(created))
    }

    /// Opportunistic avatar refresh. Failures leave the stored value.
    async fn refresh_avatar(&self, instance: &Instance, remote_jid: &str) {
        let url = match self
            .ctx
            .provider
            .profile_picture_url(&instance.name, remote_jid)
            .await
        {
            Ok(Some(url)) => url,
            Ok(None) => return,
            Err(e) => {
                debug!(instance = %instance.name, jid = remote_jid, error = %e,
                       "avatar lookup failed");
                return;
            }
        };
        if let Ok(Some(conversation)) =
            conversations::get_by_remote_jid(&self.ctx.db, &instance.id, remote_jid).await
        {
            if let Err(e) =
                conversations::set_avatar_url(&self.ctx.db, &conversation.id, &url, now_unix())
                    .await
            {
                debug!(instance = %instance.name, jid = remote_jid, error = %e,
                       "avatar update failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    use serde_json::json;
    use tempfile::tempdir;
    use tidings_core::{InstanceStatus, ProviderClient};
    use tidings_ingest::KeywordClassifier;
    use tidings_storage::Database;
    use tidings_storage::queries::{instances, messages};
    use tidings_test_utils::MockProviderClient;

    use super::*;

    fn sync_config() -> SyncConfig {
        SyncConfig {
            initial_chat_limit: 2,
            initial_message_limit: 10,
            recent_chat_limit: 10,
            recent_message_limit: 5,
            chat_timeout_secs: 5,
            lease_ttl_secs: 60,
            interval_secs: 300,
        }
    }

    fn chat(jid: &str, ts: Option<i64>) -> RemoteChat {
        RemoteChat {
            remote_jid: jid.to_string(),
            display_name: Some("Alice".to_string()),
            last_message_ts: ts,
            is_group: None,
            is_broadcast: None,
        }
    }

    fn text_item(id: &str, jid: &str, ts: i64) -> serde_json::Value {
        json!({
            "key": {"remoteJid": jid, "fromMe": false, "id": id},
            "message": {"conversation": "hello"},
            "messageTimestamp": ts
        })
    }

    async fn setup(
        provider: Arc<dyn ProviderClient>,
    ) -> (SyncService, Instance, tempfile::TempDir) {
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

        let ctx = IngestContext {
            db,
            provider,
            object_store: None,
            classifier: Arc::new(KeywordClassifier),
            hooks: Vec::new(),
            media_namespace: "tidings".to_string(),
        };
        (SyncService::new(ctx, sync_config()), instance, dir)
    }

    #[tokio::test]
    async fn full_sync_backfills_empty_instance() {
        let provider = Arc::new(
            MockProviderClient::new()
                .with_chats(vec![chat("111@s.whatsapp.net", Some(1000))])
                .with_messages(
                    "111@s.whatsapp.net",
                    vec![
                        text_item("M-1", "111@s.whatsapp.net", 900),
                        text_item("M-2", "111@s.whatsapp.net", 1000),
                    ],
                ),
        );
        let (service, instance, _dir) = setup(provider).await;

        let report = service.sync_instance(&instance).await.unwrap();
        assert_eq!(report.mode, Some(SyncMode::Full));
        assert_eq!(report.chats_synced, 1);
        assert_eq!(report.messages_created, 2);
        assert!(messages::message_exists(&service.ctx.db, "M-1").await.unwrap());
    }

    #[tokio::test]
    async fn full_mode_respects_the_low_chat_bound() {
        let provider = Arc::new(MockProviderClient::new().with_chats(vec![
            chat("111@s.whatsapp.net", None),
            chat("222@s.whatsapp.net", None),
            chat("333@s.whatsapp.net", None),
        ]));
        let (service, instance, _dir) = setup(provider).await;

        // initial_chat_limit is 2; the mock honors the limit argument.
        let report = service.sync_instance(&instance).await.unwrap();
        assert_eq!(report.chats_listed, 2);
    }

    #[tokio::test]
    async fn recent_sync_short_circuits_without_message_fetches() {
        let provider = Arc::new(
            MockProviderClient::new()
                .with_chats(vec![chat("111@s.whatsapp.net", Some(5000))])
                .with_messages(
                    "111@s.whatsapp.net",
                    vec![text_item("SEED", "111@s.whatsapp.net", 5000)],
                ),
        );
        let (service, instance, _dir) = setup(provider.clone()).await;

        // First pass populates the conversation up to ts 5000.
        service.sync_instance(&instance).await.unwrap();
        assert_eq!(provider.list_messages_calls.load(Ordering::SeqCst), 1);

        // Remote reports nothing newer: the thread must be skipped with
        // zero message fetches.
        let report = service.sync_instance(&instance).await.unwrap();
        assert_eq!(report.mode, Some(SyncMode::Recent));
        assert_eq!(report.chats_skipped, 1);
        assert_eq!(report.chats_synced, 0);
        assert_eq!(provider.list_messages_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn group_hints_and_addresses_are_filtered() {
        let mut flagged = chat("444@s.whatsapp.net", None);
        flagged.is_group = Some(true);
        let provider = Arc::new(
            MockProviderClient::new().with_chats(vec![chat("123@g.us", None), flagged]),
        );
        let (service, instance, _dir) = setup(provider).await;

        let report = service.sync_instance(&instance).await.unwrap();
        assert_eq!(report.chats_skipped, 2);
        assert_eq!(report.chats_synced, 0);
    }

    #[tokio::test]
    async fn concurrent_pass_is_refused_by_the_lease() {
        let provider = Arc::new(MockProviderClient::new());
        let (service, instance, _dir) = setup(provider).await;

        let _held = service.leases.try_acquire(&instance.id).unwrap();
        assert!(service.sync_instance(&instance).await.is_none());
    }

    /// Lists one chat, then hangs forever on the message fetch.
    struct StallingProvider;

    #[async_trait::async_trait]
    impl ProviderClient for StallingProvider {
        async fn connect_instance(&self, _: &str) -> Result<Option<String>, TidingsError> {
            Ok(None)
        }

        async fn connection_state(&self, _: &str) -> Result<String, TidingsError> {
            Ok("open".to_string())
        }

        async fn logout_instance(&self, _: &str) -> Result<(), TidingsError> {
            Ok(())
        }

        async fn list_chats(&self, _: &str, _: u32) -> Result<Vec<RemoteChat>, TidingsError> {
            Ok(vec![chat("111@s.whatsapp.net", Some(1000))])
        }

        async fn list_messages(
            &self,
            _: &str,
            _: &str,
            _: u32,
        ) -> Result<Vec<serde_json::Value>, TidingsError> {
            std::future::pending().await
        }

        async fn profile_picture_url(
            &self,
            _: &str,
            _: &str,
        ) -> Result<Option<String>, TidingsError> {
            Ok(None)
        }

        async fn download_media(
            &self,
            _: &str,
            _: &serde_json::Value,
        ) -> Result<String, TidingsError> {
            Err(TidingsError::Internal("not scripted".to_string()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn wedged_thread_fetch_times_out_and_the_pass_finishes() {
        let (service, instance, _dir) = setup(Arc::new(StallingProvider)).await;

        let report = service.sync_instance(&instance).await.unwrap();
        assert_eq!(report.chats_listed, 1);
        assert_eq!(report.chats_synced, 0, "the wedged thread never completes");
        assert_eq!(report.chats_skipped, 0);
        assert_eq!(report.messages_created, 0);
    }

    #[tokio::test]
    async fn avatar_refresh_is_best_effort() {
        let provider = Arc::new(
            MockProviderClient::new()
                .with_chats(vec![chat("111@s.whatsapp.net", Some(1000))])
                .with_messages(
                    "111@s.whatsapp.net",
                    vec![text_item("M-1", "111@s.whatsapp.net", 1000)],
                ),
        );
        provider
            .avatars
            .lock()
            .unwrap()
            .insert("111@s.whatsapp.net".to_string(), "https://pic".to_string());
        let (service, instance, _dir) = setup(provider).await;

        service.sync_instance(&instance).await.unwrap();
        let conversation =
            conversations::get_by_remote_jid(&service.ctx.db, "inst-1", "111@s.whatsapp.net")
                .await
                .unwrap()
                .unwrap();
        assert_eq!(conversation.avatar_url.as_deref(), Some("https://pic"));
    }
}
