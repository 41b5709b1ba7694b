// SPDX-FileCopyrightText: 2026 Tidings Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Serve loop: wires storage, provider, sync, and the HTTP gateway
//! together, then runs the periodic sync timer and the retention sweeper
//! alongside the server.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tidings_config::model::TidingsConfig;
use tidings_core::{
    EngineHook, Instance, InstanceStatus, ObjectStore, TidingsError, now_unix,
};
use tidings_gateway::{GatewayState, ServerConfig, start_server};
use tidings_ingest::{IngestContext, KeywordClassifier};
use tidings_provider::{EvolutionClient, HttpObjectStore};
use tidings_storage::Database;
use tidings_storage::queries::{instances, messages};
use tidings_sync::SyncService;
use tracing::{info, warn};

/// Fires a reconciliation pass whenever an instance connects, so a fresh
/// session backfills without waiting for the periodic timer.
struct SyncOnConnect {
    sync: SyncService,
}

#[async_trait]
impl EngineHook for SyncOnConnect {
    async fn on_instance_connected(&self, instance: &Instance) {
        let sync = self.sync.clone();
        let instance = instance.clone();
        tokio::spawn(async move {
            sync.sync_instance(&instance).await;
        });
    }
}

pub async fn run(config: TidingsConfig) -> Result<(), TidingsError> {
    init_tracing(&config.engine.log_level);
    info!(name = %config.engine.name, "starting tidings");

    let db = Arc::new(
        Database::open_with_wal(&config.storage.database_path, config.storage.wal_mode).await?,
    );

    let timeout = Duration::from_secs(config.provider.request_timeout_secs);
    let provider = Arc::new(EvolutionClient::new(
        &config.provider.base_url,
        config.provider.api_key.as_deref().unwrap_or_default(),
        timeout,
    )?);

    let object_store: Option<Arc<dyn ObjectStore>> =
        match (config.media.enabled, config.media.endpoint.as_deref()) {
            (true, Some(endpoint)) => Some(Arc::new(HttpObjectStore::new(endpoint, timeout)?)),
            _ => None,
        };

    // The sync service and the connect hook share the same context minus
    // the hook itself; hooks only fire on the webhook path.
    let base_ctx = IngestContext {
        db: db.clone(),
        provider: provider.clone(),
        object_store,
        classifier: Arc::new(KeywordClassifier),
        hooks: Vec::new(),
        media_namespace: config.media.namespace.clone(),
    };
    let sync = SyncService::new(base_ctx.clone(), config.sync.clone());

    let mut ctx = base_ctx;
    ctx.hooks.push(Arc::new(SyncOnConnect { sync: sync.clone() }));

    tokio::spawn(periodic_sync(
        db.clone(),
        sync.clone(),
        Duration::from_secs(config.sync.interval_secs),
    ));
    tokio::spawn(retention_sweeper(
        db.clone(),
        config.retention.message_ttl_days,
        Duration::from_secs(config.retention.sweep_interval_secs),
    ));

    let server_config = ServerConfig {
        host: config.gateway.host.clone(),
        port: config.gateway.port,
    };
    start_server(&server_config, GatewayState { ctx, sync }).await
}

/// Recent-sync every connected instance on a fixed interval.
async fn periodic_sync(db: Arc<Database>, sync: SyncService, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.tick().await; // first tick fires immediately; skip it
    loop {
        ticker.tick().await;
        let list = match instances::list_instances(&db).await {
            Ok(list) => list,
            Err(e) => {
                warn!(error = %e, "instance listing failed, skipping sync round");
                continue;
            }
        };
        for instance in list
            .into_iter()
            .filter(|i| i.status == InstanceStatus::Connected)
        {
            sync.sync_instance(&instance).await;
        }
    }
}

/// Purge messages older than the configured window.
async fn retention_sweeper(db: Arc<Database>, ttl_days: u32, interval: Duration) {
    if ttl_days == 0 {
        return;
    }
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let cutoff = now_unix() - i64::from(ttl_days) * 86_400;
        match messages::purge_created_before(&db, cutoff).await {
            Ok(0) => {}
            Ok(purged) => info!(purged, "retention sweep removed expired messages"),
            Err(e) => warn!(error = %e, "retention sweep failed"),
        }
    }
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tidings={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
