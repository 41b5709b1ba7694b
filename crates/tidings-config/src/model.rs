// SPDX-FileCopyrightText: 2026 Tidings Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Tidings engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup.

use serde::{Deserialize, Serialize};

/// Top-level Tidings configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TidingsConfig {
    /// Engine identity and logging settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Messaging gateway (provider) settings.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// HTTP gateway (webhook ingress + REST API) settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Reconciliation sync settings.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Media retrieval pipeline settings.
    #[serde(default)]
    pub media: MediaConfig,

    /// Message retention settings.
    #[serde(default)]
    pub retention: RetentionConfig,
}

/// Engine identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Display name of this deployment.
    #[serde(default = "default_engine_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: default_engine_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_engine_name() -> String {
    "tidings".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Messaging gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Base URL of the gateway REST API.
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,

    /// Gateway API key. `None` disables outbound provider calls.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Per-request timeout in seconds for gateway calls.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_base_url(),
            api_key: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_provider_base_url() -> String {
    "http://127.0.0.1:8085".to_string()
}

fn default_request_timeout_secs() -> u64 {
    15
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("tidings").join("tidings.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("tidings.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// HTTP gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Host address to bind.
    #[serde(default = "default_gateway_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_gateway_port")]
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
        }
    }
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    8070
}

/// Reconciliation sync configuration.
///
/// Chat and message limits are deliberately bounded: the full pass is small
/// to control first-connect latency, the recent pass lists more threads but
/// relies on the monotonic short-circuit to skip almost all of them.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Threads listed during a full (initial) sync.
    #[serde(default = "default_initial_chat_limit")]
    pub initial_chat_limit: u32,

    /// Messages fetched per thread during a full sync.
    #[serde(default = "default_initial_message_limit")]
    pub initial_message_limit: u32,

    /// Threads listed during a recent (catch-up) sync.
    #[serde(default = "default_recent_chat_limit")]
    pub recent_chat_limit: u32,

    /// Messages fetched per thread during a recent sync.
    #[serde(default = "default_recent_message_limit")]
    pub recent_message_limit: u32,

    /// Deadline per thread-processing iteration, in seconds.
    #[serde(default = "default_chat_timeout_secs")]
    pub chat_timeout_secs: u64,

    /// Per-instance sync lease time-to-live, in seconds. A crashed pass
    /// cannot wedge future syncs for longer than this.
    #[serde(default = "default_lease_ttl_secs")]
    pub lease_ttl_secs: u64,

    /// Interval between periodic recent syncs, in seconds.
    #[serde(default = "default_sync_interval_secs")]
    pub interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            initial_chat_limit: default_initial_chat_limit(),
            initial_message_limit: default_initial_message_limit(),
            recent_chat_limit: default_recent_chat_limit(),
            recent_message_limit: default_recent_message_limit(),
            chat_timeout_secs: default_chat_timeout_secs(),
            lease_ttl_secs: default_lease_ttl_secs(),
            interval_secs: default_sync_interval_secs(),
        }
    }
}

fn default_initial_chat_limit() -> u32 {
    12
}

fn default_initial_message_limit() -> u32 {
    25
}

fn default_recent_chat_limit() -> u32 {
    50
}

fn default_recent_message_limit() -> u32 {
    10
}

fn default_chat_timeout_secs() -> u64 {
    15
}

fn default_lease_ttl_secs() -> u64 {
    120
}

fn default_sync_interval_secs() -> u64 {
    300
}

/// Media retrieval pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MediaConfig {
    /// Enable audio retrieval to object storage. Requires an object store
    /// to be wired at startup; messages still persist when disabled.
    #[serde(default)]
    pub enabled: bool,

    /// Top-level namespace for uploaded object paths.
    #[serde(default = "default_media_namespace")]
    pub namespace: String,

    /// Base URL of the object store's upload endpoint. Required when
    /// `enabled` is true.
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            namespace: default_media_namespace(),
            endpoint: None,
        }
    }
}

fn default_media_namespace() -> String {
    "tidings".to_string()
}

/// Message retention configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    /// Messages are purged this many days after creation. 0 disables purging.
    #[serde(default = "default_message_ttl_days")]
    pub message_ttl_days: u32,

    /// Interval between retention sweeps, in seconds.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            message_ttl_days: default_message_ttl_days(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_message_ttl_days() -> u32 {
    90
}

fn default_sweep_interval_secs() -> u64 {
    3600
}
