// SPDX-FileCopyrightText: 2026 Tidings Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./tidings.toml` > `~/.config/tidings/tidings.toml`
//! > `/etc/tidings/tidings.toml` with environment variable overrides via
//! `TIDINGS_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::TidingsConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/tidings/tidings.toml` (system-wide)
/// 3. `~/.config/tidings/tidings.toml` (user XDG config)
/// 4. `./tidings.toml` (local directory)
/// 5. `TIDINGS_*` environment variables
pub fn load_config() -> Result<TidingsConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TidingsConfig::default()))
        .merge(Toml::file("/etc/tidings/tidings.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("tidings/tidings.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("tidings.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<TidingsConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TidingsConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<TidingsConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TidingsConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names. For example, `TIDINGS_PROVIDER_API_KEY`
/// must map to `provider.api_key`, not `provider.api.key`.
fn env_provider() -> Env {
    Env::prefixed("TIDINGS_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        // Example: TIDINGS_PROVIDER_BASE_URL -> "provider_base_url"
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("engine_", "engine.", 1)
            .replacen("provider_", "provider.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("gateway_", "gateway.", 1)
            .replacen("sync_", "sync.", 1)
            .replacen("media_", "media.", 1)
            .replacen("retention_", "retention.", 1);
        mapped.into()
    })
}
