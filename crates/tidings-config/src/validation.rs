// SPDX-FileCopyrightText: 2026 Tidings Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation of semantic config constraints.

use tidings_core::TidingsError;

use crate::model::TidingsConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate constraints figment cannot express.
///
/// Returns the first violation found; config errors are fatal at startup,
/// so there is no value in collecting more than one.
pub fn validate_config(config: &TidingsConfig) -> Result<(), TidingsError> {
    if !LOG_LEVELS.contains(&config.engine.log_level.as_str()) {
        return Err(TidingsError::Config(format!(
            "engine.log_level must be one of {LOG_LEVELS:?}, got {:?}",
            config.engine.log_level
        )));
    }

    if config.provider.base_url.is_empty() {
        return Err(TidingsError::Config(
            "provider.base_url cannot be empty".into(),
        ));
    }
    if !config.provider.base_url.starts_with("http://")
        && !config.provider.base_url.starts_with("https://")
    {
        return Err(TidingsError::Config(format!(
            "provider.base_url must be an http(s) URL, got {:?}",
            config.provider.base_url
        )));
    }

    if config.storage.database_path.is_empty() {
        return Err(TidingsError::Config(
            "storage.database_path cannot be empty".into(),
        ));
    }

    if config.sync.initial_chat_limit == 0 || config.sync.recent_chat_limit == 0 {
        return Err(TidingsError::Config(
            "sync chat limits must be at least 1".into(),
        ));
    }
    if config.sync.initial_message_limit == 0 || config.sync.recent_message_limit == 0 {
        return Err(TidingsError::Config(
            "sync message limits must be at least 1".into(),
        ));
    }
    if config.sync.lease_ttl_secs == 0 {
        return Err(TidingsError::Config(
            "sync.lease_ttl_secs must be at least 1".into(),
        ));
    }

    if config.media.enabled && config.media.namespace.is_empty() {
        return Err(TidingsError::Config(
            "media.namespace cannot be empty when media.enabled is true".into(),
        ));
    }
    if config.media.enabled && config.media.endpoint.is_none() {
        return Err(TidingsError::Config(
            "media.endpoint is required when media.enabled is true".into(),
        ));
    }

    Ok(())
}
