// SPDX-FileCopyrightText: 2026 Tidings Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Tidings conversation engine.
//!
//! Provides TOML configuration parsing with strict validation
//! (`deny_unknown_fields`), XDG file hierarchy lookup, and environment
//! variable overrides.
//!
//! # Usage
//!
//! ```no_run
//! use tidings_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("engine name: {}", config.engine.name);
//! ```

pub mod loader;
pub mod model;
pub mod validation;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::TidingsConfig;
use tidings_core::TidingsError;

/// Load configuration from the XDG hierarchy and validate it.
///
/// This is the high-level entry point that loads config from TOML files and
/// env vars via Figment, then runs post-deserialization validation.
pub fn load_and_validate() -> Result<TidingsConfig, TidingsError> {
    let config = loader::load_config().map_err(|e| TidingsError::Config(e.to_string()))?;
    validation::validate_config(&config)?;
    Ok(config)
}

/// Load configuration from an explicit file path and validate it.
///
/// Bypasses the XDG lookup; env var overrides still apply.
pub fn load_and_validate_path(path: &std::path::Path) -> Result<TidingsConfig, TidingsError> {
    let config =
        loader::load_config_from_path(path).map_err(|e| TidingsError::Config(e.to_string()))?;
    validation::validate_config(&config)?;
    Ok(config)
}

/// Load configuration from a TOML string and validate it.
///
/// Useful for testing and explicit configuration.
pub fn load_and_validate_str(toml_content: &str) -> Result<TidingsConfig, TidingsError> {
    let config =
        loader::load_config_from_str(toml_content).map_err(|e| TidingsError::Config(e.to_string()))?;
    validation::validate_config(&config)?;
    Ok(config)
}
