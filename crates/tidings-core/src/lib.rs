// SPDX-FileCopyrightText: 2026 Tidings Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Tidings conversation engine.
//!
//! This crate provides the domain types, the shared error type, and the
//! collaborator traits used throughout the Tidings workspace. The ingestion,
//! sync, provider, and gateway crates all build on definitions here.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::TidingsError;
pub use traits::{EngineHook, MessageClassifier, ObjectStore, ProviderClient};
pub use types::{
    AttributionFacts, Classification, ConnectionSignal, ContentType, Conversation, Direction,
    Instance, InstanceEvent, InstanceStatus, MarketingSource, MediaDescriptor, Message,
    RemoteChat, normalize_unix_seconds, now_unix,
};
