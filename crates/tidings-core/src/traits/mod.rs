// SPDX-FileCopyrightText: 2026 Tidings Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator trait definitions for the Tidings engine.
//!
//! External systems (the messaging gateway, object storage, the pluggable
//! classifier) are reached only through these traits, and all implement
//! `#[async_trait]` for dynamic dispatch where calls suspend.

pub mod classifier;
pub mod hook;
pub mod object_store;
pub mod provider;

pub use classifier::MessageClassifier;
pub use hook::EngineHook;
pub use object_store::ObjectStore;
pub use provider::ProviderClient;
