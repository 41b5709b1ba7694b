// SPDX-FileCopyrightText: 2026 Tidings Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Downstream trigger capability invoked by the ingestion engine.

use async_trait::async_trait;

use crate::types::{Conversation, Instance, Message};

/// Hooks fired by the engine after state changes.
///
/// Hooks run after the owning record is persisted and must not assume they
/// can veto the change. Failures inside a hook are the hook's problem;
/// the engine ignores them.
#[async_trait]
pub trait EngineHook: Send + Sync {
    /// Fired exactly once per newly created message, never for duplicates.
    async fn on_message_created(&self, _conversation: &Conversation, _message: &Message) {}

    /// Fired when an instance transitions to `connected`.
    async fn on_instance_connected(&self, _instance: &Instance) {}
}
