// SPDX-FileCopyrightText: 2026 Tidings Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model types for storage entities.
//!
//! The canonical types are defined in `tidings-core::types` for use across
//! crate boundaries. This module re-exports them for convenience within the
//! storage crate.

pub use tidings_core::types::{
    AttributionFacts, Classification, ContentType, Conversation, Direction, Instance,
    InstanceEvent, InstanceStatus, MarketingSource, MediaDescriptor, Message,
};
