// SPDX-FileCopyrightText: 2026 Tidings Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook event processing and message ingestion.
//!
//! The webhook processor ([`processor::handle_event`]) and the
//! reconciliation sync service both funnel message items through one
//! ingestion algorithm ([`ingest::ingest_items`]), so the idempotency and
//! monotonicity contracts hold identically on both paths.

pub mod attribution;
pub mod classify;
pub mod event;
pub mod ingest;
pub mod jid;
pub mod lifecycle;
pub mod media;
pub mod processor;

pub use classify::KeywordClassifier;
pub use ingest::{IngestContext, ingest_items};
pub use processor::{Outcome, handle_event};
