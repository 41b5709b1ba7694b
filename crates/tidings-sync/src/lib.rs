// SPDX-FileCopyrightText: 2026 Tidings Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pull-based reconciliation for missed webhooks.

pub mod lease;
pub mod service;

pub use lease::{LeaseGuard, SyncLeases};
pub use service::{SyncMode, SyncReport, SyncService};
