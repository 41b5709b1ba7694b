// SPDX-FileCopyrightText: 2026 Tidings Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence for the tidings engine.
//!
//! A single async connection (tokio-rusqlite) serializes all writes, which
//! is what makes the `INSERT OR IGNORE` idempotency check in
//! [`queries::messages`] race-free. Schema lives in `migrations/` and is
//! applied by refinery on open.

pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

pub use database::Database;
