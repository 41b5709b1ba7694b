// SPDX-FileCopyrightText: 2026 Tidings Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. Do NOT create additional Connection instances for writes: the
//! single-writer model is what turns a losing concurrent
//! `INSERT OR IGNORE` on `messages.external_id` into a detectable no-op
//! instead of a race.

use std::path::Path;

use tidings_core::TidingsError;

/// Handle to the SQLite database behind the single background writer.
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (or create) the database at `path` in WAL mode and run all
    /// pending migrations.
    pub async fn open(path: &str) -> Result<Self, TidingsError> {
        Self::open_with_wal(path, true).await
    }

    /// Open with explicit WAL selection. Rollback journal mode is only
    /// useful for throwaway scratch databases.
    pub async fn open_with_wal(path: &str, wal_mode: bool) -> Result<Self, TidingsError> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| TidingsError::Storage {
                    source: Box::new(e),
                })?;
            }
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| TidingsError::Storage {
                source: Box::new(e),
            })?;

        conn.call(move |conn| -> Result<(), TidingsError> {
            if wal_mode {
                conn.execute_batch("PRAGMA journal_mode = WAL;")
                    .map_err(|e| TidingsError::Storage {
                        source: Box::new(e),
                    })?;
            }
            conn.execute_batch(
                "PRAGMA synchronous = NORMAL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
            )
            .map_err(|e| TidingsError::Storage {
                source: Box::new(e),
            })?;
            crate::migrations::run_migrations(conn)
        })
        .await
        .map_err(|e| match e {
            tokio_rusqlite::Error::Error(inner) => inner,
            other => TidingsError::Storage {
                source: other.to_string().into(),
            },
        })?;

        Ok(Self { conn })
    }

    /// The underlying tokio-rusqlite connection. Query modules call through
    /// `connection().call(...)`.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoint the WAL. Safe to call on shutdown or at any quiet moment.
    pub async fn close(&self) -> Result<(), TidingsError> {
        self.conn
            .call(|conn| {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }
}

/// Map a tokio-rusqlite error into the crate error type.
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> TidingsError {
    TidingsError::Storage {
        source: Box::new(e),
    }
}
