// SPDX-FileCopyrightText: 2026 Tidings Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message operations.
//!
//! `external_id` carries a UNIQUE constraint; [`insert_message_if_absent`]
//! relies on it so a losing concurrent insert surfaces as a no-op rather
//! than an error. That single statement is the engine's at-most-once
//! guarantee.

use std::str::FromStr;

use rusqlite::params;
use tidings_core::TidingsError;

use crate::database::Database;
use crate::models::{Classification, ContentType, Direction, MediaDescriptor, Message};

const MESSAGE_COLUMNS: &str = "id, conversation_id, instance_id, external_id, remote_jid, \
                               from_me, status, content_type, content, media_mime_type, \
                               media_file_name, media_size, media_url, classification, \
                               message_ts, created_at";

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let from_me: bool = row.get(5)?;
    let content_type: String = row.get(7)?;
    let media_mime_type: Option<String> = row.get(9)?;
    let media_file_name: Option<String> = row.get(10)?;
    let media_size: Option<i64> = row.get(11)?;
    let media_url: Option<String> = row.get(12)?;
    let classification: Option<String> = row.get(13)?;

    let media = if media_mime_type.is_some()
        || media_file_name.is_some()
        || media_size.is_some()
        || media_url.is_some()
    {
        Some(MediaDescriptor {
            mime_type: media_mime_type,
            file_name: media_file_name,
            size_bytes: media_size,
            url: media_url,
        })
    } else {
        None
    };

    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        instance_id: row.get(2)?,
        external_id: row.get(3)?,
        remote_jid: row.get(4)?,
        direction: if from_me {
            Direction::Outbound
        } else {
            Direction::Inbound
        },
        status: row.get(6)?,
        content_type: ContentType::from_str(&content_type).unwrap_or(ContentType::Other),
        content: row.get(8)?,
        media,
        classification: classification
            .as_deref()
            .and_then(|json| serde_json::from_str::<Classification>(json).ok()),
        message_ts: row.get(14)?,
        created_at: row.get(15)?,
    })
}

/// Insert a message unless its external id is already stored.
///
/// Returns true when this call created the row, false when the id already
/// existed (duplicate delivery or a lost race against another writer).
pub async fn insert_message_if_absent(db: &Database, msg: &Message) -> Result<bool, TidingsError> {
    // Serialized outside the closure so the write path stays a plain
    // rusqlite transaction.
    let classification = msg
        .classification
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| TidingsError::Storage {
            source: Box::new(e),
        })?;
    let msg = msg.clone();
    db.connection()
        .call(move |conn| {
            let media = msg.media.clone().unwrap_or(MediaDescriptor {
                mime_type: None,
                file_name: None,
                size_bytes: None,
                url: None,
            });
            let changed = conn.execute(
                "INSERT OR IGNORE INTO messages
                 (id, conversation_id, instance_id, external_id, remote_jid, from_me,
                  status, content_type, content, media_mime_type, media_file_name,
                  media_size, media_url, classification, message_ts, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                params![
                    msg.id,
                    msg.conversation_id,
                    msg.instance_id,
                    msg.external_id,
                    msg.remote_jid,
                    msg.direction == Direction::Outbound,
                    msg.status,
                    msg.content_type.to_string(),
                    msg.content,
                    media.mime_type,
                    media.file_name,
                    media.size_bytes,
                    media.url,
                    classification,
                    msg.message_ts,
                    msg.created_at,
                ],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Fast existence probe for the idempotency check.
pub async fn message_exists(db: &Database, external_id: &str) -> Result<bool, TidingsError> {
    let external_id = external_id.to_string();
    db.connection()
        .call(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE external_id = ?1",
                params![external_id],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get a message by its provider-assigned external id.
pub async fn get_by_external_id(
    db: &Database,
    external_id: &str,
) -> Result<Option<Message>, TidingsError> {
    let external_id = external_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE external_id = ?1"
            ))?;
            match stmt.query_row(params![external_id], row_to_message) {
                Ok(msg) => Ok(Some(msg)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Patch status and (optionally) edited content of an existing message.
///
/// Core fields (ids, key, direction, timestamp) stay immutable. Returns
/// false when no message with that external id is stored yet.
pub async fn update_status(
    db: &Database,
    external_id: &str,
    status: &str,
    edited_content: Option<&str>,
) -> Result<bool, TidingsError> {
    let external_id = external_id.to_string();
    let status = status.to_string();
    let edited_content = edited_content.map(|s| s.to_string());
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE messages
                 SET status = ?2, content = COALESCE(?3, content)
                 WHERE external_id = ?1",
                params![external_id, status, edited_content],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Remove a message by external id. Returns false when nothing was stored.
pub async fn delete_by_external_id(db: &Database, external_id: &str) -> Result<bool, TidingsError> {
    let external_id = external_id.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "DELETE FROM messages WHERE external_id = ?1",
                params![external_id],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// List messages for a conversation in chronological order.
pub async fn list_for_conversation(
    db: &Database,
    conversation_id: &str,
    limit: i64,
) -> Result<Vec<Message>, TidingsError> {
    let conversation_id = conversation_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY message_ts ASC, created_at ASC LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![conversation_id, limit], row_to_message)?;
            let mut messages = Vec::new();
            for row in rows {
                messages.push(row?);
            }
            Ok(messages)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Retention sweep: delete messages created before the cutoff.
///
/// Returns the number of rows removed.
pub async fn purge_created_before(db: &Database, cutoff: i64) -> Result<u64, TidingsError> {
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "DELETE FROM messages WHERE created_at < ?1",
                params![cutoff],
            )?;
            Ok(changed as u64)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
