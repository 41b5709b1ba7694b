// SPDX-FileCopyrightText: 2026 Tidings Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation operations.
//!
//! All mutation of shared conversation state (recency, unread counter,
//! attribution) goes through [`apply_observation`], a single atomic UPDATE.
//! Callers never read-modify-write these columns.

use std::str::FromStr;

use rusqlite::params;
use tidings_core::TidingsError;

use crate::database::Database;
use crate::models::{AttributionFacts, Conversation, MarketingSource};

/// One message observation to fold into a conversation.
#[derive(Debug, Clone, Default)]
pub struct ConversationObservation {
    /// Preview/content of the observed message.
    pub preview: Option<String>,
    /// Message timestamp, unix seconds (already normalized).
    pub message_ts: i64,
    /// True for inbound messages; increments the unread counter.
    pub inbound: bool,
    /// Contact display name, when the payload carried one.
    pub display_name: Option<String>,
    /// Attribution facts extracted from the raw payload, if any.
    pub attribution: Option<AttributionFacts>,
}

fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    let source: String = row.get(8)?;
    Ok(Conversation {
        id: row.get(0)?,
        instance_id: row.get(1)?,
        remote_jid: row.get(2)?,
        display_name: row.get(3)?,
        avatar_url: row.get(4)?,
        last_message_preview: row.get(5)?,
        last_message_at: row.get(6)?,
        unread_count: row.get(7)?,
        marketing_source: MarketingSource::from_str(&source).unwrap_or(MarketingSource::Unknown),
        ad_click_id: row.get(9)?,
        ad_source_id: row.get(10)?,
        ad_source_type: row.get(11)?,
        ad_show_attribution: row.get(12)?,
        pinned: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

const CONVERSATION_COLUMNS: &str = "id, instance_id, remote_jid, display_name, avatar_url, \
                                    last_message_preview, last_message_at, unread_count, \
                                    marketing_source, ad_click_id, ad_source_id, ad_source_type, \
                                    ad_show_attribution, pinned, created_at, updated_at";

/// Find the conversation for (instance, remote contact), creating it when
/// absent.
///
/// On create the record's `created_at` is seeded from the observed message's
/// own timestamp, and `last_message_at` starts at zero so the first
/// [`apply_observation`] establishes recency. The `(instance_id, remote_jid)`
/// unique constraint plus `INSERT OR IGNORE` make concurrent creates safe.
pub async fn find_or_create(
    db: &Database,
    instance_id: &str,
    remote_jid: &str,
    display_name: Option<&str>,
    seed_ts: i64,
    now: i64,
) -> Result<Conversation, TidingsError> {
    let instance_id = instance_id.to_string();
    let remote_jid = remote_jid.to_string();
    let display_name = display_name.map(|s| s.to_string());
    let new_id = uuid::Uuid::new_v4().to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO conversations
                 (id, instance_id, remote_jid, display_name, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![new_id, instance_id, remote_jid, display_name, seed_ts, now],
            )?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONVERSATION_COLUMNS} FROM conversations
                 WHERE instance_id = ?1 AND remote_jid = ?2"
            ))?;
            let conversation =
                stmt.query_row(params![instance_id, remote_jid], row_to_conversation)?;
            Ok(conversation)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Atomically fold one message observation into the conversation.
///
/// - `last_message_at` only ever moves forward (MAX), so reconciliation
///   replays cannot regress recency.
/// - Preview/content follow the same guard so they always describe the
///   newest known message.
/// - The unread counter increments only for inbound observations; the
///   caller guarantees it is invoked at most once per external message id.
/// - Attribution columns are write-once-if-absent (COALESCE); the coarse
///   marketing source may only be upgraded away from `unknown`.
pub async fn apply_observation(
    db: &Database,
    conversation_id: &str,
    observation: &ConversationObservation,
    now: i64,
) -> Result<(), TidingsError> {
    let conversation_id = conversation_id.to_string();
    let observation = observation.clone();
    db.connection()
        .call(move |conn| {
            let facts = observation.attribution.clone().unwrap_or_default();
            let source_upgrade = if facts.is_meta_ads() {
                MarketingSource::AdAttributed.to_string()
            } else {
                MarketingSource::Unknown.to_string()
            };
            conn.execute(
                "UPDATE conversations SET
                     last_message_preview = CASE WHEN ?2 >= last_message_at
                                                 THEN COALESCE(?3, last_message_preview)
                                                 ELSE last_message_preview END,
                     last_message_at      = MAX(last_message_at, ?2),
                     unread_count         = unread_count + CASE WHEN ?4 THEN 1 ELSE 0 END,
                     display_name         = COALESCE(display_name, ?5),
                     ad_click_id          = COALESCE(ad_click_id, ?6),
                     ad_source_id         = COALESCE(ad_source_id, ?7),
                     ad_source_type       = COALESCE(ad_source_type, ?8),
                     ad_show_attribution  = COALESCE(ad_show_attribution, ?9),
                     marketing_source     = CASE WHEN marketing_source = 'unknown'
                                                 THEN ?10 ELSE marketing_source END,
                     updated_at           = ?11
                 WHERE id = ?1",
                params![
                    conversation_id,
                    observation.message_ts,
                    observation.preview,
                    observation.inbound,
                    observation.display_name,
                    facts.ad_click_id,
                    facts.source_id,
                    facts.source_type,
                    facts.show_attribution,
                    source_upgrade,
                    now,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get a conversation by id.
pub async fn get_conversation(
    db: &Database,
    id: &str,
) -> Result<Option<Conversation>, TidingsError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"
            ))?;
            match stmt.query_row(params![id], row_to_conversation) {
                Ok(conversation) => Ok(Some(conversation)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get the conversation for one remote contact under one instance.
pub async fn get_by_remote_jid(
    db: &Database,
    instance_id: &str,
    remote_jid: &str,
) -> Result<Option<Conversation>, TidingsError> {
    let instance_id = instance_id.to_string();
    let remote_jid = remote_jid.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONVERSATION_COLUMNS} FROM conversations
                 WHERE instance_id = ?1 AND remote_jid = ?2"
            ))?;
            match stmt.query_row(params![instance_id, remote_jid], row_to_conversation) {
                Ok(conversation) => Ok(Some(conversation)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// List conversations for an instance, most recent activity first.
pub async fn list_for_instance(
    db: &Database,
    instance_id: &str,
    limit: i64,
) -> Result<Vec<Conversation>, TidingsError> {
    let instance_id = instance_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONVERSATION_COLUMNS} FROM conversations
                 WHERE instance_id = ?1
                 ORDER BY pinned DESC, last_message_at DESC LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![instance_id, limit], row_to_conversation)?;
            let mut conversations = Vec::new();
            for row in rows {
                conversations.push(row?);
            }
            Ok(conversations)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Count conversations under an instance. Zero means a full sync is due.
pub async fn count_for_instance(db: &Database, instance_id: &str) -> Result<i64, TidingsError> {
    let instance_id = instance_id.to_string();
    db.connection()
        .call(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM conversations WHERE instance_id = ?1",
                params![instance_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Reset the unread counter.
pub async fn mark_read(db: &Database, conversation_id: &str, now: i64) -> Result<(), TidingsError> {
    let conversation_id = conversation_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE conversations SET unread_count = 0, updated_at = ?2 WHERE id = ?1",
                params![conversation_id, now],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Pin or unpin a conversation.
pub async fn set_pinned(
    db: &Database,
    conversation_id: &str,
    pinned: bool,
    now: i64,
) -> Result<(), TidingsError> {
    let conversation_id = conversation_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE conversations SET pinned = ?2, updated_at = ?3 WHERE id = ?1",
                params![conversation_id, pinned, now],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Store a refreshed avatar URL.
pub async fn set_avatar_url(
    db: &Database,
    conversation_id: &str,
    url: &str,
    now: i64,
) -> Result<(), TidingsError> {
    let conversation_id = conversation_id.to_string();
    let url = url.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE conversations SET avatar_url = ?2, updated_at = ?3 WHERE id = ?1",
                params![conversation_id, url, now],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}
