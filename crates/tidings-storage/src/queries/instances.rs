// SPDX-FileCopyrightText: 2026 Tidings Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Instance record and event-log operations.
//!
//! Status columns are only ever written through [`record_signal`] and
//! [`mark_error`]; the instance state machine in `tidings-ingest` is the
//! sole caller. Everything else reads.

use std::str::FromStr;

use rusqlite::params;
use tidings_core::TidingsError;

use crate::database::Database;
use crate::models::{Instance, InstanceEvent, InstanceStatus};

fn row_to_instance(row: &rusqlite::Row<'_>) -> rusqlite::Result<Instance> {
    let status: String = row.get(3)?;
    Ok(Instance {
        id: row.get(0)?,
        name: row.get(1)?,
        tenant_id: row.get(2)?,
        status: InstanceStatus::from_str(&status).unwrap_or(InstanceStatus::Error),
        qr_code: row.get(4)?,
        last_activity_at: row.get(5)?,
        last_webhook_at: row.get(6)?,
        last_webhook_event: row.get(7)?,
        last_error: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

const INSTANCE_COLUMNS: &str = "id, name, tenant_id, status, qr_code, last_activity_at, \
                                last_webhook_at, last_webhook_event, last_error, \
                                created_at, updated_at";

/// Create a new instance record.
pub async fn create_instance(db: &Database, instance: &Instance) -> Result<(), TidingsError> {
    let instance = instance.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO instances
                 (id, name, tenant_id, status, qr_code, last_activity_at,
                  last_webhook_at, last_webhook_event, last_error, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    instance.id,
                    instance.name,
                    instance.tenant_id,
                    instance.status.to_string(),
                    instance.qr_code,
                    instance.last_activity_at,
                    instance.last_webhook_at,
                    instance.last_webhook_event,
                    instance.last_error,
                    instance.created_at,
                    instance.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get an instance by its unique name.
pub async fn get_instance_by_name(
    db: &Database,
    name: &str,
) -> Result<Option<Instance>, TidingsError> {
    let name = name.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {INSTANCE_COLUMNS} FROM instances WHERE name = ?1"
            ))?;
            match stmt.query_row(params![name], row_to_instance) {
                Ok(instance) => Ok(Some(instance)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// List all instances, oldest first.
pub async fn list_instances(db: &Database) -> Result<Vec<Instance>, TidingsError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {INSTANCE_COLUMNS} FROM instances ORDER BY created_at ASC"
            ))?;
            let rows = stmt.query_map([], row_to_instance)?;
            let mut instances = Vec::new();
            for row in rows {
                instances.push(row?);
            }
            Ok(instances)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Delete an instance by name. Conversations and messages cascade.
///
/// Returns false when no such instance existed.
pub async fn delete_instance_by_name(db: &Database, name: &str) -> Result<bool, TidingsError> {
    let name = name.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute("DELETE FROM instances WHERE name = ?1", params![name])?;
            Ok(changed > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Apply one connection signal's storage effects atomically: status, QR
/// credential, last-webhook bookkeeping, and the event-log append.
///
/// `qr_code = None` clears the credential; every signal except `qr-issued`
/// passes None.
pub async fn record_signal(
    db: &Database,
    instance_id: &str,
    status: InstanceStatus,
    qr_code: Option<String>,
    event_kind: &str,
    payload: Option<String>,
    now: i64,
) -> Result<(), TidingsError> {
    let instance_id = instance_id.to_string();
    let event_kind = event_kind.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE instances
                 SET status = ?2, qr_code = ?3, last_webhook_at = ?4,
                     last_webhook_event = ?5, updated_at = ?4
                 WHERE id = ?1",
                params![instance_id, status.to_string(), qr_code, now, event_kind],
            )?;
            tx.execute(
                "INSERT INTO instance_events (instance_id, event, payload, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![instance_id, event_kind, payload, now],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Append an event-log entry without touching connection state.
///
/// Used for structurally recognizable but unknown signals, and for signals
/// absorbed while the instance sits in `error`.
pub async fn append_event(
    db: &Database,
    instance_id: &str,
    event_kind: &str,
    payload: Option<String>,
    now: i64,
) -> Result<(), TidingsError> {
    let instance_id = instance_id.to_string();
    let event_kind = event_kind.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO instance_events (instance_id, event, payload, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![instance_id, event_kind, payload, now],
            )?;
            tx.execute(
                "UPDATE instances
                 SET last_webhook_at = ?2, last_webhook_event = ?3, updated_at = ?2
                 WHERE id = ?1",
                params![instance_id, now, event_kind],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Transition an instance to `error`, recording the failure message.
pub async fn mark_error(
    db: &Database,
    instance_id: &str,
    message: &str,
    now: i64,
) -> Result<(), TidingsError> {
    let instance_id = instance_id.to_string();
    let message = message.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE instances
                 SET status = 'error', qr_code = NULL, last_error = ?2, updated_at = ?3
                 WHERE id = ?1",
                params![instance_id, message, now],
            )?;
            tx.execute(
                "INSERT INTO instance_events (instance_id, event, payload, created_at)
                 VALUES (?1, 'error', ?2, ?3)",
                params![instance_id, message, now],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Bump the last-activity timestamp (called when a message is ingested).
pub async fn touch_activity(db: &Database, instance_id: &str, ts: i64) -> Result<(), TidingsError> {
    let instance_id = instance_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE instances SET last_activity_at = ?2, updated_at = ?2 WHERE id = ?1",
                params![instance_id, ts],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Read the event log for an instance, oldest first.
pub async fn list_events(
    db: &Database,
    instance_id: &str,
    limit: i64,
) -> Result<Vec<InstanceEvent>, TidingsError> {
    let instance_id = instance_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, instance_id, event, payload, created_at
                 FROM instance_events WHERE instance_id = ?1
                 ORDER BY id ASC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![instance_id, limit], |row| {
                Ok(InstanceEvent {
                    id: row.get(0)?,
                    instance_id: row.get(1)?,
                    event: row.get(2)?,
                    payload: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?;
            let mut events = Vec::new();
            for row in rows {
                events.push(row?);
            }
            Ok(events)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tidings_core::now_unix;

    pub(crate) fn make_instance(name: &str) -> Instance {
        Instance {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            tenant_id: Some("tenant-1".to_string()),
            status: InstanceStatus::Connecting,
            qr_code: None,
            last_activity_at: None,
            last_webhook_at: None,
            last_webhook_event: None,
            last_error: None,
            created_at: now_unix(),
            updated_at: now_unix(),
        }
    }

    async fn setup() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("test.db").to_str().unwrap())
            .await
            .unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn create_and_get_by_name() {
        let (db, _dir) = setup().await;
        let instance = make_instance("crm-main");
        create_instance(&db, &instance).await.unwrap();

        let found = get_instance_by_name(&db, "crm-main").await.unwrap().unwrap();
        assert_eq!(found.id, instance.id);
        assert_eq!(found.status, InstanceStatus::Connecting);
        assert!(get_instance_by_name(&db, "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_name_is_rejected() {
        let (db, _dir) = setup().await;
        create_instance(&db, &make_instance("crm")).await.unwrap();
        let result = create_instance(&db, &make_instance("crm")).await;
        assert!(result.is_err(), "unique name constraint should fire");
    }

    #[tokio::test]
    async fn record_signal_updates_status_and_appends_event() {
        let (db, _dir) = setup().await;
        let instance = make_instance("crm");
        create_instance(&db, &instance).await.unwrap();

        record_signal(
            &db,
            &instance.id,
            InstanceStatus::Connecting,
            Some("QR-DATA".to_string()),
            "qrcode.updated",
            Some(r#"{"data":{}}"#.to_string()),
            100,
        )
        .await
        .unwrap();

        let found = get_instance_by_name(&db, "crm").await.unwrap().unwrap();
        assert_eq!(found.qr_code.as_deref(), Some("QR-DATA"));
        assert_eq!(found.last_webhook_event.as_deref(), Some("qrcode.updated"));
        assert_eq!(found.last_webhook_at, Some(100));

        record_signal(
            &db,
            &instance.id,
            InstanceStatus::Connected,
            None,
            "connection.update",
            None,
            101,
        )
        .await
        .unwrap();

        let found = get_instance_by_name(&db, "crm").await.unwrap().unwrap();
        assert_eq!(found.status, InstanceStatus::Connected);
        assert!(found.qr_code.is_none(), "QR must clear on connect");

        let events = list_events(&db, &instance.id, 10).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, "qrcode.updated");
        assert_eq!(events[1].event, "connection.update");
    }

    #[tokio::test]
    async fn mark_error_sets_status_and_clears_qr() {
        let (db, _dir) = setup().await;
        let mut instance = make_instance("crm");
        instance.qr_code = Some("stale".to_string());
        create_instance(&db, &instance).await.unwrap();

        mark_error(&db, &instance.id, "gateway unreachable", 200)
            .await
            .unwrap();

        let found = get_instance_by_name(&db, "crm").await.unwrap().unwrap();
        assert_eq!(found.status, InstanceStatus::Error);
        assert!(found.qr_code.is_none());
        assert_eq!(found.last_error.as_deref(), Some("gateway unreachable"));
    }

    #[tokio::test]
    async fn delete_cascades_and_reports_absence() {
        let (db, _dir) = setup().await;
        create_instance(&db, &make_instance("crm")).await.unwrap();
        assert!(delete_instance_by_name(&db, "crm").await.unwrap());
        assert!(!delete_instance_by_name(&db, "crm").await.unwrap());
    }
}
