// src/db/snapshot.rs
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use crate::db::connection::Database;
use crate::db::last_check;
use crate::domain::{
    from_millis, ChangeKind, ChangeRecord, CheckStatus, Entity, Lists, RemovedEntity, Timestamp,
    TrackedEntity,
};
use crate::errors::ServerError;

/// Replaces the snapshot and appends `changes` in one transaction, together
/// with the success marker for this check.
pub fn apply_check(
    db: &Database,
    entities: &[Entity],
    changes: &[ChangeRecord],
    at: Timestamp,
) -> Result<(), ServerError> {
    db.with_conn(|conn| {
        let tx = conn.transaction()?;
        replace_snapshot(&tx, entities, at)?;
        insert_changes(&tx, changes)?;
        last_check::upsert(&tx, at, CheckStatus::Success)?;
        tx.commit()?;
        Ok(())
    })
}

/// First population of an empty store. No change records are written.
pub fn seed_snapshot(db: &Database, entities: &[Entity], at: Timestamp) -> Result<(), ServerError> {
    db.with_conn(|conn| {
        let tx = conn.transaction()?;
        replace_snapshot(&tx, entities, at)?;
        last_check::upsert(&tx, at, CheckStatus::Success)?;
        tx.commit()?;
        Ok(())
    })
}

fn replace_snapshot(tx: &Transaction, entities: &[Entity], at: Timestamp) -> Result<(), ServerError> {
    tx.execute("DELETE FROM entities", [])?;

    let mut stmt =
        tx.prepare("INSERT OR REPLACE INTO entities (id, data, timestamp) VALUES (?1, ?2, ?3)")?;
    for entity in entities {
        stmt.execute(params![entity.id(), entity.to_json()?, at.timestamp_millis()])?;
    }
    Ok(())
}

fn insert_changes(tx: &Transaction, changes: &[ChangeRecord]) -> Result<(), ServerError> {
    let mut log = tx.prepare(
        "INSERT OR REPLACE INTO changes (id, type, payload, timestamp) VALUES (?1, ?2, ?3, ?4)",
    )?;
    let mut added = tx.prepare(
        "INSERT OR REPLACE INTO added_entities (id, data, timestamp) VALUES (?1, ?2, ?3)",
    )?;
    let mut removed = tx.prepare(
        "INSERT OR REPLACE INTO removed_entities (id, data, timestamp) VALUES (?1, ?2, ?3)",
    )?;

    for change in changes {
        let payload = change.kind.payload_json()?;
        let ts = change.timestamp.timestamp_millis();
        log.execute(params![change.id, change.type_name(), payload, ts])?;

        match &change.kind {
            ChangeKind::Added { .. } => {
                added.execute(params![change.id, payload, ts])?;
            }
            ChangeKind::Removed { .. } => {
                removed.execute(params![change.id, payload, ts])?;
            }
            ChangeKind::Changed { .. } => {}
        }
    }
    Ok(())
}

pub fn load_lists(db: &Database) -> Result<Lists, ServerError> {
    db.with_conn(|conn| {
        Ok(Lists {
            models: load_current(conn)?,
            removed: load_removed(conn)?,
            changes: load_changes(conn, None)?,
        })
    })
}

/// Current snapshot in upstream order; `added_at` is the latest addition
/// event for the id, or the snapshot time for seeded entities.
pub fn load_current(conn: &Connection) -> Result<Vec<TrackedEntity>, ServerError> {
    let mut stmt = conn.prepare(
        r#"
        SELECT e.data, COALESCE(a.added_at, e.timestamp)
        FROM entities e
        LEFT JOIN (
            SELECT id, MAX(timestamp) AS added_at
            FROM added_entities
            GROUP BY id
        ) a ON a.id = e.id
        ORDER BY e.rowid
        "#,
    )?;

    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (data, added_at) = row?;
        out.push(TrackedEntity {
            entity: decode_entity(&data)?,
            added_at: from_millis(added_at),
        });
    }
    Ok(out)
}

/// Entities absent from the snapshot, each with its latest removal, newest first.
pub fn load_removed(conn: &Connection) -> Result<Vec<RemovedEntity>, ServerError> {
    let mut stmt = conn.prepare(
        r#"
        SELECT r.data, r.timestamp
        FROM removed_entities r
        WHERE r.id NOT IN (SELECT id FROM entities)
          AND r.timestamp = (
              SELECT MAX(r2.timestamp) FROM removed_entities r2 WHERE r2.id = r.id
          )
        ORDER BY r.timestamp DESC, r.id
        "#,
    )?;

    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (data, removed_at) = row?;
        out.push(RemovedEntity {
            entity: decode_entity(&data)?,
            removed_at: from_millis(removed_at),
        });
    }
    Ok(out)
}

/// Change log, most recent first; records of one check keep emission order.
pub fn load_changes(conn: &Connection, limit: Option<usize>) -> Result<Vec<ChangeRecord>, ServerError> {
    let limit = limit.map(|l| l as i64).unwrap_or(-1);
    let mut stmt = conn.prepare(
        "SELECT id, type, payload, timestamp FROM changes ORDER BY timestamp DESC, rowid ASC LIMIT ?1",
    )?;
    let rows = stmt.query_map([limit], read_change_row)?;
    collect_changes(rows)
}

pub fn changes_for(conn: &Connection, id: &str) -> Result<Vec<ChangeRecord>, ServerError> {
    let mut stmt = conn.prepare(
        "SELECT id, type, payload, timestamp FROM changes WHERE id = ?1 ORDER BY timestamp DESC",
    )?;
    let rows = stmt.query_map([id], read_change_row)?;
    collect_changes(rows)
}

/// Latest write to either the change log or the snapshot.
pub fn last_change_at(conn: &Connection) -> Result<Option<Timestamp>, ServerError> {
    let ms: Option<i64> = conn
        .query_row(
            r#"
            SELECT MAX(ts) FROM (
                SELECT MAX(timestamp) AS ts FROM changes
                UNION ALL
                SELECT MAX(timestamp) AS ts FROM entities
            )
            "#,
            [],
            |r| r.get(0),
        )
        .optional()?
        .flatten();
    Ok(ms.map(from_millis))
}

type ChangeRow = (String, String, String, i64);

fn read_change_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChangeRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn collect_changes<I>(rows: I) -> Result<Vec<ChangeRecord>, ServerError>
where
    I: Iterator<Item = rusqlite::Result<ChangeRow>>,
{
    let mut out = Vec::new();
    for row in rows {
        let (id, type_name, payload, ts) = row?;
        out.push(ChangeRecord {
            kind: ChangeKind::from_stored(&type_name, &payload)?,
            id,
            timestamp: from_millis(ts),
        });
    }
    Ok(out)
}

fn decode_entity(data: &str) -> Result<Entity, ServerError> {
    let value = serde_json::from_str(data)?;
    Entity::from_value(value)
        .ok_or_else(|| ServerError::DbError("stored entity has no string id".into()))
}
