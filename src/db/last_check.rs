use rusqlite::{params, Connection, OptionalExtension};

use crate::db::connection::Database;
use crate::db::snapshot;
use crate::domain::{from_millis, CheckStatus, Timestamp, WatcherStatus};
use crate::errors::ServerError;

/// Singleton row (id = 1), last write wins.
pub fn upsert(conn: &Connection, at: Timestamp, status: CheckStatus) -> Result<(), ServerError> {
    conn.execute(
        r#"
        INSERT INTO last_check (id, last_check, last_status) VALUES (1, ?1, ?2)
        ON CONFLICT(id) DO UPDATE SET
            last_check = excluded.last_check,
            last_status = excluded.last_status
        "#,
        params![at.timestamp_millis(), status.as_str()],
    )
    .map_err(|e| ServerError::DbError(format!("record last check failed: {e}")))?;
    Ok(())
}

pub fn record_check(db: &Database, at: Timestamp, status: CheckStatus) -> Result<(), ServerError> {
    db.with_conn(|conn| upsert(conn, at, status))
}

pub fn load(conn: &Connection) -> Result<Option<(Timestamp, CheckStatus)>, ServerError> {
    let row = conn
        .query_row(
            "SELECT last_check, last_status FROM last_check WHERE id = 1",
            [],
            |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?)),
        )
        .optional()
        .map_err(|e| ServerError::DbError(format!("load last check failed: {e}")))?;

    Ok(row.map(|(ms, status)| (from_millis(ms), CheckStatus::parse(&status))))
}

/// Rebuilds the process-wide status from what the store remembers.
pub fn load_status(db: &Database) -> Result<WatcherStatus, ServerError> {
    db.with_conn(|conn| {
        let last = load(conn)?;
        Ok(WatcherStatus {
            api_last_check: last.map(|(at, _)| at),
            api_last_check_status: last.map(|(_, s)| s).unwrap_or(CheckStatus::Unknown),
            db_last_change: snapshot::last_change_at(conn)?,
        })
    })
}
