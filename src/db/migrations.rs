// src/db/migrations.rs
use rusqlite::Connection;
use tracing::info;

use crate::db::connection::Database;
use crate::errors::ServerError;

pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: &'static str,
}

/// Ordered by version, no gaps. Every step uses create-if-not-exists so a
/// fresh database and a partially migrated one converge on the same schema.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial",
        sql: include_str!("../../sql/migrations/0001_initial.sql"),
    },
    Migration {
        version: 2,
        name: "add_remove_history",
        sql: include_str!("../../sql/migrations/0002_add_remove_history.sql"),
    },
    Migration {
        version: 3,
        name: "drop_empty_changes",
        sql: include_str!("../../sql/migrations/0003_drop_empty_changes.sql"),
    },
    Migration {
        version: 4,
        name: "changes_timestamp_index",
        sql: include_str!("../../sql/migrations/0004_changes_timestamp_index.sql"),
    },
];

pub fn run_migrations(db: &Database) -> Result<u32, ServerError> {
    db.with_conn(|conn| apply_migrations(conn, MIGRATIONS))
}

/// Applies every migration newer than `max(schema_version)`, each in its own
/// transaction together with its version row. Returns the resulting version.
pub fn apply_migrations(conn: &mut Connection, migrations: &[Migration]) -> Result<u32, ServerError> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)")
        .map_err(|e| ServerError::Migration {
            version: 0,
            message: e.to_string(),
        })?;

    let mut current = current_version(conn)?;
    let start = current;

    for migration in migrations.iter().filter(|m| m.version > start) {
        if migration.version != current + 1 {
            return Err(ServerError::Migration {
                version: migration.version,
                message: format!("expected version {} next", current + 1),
            });
        }

        let fail = |e: rusqlite::Error| ServerError::Migration {
            version: migration.version,
            message: e.to_string(),
        };

        let tx = conn.transaction().map_err(fail)?;
        tx.execute_batch(migration.sql).map_err(fail)?;
        tx.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [migration.version],
        )
        .map_err(fail)?;
        tx.commit().map_err(fail)?;

        info!(version = migration.version, name = migration.name, "applied migration");
        current = migration.version;
    }

    Ok(current)
}

pub fn current_version(conn: &Connection) -> Result<u32, ServerError> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )
    .map_err(|e| ServerError::Migration {
        version: 0,
        message: format!("read schema_version: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;

    fn versions(conn: &Connection) -> Vec<u32> {
        let mut stmt = conn
            .prepare("SELECT version FROM schema_version ORDER BY version")
            .unwrap();
        let rows = stmt.query_map([], |r| r.get(0)).unwrap();
        rows.map(|r| r.unwrap()).collect()
    }

    fn schema(conn: &Connection) -> Vec<(String, String)> {
        let mut stmt = conn
            .prepare("SELECT name, sql FROM sqlite_master WHERE sql IS NOT NULL ORDER BY name")
            .unwrap();
        let rows = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
            .unwrap();
        rows.map(|r| r.unwrap()).collect()
    }

    #[test]
    fn fresh_database_gets_every_version_in_order() {
        let mut conn = Connection::open_in_memory().unwrap();
        let version = apply_migrations(&mut conn, MIGRATIONS).unwrap();

        let expected: Vec<u32> = (1..=MIGRATIONS.len() as u32).collect();
        assert_eq!(version, MIGRATIONS.len() as u32);
        assert_eq!(versions(&conn), expected);
    }

    #[test]
    fn rerunning_is_a_no_op() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_migrations(&mut conn, MIGRATIONS).unwrap();
        let before = schema(&conn);

        apply_migrations(&mut conn, MIGRATIONS).unwrap();
        assert_eq!(schema(&conn), before);
        assert_eq!(versions(&conn).len(), MIGRATIONS.len());
    }

    #[test]
    fn partial_then_full_converges_with_fresh() {
        let mut fresh = Connection::open_in_memory().unwrap();
        apply_migrations(&mut fresh, MIGRATIONS).unwrap();

        let mut partial = Connection::open_in_memory().unwrap();
        apply_migrations(&mut partial, &MIGRATIONS[..1]).unwrap();
        assert_eq!(versions(&partial), vec![1]);
        apply_migrations(&mut partial, MIGRATIONS).unwrap();

        assert_eq!(schema(&partial), schema(&fresh));
        assert_eq!(versions(&partial), versions(&fresh));
    }

    #[test]
    fn history_tables_are_backfilled_and_empty_changes_dropped() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_migrations(&mut conn, &MIGRATIONS[..1]).unwrap();

        conn.execute(
            "INSERT INTO changes (id, type, payload, timestamp) VALUES (?1, ?2, ?3, ?4)",
            params!["a", "added", r#"{"id":"a"}"#, 10],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO changes (id, type, payload, timestamp) VALUES (?1, ?2, ?3, ?4)",
            params!["a", "changed", "{}", 20],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO changes (id, type, payload, timestamp) VALUES (?1, ?2, ?3, ?4)",
            params!["a", "removed", r#"{"id":"a"}"#, 30],
        )
        .unwrap();

        apply_migrations(&mut conn, MIGRATIONS).unwrap();

        let added: i64 = conn
            .query_row("SELECT COUNT(*) FROM added_entities WHERE id = 'a'", [], |r| r.get(0))
            .unwrap();
        let removed: i64 = conn
            .query_row("SELECT COUNT(*) FROM removed_entities WHERE id = 'a'", [], |r| r.get(0))
            .unwrap();
        let changed: i64 = conn
            .query_row("SELECT COUNT(*) FROM changes WHERE type = 'changed'", [], |r| r.get(0))
            .unwrap();

        assert_eq!((added, removed, changed), (1, 1, 0));
    }

    #[test]
    fn broken_migration_is_reported_with_its_version() {
        let broken = [
            Migration {
                version: 1,
                name: "ok",
                sql: "CREATE TABLE IF NOT EXISTS t (x INTEGER);",
            },
            Migration {
                version: 2,
                name: "bad",
                sql: "CREATE TABL oops;",
            },
        ];
        let mut conn = Connection::open_in_memory().unwrap();
        let err = apply_migrations(&mut conn, &broken).unwrap_err();

        assert!(matches!(err, ServerError::Migration { version: 2, .. }));
        assert_eq!(versions(&conn), vec![1]);
    }

    #[test]
    fn resumes_after_applied_versions_and_rejects_gaps() {
        let step = |version, sql| Migration {
            version,
            name: "step",
            sql,
        };
        let mut conn = Connection::open_in_memory().unwrap();
        apply_migrations(&mut conn, &[step(1, "CREATE TABLE a (x);")]).unwrap();

        let version = apply_migrations(
            &mut conn,
            &[
                step(1, "CREATE TABLE a (x);"),
                step(2, "CREATE TABLE b (x);"),
                step(3, "CREATE TABLE c (x);"),
            ],
        )
        .unwrap();
        assert_eq!(version, 3);
        assert_eq!(versions(&conn), vec![1, 2, 3]);

        let err = apply_migrations(&mut conn, &[step(5, "CREATE TABLE e (x);")]).unwrap_err();
        assert!(matches!(err, ServerError::Migration { version: 5, .. }));
        assert_eq!(versions(&conn), vec![1, 2, 3]);
    }
}
