//! Schema definitions and migration runner for the SQLite object store.
//!
//! Migrations are simple SQL strings applied in order, tracked via the
//! `user_version` pragma, and applied against the Merkle-DAG tables this
//! loader needs.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::StoreError;

/// All migrations, in order. Each entry is `(version, description, sql)`.
static MIGRATIONS: &[(u32, &str, &str)] = &[(
    1,
    "content-addressed object store",
    r#"
    CREATE TABLE IF NOT EXISTS content (
        sha1_git    TEXT PRIMARY KEY,
        length      INTEGER NOT NULL,
        data        BLOB NOT NULL
    );

    CREATE TABLE IF NOT EXISTS skipped_content (
        sha1_git    TEXT PRIMARY KEY,
        length      INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS directory (
        sha1_git    TEXT PRIMARY KEY
    );

    CREATE TABLE IF NOT EXISTS directory_entry (
        dir_sha1_git    TEXT NOT NULL,
        name            BLOB NOT NULL,
        target          TEXT NOT NULL,
        is_dir          INTEGER NOT NULL,
        perms           TEXT,
        length          INTEGER,
        PRIMARY KEY (dir_sha1_git, name),
        FOREIGN KEY (dir_sha1_git) REFERENCES directory (sha1_git)
    );

    CREATE TABLE IF NOT EXISTS revision (
        id              TEXT PRIMARY KEY,
        directory       TEXT NOT NULL,
        message         BLOB NOT NULL,
        author_fullname BLOB NOT NULL,
        author_date     TEXT NOT NULL,
        committer_date  TEXT NOT NULL,
        parents         TEXT NOT NULL,
        extra_headers   TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS snapshot (
        id          TEXT PRIMARY KEY,
        origin_url  TEXT NOT NULL,
        created_at  TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_snapshot_origin ON snapshot (origin_url, created_at);

    CREATE TABLE IF NOT EXISTS snapshot_branch (
        snapshot_id TEXT NOT NULL,
        name        TEXT NOT NULL,
        target      TEXT NOT NULL,
        target_kind TEXT NOT NULL,
        PRIMARY KEY (snapshot_id, name),
        FOREIGN KEY (snapshot_id) REFERENCES snapshot (id)
    );

    CREATE TABLE IF NOT EXISTS origin_visit_status (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        origin_url      TEXT NOT NULL,
        status          TEXT NOT NULL,
        recorded_at     TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_visit_status_origin ON origin_visit_status (origin_url, recorded_at);
    "#,
)];

/// Run all pending migrations against `conn`.
pub fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    let current_version = get_schema_version(conn)?;
    info!(
        current_version,
        target_version = MIGRATIONS.last().map(|m| m.0).unwrap_or(0),
        "checking object store schema migrations"
    );

    for &(version, description, sql) in MIGRATIONS {
        if version > current_version {
            info!(version, description, "applying migration");
            conn.execute_batch(sql)
                .map_err(|e| StoreError::MigrationFailed {
                    version,
                    detail: e.to_string(),
                })?;
            set_schema_version(conn, version)?;
            debug!(version, "migration applied successfully");
        }
    }

    Ok(())
}

fn get_schema_version(conn: &Connection) -> Result<u32, StoreError> {
    let version: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

fn set_schema_version(conn: &Connection, version: u32) -> Result<(), StoreError> {
    conn.pragma_update(None, "user_version", version)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_run_idempotently() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), 1);
    }

    #[test]
    fn test_tables_created() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let tables: Vec<String> = {
            let mut stmt = conn
                .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
                .unwrap();
            stmt.query_map([], |row| row.get(0))
                .unwrap()
                .filter_map(|r| r.ok())
                .collect()
        };

        for expected in [
            "content",
            "skipped_content",
            "directory",
            "directory_entry",
            "revision",
            "snapshot",
            "snapshot_branch",
            "origin_visit_status",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing table {expected}");
        }
    }
}
