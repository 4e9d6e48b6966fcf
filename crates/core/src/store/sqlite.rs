//! SQLite-backed [`ObjectStore`] implementation.
//!
//! A `Mutex<Connection>` opened in WAL mode, migrations run once at
//! construction, typed query helpers above raw SQL, storing
//! content-addressed DAG objects.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use super::{schema, ObjectStore, VisitStatus};
use crate::errors::StoreError;
use crate::models::{hex as hex_id, from_hex, DirectoryEntry, Perms, Person, Sha1Git, Snapshot, SnapshotBranch, SyntheticRevision};

/// A SQLite-backed content-addressed object store.
pub struct SqliteObjectStore {
    conn: Mutex<Connection>,
}

impl SqliteObjectStore {
    /// Open (or create) the store at `path`, running migrations.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening object store");
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        schema::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory store, useful for tests.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("object store mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

fn encode_extra_headers(headers: &[(Vec<u8>, Vec<u8>)]) -> String {
    let pairs: Vec<(String, String)> = headers
        .iter()
        .map(|(k, v)| (hex::encode(k), hex::encode(v)))
        .collect();
    serde_json::to_string(&pairs).expect("extra_headers serialize cannot fail")
}

fn decode_extra_headers(raw: &str) -> Vec<(Vec<u8>, Vec<u8>)> {
    let pairs: Vec<(String, String)> = serde_json::from_str(raw).unwrap_or_default();
    pairs
        .into_iter()
        .filter_map(|(k, v)| Some((hex::decode(k).ok()?, hex::decode(v).ok()?)))
        .collect()
}

fn encode_parents(parents: &[Sha1Git]) -> String {
    parents.iter().map(hex).collect::<Vec<_>>().join(",")
}

fn decode_parents(raw: &str) -> Vec<Sha1Git> {
    if raw.is_empty() {
        return Vec::new();
    }
    raw.split(',').filter_map(from_hex).collect()
}

impl ObjectStore for SqliteObjectStore {
    fn skipped_content_add(&self, items: &[(Sha1Git, u64)]) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO skipped_content (sha1_git, length) VALUES (?1, ?2)",
            )?;
            for (id, length) in items {
                stmt.execute(params![hex_id(id), *length as i64])?;
            }
        }
        tx.commit()?;
        debug!(count = items.len(), "stored skipped contents");
        Ok(())
    }

    fn content_add(&self, items: &[(Sha1Git, Vec<u8>)]) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO content (sha1_git, length, data) VALUES (?1, ?2, ?3)",
            )?;
            for (id, bytes) in items {
                stmt.execute(params![hex_id(id), bytes.len() as i64, bytes])?;
            }
        }
        tx.commit()?;
        debug!(count = items.len(), "stored contents");
        Ok(())
    }

    fn directory_add(&self, dirs: &[(Sha1Git, Vec<DirectoryEntry>)]) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut dir_stmt = tx.prepare("INSERT OR IGNORE INTO directory (sha1_git) VALUES (?1)")?;
            let mut entry_stmt = tx.prepare(
                "INSERT OR REPLACE INTO directory_entry
                 (dir_sha1_git, name, target, is_dir, perms, length)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (id, entries) in dirs {
                dir_stmt.execute(params![hex_id(id)])?;
                for entry in entries {
                    let perms = entry.perms.map(|p| match p {
                        Perms::Regular => "regular",
                        Perms::Executable => "executable",
                        Perms::Symlink => "symlink",
                    });
                    entry_stmt.execute(params![
                        hex_id(id),
                        entry.name,
                        hex_id(&entry.target),
                        entry.is_dir as i64,
                        perms,
                        entry.length.map(|l| l as i64),
                    ])?;
                }
            }
        }
        tx.commit()?;
        debug!(count = dirs.len(), "stored directories");
        Ok(())
    }

    fn revision_add(&self, id: Sha1Git, revision: &SyntheticRevision) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR REPLACE INTO revision
             (id, directory, message, author_fullname, author_date, committer_date, parents, extra_headers)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                hex_id(&id),
                hex_id(&revision.directory),
                revision.message,
                revision.author.fullname,
                revision.author_date.to_rfc3339(),
                revision.committer_date.to_rfc3339(),
                encode_parents(&revision.parents),
                encode_extra_headers(&revision.extra_headers),
            ],
        )?;
        debug!(id = %hex_id(&id), "stored revision");
        Ok(())
    }

    fn snapshot_add(&self, origin_url: &str, snapshot: &Snapshot) -> Result<Sha1Git, StoreError> {
        let id = snapshot_id(snapshot);
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO snapshot (id, origin_url, created_at) VALUES (?1, ?2, ?3)",
            params![hex_id(&id), origin_url, Utc::now().to_rfc3339()],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO snapshot_branch (snapshot_id, name, target, target_kind)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (name, branch) in &snapshot.branches {
                let (target, kind) = match branch {
                    SnapshotBranch::Revision(rev_id) => (hex_id(rev_id), "revision"),
                    SnapshotBranch::Alias(alias) => (alias.clone(), "alias"),
                };
                stmt.execute(params![hex_id(&id), name, target, kind])?;
            }
        }
        tx.commit()?;
        info!(id = %hex_id(&id), origin_url, "stored snapshot");
        Ok(id)
    }

    fn snapshot_get_latest(&self, origin_url: &str) -> Result<Option<(Sha1Git, Snapshot)>, StoreError> {
        let conn = self.conn();
        let snap_id: Option<String> = conn
            .query_row(
                "SELECT id FROM snapshot WHERE origin_url = ?1 ORDER BY created_at DESC LIMIT 1",
                params![origin_url],
                |row| row.get(0),
            )
            .optional()?;
        let Some(snap_id) = snap_id else {
            return Ok(None);
        };
        let mut stmt = conn.prepare(
            "SELECT name, target, target_kind FROM snapshot_branch WHERE snapshot_id = ?1",
        )?;
        let mut branches = std::collections::BTreeMap::new();
        let rows = stmt.query_map(params![&snap_id], |row| {
            let name: String = row.get(0)?;
            let target: String = row.get(1)?;
            let kind: String = row.get(2)?;
            Ok((name, target, kind))
        })?;
        for row in rows {
            let (name, target, kind) = row?;
            let branch = if kind == "alias" {
                SnapshotBranch::Alias(target)
            } else {
                SnapshotBranch::Revision(from_hex(&target).ok_or_else(|| {
                    StoreError::MigrationFailed {
                        version: 1,
                        detail: format!("corrupt snapshot branch target '{}'", target),
                    }
                })?)
            };
            branches.insert(name, branch);
        }
        let id = from_hex(&snap_id).ok_or_else(|| StoreError::NotFound {
            entity: "snapshot".into(),
            id: snap_id.clone(),
        })?;
        Ok(Some((id, Snapshot { branches })))
    }

    fn revision_get(&self, id: Sha1Git) -> Result<Option<SyntheticRevision>, StoreError> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT directory, message, author_fullname, author_date, committer_date, parents, extra_headers
                 FROM revision WHERE id = ?1",
                params![hex_id(&id)],
                |row| {
                    let directory: String = row.get(0)?;
                    let message: Vec<u8> = row.get(1)?;
                    let author_fullname: Vec<u8> = row.get(2)?;
                    let author_date: String = row.get(3)?;
                    let committer_date: String = row.get(4)?;
                    let parents: String = row.get(5)?;
                    let extra_headers: String = row.get(6)?;
                    Ok((
                        directory,
                        message,
                        author_fullname,
                        author_date,
                        committer_date,
                        parents,
                        extra_headers,
                    ))
                },
            )
            .optional()?;
        let Some((directory, message, author_fullname, author_date, committer_date, parents, extra_headers)) = row
        else {
            return Ok(None);
        };
        let directory = from_hex(&directory).ok_or_else(|| StoreError::NotFound {
            entity: "directory".into(),
            id: directory.clone(),
        })?;
        let author = Person::from_fullname(&author_fullname);
        Ok(Some(SyntheticRevision {
            directory,
            message,
            committer: author.clone(),
            author,
            author_date: chrono::DateTime::parse_from_rfc3339(&author_date)
                .map(|d| d.with_timezone(&Utc))
                .map_err(|e| StoreError::MigrationFailed {
                    version: 1,
                    detail: e.to_string(),
                })?,
            committer_date: chrono::DateTime::parse_from_rfc3339(&committer_date)
                .map(|d| d.with_timezone(&Utc))
                .map_err(|e| StoreError::MigrationFailed {
                    version: 1,
                    detail: e.to_string(),
                })?,
            parents: decode_parents(&parents),
            synthetic: true,
            extra_headers: decode_extra_headers(&extra_headers),
        }))
    }

    fn origin_visit_status(&self, origin_url: &str, status: VisitStatus) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO origin_visit_status (origin_url, status, recorded_at) VALUES (?1, ?2, ?3)",
            params![origin_url, status.as_str(), Utc::now().to_rfc3339()],
        )?;
        info!(origin_url, status = status.as_str(), "recorded visit status");
        Ok(())
    }
}

/// Compute a snapshot's content-derived id: the git2 hash of its sorted
/// `name -> target` pairs, matching the same "hash of canonical encoding"
/// principle used for directories and revisions.
fn snapshot_id(snapshot: &Snapshot) -> Sha1Git {
    let mut buf = Vec::new();
    for (name, branch) in &snapshot.branches {
        buf.extend_from_slice(name.as_bytes());
        buf.push(0);
        match branch {
            SnapshotBranch::Revision(id) => {
                buf.push(b'R');
                buf.extend_from_slice(id);
            }
            SnapshotBranch::Alias(alias) => {
                buf.push(b'A');
                buf.extend_from_slice(alias.as_bytes());
            }
        }
        buf.push(b'\n');
    }
    let oid = git2::Oid::hash_object(git2::ObjectType::Blob, &buf).expect("hash_object cannot fail on bytes");
    let mut id = [0u8; 20];
    id.copy_from_slice(oid.as_bytes());
    id
}
