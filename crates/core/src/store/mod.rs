//! The content-addressed object store.
//!
//! The store is treated as an external collaborator reached only through
//! `skipped_content_add` / `content_add` / `directory_add` / `revision_add` /
//! `snapshot_add` / `snapshot_get_latest` / `revision_get` /
//! `origin_visit_status`. This crate ships one concrete implementation,
//! [`SqliteObjectStore`]: WAL-mode SQLite behind a `Mutex<Connection>` with
//! its own migration runner, so the loader is runnable end-to-end without a
//! separate storage service.

pub mod schema;
pub mod sqlite;

use crate::errors::StoreError;
use crate::models::{DirectoryEntry, Sha1Git, Snapshot, SyntheticRevision};

/// Outcome of a completed visit, recorded against the origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitStatus {
    Created,
    Full,
    Partial,
    NotFound,
    Failed,
}

impl VisitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisitStatus::Created => "created",
            VisitStatus::Full => "full",
            VisitStatus::Partial => "partial",
            VisitStatus::NotFound => "not_found",
            VisitStatus::Failed => "failed",
        }
    }
}

/// The storage collaborator's interface.
///
/// Methods are synchronous: every implementation shipped here is a local
/// SQLite file and the loader is single-threaded and sequential, so there is
/// no benefit to an async trait and no runtime-blocking concern large enough
/// to warrant `spawn_blocking`.
pub trait ObjectStore {
    /// Persist skipped (oversize) contents; hashes and length only.
    fn skipped_content_add(&self, items: &[(Sha1Git, u64)]) -> Result<(), StoreError>;

    /// Persist full contents: hash, length, and bytes.
    fn content_add(&self, items: &[(Sha1Git, Vec<u8>)]) -> Result<(), StoreError>;

    /// Persist directory nodes reachable from a revision's root, keyed by
    /// their own `sha1_git`. Each directory is flattened to its immediate
    /// children (see [`crate::models::Directory::storage_entries`]);
    /// callers pass every directory touched this batch and the store
    /// deduplicates by primary key.
    fn directory_add(&self, dirs: &[(Sha1Git, Vec<DirectoryEntry>)]) -> Result<(), StoreError>;

    /// Persist one synthetic commit built from an SVN revision.
    fn revision_add(&self, id: Sha1Git, revision: &SyntheticRevision) -> Result<(), StoreError>;

    /// Bind `origin_url` to a final snapshot.
    fn snapshot_add(&self, origin_url: &str, snapshot: &Snapshot) -> Result<Sha1Git, StoreError>;

    /// The most recently recorded snapshot for `origin_url`, if any.
    fn snapshot_get_latest(&self, origin_url: &str) -> Result<Option<(Sha1Git, Snapshot)>, StoreError>;

    /// Look up a previously stored synthetic revision by id.
    fn revision_get(&self, id: Sha1Git) -> Result<Option<SyntheticRevision>, StoreError>;

    /// Record a visit status transition for `origin_url`.
    fn origin_visit_status(&self, origin_url: &str, status: VisitStatus) -> Result<(), StoreError>;
}

pub use sqlite::SqliteObjectStore;
