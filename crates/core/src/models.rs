//! Domain model types for the content-addressed Merkle-DAG produced by the
//! loader: filesystem nodes, synthetic revisions, snapshots, and the SVN
//! log/external-definition types that feed them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Hash identifiers
// ---------------------------------------------------------------------------

/// A git-compatible object id: the SHA-1 of a canonical git object
/// (`blob`, `tree`, or `commit`) as produced by [`git2::Oid::hash_object`].
pub type Sha1Git = [u8; 20];

/// Render a [`Sha1Git`] as lowercase hex, the form used in log messages,
/// `extra_headers`, and the object store's primary keys.
pub fn hex(id: &Sha1Git) -> String {
    hex::encode(id)
}

/// Parse a lowercase hex string back into a [`Sha1Git`].
pub fn from_hex(s: &str) -> Option<Sha1Git> {
    let bytes = hex::decode(s).ok()?;
    bytes.try_into().ok()
}

// ---------------------------------------------------------------------------
// Filesystem nodes (the Merkle tree)
// ---------------------------------------------------------------------------

/// File permission bits as tracked by the loader. SVN only distinguishes
/// regular files, executables (`svn:executable`), and symlinks
/// (`svn:special` pointing at a `link <target>` file).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Perms {
    Regular,
    Executable,
    Symlink,
}

impl Perms {
    /// The git file mode these permissions correspond to, used when
    /// building canonical tree entries.
    pub fn git_mode(&self) -> &'static str {
        match self {
            Perms::Regular => "100644",
            Perms::Executable => "100755",
            Perms::Symlink => "120000",
        }
    }
}

/// A single node of the replayed filesystem tree.
///
/// `Directory` carries a lazily-computed hash: the editor may touch a
/// directory's children many times across a single revision (adds,
/// externals reconciliation, deletes), so the hash is only finalized once
/// when the tree is collected at `close()`.
#[derive(Debug, Clone)]
pub enum FsNode {
    Content {
        sha1_git: Sha1Git,
        length: u64,
        perms: Perms,
    },
    /// A file that exceeded `max_content_size` and whose bytes were not
    /// read into memory; only its hash and length are known.
    SkippedContent { sha1_git: Sha1Git, length: u64 },
    Directory(Directory),
}

impl FsNode {
    pub fn sha1_git(&self) -> Sha1Git {
        match self {
            FsNode::Content { sha1_git, .. } => *sha1_git,
            FsNode::SkippedContent { sha1_git, .. } => *sha1_git,
            FsNode::Directory(dir) => dir.hash(),
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, FsNode::Directory(_))
    }

    pub fn git_mode(&self) -> &'static str {
        match self {
            FsNode::Content { perms, .. } => perms.git_mode(),
            FsNode::SkippedContent { .. } => Perms::Regular.git_mode(),
            FsNode::Directory(_) => "40000",
        }
    }
}

/// An in-memory directory node. Entries are kept sorted by name (a
/// `BTreeMap`) so the canonical git tree encoding (§ from_disk) is
/// deterministic without an extra sort pass.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    pub entries: BTreeMap<Vec<u8>, FsNode>,
    hash: Option<Sha1Git>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The directory's hash, computed on demand. Panics if the hash has
    /// never been finalized via [`Directory::set_hash`] — callers must
    /// collect bottom-up so every directory is hashed before its parent
    /// asks for it.
    pub fn hash(&self) -> Sha1Git {
        self.hash
            .expect("directory hash requested before it was finalized")
    }

    pub fn hash_checked(&self) -> Option<Sha1Git> {
        self.hash
    }

    pub fn set_hash(&mut self, hash: Sha1Git) {
        self.hash = Some(hash);
    }

    /// Invalidate a cached hash, forcing recomputation next collect pass.
    /// Used when externals reconciliation mutates a directory's children
    /// without going through the normal add/remove entry points.
    pub fn invalidate(&mut self) {
        self.hash = None;
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flatten this directory's immediate children into the row shape the
    /// object store persists. Recursing into sub-directories is the
    /// caller's job (the loader walks the whole tree bottom-up and calls
    /// `directory_add` once per directory, not once for the whole tree).
    pub fn storage_entries(&self) -> Vec<DirectoryEntry> {
        self.entries
            .iter()
            .map(|(name, node)| DirectoryEntry {
                name: name.clone(),
                target: node.sha1_git(),
                is_dir: node.is_directory(),
                perms: match node {
                    FsNode::Content { perms, .. } => Some(*perms),
                    FsNode::SkippedContent { .. } | FsNode::Directory(_) => None,
                },
                length: match node {
                    FsNode::Content { length, .. } | FsNode::SkippedContent { length, .. } => {
                        Some(*length)
                    }
                    FsNode::Directory(_) => None,
                },
            })
            .collect()
    }
}

/// One row of a persisted directory: a child name plus the hash of the
/// node it points to, flattened for storage (see [`ObjectStore::directory_add`]
/// in `crate::store`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub name: Vec<u8>,
    pub target: Sha1Git,
    pub is_dir: bool,
    pub perms: Option<Perms>,
    pub length: Option<u64>,
}

// ---------------------------------------------------------------------------
// SVN log / changed-path model
// ---------------------------------------------------------------------------

/// The kind of node a changed path refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
    Unknown,
}

/// The action recorded against a path in `svn log --verbose`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Add,
    Modify,
    Delete,
    Replace,
}

impl ChangeAction {
    pub fn from_code(code: &str) -> Self {
        match code {
            "A" => Self::Add,
            "D" => Self::Delete,
            "R" => Self::Replace,
            _ => Self::Modify,
        }
    }
}

/// One entry in a revision's changed-paths list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangedPath {
    pub path: String,
    pub action: ChangeAction,
    pub kind: EntryKind,
    pub copyfrom_path: Option<String>,
    pub copyfrom_rev: Option<i64>,
}

/// A single SVN revision's log metadata, normalized from `svn log --xml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvnLogEntry {
    pub rev: i64,
    pub author: String,
    pub author_date: DateTime<Utc>,
    pub message: Vec<u8>,
    pub changed_paths: Vec<ChangedPath>,
    /// True if some changed path is under (or an ancestor, via a copy, of)
    /// the loaded root directory. Sub-path loads use this to skip emitting
    /// a revision that touched nothing under the loaded root.
    pub has_changes: bool,
}

// ---------------------------------------------------------------------------
// svn:externals
// ---------------------------------------------------------------------------

/// One parsed line of an `svn:externals` property value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExternalDefinition {
    /// Path (relative to the directory carrying the property) the external
    /// is checked out into.
    pub path: String,
    /// The external's source URL (or path, for relative-URL externals).
    pub url: String,
    /// Operative revision, if pinned (`-r N url path`).
    pub revision: Option<i64>,
    /// Peg revision, if pinned (`url@N path` or `path url@N`, legacy form).
    pub peg_revision: Option<i64>,
    /// True if `url` is relative (`../`, `^/`, `//`, `/`) rather than
    /// absolute, per SVN 1.5+ relative-external syntax.
    pub relative_url: bool,
    /// True if this line used the pre-1.5 `path url` order instead of the
    /// modern `url path` order.
    pub legacy_format: bool,
}

// ---------------------------------------------------------------------------
// Synthetic revision / snapshot
// ---------------------------------------------------------------------------

/// An author or committer identity, as derived from an SVN username.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub fullname: Vec<u8>,
    pub name: Option<Vec<u8>>,
    pub email: Option<Vec<u8>>,
}

impl Person {
    /// If `fullname` looks like `Name <email>`, split it;
    /// otherwise the whole string is the name and there is no email.
    pub fn from_fullname(fullname: &[u8]) -> Self {
        let text = String::from_utf8_lossy(fullname);
        if let (Some(open), Some(close)) = (text.find('<'), text.rfind('>')) {
            if open < close {
                let name = text[..open].trim();
                let email = &text[open + 1..close];
                return Self {
                    fullname: fullname.to_vec(),
                    name: if name.is_empty() {
                        None
                    } else {
                        Some(name.as_bytes().to_vec())
                    },
                    email: Some(email.as_bytes().to_vec()),
                };
            }
        }
        Self {
            fullname: fullname.to_vec(),
            name: Some(fullname.to_vec()),
            email: None,
        }
    }
}

/// A synthetic commit built from one SVN revision, analogous to a git
/// commit but carrying `extra_headers` identifying its SVN origin.
#[derive(Debug, Clone)]
pub struct SyntheticRevision {
    pub directory: Sha1Git,
    pub message: Vec<u8>,
    pub author: Person,
    pub committer: Person,
    pub author_date: DateTime<Utc>,
    pub committer_date: DateTime<Utc>,
    pub parents: Vec<Sha1Git>,
    pub synthetic: bool,
    /// `(b"svn_repo_uuid", uuid)` and `(b"svn_revision", rev.to_string())`,
    /// in that order, matching `converters.build_swh_revision`.
    pub extra_headers: Vec<(Vec<u8>, Vec<u8>)>,
}

impl SyntheticRevision {
    /// The SVN revision number this commit was built from, read back out
    /// of `extra_headers`. Used by `check_history_not_altered`.
    pub fn svn_revision(&self) -> Option<i64> {
        self.extra_headers
            .iter()
            .find(|(k, _)| k == b"svn_revision")
            .and_then(|(_, v)| std::str::from_utf8(v).ok())
            .and_then(|s| s.parse().ok())
    }
}

/// A named pointer into the DAG, produced once at the end of a load.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub branches: BTreeMap<String, SnapshotBranch>,
}

#[derive(Debug, Clone)]
pub enum SnapshotBranch {
    Revision(Sha1Git),
    Alias(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_person_from_fullname_with_email() {
        let p = Person::from_fullname(b"Jane Doe <jane@example.com>");
        assert_eq!(p.name.as_deref(), Some(&b"Jane Doe"[..]));
        assert_eq!(p.email.as_deref(), Some(&b"jane@example.com"[..]));
    }

    #[test]
    fn test_person_from_fullname_without_email() {
        let p = Person::from_fullname(b"jdoe");
        assert_eq!(p.name.as_deref(), Some(&b"jdoe"[..]));
        assert_eq!(p.email, None);
    }

    #[test]
    fn test_hex_round_trip() {
        let id: Sha1Git = [0x11; 20];
        let s = hex(&id);
        assert_eq!(from_hex(&s), Some(id));
    }

    #[test]
    fn test_change_action_from_code() {
        assert_eq!(ChangeAction::from_code("A"), ChangeAction::Add);
        assert_eq!(ChangeAction::from_code("D"), ChangeAction::Delete);
        assert_eq!(ChangeAction::from_code("R"), ChangeAction::Replace);
        assert_eq!(ChangeAction::from_code("M"), ChangeAction::Modify);
    }

    #[test]
    fn test_synthetic_revision_svn_revision_roundtrip() {
        let rev = SyntheticRevision {
            directory: [0u8; 20],
            message: b"msg".to_vec(),
            author: Person::from_fullname(b"a"),
            committer: Person::from_fullname(b"a"),
            author_date: Utc::now(),
            committer_date: Utc::now(),
            parents: vec![],
            synthetic: true,
            extra_headers: vec![
                (b"svn_repo_uuid".to_vec(), b"uuid-1".to_vec()),
                (b"svn_revision".to_vec(), b"42".to_vec()),
            ],
        };
        assert_eq!(rev.svn_revision(), Some(42));
    }
}
