//! The loading orchestrator: resolves the resume point, drives the replay
//! editor over the revision range, batches objects to the store, and
//! writes the final snapshot.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};

use crate::config::SvnConfig;
use crate::errors::{LoaderError, ReplayError};
use crate::models::{
    DirectoryEntry, Directory, FsNode, Person, Sha1Git, Snapshot, SnapshotBranch, SvnLogEntry,
    SyntheticRevision,
};
use crate::store::{ObjectStore, VisitStatus};
use crate::svn::from_disk::{directory_from_disk, hash_directory, read_content_bytes};
use crate::svn::replay::Editor;
use crate::svn::repo::SvnRepo;

/// Outcome of one loader run.
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub status: VisitStatus,
    pub snapshot_id: Option<Sha1Git>,
    pub head_revision: i64,
    pub uneventful: bool,
}

/// Drives one full loading visit against a single origin.
pub struct Loader<'s, S: ObjectStore> {
    repo: SvnRepo,
    store: &'s S,
    editor: Editor,
    origin_url: String,
    incremental: bool,
    check_revision: u64,
    check_revision_from: i64,
    max_content_size: u64,
}

impl<'s, S: ObjectStore> Loader<'s, S> {
    #[instrument(skip(store, svn_config))]
    pub async fn new(svn_config: &SvnConfig, store: &'s S) -> Result<Self, LoaderError> {
        let visit_root = svn_config
            .temp_directory
            .join(format!("svn-loader.{}", std::process::id()));
        std::fs::create_dir_all(&visit_root).map_err(ReplayError::Io)?;
        let scratch_root = visit_root.join("work");
        let externals_cache_dir = visit_root.join("externals-cache");
        std::fs::create_dir_all(&scratch_root).map_err(ReplayError::Io)?;
        std::fs::create_dir_all(&externals_cache_dir).map_err(ReplayError::Io)?;

        let repo = SvnRepo::open_with_fallback(
            &svn_config.url,
            svn_config.origin_url.as_deref(),
            svn_config.temp_directory.clone(),
            &svn_config.username,
            svn_config.password.as_deref(),
        )
        .await?;

        let editor = Editor::new(scratch_root, externals_cache_dir, svn_config.max_content_size);

        Ok(Self {
            origin_url: svn_config.origin_url.clone().unwrap_or_else(|| svn_config.url.clone()),
            incremental: svn_config.incremental,
            check_revision: svn_config.check_revision,
            check_revision_from: svn_config.check_revision_from,
            max_content_size: svn_config.max_content_size,
            repo,
            store,
            editor,
        })
    }

    /// Run one full visit: resolve the resume point, replay every pending
    /// revision, and write the final snapshot.
    #[instrument(skip(self), fields(origin_url = %self.origin_url))]
    pub async fn run(&mut self) -> Result<LoadOutcome, LoaderError> {
        let prior_snapshot = self.store.snapshot_get_latest(&self.origin_url)?;
        let prior_head_revision = self.resolve_prior_revision(&prior_snapshot)?;

        let head = self.repo.head_revision().await?;
        if head == 0 {
            info!("repository is empty, nothing to load");
            self.store.origin_visit_status(&self.origin_url, VisitStatus::Full)?;
            return Ok(LoadOutcome {
                status: VisitStatus::Full,
                snapshot_id: None,
                head_revision: 0,
                uneventful: true,
            });
        }

        let mut start = self.initial_revision();
        let mut parents: Vec<Sha1Git> = Vec::new();
        if let Some((prev_id, prev_rev, prev_revision)) = &prior_head_revision {
            if self.check_history_not_altered(*prev_rev, *prev_id, prev_revision).await? {
                start = prev_rev + 1;
                parents.push(*prev_id);
            } else {
                warn!(prev_rev, "stored history no longer matches SVN, reloading from revision 1");
                start = self.initial_revision();
            }
        }

        if start > head {
            self.store.origin_visit_status(&self.origin_url, VisitStatus::Full)?;
            return Err(LoaderError::Uneventful(format!(
                "nothing new past revision {head}"
            )));
        }

        // The editor is always driven from revision 1: it carries both the
        // in-memory Merkle tree and the on-disk scratch tree, and there is
        // no cheaper way to reconstruct that state (including per-directory
        // externals tracking) than replaying every revision up to the
        // resume point. Only revisions >= `start` are actually persisted;
        // earlier ones were already written to the store by a prior visit.
        let replay_from = self.initial_revision();
        let entries = self.repo.logs(replay_from, head).await?;

        let mut last_synth_id: Option<Sha1Git> = parents.first().copied();
        let mut last_root_hash: Option<Sha1Git> = None;
        let mut last_rev: i64 = start;
        let mut partial = false;

        for entry in &entries {
            if entry.rev < replay_from {
                continue;
            }
            if !entry.has_changes {
                // Nothing under the loaded sub-path moved; skip rather than
                // emitting a commit for a revision that didn't touch it.
                continue;
            }

            let replay_result = self.editor.apply_revision(&self.repo, entry).await?;
            if self.editor.has_relative_externals {
                self.repo
                    .has_relative_externals
                    .store(true, std::sync::atomic::Ordering::Relaxed);
            }
            if self.editor.has_recursive_externals {
                self.repo
                    .has_recursive_externals
                    .store(true, std::sync::atomic::Ordering::Relaxed);
            }

            if entry.rev < start {
                // Already persisted by an earlier visit; this pass only
                // needed to bring the editor's in-memory/on-disk state back
                // to where that visit left off.
                continue;
            }

            let synth = build_synthetic_revision(entry, replay_result.root_hash, parents.clone(), self.repo.uuid());
            let synth_id = hash_revision(&synth);

            self.persist_revision(&replay_result.root, synth_id, &synth)?;

            parents = vec![synth_id];
            last_synth_id = Some(synth_id);
            last_root_hash = Some(replay_result.root_hash);
            last_rev = entry.rev;

            if self.should_check(entry.rev) {
                if let Err(e) = self.verify_divergence(entry.rev, replay_result.root_hash).await {
                    warn!(rev = entry.rev, error = %e, "periodic divergence check failed");
                    partial = true;
                }
            }
        }

        let snapshot_id = match last_synth_id {
            Some(id) => {
                let mut branches = BTreeMap::new();
                branches.insert("HEAD".to_string(), SnapshotBranch::Revision(id));
                let snapshot = Snapshot { branches };
                let snap_id = self.store.snapshot_add(&self.origin_url, &snapshot)?;

                if let Some(root_hash) = last_root_hash {
                    if let Err(e) = self.verify_divergence(last_rev, root_hash).await {
                        warn!(rev = last_rev, error = %e, "post-load divergence check failed");
                        partial = true;
                    }
                }
                Some(snap_id)
            }
            None => None,
        };

        let uneventful = match (&prior_snapshot, snapshot_id) {
            (Some((prior_id, _)), Some(new_id)) => *prior_id == new_id,
            _ => false,
        };

        let status = if partial { VisitStatus::Partial } else { VisitStatus::Full };
        self.store.origin_visit_status(&self.origin_url, status)?;

        Ok(LoadOutcome {
            status,
            snapshot_id,
            head_revision: head,
            uneventful,
        })
    }

    fn initial_revision(&self) -> i64 {
        self.repo.initial_revision()
    }

    fn resolve_prior_revision(
        &self,
        prior_snapshot: &Option<(Sha1Git, Snapshot)>,
    ) -> Result<Option<(Sha1Git, i64, SyntheticRevision)>, LoaderError> {
        if !self.incremental {
            return Ok(None);
        }
        let Some((_, snapshot)) = prior_snapshot else {
            return Ok(None);
        };
        let Some(SnapshotBranch::Revision(target)) = snapshot.branches.get("HEAD") else {
            return Ok(None);
        };
        let Some(revision) = self.store.revision_get(*target)? else {
            return Ok(None);
        };
        let Some(rev_num) = revision.svn_revision() else {
            return Ok(None);
        };
        Ok(Some((*target, rev_num, revision)))
    }

    /// Re-derive the root hash and commit id for `prev_rev` from a fresh
    /// export and compare against the stored revision's id. Reuses the same
    /// export/hash path as the periodic divergence check rather than
    /// replaying every revision again from scratch.
    #[instrument(skip(self, prev_revision))]
    async fn check_history_not_altered(
        &self,
        prev_rev: i64,
        prev_id: Sha1Git,
        prev_revision: &SyntheticRevision,
    ) -> Result<bool, LoaderError> {
        let (_tmp, exported) = self.repo.export_temporary(prev_rev).await?;
        let mut tree = directory_from_disk(&exported, self.max_content_size)?;
        let hash = hash_directory(&tree);
        tree.set_hash(hash);

        let entries = self.repo.logs(prev_rev, prev_rev).await?;
        let Some(entry) = entries.first() else {
            return Ok(false);
        };

        let parents: Vec<Sha1Git> = prev_revision.parents.clone();
        let synth = build_synthetic_revision(entry, hash, parents, self.repo.uuid());
        let synth_id = hash_revision(&synth);
        Ok(synth_id == prev_id)
    }

    fn should_check(&self, rev: i64) -> bool {
        self.check_revision > 0 && rev >= self.check_revision_from && (rev as u64) % self.check_revision == 0
    }

    /// Re-export `rev` fresh and compare its tree hash against `root_hash`.
    #[instrument(skip(self))]
    async fn verify_divergence(&self, rev: i64, root_hash: Sha1Git) -> Result<(), LoaderError> {
        let (_tmp, exported) = self.repo.export_temporary(rev).await?;
        let tree = directory_from_disk(&exported, self.max_content_size)?;
        let computed = hash_directory(&tree);
        if computed != root_hash {
            return Err(LoaderError::HashDivergence {
                revision: rev,
                expected: crate::models::hex(&root_hash),
                computed: crate::models::hex(&computed),
            });
        }
        Ok(())
    }

    fn persist_revision(
        &self,
        root: &Directory,
        id: Sha1Git,
        revision: &SyntheticRevision,
    ) -> Result<(), LoaderError> {
        let mut contents = Vec::new();
        let mut skipped = Vec::new();
        let mut dirs = Vec::new();
        collect_objects(root, self.editor.scratch_root(), &mut contents, &mut skipped, &mut dirs)?;

        self.store.skipped_content_add(&skipped)?;
        self.store.content_add(&contents)?;
        self.store.directory_add(&dirs)?;
        self.store.revision_add(id, revision)?;
        Ok(())
    }
}

fn collect_objects(
    dir: &Directory,
    disk_path: &Path,
    contents: &mut Vec<(Sha1Git, Vec<u8>)>,
    skipped: &mut Vec<(Sha1Git, u64)>,
    dirs: &mut Vec<(Sha1Git, Vec<DirectoryEntry>)>,
) -> Result<(), ReplayError> {
    for (name, node) in &dir.entries {
        let child_path = disk_path.join(String::from_utf8_lossy(name).as_ref());
        match node {
            FsNode::Content { sha1_git, .. } => {
                let bytes = read_content_bytes(&child_path)?;
                contents.push((*sha1_git, bytes));
            }
            FsNode::SkippedContent { sha1_git, length } => {
                skipped.push((*sha1_git, *length));
            }
            FsNode::Directory(child) => {
                collect_objects(child, &child_path, contents, skipped, dirs)?;
            }
        }
    }
    dirs.push((dir.hash(), dir.storage_entries()));
    Ok(())
}

fn build_synthetic_revision(
    entry: &SvnLogEntry,
    directory: Sha1Git,
    parents: Vec<Sha1Git>,
    uuid: &str,
) -> SyntheticRevision {
    let author = Person::from_fullname(entry.author.as_bytes());
    let committer = author.clone();
    SyntheticRevision {
        directory,
        message: entry.message.clone(),
        author,
        committer,
        author_date: entry.author_date,
        committer_date: entry.author_date,
        parents,
        synthetic: true,
        extra_headers: vec![
            (b"svn_repo_uuid".to_vec(), uuid.as_bytes().to_vec()),
            (b"svn_revision".to_vec(), entry.rev.to_string().into_bytes()),
        ],
    }
}

/// Git-compatible commit-object hash over a [`SyntheticRevision`]'s fields:
/// tree, parents, author, committer, extra headers, message, in that order.
/// See DESIGN.md for the rationale behind this choice of id scheme.
pub fn hash_revision(rev: &SyntheticRevision) -> Sha1Git {
    let mut buf = Vec::new();
    buf.extend_from_slice(b"tree ");
    buf.extend_from_slice(crate::models::hex(&rev.directory).as_bytes());
    buf.push(b'\n');
    for parent in &rev.parents {
        buf.extend_from_slice(b"parent ");
        buf.extend_from_slice(crate::models::hex(parent).as_bytes());
        buf.push(b'\n');
    }
    buf.extend_from_slice(b"author ");
    buf.extend(encode_person(&rev.author, rev.author_date));
    buf.push(b'\n');
    buf.extend_from_slice(b"committer ");
    buf.extend(encode_person(&rev.committer, rev.committer_date));
    buf.push(b'\n');
    for (key, value) in &rev.extra_headers {
        buf.extend_from_slice(key);
        buf.push(b' ');
        buf.extend_from_slice(value);
        buf.push(b'\n');
    }
    buf.push(b'\n');
    buf.extend_from_slice(&rev.message);

    let oid = git2::Oid::hash_object(git2::ObjectType::Commit, &buf)
        .expect("hash_object cannot fail hashing an in-memory commit buffer");
    let mut id = [0u8; 20];
    id.copy_from_slice(oid.as_bytes());
    id
}

fn encode_person(person: &Person, date: chrono::DateTime<chrono::Utc>) -> Vec<u8> {
    let mut buf = person.fullname.clone();
    buf.extend_from_slice(format!(" {} +0000", date.timestamp()).as_bytes());
    buf
}
