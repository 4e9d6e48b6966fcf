//! Build [`FsNode`]/[`Directory`] trees by reading an on-disk export.
//!
//! The replay editor never applies text-deltas itself: every
//! added/modified file is exported fresh by `svn`
//! (which already performs EOL normalization and materializes
//! `svn:special` files as real OS symlinks) and then hashed here from its
//! on-disk bytes — the same operation the post-load divergence check runs
//! against a clean `svn export`, which is exactly why the two are
//! guaranteed to agree.

use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::errors::ReplayError;
use crate::models::{Directory, FsNode, Perms, Sha1Git};

fn io_err(path: &Path, e: std::io::Error) -> ReplayError {
    ReplayError::ScratchTree {
        path: path.display().to_string(),
        detail: e.to_string(),
    }
}

/// Git-compatible blob hash of `bytes`.
pub fn hash_blob(bytes: &[u8]) -> Sha1Git {
    let oid = git2::Oid::hash_object(git2::ObjectType::Blob, bytes)
        .expect("hash_object cannot fail hashing in-memory bytes");
    let mut id = [0u8; 20];
    id.copy_from_slice(oid.as_bytes());
    id
}

/// Git-compatible tree hash over `dir`'s already-finalized children,
/// encoded the way `git mktree` would: `"{mode} {name}\0{raw 20-byte id}"`
/// per entry, entries already sorted by name (the `BTreeMap` ordering).
pub fn hash_directory(dir: &Directory) -> Sha1Git {
    let mut buf = Vec::new();
    for (name, node) in &dir.entries {
        buf.extend_from_slice(node.git_mode().as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(name);
        buf.push(0);
        buf.extend_from_slice(&node.sha1_git());
    }
    let oid = git2::Oid::hash_object(git2::ObjectType::Tree, &buf)
        .expect("hash_object cannot fail hashing a canonical tree buffer");
    let mut id = [0u8; 20];
    id.copy_from_slice(oid.as_bytes());
    id
}

/// Hash a single file (or symlink) at `path` into an [`FsNode`]. Files
/// larger than `max_content_size` become [`FsNode::SkippedContent`].
pub fn content_from_file(path: &Path, max_content_size: u64) -> Result<FsNode, ReplayError> {
    let meta = fs::symlink_metadata(path).map_err(|e| io_err(path, e))?;

    if meta.file_type().is_symlink() {
        let target = fs::read_link(path).map_err(|e| io_err(path, e))?;
        let bytes = target.as_os_str().as_bytes().to_vec();
        let sha1_git = hash_blob(&bytes);
        return Ok(FsNode::Content {
            sha1_git,
            length: bytes.len() as u64,
            perms: Perms::Symlink,
        });
    }

    let length = meta.len();
    let bytes = fs::read(path).map_err(|e| io_err(path, e))?;
    let sha1_git = hash_blob(&bytes);

    if length > max_content_size {
        return Ok(FsNode::SkippedContent { sha1_git, length });
    }

    let perms = if meta.permissions().mode() & 0o111 != 0 {
        Perms::Executable
    } else {
        Perms::Regular
    };
    Ok(FsNode::Content {
        sha1_git,
        length,
        perms,
    })
}

/// Read the exact bytes a [`Content`](FsNode::Content) node was hashed
/// from: the symlink target for a symlink, the file's bytes otherwise.
/// Used by the loader when batching content to the object store, since
/// the in-memory tree itself only carries the hash and length.
pub fn read_content_bytes(path: &Path) -> Result<Vec<u8>, ReplayError> {
    let meta = fs::symlink_metadata(path).map_err(|e| io_err(path, e))?;
    if meta.file_type().is_symlink() {
        let target = fs::read_link(path).map_err(|e| io_err(path, e))?;
        Ok(target.as_os_str().as_bytes().to_vec())
    } else {
        fs::read(path).map_err(|e| io_err(path, e))
    }
}

/// Recursively hash an entire on-disk subtree into a [`Directory`], with
/// every node's hash finalized bottom-up.
pub fn directory_from_disk(path: &Path, max_content_size: u64) -> Result<Directory, ReplayError> {
    let mut dir = Directory::new();
    let mut entries: Vec<_> = fs::read_dir(path)
        .map_err(|e| io_err(path, e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| io_err(path, e))?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = entry.file_name().as_bytes().to_vec();
        let child_path = entry.path();
        let file_type = entry.file_type().map_err(|e| io_err(&child_path, e))?;

        let node = if !file_type.is_symlink() && file_type.is_dir() {
            let mut child_dir = directory_from_disk(&child_path, max_content_size)?;
            let hash = hash_directory(&child_dir);
            child_dir.set_hash(hash);
            FsNode::Directory(child_dir)
        } else {
            content_from_file(&child_path, max_content_size)?
        };
        dir.entries.insert(name, node);
    }
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    #[test]
    fn test_hash_blob_matches_git_hash_object() {
        let id = hash_blob(b"hello\n");
        assert_eq!(hex::encode(id), "ce013625030ba8dba906f756967f9e9ca394464a");
    }

    #[test]
    fn test_content_from_file_regular() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, b"hello\n").unwrap();
        let node = content_from_file(&path, 1024).unwrap();
        match node {
            FsNode::Content { perms, length, .. } => {
                assert_eq!(perms, Perms::Regular);
                assert_eq!(length, 6);
            }
            _ => panic!("expected Content"),
        }
    }

    #[test]
    fn test_content_from_file_executable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.sh");
        fs::write(&path, b"#!/bin/sh\n").unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
        let node = content_from_file(&path, 1024).unwrap();
        assert!(matches!(node, FsNode::Content { perms: Perms::Executable, .. }));
    }

    #[test]
    fn test_content_from_file_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("f.txt");
        fs::write(&target, b"hi").unwrap();
        let link = dir.path().join("link.txt");
        symlink("./f.txt", &link).unwrap();
        let node = content_from_file(&link, 1024).unwrap();
        match node {
            FsNode::Content { perms, length, .. } => {
                assert_eq!(perms, Perms::Symlink);
                assert_eq!(length, "./f.txt".len() as u64);
            }
            _ => panic!("expected Content"),
        }
    }

    #[test]
    fn test_content_from_file_oversize_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        fs::write(&path, vec![0u8; 100]).unwrap();
        let node = content_from_file(&path, 10).unwrap();
        assert!(matches!(node, FsNode::SkippedContent { length: 100, .. }));
    }

    #[test]
    fn test_directory_from_disk_nested() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();
        fs::write(dir.path().join("sub/b.txt"), b"b").unwrap();

        let tree = directory_from_disk(dir.path(), 1024).unwrap();
        assert_eq!(tree.entries.len(), 2);
        match tree.entries.get(&b"sub".to_vec()) {
            Some(FsNode::Directory(sub)) => assert_eq!(sub.entries.len(), 1),
            _ => panic!("expected nested directory"),
        }
    }
}
