//! The SVN repository facade, built over [`SvnClient`]'s CLI wrapper
//! instead of a native SVN library binding.
//!
//! Holds the connection identity (origin/remote URL, UUID, root-relative
//! sub-path) and exposes the handful of operations the replay engine and
//! externals resolver need, all passing through [`crate::svn::retry`].

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info, instrument, warn};

use super::client::SvnClient;
use super::path_utils::HeadAtDateCache;
use super::retry::with_retry;
use crate::errors::SvnError;
use crate::models::SvnLogEntry;

/// RAII guard that overrides `SSH_ASKPASS`/`SSH_ASKPASS_REQUIRE` for the
/// duration of an export/checkout so a dead `svn+ssh://` external never
/// blocks on an interactive password prompt, restoring whatever was there
/// before on drop. Mirrors the "Global mutable state" design note.
struct SshAskpassGuard {
    prev_askpass: Option<String>,
    prev_require: Option<String>,
}

impl SshAskpassGuard {
    fn engage() -> Self {
        let prev_askpass = std::env::var("SSH_ASKPASS").ok();
        let prev_require = std::env::var("SSH_ASKPASS_REQUIRE").ok();
        std::env::set_var("SSH_ASKPASS", "/bin/echo");
        std::env::set_var("SSH_ASKPASS_REQUIRE", "force");
        Self {
            prev_askpass,
            prev_require,
        }
    }
}

impl Drop for SshAskpassGuard {
    fn drop(&mut self) {
        match &self.prev_askpass {
            Some(v) => std::env::set_var("SSH_ASKPASS", v),
            None => std::env::remove_var("SSH_ASKPASS"),
        }
        match &self.prev_require {
            Some(v) => std::env::set_var("SSH_ASKPASS_REQUIRE", v),
            None => std::env::remove_var("SSH_ASKPASS_REQUIRE"),
        }
    }
}

/// Facade over one SVN repository connection, analogous to the original
/// loader's `SvnRepo`.
pub struct SvnRepo {
    client: SvnClient,
    origin_url: String,
    remote_url: String,
    uuid: String,
    repos_root_url: String,
    /// The loaded sub-path relative to `repos_root_url`; empty for
    /// whole-repository loads.
    root_directory: String,
    temp_dir: PathBuf,
    username: String,
    password: Option<String>,
    head_at_date_cache: HeadAtDateCache,
    /// Set by the externals resolver's root `close()` once any externals
    /// turn out to use relative URLs.
    pub has_relative_externals: std::sync::atomic::AtomicBool,
    /// Set once a recursive external is detected.
    pub has_recursive_externals: std::sync::atomic::AtomicBool,
}

impl SvnRepo {
    /// Construct a facade for `remote_url`, resolving UUID and root URL via
    /// `svn info`. `origin_url` defaults to `remote_url` when `None`.
    #[instrument(skip(password), fields(remote_url))]
    pub async fn open(
        remote_url: &str,
        origin_url: Option<&str>,
        temp_dir: PathBuf,
        username: &str,
        password: Option<&str>,
    ) -> Result<Self, SvnError> {
        let client = SvnClient::new(remote_url, username, password.map(str::to_string));
        let info = with_retry(|| client.info(remote_url)).await?;

        let origin_url = origin_url.unwrap_or(remote_url).to_string();
        let root_directory = info
            .url
            .strip_prefix(&info.root_url)
            .unwrap_or("")
            .trim_start_matches('/')
            .to_string();

        info!(
            remote_url = %info.url,
            root_url = %info.root_url,
            uuid = %info.uuid,
            root_directory = %root_directory,
            "opened svn repository"
        );

        Ok(Self {
            client,
            origin_url,
            remote_url: info.url,
            uuid: info.uuid,
            repos_root_url: info.root_url,
            root_directory,
            temp_dir,
            username: username.to_string(),
            password: password.map(str::to_string),
            head_at_date_cache: HeadAtDateCache::new(),
            has_relative_externals: std::sync::atomic::AtomicBool::new(false),
            has_recursive_externals: std::sync::atomic::AtomicBool::new(false),
        })
    }

    /// Retry `open` with an anonymous credential fallback ladder, matching
    /// `get_svn_repo`'s `(anonymous, anonymous)` then `(anonymous, "")`
    /// attempts before giving up with `NotFound`.
    pub async fn open_with_fallback(
        remote_url: &str,
        origin_url: Option<&str>,
        temp_dir: PathBuf,
        username: &str,
        password: Option<&str>,
    ) -> Result<Self, SvnError> {
        match Self::open(remote_url, origin_url, temp_dir.clone(), username, password).await {
            Ok(repo) => Ok(repo),
            Err(e) if matches!(&e, SvnError::CommandFailed { stderr, .. } if stderr.contains("Unable to connect")) => {
                warn!(error = %e, "falling back to anonymous credentials");
                for (user, pass) in [("anonymous", Some("anonymous")), ("anonymous", Some(""))] {
                    if let Ok(repo) =
                        Self::open(remote_url, origin_url, temp_dir.clone(), user, pass).await
                    {
                        return Ok(repo);
                    }
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    pub fn origin_url(&self) -> &str {
        &self.origin_url
    }

    pub fn remote_url(&self) -> &str {
        &self.remote_url
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn repos_root_url(&self) -> &str {
        &self.repos_root_url
    }

    pub fn root_directory(&self) -> &str {
        &self.root_directory
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Build a URL under the repository root, given a path relative to
    /// `root_directory`.
    pub fn url_for(&self, relative_path: &str) -> String {
        self.client.join_url(&join_under_root(&self.root_directory, relative_path))
    }

    #[instrument(skip(self))]
    pub async fn head_revision(&self) -> Result<i64, SvnError> {
        let info = with_retry(|| self.client.info(&self.remote_url)).await?;
        Ok(info.latest_rev)
    }

    pub fn initial_revision(&self) -> i64 {
        1
    }

    /// Fetch log entries in `[start, end]`, `has_changes` computed against
    /// `root_directory`.
    #[instrument(skip(self))]
    pub async fn logs(&self, start: i64, end: i64) -> Result<Vec<SvnLogEntry>, SvnError> {
        with_retry(|| self.client.log(start, end, &self.root_directory, None)).await
    }

    #[instrument(skip(self))]
    pub async fn propget(&self, path: &str, rev: i64, prop: &str) -> Result<Option<String>, SvnError> {
        let full_path = join_under_root(&self.root_directory, path);
        with_retry(|| self.client.propget(&full_path, rev, prop)).await
    }

    /// `svn export` a path (relative to `root_directory`) at `rev` into
    /// `dest`. Scoped by the SSH askpass guard so dead `svn+ssh` externals
    /// never block on a TTY.
    #[instrument(skip(self))]
    pub async fn export(&self, path: &str, rev: i64, dest: &Path) -> Result<(), SvnError> {
        let _guard = SshAskpassGuard::engage();
        let full_path = join_under_root(&self.root_directory, path);
        with_retry(|| self.client.export(&full_path, rev, dest)).await
    }

    /// `svn export` an arbitrary absolute URL (used by the externals
    /// resolver, which may need to export from `origin_url` or
    /// `remote_url` rather than `self.root_directory`). A negative `rev`
    /// exports at `HEAD`.
    #[instrument(skip(self))]
    pub async fn export_url(&self, url: &str, rev: i64, dest: &Path) -> Result<(), SvnError> {
        let _guard = SshAskpassGuard::engage();
        if dest.exists() {
            tokio::fs::remove_dir_all(dest).await.ok();
        }
        let client = SvnClient::new(url, self.username.as_str(), self.password.clone());
        with_retry(|| client.export("", rev, dest)).await
    }

    /// Export the whole loaded tree at `rev` to a fresh temp directory for
    /// the mid/post-load divergence check. Uses the origin URL when
    /// relative externals were detected, or the remote (dump-mounted) URL
    /// otherwise — matching `export_temporary`'s source-selection rule.
    #[instrument(skip(self))]
    pub async fn export_temporary(&self, rev: i64) -> Result<(TempDir, PathBuf), SvnError> {
        let base_url = if self
            .has_relative_externals
            .load(std::sync::atomic::Ordering::Relaxed)
        {
            &self.origin_url
        } else {
            &self.remote_url
        };
        let dir = TempDir::new_in(&self.temp_dir).map_err(SvnError::IoError)?;
        let dest = dir.path().join("export");
        let client = SvnClient::new(base_url.as_str(), self.username.as_str(), self.password.clone());
        let full_path = join_under_root(&self.root_directory, "");
        let _guard = SshAskpassGuard::engage();
        with_retry(|| client.export(&full_path, rev, &dest)).await?;
        Ok((dir, dest))
    }

    /// Binary-search `[1, head]` for the latest revision whose commit date
    /// is not after `at`, memoized per `(epoch_secs)`.
    #[instrument(skip(self))]
    pub async fn get_head_revision_at_date(
        &self,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<i64, SvnError> {
        let epoch = at.timestamp();
        if let Some(cached) = self.head_at_date_cache.get(epoch) {
            return Ok(cached);
        }
        let head = self.head_revision().await?;
        if head == 0 {
            return Err(SvnError::RevisionNotFound(0));
        }

        let rev1_entries = self.logs(1, 1).await?;
        let rev1_date = rev1_entries
            .first()
            .map(|e| e.author_date)
            .unwrap_or_else(chrono::Utc::now);
        if rev1_date > at {
            return Err(SvnError::RevisionNotFound(1));
        }

        let (mut lo, mut hi) = (1i64, head);
        while lo < hi {
            let mid = lo + (hi - lo + 1) / 2;
            let entries = self.logs(mid, mid).await?;
            let date = entries
                .first()
                .map(|e| e.author_date)
                .unwrap_or_else(chrono::Utc::now);
            if date <= at {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }
        debug!(epoch, resolved_rev = lo, "resolved head-at-date");
        self.head_at_date_cache.insert(epoch, lo);
        Ok(lo)
    }
}

/// Join a path relative to the loaded sub-path with the sub-path itself,
/// producing a path relative to the repository root.
fn join_under_root(root_directory: &str, relative_path: &str) -> String {
    match (root_directory.is_empty(), relative_path.is_empty()) {
        (true, _) => relative_path.to_string(),
        (false, true) => root_directory.to_string(),
        (false, false) => format!("{}/{}", root_directory.trim_end_matches('/'), relative_path.trim_start_matches('/')),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_under_root_whole_repo() {
        assert_eq!(join_under_root("", "trunk/foo"), "trunk/foo");
    }

    #[test]
    fn test_join_under_root_sub_path() {
        assert_eq!(join_under_root("trunk", "foo/bar"), "trunk/foo/bar");
        assert_eq!(join_under_root("trunk", ""), "trunk");
    }

    #[test]
    fn test_ssh_askpass_guard_restores_previous_value() {
        std::env::set_var("SSH_ASKPASS", "previous-value");
        {
            let _guard = SshAskpassGuard::engage();
            assert_eq!(std::env::var("SSH_ASKPASS").unwrap(), "/bin/echo");
        }
        assert_eq!(std::env::var("SSH_ASKPASS").unwrap(), "previous-value");
        std::env::remove_var("SSH_ASKPASS");
    }
}
