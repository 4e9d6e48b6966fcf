//! Low-level asynchronous `svn` CLI command runner.
//!
//! This is the thing every other `svn::*` module shells out through. It
//! knows nothing about replay, externals, or revisions beyond what the
//! command line accepts — that logic lives in `svn::repo` and
//! `svn::replay`.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, instrument, warn};

use super::parser::{parse_svn_diff_summarize, parse_svn_info, parse_svn_log, SvnInfo};
use crate::errors::SvnError;
use crate::models::{ChangedPath, SvnLogEntry};

/// Asynchronous client for interacting with an SVN repository via the CLI.
#[derive(Debug, Clone)]
pub struct SvnClient {
    url: String,
    username: String,
    password: Option<String>,
}

impl SvnClient {
    /// Create a new SVN client targeting `url` with the given credentials.
    /// An empty username/no password means anonymous access.
    pub fn new(url: impl Into<String>, username: impl Into<String>, password: Option<String>) -> Self {
        Self {
            url: url.into(),
            username: username.into(),
            password,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn info(&self, target: &str) -> Result<SvnInfo, SvnError> {
        let output = self.run_svn(&["info", "--xml", target]).await?;
        parse_svn_info(&output)
    }

    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn log(
        &self,
        start_rev: i64,
        end_rev: i64,
        root_relative_path: &str,
        limit: Option<u32>,
    ) -> Result<Vec<SvnLogEntry>, SvnError> {
        let end_str = if end_rev < 0 {
            "HEAD".to_string()
        } else {
            end_rev.to_string()
        };
        let rev_range = format!("{}:{}", start_rev, end_str);
        let limit_str = limit.map(|l| l.to_string());
        let mut args = vec!["log", "--xml", "--verbose", "-r", &rev_range];
        if let Some(ref l) = limit_str {
            args.push("--limit");
            args.push(l);
        }
        args.push(&self.url);
        let output = self.run_svn(&args).await?;
        parse_svn_log(&output, root_relative_path)
    }

    #[instrument(skip(self), fields(url = %self.url, rev))]
    pub async fn diff_summarize(&self, rev: i64) -> Result<Vec<ChangedPath>, SvnError> {
        let rev_range = format!("{}:{}", rev - 1, rev);
        let output = self
            .run_svn(&["diff", "--summarize", "--xml", "-r", &rev_range, &self.url])
            .await?;
        parse_svn_diff_summarize(&output)
    }

    /// `svn export` a path at a revision into `dest`. `path` is relative
    /// to the client's URL; empty means export the whole URL. A negative
    /// `rev` exports at `HEAD`, matching `log`'s `end_rev` convention.
    #[instrument(skip(self), fields(url = %self.url, rev))]
    pub async fn export(&self, path: &str, rev: i64, dest: &Path) -> Result<(), SvnError> {
        if dest.exists() {
            tokio::fs::remove_dir_all(dest).await.ok();
        }
        let src_url = self.join_url(path);
        let rev_str = if rev < 0 { "HEAD".to_string() } else { rev.to_string() };
        let dest_str = dest.to_string_lossy().to_string();
        self.run_svn(&["export", "--force", "-r", &rev_str, &src_url, &dest_str])
            .await?;
        Ok(())
    }

    /// `svn propget` a property on a path at a revision. Returns `None`
    /// if the property is unset.
    #[instrument(skip(self), fields(url = %self.url, rev, prop))]
    pub async fn propget(&self, path: &str, rev: i64, prop: &str) -> Result<Option<String>, SvnError> {
        let target = self.join_url(path);
        let rev_str = rev.to_string();
        let output = self
            .run_svn(&["propget", prop, "-r", &rev_str, "--strict", &target])
            .await;
        match output {
            Ok(s) if s.is_empty() => Ok(None),
            Ok(s) => Ok(Some(s.trim_end_matches('\n').to_string())),
            Err(SvnError::CommandFailed { stderr, .. }) if stderr.contains("E200009") => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn join_url(&self, path: &str) -> String {
        if path.is_empty() {
            self.url.clone()
        } else if path.starts_with("http://") || path.starts_with("https://") || path.starts_with("svn://") || path.starts_with("file://") {
            path.to_string()
        } else {
            format!("{}/{}", self.url.trim_end_matches('/'), path.trim_start_matches('/'))
        }
    }

    fn auth_args<'a>(&'a self, cmd: &mut Command) {
        cmd.arg("--non-interactive").arg("--no-auth-cache");
        if !self.username.is_empty() {
            cmd.arg("--username").arg(&self.username);
        }
        if let Some(ref pw) = self.password {
            cmd.arg("--password").arg(pw);
        }
    }

    async fn run_svn(&self, args: &[&str]) -> Result<String, SvnError> {
        let mut cmd = Command::new("svn");
        cmd.args(args);
        self.auth_args(&mut cmd);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        debug!(cmd = ?format!("svn {}", args.join(" ")), "running svn command");
        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SvnError::BinaryNotFound("svn".into())
            } else {
                SvnError::IoError(e)
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            let exit_code = output.status.code().unwrap_or(-1);
            warn!(exit_code, %stderr, "svn command failed");
            return Err(SvnError::CommandFailed { exit_code, stderr });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}
