//! Dump-driven frontends: mount a remote SVN repository into a local
//! `file://` copy via `svnrdump dump | gzip` followed by `svnadmin create`
//! + `svnadmin load`, so the rest of the loader can treat any origin as a
//! local one. Both steps compose two
//! subprocesses end to end; each is modeled as an explicit spawn-pipe-wait
//! pair rather than a shell pipeline.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{instrument, warn};

use crate::errors::SvnError;

/// Outcome of a remote-dump attempt. `partial` is set when `svnrdump`
/// exited non-zero but some revisions were still written — the dump is
/// still usable, just incomplete.
#[derive(Debug, Clone)]
pub struct DumpOutcome {
    pub dump_path: PathBuf,
    pub dumped_through_rev: Option<i64>,
    pub partial: bool,
}

fn binary_err(e: std::io::Error, bin: &str) -> SvnError {
    if e.kind() == std::io::ErrorKind::NotFound {
        SvnError::BinaryNotFound(bin.to_string())
    } else {
        SvnError::IoError(e)
    }
}

/// Find the highest `* Dumped revision N.` line in `svnrdump`'s stderr.
fn parse_last_dumped_revision(stderr: &str) -> Option<i64> {
    stderr
        .lines()
        .rev()
        .find_map(|line| {
            line.trim()
                .strip_prefix("* Dumped revision ")
                .and_then(|rest| rest.trim_end_matches('.').parse::<i64>().ok())
        })
}

/// Dump `url` to a gzip-compressed file at `dest_path` via
/// `svnrdump dump <url> | gzip`. Returns a [`DumpOutcome`] even on a
/// partial dump; only genuinely fatal conditions (binary missing,
/// repository not found) return `Err`.
#[instrument(skip(password), fields(url))]
pub async fn dump_remote_to_file(
    url: &str,
    username: &str,
    password: Option<&str>,
    dest_path: &Path,
) -> Result<DumpOutcome, SvnError> {
    let mut rdump_cmd = Command::new("svnrdump");
    rdump_cmd
        .arg("dump")
        .arg(url)
        .arg("--non-interactive")
        .arg("--no-auth-cache");
    if !username.is_empty() {
        rdump_cmd.arg("--username").arg(username);
    }
    if let Some(pw) = password {
        rdump_cmd.arg("--password").arg(pw);
    }
    rdump_cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    let mut rdump = rdump_cmd.spawn().map_err(|e| binary_err(e, "svnrdump"))?;
    let rdump_stdout = rdump.stdout.take().expect("stdout piped above");
    let rdump_stderr = rdump.stderr.take().expect("stderr piped above");

    let out_file = std::fs::File::create(dest_path).map_err(SvnError::IoError)?;
    let stdin_stdio: Stdio = rdump_stdout.try_into().map_err(|_| SvnError::WorkingCopyError {
        path: dest_path.display().to_string(),
        detail: "failed to connect svnrdump stdout to gzip stdin".into(),
    })?;

    let mut gzip = Command::new("gzip")
        .arg("-c")
        .stdin(stdin_stdio)
        .stdout(Stdio::from(out_file))
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| binary_err(e, "gzip"))?;

    // Drain stderr concurrently with waiting on both children so a full
    // pipe buffer on either side can't deadlock the other.
    let stderr_task = tokio::spawn(async move {
        let mut lines = BufReader::new(rdump_stderr).lines();
        let mut buf = String::new();
        while let Ok(Some(line)) = lines.next_line().await {
            buf.push_str(&line);
            buf.push('\n');
        }
        buf
    });

    let rdump_status = rdump.wait().await.map_err(SvnError::IoError)?;
    let gzip_status = gzip.wait().await.map_err(SvnError::IoError)?;
    let stderr_text = stderr_task.await.unwrap_or_default();
    let dumped_through_rev = parse_last_dumped_revision(&stderr_text);

    if stderr_text.contains("E170013") {
        return Err(SvnError::RevisionNotFound(0));
    }

    if !rdump_status.success() {
        warn!(stderr = %stderr_text, "svnrdump exited non-zero; dump may be partial");
        return Ok(DumpOutcome {
            dump_path: dest_path.to_path_buf(),
            dumped_through_rev,
            partial: true,
        });
    }
    if !gzip_status.success() {
        return Err(SvnError::CommandFailed {
            exit_code: gzip_status.code().unwrap_or(-1),
            stderr: "gzip exited non-zero while compressing dump".into(),
        });
    }

    Ok(DumpOutcome {
        dump_path: dest_path.to_path_buf(),
        dumped_through_rev,
        partial: false,
    })
}

async fn run_capture(bin: &str, args: &[&str]) -> Result<(), SvnError> {
    let output = Command::new(bin)
        .args(args)
        .output()
        .await
        .map_err(|e| binary_err(e, bin))?;
    if !output.status.success() {
        return Err(SvnError::CommandFailed {
            exit_code: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }
    Ok(())
}

/// Create a fresh repository at `repo_dir` and load `dump_path` into it
/// with `svnadmin load --bypass-prop-validation --no-flush-to-disk`,
/// transparently gunzipping when `dump_path` ends in `.gz`. Returns the
/// `file://` URL of the loaded repository.
#[instrument]
pub async fn create_local_repo_from_dump(
    dump_path: &Path,
    repo_dir: &Path,
    max_rev: Option<i64>,
) -> Result<String, SvnError> {
    if repo_dir.exists() {
        tokio::fs::remove_dir_all(repo_dir).await.ok();
    }
    run_capture("svnadmin", &["create", &repo_dir.display().to_string()]).await?;

    let rev_range = max_rev.map(|r| format!("1:{r}"));
    let mut load_args: Vec<String> = vec![
        "load".into(),
        "--bypass-prop-validation".into(),
        "--no-flush-to-disk".into(),
    ];
    if let Some(ref range) = rev_range {
        load_args.push("-r".into());
        load_args.push(range.clone());
    }
    load_args.push(repo_dir.display().to_string());

    let is_gz = dump_path.extension().map(|e| e == "gz").unwrap_or(false);

    if is_gz {
        let mut gunzip = Command::new("gzip")
            .arg("-dc")
            .arg(dump_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| binary_err(e, "gzip"))?;
        let gunzip_stdout = gunzip.stdout.take().expect("stdout piped above");
        let stdin_stdio: Stdio = gunzip_stdout.try_into().map_err(|_| SvnError::WorkingCopyError {
            path: dump_path.display().to_string(),
            detail: "failed to connect gzip stdout to svnadmin load stdin".into(),
        })?;

        let mut load = Command::new("svnadmin")
            .args(&load_args)
            .stdin(stdin_stdio)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| binary_err(e, "svnadmin"))?;
        let load_stderr = load.stderr.take().expect("stderr piped above");
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(load_stderr).lines();
            let mut buf = String::new();
            while let Ok(Some(line)) = lines.next_line().await {
                buf.push_str(&line);
                buf.push('\n');
            }
            buf
        });

        let load_status = load.wait().await.map_err(SvnError::IoError)?;
        let _gunzip_status = gunzip.wait().await.map_err(SvnError::IoError)?;
        let stderr_text = stderr_task.await.unwrap_or_default();

        if !load_status.success() {
            return Err(SvnError::CommandFailed {
                exit_code: load_status.code().unwrap_or(-1),
                stderr: stderr_text,
            });
        }
    } else {
        let file = std::fs::File::open(dump_path).map_err(SvnError::IoError)?;
        let output = {
            let mut cmd = Command::new("svnadmin");
            cmd.args(&load_args)
                .stdin(Stdio::from(file))
                .stdout(Stdio::null())
                .stderr(Stdio::piped());
            cmd.output().await.map_err(|e| binary_err(e, "svnadmin"))?
        };
        if !output.status.success() {
            return Err(SvnError::CommandFailed {
                exit_code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
    }

    Ok(format!("file://{}", repo_dir.display()))
}

/// Full remote-dump materialization: dump `url` into `work_dir`, then load
/// it into a fresh repository under `work_dir/repo`, returning the local
/// `file://` URL and the dump outcome.
#[instrument(skip(password))]
pub async fn materialize_remote_dump(
    url: &str,
    username: &str,
    password: Option<&str>,
    work_dir: &Path,
) -> Result<(String, DumpOutcome), SvnError> {
    tokio::fs::create_dir_all(work_dir).await.map_err(SvnError::IoError)?;
    let dump_path = work_dir.join("repo.svndump.gz");
    let outcome = dump_remote_to_file(url, username, password, &dump_path).await?;
    let repo_dir = work_dir.join("repo");
    let file_url = create_local_repo_from_dump(&dump_path, &repo_dir, outcome.dumped_through_rev).await?;
    Ok((file_url, outcome))
}
