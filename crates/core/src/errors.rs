//! Error types for the svn-loader core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Svn(#[from] SvnError),

    #[error(transparent)]
    Replay(#[from] ReplayError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Loader(#[from] LoaderError),
}

// ---------------------------------------------------------------------------
// SVN errors
// ---------------------------------------------------------------------------

/// Errors from SVN CLI operations.
#[derive(Debug, Error)]
pub enum SvnError {
    /// The `svn` binary was not found on `$PATH`.
    #[error("svn binary not found: {0}")]
    BinaryNotFound(String),

    /// An `svn`/`svnadmin`/`svnrdump` command exited with a non-zero status.
    #[error("svn command failed (exit {exit_code}): {stderr}")]
    CommandFailed { exit_code: i32, stderr: String },

    /// Could not parse the XML output produced by `svn`.
    #[error("failed to parse svn XML output: {0}")]
    XmlParseError(String),

    /// An authentication problem with the SVN server.
    #[error("svn authentication failed for user '{username}': {detail}")]
    AuthenticationFailed { username: String, detail: String },

    /// The requested revision does not exist.
    #[error("svn revision {0} not found")]
    RevisionNotFound(i64),

    /// A checkout / export / working-copy operation failed.
    #[error("svn working copy error at '{path}': {detail}")]
    WorkingCopyError { path: String, detail: String },

    /// Network / connectivity issue. Distinguished from other command
    /// failures so the retry wrapper can recognize it.
    #[error("svn network error: {0}")]
    NetworkError(String),

    /// Malformed `svn:externals` definition.
    #[error("invalid svn:externals definition '{raw}': {detail}")]
    InvalidExternal { raw: String, detail: String },

    /// Generic I/O wrapper.
    #[error("svn I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl SvnError {
    /// True if this error represents a transient condition the retry
    /// wrapper (see `svn::retry`) should retry rather than give up on.
    pub fn is_retryable(&self) -> bool {
        match self {
            SvnError::NetworkError(_) => true,
            SvnError::CommandFailed { stderr, .. } => {
                const RETRYABLE_PREFIXES: &[&str] = &[
                    "Connection timed out",
                    "Unable to connect to a repository at URL",
                    "Error running context: The server unexpectedly closed the connection",
                    "ra_serf: The server sent a truncated HTTP response body",
                ];
                RETRYABLE_PREFIXES.iter().any(|p| stderr.contains(p))
            }
            SvnError::IoError(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Replay / hashing errors
// ---------------------------------------------------------------------------

/// Errors from the revision replay editor and the from-disk hashing pipeline.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("svn error during replay: {0}")]
    Svn(#[from] SvnError),

    #[error("git2 hashing error: {0}")]
    Git2(#[from] git2::Error),

    #[error("filesystem error while building scratch tree at '{path}': {detail}")]
    ScratchTree { path: String, detail: String },

    #[error("cannot apply change to path '{path}': {detail}")]
    InvalidChange { path: String, detail: String },

    #[error("external definition overlaps a versioned path: {0}")]
    ExternalOverlap(String),

    #[error("recursive svn:externals detected rooted at '{0}'")]
    RecursiveExternal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Object store errors
// ---------------------------------------------------------------------------

/// Errors from the content-addressed object store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store migration failed (version {version}): {detail}")]
    MigrationFailed { version: u32, detail: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("store I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    #[error("configuration parse error: {0}")]
    ParseError(String),

    #[error("required environment variable '{var}' is not set (referenced by config field '{field}')")]
    EnvVarMissing { var: String, field: String },

    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Loader / orchestration errors
// ---------------------------------------------------------------------------

/// Errors and non-error control-flow outcomes from the loading orchestrator.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error(transparent)]
    Svn(#[from] SvnError),

    #[error(transparent)]
    Replay(#[from] ReplayError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Nothing new to load; not a failure, signalled so callers can exit 0.
    #[error("uneventful: {0}")]
    Uneventful(String),

    /// The previously-loaded history no longer matches SVN; a full reload
    /// is required. Not itself fatal — the orchestrator catches this and
    /// resets `revision_start` to the initial revision.
    #[error("history altered at revision {0}: stored revision no longer matches SVN")]
    HistoryAltered(i64),

    /// A reconstructed directory hash diverged from a freshly exported one.
    #[error("hash divergence at revision {revision}: expected {expected}, computed {computed}")]
    HashDivergence {
        revision: i64,
        expected: String,
        computed: String,
    },
}
