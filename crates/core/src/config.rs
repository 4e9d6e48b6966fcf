//! TOML-based configuration for the SVN loader.
//!
//! Sensitive values (the SVN password) are stored as `_env` fields that
//! reference environment variable names; the actual secret is resolved at
//! runtime via [`LoaderConfig::resolve_env_vars`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level loader configuration loaded from a TOML file.
///
/// Mirrors the "Inbound configuration" table: `svn` carries the fields the
/// loader is invoked with (`url`, `origin_url`, `visit_date`, `incremental`,
/// ...); `store` and `log` are the ambient settings the distilled
/// specification leaves implicit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    pub svn: SvnConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub log: LogConfig,
}

// ---------------------------------------------------------------------------
// SVN
// ---------------------------------------------------------------------------

/// SVN source configuration — the parameters a single loading run is
/// invoked with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvnConfig {
    /// URL (or local path / sub-project URL) to load from.
    pub url: String,

    /// Origin URL recorded against the visit, if different from `url`
    /// (e.g. when `url` was rewritten to a `file://` dump mount, or to a
    /// redirect-resolved remote URL).
    #[serde(default)]
    pub origin_url: Option<String>,

    /// Visit date; revisions committed after this instant are not loaded.
    /// RFC3339. Defaults to "now" at load time if unset.
    #[serde(default)]
    pub visit_date: Option<chrono::DateTime<chrono::Utc>>,

    /// Resume from the last loaded revision rather than reloading from
    /// scratch.
    #[serde(default = "default_true")]
    pub incremental: bool,

    /// Scratch directory root for exports and replay working trees.
    #[serde(default = "default_temp_directory")]
    pub temp_directory: PathBuf,

    /// Keep scratch directories after the run for inspection instead of
    /// deleting them.
    #[serde(default)]
    pub debug: bool,

    /// Re-verify the reconstructed tree hash against a fresh export every
    /// `check_revision` revisions (0 disables periodic checks).
    #[serde(default = "default_check_revision")]
    pub check_revision: u64,

    /// Only start periodic divergence checks once this revision has been
    /// reached.
    #[serde(default)]
    pub check_revision_from: i64,

    /// Files larger than this many bytes are recorded as `SkippedContent`
    /// rather than hashed with their bytes in memory.
    #[serde(default = "default_max_content_size")]
    pub max_content_size: u64,

    /// SVN username for authentication. Empty string tries anonymous
    /// access first, matching `get_svn_repo`'s credential fallback ladder.
    #[serde(default)]
    pub username: String,

    /// Environment variable holding the SVN password.
    #[serde(default)]
    pub password_env: Option<String>,

    /// Resolved password (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub password: Option<String>,
}

fn default_true() -> bool {
    true
}
fn default_temp_directory() -> PathBuf {
    std::env::temp_dir()
}
fn default_check_revision() -> u64 {
    1000
}
fn default_max_content_size() -> u64 {
    100 * 1024 * 1024
}

// ---------------------------------------------------------------------------
// Object store
// ---------------------------------------------------------------------------

/// Configuration for the bundled SQLite-backed object store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database file (the object store).
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("svn-loader.sqlite3")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Structured logging configuration, consumed by the CLI entry point to
/// build a `tracing_subscriber` filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit logs as JSON lines instead of human-readable text.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl LoaderConfig {
    /// Load a [`LoaderConfig`] from a TOML file at the given path.
    ///
    /// This does **not** resolve environment variables — call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: LoaderConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Resolve all `*_env` fields from environment variables.
    ///
    /// A missing variable logs a warning but does not fail — anonymous SVN
    /// access is a legitimate mode, so the loader decides at connection
    /// time whether a missing password is fatal.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        info!("resolving environment variable references in config");

        if let Some(ref env_name) = self.svn.password_env {
            self.svn.password = resolve_optional_env(env_name, "svn.password_env");
        }

        debug!("environment variable resolution complete");
        Ok(())
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.svn.url.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "svn.url".into(),
                detail: "SVN URL must not be empty".into(),
            });
        }
        if self.svn.max_content_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "svn.max_content_size".into(),
                detail: "max_content_size must be > 0".into(),
            });
        }
        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }
}

/// Try to read an environment variable by name. Returns `Some(value)` on
/// success; logs a warning and returns `None` if the variable is unset.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}
