//! svn-loader command-line entry point.
//!
//! A single `load` subcommand drives one loading visit against an SVN
//! origin; `init`/`validate` manage the TOML configuration file, matching
//! the shape of the original team-mode CLI this crate was split from.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use svn_loader_core::config::LoaderConfig;
use svn_loader_core::errors::LoaderError;
use svn_loader_core::store::SqliteObjectStore;
use svn_loader_core::Loader;

/// svn-loader command-line tool.
#[derive(Parser, Debug)]
#[command(
    name = "svn-loader",
    version,
    about = "Replay an SVN repository's history into a content-addressed Merkle DAG"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true, default_value = "./svn-loader.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load (or incrementally resume) one origin.
    Load,

    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./svn-loader.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file.
    Validate,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(LoaderError::Uneventful(msg)) = e.downcast_ref::<LoaderError>() {
                tracing::info!("{msg}");
                return ExitCode::SUCCESS;
            }
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init { output } => cmd_init(&output),
        Commands::Validate => cmd_validate(&cli.config),
        Commands::Load => cmd_load(&cli.config).await,
    }
}

fn load_config(path: &PathBuf) -> Result<LoaderConfig> {
    LoaderConfig::load_and_resolve(path).context("failed to load configuration")
}

fn cmd_init(output: &PathBuf) -> Result<()> {
    let default_config = r#"[svn]
url = "https://svn.example.com/repo/trunk"
# origin_url = "https://svn.example.com/repo/trunk"
incremental = true
# temp_directory = "/tmp/svn-loader"
debug = false
check_revision = 1000
check_revision_from = 0
max_content_size = 104857600
username = "anonymous"
# password_env = "SVN_PASSWORD"

[store]
path = "svn-loader.sqlite3"

[log]
level = "info"
json = false
"#;

    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    std::fs::write(output, default_config).context("failed to write config file")?;

    println!("Default configuration written to {}", output.display());
    println!();
    println!("Next steps:");
    println!("  1. Edit the config file with your SVN repository URL");
    println!("  2. Set any referenced environment variables (SVN_PASSWORD, ...)");
    println!("  3. Validate with: svn-loader validate --config {}", output.display());
    println!("  4. Load with:     svn-loader load --config {}", output.display());

    Ok(())
}

fn cmd_validate(config_path: &PathBuf) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let mut config =
        LoaderConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  [OK] TOML structure is valid");

    let _ = config.resolve_env_vars();
    println!("  [OK] Environment variable references processed");

    match config.validate() {
        Ok(()) => println!("  [OK] All required fields are valid"),
        Err(e) => {
            println!("  [FAIL] Validation error: {}", e);
            anyhow::bail!("configuration validation failed");
        }
    }

    println!();
    println!("Configuration summary:");
    println!("  SVN URL        : {}", config.svn.url);
    println!("  Origin URL     : {}", config.svn.origin_url.as_deref().unwrap_or(&config.svn.url));
    println!("  Incremental    : {}", config.svn.incremental);
    println!("  Check revision : every {} revisions (from {})", config.svn.check_revision, config.svn.check_revision_from);
    println!(
        "  SVN password   : {}",
        if config.svn.password.is_some() { "set" } else { "not set" }
    );
    println!("  Store path     : {}", config.store.path.display());
    println!();
    println!("Configuration is valid.");

    Ok(())
}

async fn cmd_load(config_path: &PathBuf) -> Result<()> {
    let config = load_config(config_path)?;

    let store = SqliteObjectStore::open(&config.store.path)
        .with_context(|| format!("failed to open object store at {}", config.store.path.display()))?;

    let mut loader = Loader::new(&config.svn, &store)
        .await
        .context("failed to initialize loader")?;

    let outcome = loader.run().await?;

    println!("Load complete:");
    println!("  Status         : {}", outcome.status.as_str());
    println!("  Head revision  : {}", outcome.head_revision);
    println!("  Eventful       : {}", !outcome.uneventful);
    if let Some(id) = outcome.snapshot_id {
        println!("  Snapshot       : {}", svn_loader_core::models::hex(&id));
    }

    Ok(())
}
