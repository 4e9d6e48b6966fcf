//! svn-loader core library.
//!
//! This crate provides the foundational components for a one-directional
//! SVN-to-Merkle-DAG loader: configuration, domain models, error types, the
//! SVN access layer (CLI wrapper, replay editor, externals resolver, dump
//! frontends), the content-addressed object store, and the loading
//! orchestrator that ties them together.

pub mod config;
pub mod errors;
pub mod loader;
pub mod models;
pub mod store;
pub mod svn;

// Re-exports for convenience.
pub use config::LoaderConfig;
pub use loader::{LoadOutcome, Loader};
pub use store::ObjectStore;
