//! SVN access layer: the CLI wrapper, its response parsers, and everything
//! built on top of them (retry, externals parsing, URL helpers, the
//! repository facade, the from-disk hashing pipeline, the replay editor,
//! and dump-based fast ingestion).

pub mod client;
pub mod dump;
pub mod external;
pub mod from_disk;
pub mod parser;
pub mod path_utils;
pub mod replay;
pub mod repo;
pub mod retry;

pub use client::SvnClient;
pub use parser::*;
pub use repo::SvnRepo;
