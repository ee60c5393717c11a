//! Error types for the veldt scene core

use thiserror::Error;

/// Main error type for the crate
///
/// Per-object data problems (degenerate boxes, unresolved materials)
/// are not errors: they are logged and the object is skipped or
/// substituted. `Error` covers stream integrity and I/O failures.
#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt scene stream: {0}")]
    Corrupt(String),

    #[error("unsupported chunk version {0}")]
    ChunkVersion(u32),

    #[error("cull dispatch error: {0}")]
    Dispatch(String),
}
