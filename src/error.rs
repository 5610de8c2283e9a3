//! Error types for the relay.
//!
//! Read timeouts and peer disconnects are not errors: they end a session
//! normally and are reported through [`crate::server::EndReason`].

use std::io;
use std::path::PathBuf;

/// Terminal failures of a serve attempt.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The configured source file could not be opened for reading.
    #[error("source file '{}' not found: {source}", .path.display())]
    SourceFileMissing { path: PathBuf, source: io::Error },

    /// The listening socket could not be created.
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },

    #[error("failed to accept connection: {0}")]
    Accept(io::Error),

    /// The peer connection failed in a way other than timeout or disconnect.
    #[error("connection error: {0}")]
    Connection(io::Error),

    /// Persisting an upload failed.
    #[error("failed to write upload to '{}': {source}", .path.display())]
    WriteFailure { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
