//! Error types shared by the library.

use std::path::PathBuf;

/// Errors that can occur while extracting or clustering breakpoints.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("CRAM input {path} requires a reference genome (--reference)")]
    MissingReference { path: PathBuf },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(
        "input is not coordinate-sorted: read {read} at {chrom}:{pos} follows a later position; sort it with 'samtools sort'"
    )]
    UnsortedInput { read: String, chrom: String, pos: u64 },

    #[error("malformed breakpoint row at line {line}: {msg}")]
    Parse { line: usize, msg: String },

    #[error("I/O error: {source} ({path})")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
}

impl Error {
    /// Wrap an `io::Error` with the path it happened on.
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io {
            source,
            path: path.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
