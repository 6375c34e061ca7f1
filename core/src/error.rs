use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to process {path}: {source}")]
    Entry {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("File {path} changed while archiving: expected {expected} bytes, read {actual}")]
    SizeMismatch { path: String, expected: u64, actual: u64 },

    #[error("Archive already exists at {path}")]
    ArchiveExists { path: String },

    #[error("Lock conflict: {0}")]
    LockConflict(String),

    #[error("Archive entry escapes the output directory: {path}")]
    UnsafeEntryPath { path: String },

    #[error("Invalid archive: {0}")]
    InvalidArchive(String),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub(crate) fn entry(path: impl Into<String>, source: std::io::Error) -> Self {
        Error::Entry {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
