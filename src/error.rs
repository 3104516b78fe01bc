use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {reason}", path.display())]
    MalformedArchive { path: PathBuf, reason: String },

    #[error("{}: checksum mismatch (expected {expected}, found {actual})", path.display())]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("{}: file does not exist", path.display())]
    MissingFile { path: PathBuf },

    #[error("{0}")]
    InvariantViolation(String),

    #[error("unknown category: {0}")]
    UnknownCategory(String),

    #[error("category already exists: {0}")]
    DuplicateCategory(String),

    #[error("invalid fingerprint: {0:?}")]
    InvalidFingerprint(String),

    #[error("no IWAD selected")]
    NoBaseSelected,

    #[error("serialize: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
