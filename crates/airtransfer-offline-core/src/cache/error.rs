use std::path::PathBuf;

use thiserror::Error;

use crate::net::FetchError;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse cache bucket {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize cache bucket: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Only GET requests can be cached, got {0}")]
    UnsupportedMethod(String),

    #[error("Request {0} appears more than once in one batch")]
    DuplicateRequest(String),

    #[error("Invalid cache name {0:?}: use letters, digits, '-', '_' or '.'")]
    InvalidName(String),
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure of an install step. Nothing from the failed install is stored.
#[derive(Error, Debug)]
pub enum InstallError {
    #[error("Failed to fetch seed resource {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error(transparent)]
    Cache(#[from] CacheError),
}
