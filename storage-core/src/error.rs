use std::io;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Invalid name: {0:?}")]
    InvalidName(String),

    #[error("Directory not found: {0}")]
    DirectoryNotFound(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Blob not found: {0}")]
    BlobNotFound(String),

    #[error("Storage unavailable: {source}")]
    StoreUnavailable {
        #[source]
        source: BoxError,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl StorageError {
    /// Wraps a transport or backend failure.
    pub fn unavailable(source: impl Into<BoxError>) -> Self {
        StorageError::StoreUnavailable {
            source: source.into(),
        }
    }

    /// True for the not-found family of errors.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::DirectoryNotFound(_)
                | StorageError::FileNotFound(_)
                | StorageError::BlobNotFound(_)
        )
    }
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        StorageError::unavailable(err)
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
