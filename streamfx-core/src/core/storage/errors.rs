use thiserror::Error;

/// The storage package specific results.
pub type Result<T> = std::result::Result<T, StorageError>;

/// The errors which can occur while interacting with the filesystem storage.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StorageError {
    #[error("failed to delete {0}, {1}")]
    DeletionFailed(String, String),
}
