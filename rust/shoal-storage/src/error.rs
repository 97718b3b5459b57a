use thiserror::Error;

/// The common error type used by this crate
#[derive(Error, Debug)]
pub enum ShoalStorageError {
    /// There was a problem when accessing a storage backend
    #[error("Storage backend error: {0}")]
    StorageBackend(String),
}
