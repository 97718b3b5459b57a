use shoal_storage::ShoalStorageError;
use thiserror::Error;

/// The common error type used by this crate
#[derive(Error, Debug)]
pub enum ShoalProllyTreeError {
    /// A bucket could not be encoded
    #[error("Failed to encode a bucket: {0}")]
    EncodeFailed(String),

    /// A block's bytes could not be decoded, or decoded to a
    /// non-canonical encoding
    #[error("Malformed block: {0}")]
    MalformedBlock(String),

    /// A required block is missing from storage
    #[error("Block not found in storage: {0}")]
    MissingBlock(String),

    /// A fetched block's bytes do not hash to the requested digest
    #[error("Digest mismatch: {0}")]
    DigestMismatch(String),

    /// A fetched bucket's prefix disagrees with the expected prefix
    #[error("Prefix mismatch: {0}")]
    PrefixMismatch(String),

    /// A fetched bucket sits at a different level than expected
    #[error("Level mismatch: {0}")]
    LevelMismatch(String),

    /// The tree did not match the expected shape
    #[error("Tree did not match expected shape: {0}")]
    UnexpectedTreeShape(String),

    /// A cursor was asked to move somewhere it cannot go
    #[error("Invalid cursor move: {0}")]
    InvalidMove(String),

    /// A batch of updates violated the ordering contract
    #[error("Invalid updates: {0}")]
    InvalidUpdates(String),

    /// The mutation loop drained its updates without producing a root
    #[error("Mutation completed without finding a new root")]
    NoNewRoot,

    /// There was a problem when accessing storage
    #[error("Storage error: {0}")]
    Storage(#[from] ShoalStorageError),
}
