use async_trait::async_trait;

use crate::{Cid, ConditionalSync, ShoalStorageError};

mod memory;
pub use memory::*;

#[cfg(any(test, feature = "helpers"))]
mod measure;
#[cfg(any(test, feature = "helpers"))]
pub use measure::*;

/// A [`BlockStore`] holds opaque byte blocks addressed by [`Cid`].
///
/// Writes are content-addressed and therefore idempotent: storing the
/// same bytes under the same [`Cid`] twice is a no-op, which is why
/// `put` only needs shared access. A store never interprets the bytes it
/// holds; verification against the digest is the reader's concern.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait BlockStore: ConditionalSync {
    /// Retrieve a block by its [`Cid`], or `None` when the store does
    /// not hold it.
    async fn get(&self, cid: &Cid) -> Result<Option<Vec<u8>>, ShoalStorageError>;

    /// Store a block under the given [`Cid`].
    async fn put(&self, cid: Cid, bytes: Vec<u8>) -> Result<(), ShoalStorageError>;
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<S> BlockStore for &S
where
    S: BlockStore,
{
    async fn get(&self, cid: &Cid) -> Result<Option<Vec<u8>>, ShoalStorageError> {
        (**self).get(cid).await
    }

    async fn put(&self, cid: Cid, bytes: Vec<u8>) -> Result<(), ShoalStorageError> {
        (**self).put(cid, bytes).await
    }
}
