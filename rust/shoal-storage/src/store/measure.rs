use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;

use crate::{Cid, ShoalStorageError};

use super::BlockStore;

/// A [`MeasuredBlockStore`] acts as a proxy over a [`BlockStore`]
/// implementation that measures reads and writes.
#[derive(Clone)]
pub struct MeasuredBlockStore<Store>
where
    Store: BlockStore,
{
    reads: Arc<AtomicUsize>,
    writes: Arc<AtomicUsize>,
    store: Store,
}

impl<Store> MeasuredBlockStore<Store>
where
    Store: BlockStore,
{
    /// Wrap the provided [`BlockStore`] so that reads and writes to it may be
    /// measured.
    pub fn new(store: Store) -> Self {
        Self {
            reads: Arc::new(AtomicUsize::default()),
            writes: Arc::new(AtomicUsize::default()),
            store,
        }
    }

    /// The aggregate number of reads from the wrapped [`BlockStore`]
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    /// The aggregate number of writes to the wrapped [`BlockStore`]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<Store> BlockStore for MeasuredBlockStore<Store>
where
    Store: BlockStore,
{
    async fn get(&self, cid: &Cid) -> Result<Option<Vec<u8>>, ShoalStorageError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.store.get(cid).await
    }

    async fn put(&self, cid: Cid, bytes: Vec<u8>) -> Result<(), ShoalStorageError> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.store.put(cid, bytes).await
    }
}
