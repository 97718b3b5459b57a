use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{Cid, ShoalStorageError};

use super::BlockStore;

/// A trivial implementation of [`BlockStore`] - backed by a [`HashMap`] -
/// where all blocks are kept in memory and never persisted.
#[derive(Clone, Default)]
pub struct MemoryBlockStore {
    blocks: Arc<RwLock<HashMap<Cid, Vec<u8>>>>,
}

impl MemoryBlockStore {
    /// The number of blocks currently held by this store.
    pub async fn len(&self) -> usize {
        self.blocks.read().await.len()
    }

    /// Whether this store holds no blocks at all.
    pub async fn is_empty(&self) -> bool {
        self.blocks.read().await.is_empty()
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl BlockStore for MemoryBlockStore {
    async fn get(&self, cid: &Cid) -> Result<Option<Vec<u8>>, ShoalStorageError> {
        let blocks = self.blocks.read().await;
        Ok(blocks.get(cid).cloned())
    }

    async fn put(&self, cid: Cid, bytes: Vec<u8>) -> Result<(), ShoalStorageError> {
        let mut blocks = self.blocks.write().await;
        blocks.insert(cid, bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use crate::{Blake3Hasher, BlockStore, Cid, Hasher, MemoryBlockStore};

    #[tokio::test]
    async fn it_stores_and_retrieves_blocks() -> Result<()> {
        let store = MemoryBlockStore::default();
        let bytes = b"a block of bytes".to_vec();
        let cid = Cid::new(0x71, Blake3Hasher::ID, Blake3Hasher::digest(&bytes));

        assert_eq!(store.get(&cid).await?, None);

        store.put(cid.clone(), bytes.clone()).await?;

        assert_eq!(store.get(&cid).await?, Some(bytes));
        assert_eq!(store.len().await, 1);

        Ok(())
    }
}
