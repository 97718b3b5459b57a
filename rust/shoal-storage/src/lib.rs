#![warn(missing_docs)]

//! Content-addressed block storage for shoal trees.
//!
//! This crate contains the transport half of a shoal tree: blocks of
//! bytes, addressed by [`Cid`] (a codec identifier, a hasher identifier
//! and a digest), behind the [`BlockStore`] trait. The tree crate never
//! touches anything but this surface, so backends can range from an
//! in-process map to a remote replica.
//!
//! ```rust
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use shoal_storage::{Blake3Hasher, BlockStore, Cid, Hasher, MemoryBlockStore};
//!
//! let store = MemoryBlockStore::default();
//!
//! let bytes = b"some block".to_vec();
//! let cid = Cid::new(0x71, Blake3Hasher::ID, Blake3Hasher::digest(&bytes));
//!
//! store.put(cid.clone(), bytes).await?;
//! assert!(store.get(&cid).await?.is_some());
//! # Ok(())
//! # }
//! ```

mod sync;
pub use sync::*;

mod error;
pub use error::*;

mod hash;
pub use hash::*;

mod cid;
pub use cid::*;

mod store;
pub use store::*;
