#![warn(missing_docs)]

//! This crate provides an ordered index of timestamped, hash-identified
//! entries implemented as a prolly tree: a search tree whose shape is a
//! deterministic function of its contents, stored bucket by bucket in a
//! content-addressed [`shoal_storage::BlockStore`]. Equal contents
//! always produce equal root digests, so replicas can compare and merge
//! trees while skipping every subtree whose digest already matches.
//!
//! In order to use it, construct a block store and initialize a
//! [`Tree`] over it:
//!
//! ```rust
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use shoal_prolly_tree::{DagCborCodec, Entry, Tree, TreeConfig, Tuple};
//! use shoal_storage::{Blake3Hasher, MemoryBlockStore};
//!
//! let store = MemoryBlockStore::default();
//! let mut tree =
//!     Tree::<DagCborCodec, Blake3Hasher, _>::empty(store, TreeConfig::default()).await?;
//!
//! // Index an entry under its (timestamp, hash) tuple
//! tree.insert(Entry::new(0, vec![0, 0, 0, 0], b"hi".to_vec())).await?;
//!
//! // Look it back up
//! let found = tree.get(&Tuple::new(0, vec![0, 0, 0, 0])).await?;
//! assert!(found.is_some());
//!
//! // The root digest identifies the whole tree
//! println!("{}", tree.cid());
//! # Ok(())
//! # }
//! ```

mod boundary;
pub use boundary::*;

mod bucket;
pub use bucket::*;

mod codec;
pub use codec::*;

mod cursor;
pub use cursor::*;

mod diff;
pub use diff::*;

mod entry;
pub use entry::*;

mod error;
pub use error::*;

mod mutation;
pub use mutation::*;

mod tree;
pub use tree::*;
