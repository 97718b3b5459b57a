use std::{
    future::poll_fn,
    marker::PhantomData,
    ops::{Bound, RangeBounds},
    pin::pin,
};

use async_stream::try_stream;
use futures_core::Stream;
use shoal_storage::{BlockStore, Cid, Digest, Hasher};

use crate::{
    Bucket, BucketCodec, Cursor, Entry, Prefix, ShoalProllyTreeError, TreeDiff, Tuple, Update,
    bucket::validate_entry_order, diff, mutation::mutation_stream,
};

/// Configuration fixed at tree creation time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TreeConfig {
    /// Expected number of entries per bucket at every level.
    pub average_bucket_size: u32,
}

impl Default for TreeConfig {
    fn default() -> Self {
        TreeConfig {
            average_bucket_size: 30,
        }
    }
}

/// An ordered index of [`Entry`] values whose shape - bucket boundaries,
/// bucket bytes and root digest - is a pure function of its contents.
///
/// Two trees with equal contents have equal root digests no matter how
/// the contents got there, which makes trees on distant peers cheap to
/// compare: subtrees with matching digests need never be fetched.
#[derive(Clone)]
pub struct Tree<C, H, S>
where
    C: BucketCodec,
    H: Hasher,
    S: BlockStore,
{
    store: S,
    root: Bucket,

    codec: PhantomData<C>,
    hasher: PhantomData<H>,
}

impl<C, H, S> Tree<C, H, S>
where
    C: BucketCodec,
    H: Hasher,
    S: BlockStore,
{
    /// Create the canonical empty tree: a single empty bucket at level
    /// 0, stored under its digest.
    pub async fn empty(store: S, config: TreeConfig) -> Result<Self, ShoalProllyTreeError> {
        let prefix = Prefix::new::<C, H>(config.average_bucket_size, 0);
        let root = Bucket::seal::<C, H>(prefix, Vec::new())?;
        store.put(root.cid(), root.bytes().to_vec()).await?;
        Ok(Tree {
            store,
            root,
            codec: PhantomData,
            hasher: PhantomData,
        })
    }

    /// Rehydrate a tree from the digest of its root bucket.
    ///
    /// The root's level is read from the block itself; everything else
    /// about its prefix must agree with `config` and the tree's codec
    /// and hasher.
    pub async fn from_digest(
        store: S,
        digest: Digest,
        config: TreeConfig,
    ) -> Result<Self, ShoalProllyTreeError> {
        let cid = Cid::new(C::ID, H::ID, digest);
        let Some(bytes) = store.get(&cid).await? else {
            return Err(ShoalProllyTreeError::MissingBlock(format!("{cid}")));
        };
        let actual = H::digest(&bytes);
        if actual != digest {
            return Err(ShoalProllyTreeError::DigestMismatch(format!(
                "root bytes do not hash to {cid}"
            )));
        }
        let (prefix, entries) = C::decode(&bytes)?;
        if prefix.average != config.average_bucket_size
            || prefix.codec != C::ID
            || prefix.hasher != H::ID
        {
            return Err(ShoalProllyTreeError::PrefixMismatch(format!(
                "root prefix {prefix:?} does not match the tree configuration"
            )));
        }
        validate_entry_order(&entries)?;
        Ok(Tree {
            store,
            root: Bucket::assemble(prefix, entries, bytes, digest),
            codec: PhantomData,
            hasher: PhantomData,
        })
    }

    /// The [`BlockStore`] used by this tree.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The root bucket.
    pub fn root(&self) -> &Bucket {
        &self.root
    }

    /// The digest of the root bucket.
    pub fn digest(&self) -> &Digest {
        self.root.digest()
    }

    /// The [`Cid`] of the root bucket.
    pub fn cid(&self) -> Cid {
        self.root.cid()
    }

    /// The configuration this tree was created with.
    pub fn config(&self) -> TreeConfig {
        TreeConfig {
            average_bucket_size: self.root.prefix().average,
        }
    }

    /// A fresh [`Cursor`] positioned at the start of the root bucket.
    pub fn cursor(&self) -> Cursor<'_, C, H, S> {
        Cursor::new(&self.store, self.root.clone())
    }

    /// Retrieve the entry with the given tuple, if present.
    pub async fn get(&self, tuple: &Tuple) -> Result<Option<Entry>, ShoalProllyTreeError> {
        if self.root.is_empty() {
            return Ok(None);
        }
        let mut cursor = self.cursor();
        cursor.jump_to(tuple, 0).await?;
        let entry = cursor.current()?;
        if entry.tuple_ref() == tuple.to_ref() {
            Ok(Some(entry.clone()))
        } else {
            Ok(None)
        }
    }

    /// An async stream over all entries, in ascending tuple order.
    pub fn stream(&self) -> impl Stream<Item = Result<Entry, ShoalProllyTreeError>> + '_ {
        self.stream_range(..)
    }

    /// An async stream over the entries whose tuples fall within the
    /// provided range, in ascending tuple order.
    pub fn stream_range<'a, R>(
        &'a self,
        range: R,
    ) -> impl Stream<Item = Result<Entry, ShoalProllyTreeError>> + 'a
    where
        R: RangeBounds<Tuple> + 'a,
    {
        try_stream! {
            if self.root.is_empty() {
                return;
            }
            let mut cursor = self.cursor();
            let start = match range.start_bound() {
                Bound::Included(tuple) | Bound::Excluded(tuple) => tuple.clone(),
                Bound::Unbounded => Tuple::origin(),
            };
            cursor.jump_to(&start, 0).await?;
            loop {
                if cursor.done() {
                    return;
                }
                let entry = cursor.current()?.clone();
                let tuple = entry.tuple();
                let past_end = match range.end_bound() {
                    Bound::Included(end) => tuple > *end,
                    Bound::Excluded(end) => tuple >= *end,
                    Bound::Unbounded => false,
                };
                if past_end {
                    return;
                }
                if range.contains(&tuple) {
                    yield entry;
                }
                cursor.next(0).await?;
            }
        }
    }

    /// Apply an ordered batch of updates, yielding diff segments as the
    /// rebuild proceeds. The batch must be strictly ascending by tuple.
    ///
    /// The new root is committed when the stream completes; dropping
    /// the stream early abandons the mutation without corrupting the
    /// tree.
    pub fn mutate(
        &mut self,
        updates: Vec<Update>,
    ) -> impl Stream<Item = Result<TreeDiff, ShoalProllyTreeError>> + '_ {
        let Tree { store, root, .. } = self;
        mutation_stream::<C, H, S>(store, root, updates)
    }

    /// Apply an ordered batch of updates and collect the full diff.
    pub async fn apply(&mut self, updates: Vec<Update>) -> Result<TreeDiff, ShoalProllyTreeError> {
        let mut collected = TreeDiff::default();
        {
            let mut stream = pin!(self.mutate(updates));
            while let Some(segment) = poll_fn(|cx| stream.as_mut().poll_next(cx)).await {
                let segment = segment?;
                collected.nodes.extend(segment.nodes);
                collected.buckets.extend(segment.buckets);
            }
        }
        Ok(collected)
    }

    /// Insert a single entry, replacing any entry with the same tuple.
    pub async fn insert(&mut self, entry: Entry) -> Result<(), ShoalProllyTreeError> {
        self.apply(vec![Update::Add(entry)]).await?;
        Ok(())
    }

    /// Remove the entry with the given tuple, if present.
    pub async fn remove(&mut self, tuple: &Tuple) -> Result<(), ShoalProllyTreeError> {
        self.apply(vec![Update::Rm(tuple.clone())]).await?;
        Ok(())
    }

    /// The structural diff from this tree to `other`, as a lazy stream
    /// of [`TreeDiff`] segments.
    pub fn diff<'a, O>(
        &'a self,
        other: &'a Tree<C, H, O>,
    ) -> impl Stream<Item = Result<TreeDiff, ShoalProllyTreeError>> + 'a
    where
        O: BlockStore,
    {
        diff::<C, H, S, O>(&self.store, &other.store, &self.root, &other.root)
    }
}
