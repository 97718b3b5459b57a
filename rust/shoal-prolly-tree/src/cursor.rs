use std::marker::PhantomData;

use nonempty::NonEmpty;
use shoal_storage::{BlockStore, Digest, Hasher};

use crate::{Bucket, BucketCodec, Entry, ShoalProllyTreeError, Tuple, load_bucket};

/// Picks the index to land on after a vertical move.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Guide<'a> {
    /// Aim at the first entry.
    Lowest,
    /// Aim at the first entry whose tuple is greater than or equal to
    /// the target, or the last entry when every tuple is smaller.
    ByTuple(&'a Tuple),
}

impl Guide<'_> {
    pub(crate) fn index(&self, entries: &[Entry]) -> Option<usize> {
        if entries.is_empty() {
            return None;
        }
        match self {
            Guide::Lowest => Some(0),
            Guide::ByTuple(tuple) => {
                let target = tuple.to_ref();
                let index = entries.partition_point(|entry| entry.tuple_ref() < target);
                Some(index.min(entries.len() - 1))
            }
        }
    }
}

/// A stateful position inside a tree: the stack of buckets from the
/// root down to the current level, and an index into the topmost
/// bucket's entries.
///
/// All forward motion is monotone: a cursor never revisits a tuple it
/// has stepped past. Mutating operations take `&mut self`, so overlapping
/// moves on one cursor are ruled out at compile time; once the cursor
/// steps past the head of the root it is `done` and further motion
/// no-ops.
pub struct Cursor<'a, C, H, S>
where
    C: BucketCodec,
    H: Hasher,
    S: BlockStore,
{
    store: &'a S,
    stack: NonEmpty<Bucket>,
    index: Option<usize>,
    done: bool,

    codec: PhantomData<C>,
    hasher: PhantomData<H>,
}

impl<'a, C, H, S> Clone for Cursor<'a, C, H, S>
where
    C: BucketCodec,
    H: Hasher,
    S: BlockStore,
{
    fn clone(&self) -> Self {
        Cursor {
            store: self.store,
            stack: self.stack.clone(),
            index: self.index,
            done: self.done,
            codec: PhantomData,
            hasher: PhantomData,
        }
    }
}

impl<'a, C, H, S> Cursor<'a, C, H, S>
where
    C: BucketCodec,
    H: Hasher,
    S: BlockStore,
{
    /// Create a cursor over the tree rooted at `root`, positioned at
    /// the root bucket's first entry.
    pub fn new(store: &'a S, root: Bucket) -> Self {
        let index = if root.is_empty() { None } else { Some(0) };
        Cursor {
            store,
            stack: NonEmpty::new(root),
            index,
            done: false,
            codec: PhantomData,
            hasher: PhantomData,
        }
    }

    /// The level of the bucket the cursor currently points into.
    pub fn level(&self) -> u32 {
        self.stack.last().level()
    }

    /// The level of the root bucket.
    pub fn root_level(&self) -> u32 {
        self.stack.first().level()
    }

    /// The index of the current entry within the current bucket, or
    /// `None` when the current bucket is empty.
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    /// Whether the cursor has stepped past the head of the tree.
    pub fn done(&self) -> bool {
        self.done
    }

    /// The bucket the cursor currently points into.
    pub fn current_bucket(&self) -> &Bucket {
        self.stack.last()
    }

    /// A snapshot of the bucket stack, root first.
    pub fn buckets(&self) -> NonEmpty<Bucket> {
        self.stack.clone()
    }

    /// The entry under the cursor.
    pub fn current(&self) -> Result<&Entry, ShoalProllyTreeError> {
        self.index
            .and_then(|index| self.current_bucket().entries().get(index))
            .ok_or_else(|| {
                ShoalProllyTreeError::InvalidMove("cursor has no current entry".into())
            })
    }

    /// The bucket the cursor's path crosses at `level`, if the stack
    /// reaches down that far.
    pub(crate) fn bucket_at_level(&self, level: u32) -> Option<&Bucket> {
        let root_level = self.root_level();
        if level > root_level || level < self.level() {
            return None;
        }
        match (root_level - level) as usize {
            0 => Some(self.stack.first()),
            index => self.stack.tail.get(index - 1),
        }
    }

    /// True when every parent-child pair along the stack is linked
    /// through the parent's first entry: the cursor sits on the
    /// leftmost spine of the tree.
    pub fn is_at_tail(&self) -> bool {
        self.path_links(|bucket| bucket.first())
    }

    /// True when every parent-child pair along the stack is linked
    /// through the parent's last entry: the cursor sits on the
    /// rightmost spine of the tree.
    pub fn is_at_head(&self) -> bool {
        self.path_links(|bucket| bucket.boundary())
    }

    fn path_links(&self, pick: impl Fn(&Bucket) -> Option<&Entry>) -> bool {
        self.stack
            .iter()
            .zip(self.stack.iter().skip(1))
            .all(|(parent, child)| match pick(parent) {
                Some(link) => link.message.as_slice() == child.digest().as_slice(),
                None => false,
            })
    }

    /// Advance by one tuple at `level`.
    pub async fn next(&mut self, level: u32) -> Result<(), ShoalProllyTreeError> {
        if self.done {
            return Ok(());
        }
        if level > self.root_level() {
            self.done = true;
            return Ok(());
        }
        let origin_level = self.level();
        if level != origin_level {
            self.move_to_level(level, Guide::Lowest).await?;
        }
        if level >= origin_level {
            self.move_sideways().await?;
        }
        Ok(())
    }

    /// Advance to the first entry of the following bucket at `level`.
    pub async fn next_bucket(&mut self, level: u32) -> Result<(), ShoalProllyTreeError> {
        if self.done {
            return Ok(());
        }
        if level > self.root_level() {
            self.done = true;
            return Ok(());
        }
        if level != self.level() {
            self.move_to_level(level, Guide::Lowest).await?;
        }
        self.index = match self.current_bucket().len() {
            0 => None,
            length => Some(length - 1),
        };
        self.move_sideways().await
    }

    /// Fast-forward at `level` until the current tuple is greater than
    /// or equal to `tuple`, clamping at the head of the level when no
    /// such entry exists.
    pub async fn next_tuple(
        &mut self,
        tuple: &Tuple,
        level: u32,
    ) -> Result<(), ShoalProllyTreeError> {
        if self.done {
            return Ok(());
        }
        if level > self.root_level() {
            self.done = true;
            return Ok(());
        }
        if level > self.level() {
            self.move_to_level(level, Guide::ByTuple(tuple)).await?;
        }
        while self.level() < self.root_level() && self.bucket_ends_before(tuple) {
            self.ascend()?;
        }
        let target = Guide::ByTuple(tuple).index(self.current_bucket().entries());
        self.index = match (self.index, target) {
            (Some(index), Some(target)) => Some(index.max(target)),
            (None, target) => target,
            (index, None) => index,
        };
        if level < self.level() {
            self.move_to_level(level, Guide::ByTuple(tuple)).await?;
        }
        Ok(())
    }

    /// Reset to the root and descend to `level` aimed at `tuple`.
    pub async fn jump_to(&mut self, tuple: &Tuple, level: u32) -> Result<(), ShoalProllyTreeError> {
        if level > self.root_level() {
            return Err(ShoalProllyTreeError::InvalidMove(format!(
                "level {level} is above the root"
            )));
        }
        let root = self.stack.first().clone();
        self.index = Guide::ByTuple(tuple).index(root.entries());
        self.stack = NonEmpty::new(root);
        self.done = false;
        if level < self.level() {
            self.move_to_level(level, Guide::ByTuple(tuple)).await?;
        }
        Ok(())
    }

    /// Move the top of the stack to `target`, descending with `guide`.
    /// Ascents re-aim each parent at the tuple the cursor was on.
    pub(crate) async fn move_to_level(
        &mut self,
        target: u32,
        guide: Guide<'_>,
    ) -> Result<(), ShoalProllyTreeError> {
        if target == self.level() {
            return Err(ShoalProllyTreeError::InvalidMove(format!(
                "cursor is already at level {target}"
            )));
        }
        if target > self.root_level() {
            return Err(ShoalProllyTreeError::InvalidMove(format!(
                "level {target} is above the root"
            )));
        }
        while self.level() < target {
            self.ascend()?;
        }
        while self.level() > target {
            let (child, index) = self.load_child(guide).await?;
            self.stack.push(child);
            self.index = index;
        }
        Ok(())
    }

    /// Step to the next tuple at the current level, climbing over
    /// bucket ends and descending back down the leftmost path. Sets
    /// `done` when the climb overflows the root.
    async fn move_sideways(&mut self) -> Result<(), ShoalProllyTreeError> {
        let origin_level = self.level();
        while self.overflows() {
            if self.stack.len() == 1 {
                self.done = true;
                return Ok(());
            }
            self.ascend()?;
        }
        let Some(index) = self.index else {
            return Err(ShoalProllyTreeError::UnexpectedTreeShape(
                "non-empty bucket without a cursor index".into(),
            ));
        };
        self.index = Some(index + 1);
        if self.level() > origin_level {
            self.move_to_level(origin_level, Guide::Lowest).await?;
        }
        Ok(())
    }

    fn overflows(&self) -> bool {
        match self.index {
            None => true,
            Some(index) => index + 1 >= self.current_bucket().len(),
        }
    }

    fn bucket_ends_before(&self, tuple: &Tuple) -> bool {
        match self.current_bucket().boundary() {
            Some(boundary) => boundary.tuple_ref() < tuple.to_ref(),
            None => false,
        }
    }

    /// Pop the current bucket and re-aim the parent index at the tuple
    /// the cursor was positioned on.
    fn ascend(&mut self) -> Result<(), ShoalProllyTreeError> {
        let tuple = self
            .index
            .and_then(|index| self.current_bucket().entries().get(index))
            .map(|entry| entry.tuple());
        if self.stack.pop().is_none() {
            return Err(ShoalProllyTreeError::InvalidMove(
                "cannot move above the root".into(),
            ));
        }
        let entries = self.stack.last().entries();
        self.index = match &tuple {
            Some(tuple) => Guide::ByTuple(tuple).index(entries),
            None => Guide::Lowest.index(entries),
        };
        Ok(())
    }

    /// Load the child bucket linked by the current entry, one level
    /// down, choosing the landing index with `guide`.
    async fn load_child(
        &self,
        guide: Guide<'_>,
    ) -> Result<(Bucket, Option<usize>), ShoalProllyTreeError> {
        let entry = self.current()?;
        let digest: Digest = entry.message.as_slice().try_into().map_err(|_| {
            ShoalProllyTreeError::UnexpectedTreeShape(
                "link message is not a bucket digest".into(),
            )
        })?;
        let prefix = self.current_bucket().prefix().at_level(self.level() - 1);
        let child = load_bucket::<C, H, S>(self.store, digest, &prefix).await?;
        if child.is_empty() {
            return Err(ShoalProllyTreeError::UnexpectedTreeShape(
                "non-root bucket with no entries".into(),
            ));
        }
        let index = guide.index(child.entries());
        Ok((child, index))
    }
}
