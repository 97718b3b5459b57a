use async_stream::try_stream;
use futures_core::Stream;
use nonempty::NonEmpty;
use shoal_storage::{BlockStore, Hasher};

use crate::{Bucket, BucketCodec, Cursor, Entry, ShoalProllyTreeError, Tuple};

/// A changed entry: what one tree holds on the left, what the other
/// holds on the right; `None` on the side that lacks the tuple.
pub type NodeDiff = (Option<Entry>, Option<Entry>);

/// A changed bucket, with the same left/right convention as [`NodeDiff`].
pub type BucketDiff = (Option<Bucket>, Option<Bucket>);

/// One segment of a streamed structural diff: entry-level changes in
/// ascending tuple order, together with the bucket-level changes that
/// cover them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TreeDiff {
    /// Entry-level changes
    pub nodes: Vec<NodeDiff>,
    /// Bucket-level changes
    pub buckets: Vec<BucketDiff>,
}

impl TreeDiff {
    /// Whether this segment carries no changes at all.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.buckets.is_empty()
    }
}

/// Compute the structural diff between the trees rooted at `left_root`
/// and `right_root`, as a lazy stream of [`TreeDiff`] segments in
/// ascending tuple order.
///
/// Two cursors walk the leaf levels in lockstep; any subtree whose
/// bucket digests agree on both sides is skipped wholesale, which is
/// what makes diffing two large mostly-equal trees cheap.
pub fn diff<'a, C, H, L, R>(
    left_store: &'a L,
    right_store: &'a R,
    left_root: &Bucket,
    right_root: &Bucket,
) -> impl Stream<Item = Result<TreeDiff, ShoalProllyTreeError>> + 'a
where
    C: BucketCodec,
    H: Hasher,
    L: BlockStore,
    R: BlockStore,
{
    let left_root = left_root.clone();
    let right_root = right_root.clone();

    try_stream! {
        if left_root.digest() == right_root.digest() {
            return;
        }

        let origin = Tuple::origin();
        let mut left = Cursor::<C, H, L>::new(left_store, left_root.clone());
        if left.root_level() > 0 {
            left.jump_to(&origin, 0).await?;
        }
        let mut right = Cursor::<C, H, R>::new(right_store, right_root.clone());
        if right.root_level() > 0 {
            right.jump_to(&origin, 0).await?;
        }

        let mut pending = TreeDiff::default();

        loop {
            let left_live = !left.done() && left.index().is_some();
            let right_live = !right.done() && right.index().is_some();

            match (left_live, right_live) {
                (false, false) => break,
                (true, false) => {
                    let bucket = left.current_bucket().clone();
                    let start = left.index().unwrap_or(0);
                    for entry in &bucket.entries()[start..] {
                        pending.nodes.push((Some(entry.clone()), None));
                    }
                    let before = snapshot(&left);
                    left.next_bucket(0).await?;
                    let exits = exited(before, &left);
                    merge_exits(&mut pending, exits, Vec::new());
                    if !pending.is_empty() {
                        yield std::mem::take(&mut pending);
                    }
                }
                (false, true) => {
                    let bucket = right.current_bucket().clone();
                    let start = right.index().unwrap_or(0);
                    for entry in &bucket.entries()[start..] {
                        pending.nodes.push((None, Some(entry.clone())));
                    }
                    let before = snapshot(&right);
                    right.next_bucket(0).await?;
                    let exits = exited(before, &right);
                    merge_exits(&mut pending, Vec::new(), exits);
                    if !pending.is_empty() {
                        yield std::mem::take(&mut pending);
                    }
                }
                (true, true) => {
                    let aligned = left.index() == Some(0)
                        && right.index() == Some(0)
                        && left.current_bucket().digest() == right.current_bucket().digest();

                    if aligned {
                        // Equal buckets at a bucket start: skip the whole
                        // subtree, climbing as long as the parents agree and
                        // the cursors sit on their leftmost leaf.
                        let skip_level = common_skip_level(&left, &right);
                        tracing::trace!(
                            skip_level,
                            digest = %shoal_storage::display(left.current_bucket().digest()),
                            "skipping equal subtree"
                        );
                        let before_left = snapshot(&left);
                        let before_right = snapshot(&right);
                        left.next_bucket(skip_level).await?;
                        if !left.done() && skip_level > 0 {
                            left.next(0).await?;
                        }
                        right.next_bucket(skip_level).await?;
                        if !right.done() && skip_level > 0 {
                            right.next(0).await?;
                        }
                        let left_exits = exited(before_left, &left);
                        let right_exits = exited(before_right, &right);
                        merge_exits(&mut pending, left_exits, right_exits);
                        if !pending.is_empty() {
                            yield std::mem::take(&mut pending);
                        }
                    } else {
                        let left_entry = left.current()?.clone();
                        let right_entry = right.current()?.clone();

                        let mut left_exits = Vec::new();
                        let mut right_exits = Vec::new();
                        match left_entry.tuple_ref().cmp(&right_entry.tuple_ref()) {
                            std::cmp::Ordering::Less => {
                                pending.nodes.push((Some(left_entry), None));
                                let before = snapshot(&left);
                                left.next(0).await?;
                                left_exits = exited(before, &left);
                            }
                            std::cmp::Ordering::Greater => {
                                pending.nodes.push((None, Some(right_entry)));
                                let before = snapshot(&right);
                                right.next(0).await?;
                                right_exits = exited(before, &right);
                            }
                            std::cmp::Ordering::Equal => {
                                if left_entry.message != right_entry.message {
                                    pending.nodes.push((Some(left_entry), Some(right_entry)));
                                }
                                let before = snapshot(&left);
                                left.next(0).await?;
                                left_exits = exited(before, &left);
                                let before = snapshot(&right);
                                right.next(0).await?;
                                right_exits = exited(before, &right);
                            }
                        }
                        let stepped = !left_exits.is_empty() || !right_exits.is_empty();
                        merge_exits(&mut pending, left_exits, right_exits);
                        if stepped && !pending.is_empty() {
                            yield std::mem::take(&mut pending);
                        }
                    }
                }
            }
        }

        // The roots themselves never leave the cursor stacks; report
        // them directly (they are known to differ at this point).
        pending.buckets.push((Some(left_root), None));
        pending.buckets.push((None, Some(right_root)));
        yield std::mem::take(&mut pending);
    }
}

/// The highest level at which both cursors sit at the start of
/// digest-equal buckets, so that the whole subtree below can be
/// skipped in one sideways move.
fn common_skip_level<C, H, L, R>(left: &Cursor<'_, C, H, L>, right: &Cursor<'_, C, H, R>) -> u32
where
    C: BucketCodec,
    H: Hasher,
    L: BlockStore,
    R: BlockStore,
{
    let mut level = 0;
    loop {
        let (Some(left_parent), Some(right_parent)) = (
            left.bucket_at_level(level + 1),
            right.bucket_at_level(level + 1),
        ) else {
            return level;
        };
        if left_parent.digest() != right_parent.digest() {
            return level;
        }
        let (Some(left_child), Some(right_child)) =
            (left.bucket_at_level(level), right.bucket_at_level(level))
        else {
            return level;
        };
        if !first_link(left_parent, left_child) || !first_link(right_parent, right_child) {
            return level;
        }
        level += 1;
    }
}

fn first_link(parent: &Bucket, child: &Bucket) -> bool {
    match parent.entries().first() {
        Some(link) => link.message.as_slice() == child.digest().as_slice(),
        None => false,
    }
}

fn snapshot<C, H, S>(cursor: &Cursor<'_, C, H, S>) -> Vec<Bucket>
where
    C: BucketCodec,
    H: Hasher,
    S: BlockStore,
{
    cursor.buckets().into_iter().collect()
}

/// The buckets the cursor's stack no longer crosses after a move,
/// leaf-most first.
fn exited<C, H, S>(before: Vec<Bucket>, cursor: &Cursor<'_, C, H, S>) -> Vec<Bucket>
where
    C: BucketCodec,
    H: Hasher,
    S: BlockStore,
{
    let after: NonEmpty<Bucket> = cursor.buckets();
    before
        .into_iter()
        .rev()
        .filter(|bucket| {
            !after
                .iter()
                .any(|remaining| remaining.digest() == bucket.digest())
        })
        .collect()
}

/// Fold per-step bucket exits into the pending diff, cancelling the
/// pairs that left both sides with equal digests (those subtrees were
/// skipped as equal, not changed).
fn merge_exits(pending: &mut TreeDiff, left: Vec<Bucket>, mut right: Vec<Bucket>) {
    for bucket in left {
        if let Some(position) = right
            .iter()
            .position(|other| other.digest() == bucket.digest())
        {
            right.remove(position);
        } else {
            pending.buckets.push((Some(bucket), None));
        }
    }
    for bucket in right {
        pending.buckets.push((None, Some(bucket)));
    }
}
