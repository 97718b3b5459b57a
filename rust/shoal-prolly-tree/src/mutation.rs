use std::collections::BTreeMap;

use async_stream::try_stream;
use futures_core::Stream;
use shoal_storage::{BlockStore, Digest, Hasher};

use crate::{
    Bucket, BucketCodec, BucketDiff, Cursor, Entry, NodeDiff, ShoalProllyTreeError, TreeDiff,
    Tuple, boundary::BOUNDARY_WINDOW, entry::TupleRef, is_boundary, load_bucket,
};

/// A single requested change against the leaf level of a tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Update {
    /// Insert this entry, replacing any entry that shares its tuple.
    Add(Entry),
    /// Remove the entry with this tuple, if present.
    Rm(Tuple),
}

impl Update {
    /// The tuple this update applies to.
    pub fn tuple(&self) -> Tuple {
        match self {
            Update::Add(entry) => entry.tuple(),
            Update::Rm(tuple) => tuple.clone(),
        }
    }

    fn tuple_ref(&self) -> TupleRef<'_> {
        match self {
            Update::Add(entry) => entry.tuple_ref(),
            Update::Rm(tuple) => tuple.to_ref(),
        }
    }
}

/// A batch must be strictly ascending by tuple, which also rules out an
/// `Add` and an `Rm` of the same tuple in one call.
fn validate(updates: &[Update]) -> Result<(), ShoalProllyTreeError> {
    for update in updates {
        if let Update::Add(entry) = update {
            if entry.hash.len() < BOUNDARY_WINDOW {
                return Err(ShoalProllyTreeError::InvalidUpdates(format!(
                    "entry hash is {} bytes, expected at least {}",
                    entry.hash.len(),
                    BOUNDARY_WINDOW
                )));
            }
        }
    }
    for pair in updates.windows(2) {
        if pair[0].tuple_ref() >= pair[1].tuple_ref() {
            return Err(ShoalProllyTreeError::InvalidUpdates(
                "updates must be strictly ascending by tuple, without duplicates".into(),
            ));
        }
    }
    Ok(())
}

/// The outcome of rebuilding one bucket.
struct Rebuild {
    /// Buckets sealed by this rebuild, in tuple order
    emitted: Vec<Bucket>,
    /// Entries past the final boundary, carried into the next sibling
    leftovers: Vec<Entry>,
    /// Entry-level changes, in tuple order
    nodes: Vec<NodeDiff>,
    /// Whether the rebuild produced anything other than the bucket itself
    changed: bool,
}

/// Merge carried-over entries, the bucket's own entries and a slice of
/// updates into one ordered run, then re-chunk the run through the
/// boundary predicate. Only the head bucket of a level may finish with
/// a trailing, boundary-less bucket; elsewhere the trailing entries are
/// returned as leftovers.
fn update_bucket<C, H>(
    bucket: &Bucket,
    leftovers: Vec<Entry>,
    updates: Vec<Update>,
    is_head: bool,
) -> Result<Rebuild, ShoalProllyTreeError>
where
    C: BucketCodec,
    H: Hasher,
{
    let prefix = bucket.prefix().clone();
    let level = prefix.level;

    let mut source = leftovers;
    source.extend_from_slice(bucket.entries());

    let mut merged: Vec<Entry> = Vec::with_capacity(source.len() + updates.len());
    let mut nodes: Vec<NodeDiff> = Vec::new();
    let mut updates = updates.into_iter().peekable();

    'entries: for entry in source {
        loop {
            let Some(update) = updates.peek() else {
                merged.push(entry);
                continue 'entries;
            };
            match update.tuple_ref().cmp(&entry.tuple_ref()) {
                std::cmp::Ordering::Less => {
                    if let Some(Update::Add(added)) = updates.next() {
                        nodes.push((None, Some(added.clone())));
                        merged.push(added);
                    }
                }
                std::cmp::Ordering::Equal => {
                    match updates.next() {
                        Some(Update::Add(added)) => {
                            if added.message == entry.message {
                                merged.push(entry);
                            } else {
                                nodes.push((Some(entry), Some(added.clone())));
                                merged.push(added);
                            }
                        }
                        Some(Update::Rm(_)) => {
                            nodes.push((Some(entry), None));
                        }
                        None => merged.push(entry),
                    }
                    continue 'entries;
                }
                std::cmp::Ordering::Greater => {
                    merged.push(entry);
                    continue 'entries;
                }
            }
        }
    }
    for update in updates {
        if let Update::Add(added) = update {
            nodes.push((None, Some(added.clone())));
            merged.push(added);
        }
    }

    let mut emitted: Vec<Bucket> = Vec::new();
    let mut run: Vec<Entry> = Vec::new();
    for entry in merged {
        let closes = is_boundary(prefix.average, level, &entry);
        run.push(entry);
        if closes {
            emitted.push(Bucket::seal::<C, H>(prefix.clone(), std::mem::take(&mut run))?);
        }
    }

    let mut leftovers = run;
    if is_head {
        if !leftovers.is_empty() {
            emitted.push(Bucket::seal::<C, H>(
                prefix.clone(),
                std::mem::take(&mut leftovers),
            )?);
        } else if emitted.is_empty() && level == 0 {
            // The head of the leaf level must close even when nothing
            // is left; the canonical empty tree is one empty bucket.
            emitted.push(Bucket::seal::<C, H>(prefix.clone(), Vec::new())?);
        }
    }

    let changed =
        !(leftovers.is_empty() && emitted.len() == 1 && emitted[0].digest() == bucket.digest());

    Ok(Rebuild {
        emitted,
        leftovers,
        nodes,
        changed,
    })
}

/// Apply an ordered batch of updates to the tree rooted in `root_slot`,
/// yielding [`TreeDiff`] segments as new buckets are sealed.
///
/// The engine drives a cursor over the old tree bottom-up: it splices
/// updates into the leaf level, turns each sealed bucket's boundary
/// into an update one level higher, and repeats until a single bucket
/// covers a level end to end. Only then is the new root committed to
/// `root_slot`; dropping the stream mid-way leaves the tree untouched.
pub(crate) fn mutation_stream<'a, C, H, S>(
    store: &'a S,
    root_slot: &'a mut Bucket,
    batch: Vec<Update>,
) -> impl Stream<Item = Result<TreeDiff, ShoalProllyTreeError>> + 'a
where
    C: BucketCodec,
    H: Hasher,
    S: BlockStore,
{
    try_stream! {
        if batch.is_empty() {
            return;
        }
        validate(&batch)?;

        let root = root_slot.clone();
        let root_level = root.level();
        let base_prefix = root.prefix().clone();
        let mut cursor = Cursor::<C, H, S>::new(store, root.clone());

        // Updates ordered by (level, tuple); rounds always consume the
        // lowest live level, so levels are processed strictly upward.
        let mut queue: BTreeMap<(u32, Tuple), Update> = batch
            .into_iter()
            .map(|update| ((0, update.tuple()), update))
            .collect();
        let mut leftovers: Vec<Entry> = Vec::new();
        let mut current_level = 0u32;
        let mut first_on_level = true;
        let mut visited_tail = false;
        let mut visited_head = false;
        let mut buckets_on_level = 0usize;
        let mut last_emitted: Option<Bucket> = None;
        let mut pending_nodes: Vec<NodeDiff> = Vec::new();
        let mut pending_buckets: Vec<BucketDiff> = Vec::new();
        let mut new_root: Option<Bucket> = None;

        while new_root.is_none() {
            let level = if leftovers.is_empty() {
                match queue.keys().next() {
                    Some((level, _)) => *level,
                    None => break,
                }
            } else {
                current_level
            };

            if level != current_level {
                current_level = level;
                first_on_level = true;
                visited_tail = false;
                visited_head = false;
                buckets_on_level = 0;
                last_emitted = None;
            }

            tracing::trace!(
                level,
                pending = queue.len(),
                leftovers = leftovers.len(),
                "rebuild round"
            );

            let (updatee, is_head, synthetic) = if level > root_level {
                // The tree is growing: there is no bucket to rebuild at
                // this level yet.
                let empty = Bucket::seal::<C, H>(base_prefix.at_level(level), Vec::new())?;
                (empty, true, true)
            } else {
                if leftovers.is_empty() {
                    let target = match queue.keys().next() {
                        Some((_, tuple)) => tuple.clone(),
                        None => break,
                    };
                    if first_on_level {
                        // The previous level left the cursor far to the
                        // right of this level's first update; re-aim
                        // from the root.
                        cursor.jump_to(&target, level).await?;
                    } else {
                        cursor.next_tuple(&target, level).await?;
                    }
                } else {
                    cursor.next_bucket(level).await?;
                }
                ensure_positioned(&cursor)?;
                (cursor.current_bucket().clone(), cursor.is_at_head(), false)
            };

            if synthetic {
                visited_tail = true;
                visited_head = true;
            } else {
                if first_on_level && cursor.is_at_tail() {
                    visited_tail = true;
                }
                if is_head {
                    visited_head = true;
                }
            }
            first_on_level = false;

            // The slice of updates that fall inside this bucket: same
            // level, tuple within the boundary (or everything left at
            // this level once we are at the head).
            let boundary = updatee.boundary().map(|entry| entry.tuple());
            let mut round_updates = Vec::new();
            loop {
                let Some(key) = queue.keys().next().cloned() else {
                    break;
                };
                if key.0 != level {
                    break;
                }
                let within = is_head
                    || match &boundary {
                        Some(boundary) => key.1 <= *boundary,
                        None => true,
                    };
                if !within {
                    break;
                }
                if let Some(update) = queue.remove(&key) {
                    round_updates.push(update);
                }
            }

            let incoming = std::mem::take(&mut leftovers);
            let rebuild = update_bucket::<C, H>(&updatee, incoming, round_updates, is_head)?;
            leftovers = rebuild.leftovers;
            buckets_on_level += rebuild.emitted.len();

            for bucket in &rebuild.emitted {
                store.put(bucket.cid(), bucket.bytes().to_vec()).await?;
            }

            if level == 0 {
                pending_nodes.extend(rebuild.nodes);
            }
            if !synthetic {
                pending_buckets.push((Some(updatee.clone()), None));
            }
            for bucket in &rebuild.emitted {
                pending_buckets.push((None, Some(bucket.clone())));
            }

            // Each sealed bucket becomes an insertion one level up; the
            // bucket we consumed becomes a removal there, unless the
            // rebuild reproduced it exactly.
            for bucket in &rebuild.emitted {
                if let Some(parent) = bucket.parent_entry() {
                    queue.insert((level + 1, parent.tuple()), Update::Add(parent));
                }
            }
            if !synthetic && rebuild.changed {
                if let Some(parent) = updatee.parent_entry() {
                    let tuple = parent.tuple();
                    queue
                        .entry((level + 1, tuple.clone()))
                        .or_insert(Update::Rm(tuple));
                }
            }

            if let Some(bucket) = rebuild.emitted.last() {
                last_emitted = Some(bucket.clone());
            }

            if !rebuild.emitted.is_empty() {
                let nodes = if is_head {
                    std::mem::take(&mut pending_nodes)
                } else {
                    match rebuild.emitted.last().and_then(|bucket| bucket.boundary()) {
                        Some(limit) => split_nodes(&mut pending_nodes, &limit.tuple()),
                        None => std::mem::take(&mut pending_nodes),
                    }
                };
                let segment = TreeDiff {
                    nodes,
                    buckets: drain_bucket_diffs(&mut pending_buckets),
                };
                if !segment.is_empty() {
                    yield segment;
                }
            }

            if buckets_on_level == 1 && leftovers.is_empty() && visited_tail && visited_head {
                new_root = last_emitted.clone();
            }
        }

        let mut new_root = new_root.ok_or(ShoalProllyTreeError::NoNewRoot)?;

        let mut tail_segment = TreeDiff {
            nodes: std::mem::take(&mut pending_nodes),
            buckets: drain_bucket_diffs(&mut pending_buckets),
        };

        // A fresh build stops the moment a level fits in one bucket, so
        // a canonical root never holds a single link entry. A rebuild
        // can still end on one when the remainder of the level below
        // was never visited; collapse such chains onto their child.
        while new_root.level() > 0 && new_root.len() == 1 {
            let link = &new_root.entries()[0];
            let digest: Digest = link.message.as_slice().try_into().map_err(|_| {
                ShoalProllyTreeError::UnexpectedTreeShape(
                    "link message is not a bucket digest".into(),
                )
            })?;
            let prefix = new_root.prefix().at_level(new_root.level() - 1);
            let child = load_bucket::<C, H, S>(store, digest, &prefix).await?;
            tail_segment.buckets.push((Some(new_root), None));
            new_root = child;
        }

        tracing::debug!(
            level = new_root.level(),
            digest = %shoal_storage::display(new_root.digest()),
            "mutation produced a new root"
        );
        // When the tree shrank, the old root path above the new root is
        // no longer referenced by anything.
        if new_root.level() < root_level {
            for bucket in cursor.buckets() {
                if bucket.level() > new_root.level() {
                    tail_segment.buckets.push((Some(bucket), None));
                }
            }
        }
        if !tail_segment.is_empty() {
            yield tail_segment;
        }

        *root_slot = new_root;
    }
}

fn ensure_positioned<C, H, S>(cursor: &Cursor<'_, C, H, S>) -> Result<(), ShoalProllyTreeError>
where
    C: BucketCodec,
    H: Hasher,
    S: BlockStore,
{
    if cursor.done() {
        return Err(ShoalProllyTreeError::UnexpectedTreeShape(
            "cursor ran past the head mid-rebuild".into(),
        ));
    }
    Ok(())
}

/// Drain the pending node diffs up to and including `limit`.
fn split_nodes(pending: &mut Vec<NodeDiff>, limit: &Tuple) -> Vec<NodeDiff> {
    let limit = limit.to_ref();
    let index = pending.partition_point(|diff| match node_tuple(diff) {
        Some(tuple) => tuple <= limit,
        None => false,
    });
    pending.drain(..index).collect()
}

fn node_tuple(diff: &NodeDiff) -> Option<TupleRef<'_>> {
    diff.0
        .as_ref()
        .or(diff.1.as_ref())
        .map(|entry| entry.tuple_ref())
}

/// Drain the pending bucket diffs, cancelling removal/addition pairs
/// with equal digests: a rebuild that reproduces a bucket byte for byte
/// is not a change.
fn drain_bucket_diffs(pending: &mut Vec<BucketDiff>) -> Vec<BucketDiff> {
    let drained = std::mem::take(pending);
    let mut keep = vec![true; drained.len()];
    for removal in 0..drained.len() {
        let (Some(removed), None) = &drained[removal] else {
            continue;
        };
        for addition in 0..drained.len() {
            if !keep[addition] || !keep[removal] {
                continue;
            }
            if let (None, Some(added)) = &drained[addition] {
                if added.digest() == removed.digest() {
                    keep[removal] = false;
                    keep[addition] = false;
                }
            }
        }
    }
    drained
        .into_iter()
        .zip(keep)
        .filter_map(|(diff, kept)| kept.then_some(diff))
        .collect()
}
