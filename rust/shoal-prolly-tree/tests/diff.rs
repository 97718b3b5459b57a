use anyhow::Result;
use futures_util::TryStreamExt;
use shoal_prolly_tree::{
    DagCborCodec, Entry, NodeDiff, Tree, TreeConfig, TreeDiff, Tuple, Update,
};
use shoal_storage::{Blake3Hasher, Hasher, MeasuredBlockStore, MemoryBlockStore};

type TestTree<S = MemoryBlockStore> = Tree<DagCborCodec, Blake3Hasher, S>;

fn entry(index: u64) -> Entry {
    let hash = Blake3Hasher::digest(&index.to_be_bytes())[..4].to_vec();
    Entry::new(index as i64, hash, index.to_be_bytes().to_vec())
}

fn entries(range: std::ops::Range<u64>) -> Vec<Entry> {
    range.map(entry).collect()
}

async fn tree_of(range: std::ops::Range<u64>) -> Result<TestTree> {
    let mut tree =
        TestTree::empty(MemoryBlockStore::default(), TreeConfig::default()).await?;
    tree.apply(entries(range).into_iter().map(Update::Add).collect())
        .await?;
    Ok(tree)
}

async fn node_diffs<L, R>(left: &TestTree<L>, right: &TestTree<R>) -> Result<Vec<NodeDiff>>
where
    L: shoal_storage::BlockStore,
    R: shoal_storage::BlockStore,
{
    let segments: Vec<TreeDiff> = left.diff(right).try_collect().await?;
    Ok(segments.into_iter().flat_map(|segment| segment.nodes).collect())
}

#[tokio::test]
async fn reports_one_sided_and_shared_windows() -> Result<()> {
    let left = tree_of(0..32).await?;
    let right = tree_of(16..48).await?;

    let nodes = node_diffs(&left, &right).await?;

    let mut expected: Vec<NodeDiff> = Vec::new();
    for entry in entries(0..16) {
        expected.push((Some(entry), None));
    }
    for entry in entries(32..48) {
        expected.push((None, Some(entry)));
    }

    assert_eq!(nodes, expected, "0..16 left only, 16..32 shared, 32..48 right only");

    Ok(())
}

#[tokio::test]
async fn reports_changed_messages_as_pairs() -> Result<()> {
    let left = tree_of(0..32).await?;

    let mut changed = entry(20);
    changed.message = b"rewritten".to_vec();
    let mut right = tree_of(0..32).await?;
    right.insert(changed.clone()).await?;

    let nodes = node_diffs(&left, &right).await?;

    assert_eq!(nodes, vec![(Some(entry(20)), Some(changed))]);

    Ok(())
}

#[tokio::test]
async fn diff_of_equal_trees_is_empty_and_free() -> Result<()> {
    let store = MeasuredBlockStore::new(MemoryBlockStore::default());
    let mut left = TestTree::<_>::empty(store.clone(), TreeConfig::default()).await?;
    left.apply(entries(0..256).into_iter().map(Update::Add).collect())
        .await?;
    let mut right =
        TestTree::empty(MemoryBlockStore::default(), TreeConfig::default()).await?;
    right
        .apply(entries(0..256).into_iter().map(Update::Add).collect())
        .await?;

    assert_eq!(left.digest(), right.digest());

    let reads = store.reads();
    let segments: Vec<TreeDiff> = left.diff(&right).try_collect().await?;

    assert!(segments.is_empty());
    assert_eq!(store.reads(), reads, "equal digests short-circuit the walk");

    Ok(())
}

#[tokio::test]
async fn diff_is_symmetric() -> Result<()> {
    let left = tree_of(0..40).await?;
    let right = tree_of(25..80).await?;

    let forward = node_diffs(&left, &right).await?;
    let backward = node_diffs(&right, &left).await?;

    let swapped: Vec<NodeDiff> = backward
        .into_iter()
        .map(|(left, right)| (right, left))
        .collect();

    assert_eq!(forward, swapped);

    Ok(())
}

#[tokio::test]
async fn diffs_against_the_empty_tree() -> Result<()> {
    let empty = TestTree::empty(MemoryBlockStore::default(), TreeConfig::default()).await?;
    let full = tree_of(0..32).await?;

    let nodes = node_diffs(&empty, &full).await?;
    let expected: Vec<NodeDiff> = entries(0..32)
        .into_iter()
        .map(|entry| (None, Some(entry)))
        .collect();
    assert_eq!(nodes, expected);

    let nodes = node_diffs(&full, &empty).await?;
    let expected: Vec<NodeDiff> = entries(0..32)
        .into_iter()
        .map(|entry| (Some(entry), None))
        .collect();
    assert_eq!(nodes, expected);

    Ok(())
}

#[tokio::test]
async fn applying_a_diff_merges_trees() -> Result<()> {
    let mut left = tree_of(0..32).await?;
    let right = tree_of(16..48).await?;

    let nodes = node_diffs(&left, &right).await?;
    let updates: Vec<Update> = nodes
        .into_iter()
        .map(|diff| match diff {
            (_, Some(theirs)) => Update::Add(theirs),
            (Some(ours), None) => Update::Rm(ours.tuple()),
            (None, None) => unreachable!("empty diff pair"),
        })
        .collect();

    left.apply(updates).await?;

    assert_eq!(left.digest(), right.digest(), "left becomes right byte for byte");

    Ok(())
}

#[tokio::test]
async fn diff_emissions_ascend_by_tuple() -> Result<()> {
    let left = tree_of(0..100).await?;
    let right = tree_of(50..150).await?;

    let nodes = node_diffs(&left, &right).await?;
    let tuples: Vec<Tuple> = nodes
        .iter()
        .map(|(left, right)| {
            left.as_ref()
                .or(right.as_ref())
                .expect("one side is present")
                .tuple()
        })
        .collect();

    let mut sorted = tuples.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(tuples, sorted);

    Ok(())
}
