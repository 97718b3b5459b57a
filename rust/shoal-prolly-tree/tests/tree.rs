use anyhow::Result;
use shoal_prolly_tree::{
    DagCborCodec, Entry, ShoalProllyTreeError, Tree, TreeConfig, Tuple, Update,
};
use shoal_storage::{Blake3Hasher, BlockStore, Hasher, MeasuredBlockStore, MemoryBlockStore};

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

#[tokio::test]
async fn creates_the_canonical_empty_tree() -> Result<()> {
    let tree = TestTree::empty(MemoryBlockStore::default(), TreeConfig::default()).await?;
    let other = TestTree::empty(MemoryBlockStore::default(), TreeConfig::default()).await?;

    assert_eq!(tree.root().level(), 0);
    assert!(tree.root().is_empty());
    assert_eq!(tree.digest(), other.digest(), "empty trees agree on a digest");

    assert_eq!(tree.get(&Tuple::new(42, vec![0, 0, 0, 7])).await?, None);

    Ok(())
}

#[tokio::test]
async fn single_insert_stays_a_single_bucket() -> Result<()> {
    let mut tree = TestTree::empty(MemoryBlockStore::default(), TreeConfig::default()).await?;
    // The zero hash closes the first bucket immediately.
    let single = Entry::new(0, vec![0, 0, 0, 0], b"hi".to_vec());

    tree.insert(single.clone()).await?;

    assert_eq!(tree.root().level(), 0);
    assert_eq!(tree.root().entries(), &[single.clone()]);
    let digest = *tree.digest();

    tree.insert(single.clone()).await?;
    assert_eq!(
        *tree.digest(),
        digest,
        "reinserting the same entry is a no-op"
    );

    assert_eq!(tree.get(&single.tuple()).await?, Some(single));

    Ok(())
}

#[tokio::test]
async fn insertion_order_is_irrelevant() -> Result<()> {
    use rand::seq::SliceRandom;

    let batched = tree_of(0..64).await?;

    let mut shuffled = entries(0..64);
    shuffled.shuffle(&mut rand::thread_rng());

    let mut tree = TestTree::empty(MemoryBlockStore::default(), TreeConfig::default()).await?;
    for entry in shuffled {
        tree.insert(entry).await?;
    }

    assert_eq!(
        tree.digest(),
        batched.digest(),
        "alternate insertion order results in same digest"
    );

    for entry in entries(0..64) {
        assert_eq!(tree.get(&entry.tuple()).await?, Some(entry));
    }

    Ok(())
}

#[tokio::test]
async fn larger_trees_grow_levels() -> Result<()> {
    let tree = tree_of(0..512).await?;

    assert!(tree.root().level() >= 1, "512 entries split into levels");

    for entry in entries(0..512) {
        assert_eq!(tree.get(&entry.tuple()).await?, Some(entry));
    }
    assert_eq!(tree.get(&entry(512).tuple()).await?, None);

    Ok(())
}

#[tokio::test]
async fn removing_everything_restores_the_empty_tree() -> Result<()> {
    let empty = TestTree::empty(MemoryBlockStore::default(), TreeConfig::default()).await?;

    let mut tree = tree_of(0..64).await?;
    tree.apply(
        entries(0..64)
            .into_iter()
            .map(|entry| Update::Rm(entry.tuple()))
            .collect(),
    )
    .await?;

    assert_eq!(tree.digest(), empty.digest());
    assert!(tree.root().is_empty());

    Ok(())
}

#[tokio::test]
async fn removing_one_by_one_restores_the_empty_tree() -> Result<()> {
    use rand::seq::SliceRandom;

    let empty = TestTree::empty(MemoryBlockStore::default(), TreeConfig::default()).await?;

    let mut tree = tree_of(0..64).await?;
    let mut victims = entries(0..64);
    victims.shuffle(&mut rand::thread_rng());
    for victim in victims {
        tree.remove(&victim.tuple()).await?;
    }

    assert_eq!(tree.digest(), empty.digest());

    Ok(())
}

#[tokio::test]
async fn one_entry_changes_the_root_digest() -> Result<()> {
    let mut tree = tree_of(0..32).await?;
    let baseline = *tree.digest();

    let mut changed = entry(5);
    changed.message = b"rewritten".to_vec();
    tree.insert(changed).await?;

    assert_ne!(*tree.digest(), baseline);

    // Restoring the original message restores the original digest.
    tree.insert(entry(5)).await?;
    assert_eq!(*tree.digest(), baseline);

    Ok(())
}

#[tokio::test]
async fn restores_tree_from_digest() -> Result<()> {
    let store = MemoryBlockStore::default();
    let mut tree = TestTree::empty(store.clone(), TreeConfig::default()).await?;
    tree.apply(entries(0..64).into_iter().map(Update::Add).collect())
        .await?;
    let digest = *tree.digest();

    let restored = TestTree::from_digest(store, digest, TreeConfig::default()).await?;

    assert_eq!(restored.digest(), tree.digest());
    for entry in entries(0..64) {
        assert_eq!(restored.get(&entry.tuple()).await?, Some(entry));
    }

    Ok(())
}

#[tokio::test]
async fn rejects_mismatched_configuration_on_rehydration() -> Result<()> {
    let store = MemoryBlockStore::default();
    let tree = TestTree::empty(store.clone(), TreeConfig::default()).await?;
    let digest = *tree.digest();

    let result = TestTree::from_digest(
        store,
        digest,
        TreeConfig {
            average_bucket_size: 16,
        },
    )
    .await;

    assert!(matches!(
        result,
        Err(ShoalProllyTreeError::PrefixMismatch(_))
    ));

    Ok(())
}

#[tokio::test]
async fn detects_corrupted_buckets() -> Result<()> {
    let store = MemoryBlockStore::default();
    let mut tree = TestTree::empty(store.clone(), TreeConfig::default()).await?;
    tree.apply(entries(0..512).into_iter().map(Update::Add).collect())
        .await?;
    assert!(tree.root().level() >= 1);
    let root_digest = *tree.digest();

    // Find the leaf bucket holding the first entry and flip one of its
    // stored bytes.
    let target = entry(0).tuple();
    let mut cursor = tree.cursor();
    cursor.jump_to(&target, 0).await?;
    let leaf = cursor.current_bucket().clone();
    assert!(leaf.level() < tree.root().level());

    let mut tampered = leaf.bytes().to_vec();
    let mid = tampered.len() / 2;
    tampered[mid] ^= 0xff;
    store.put(leaf.cid(), tampered).await?;

    let result = tree.get(&target).await;
    assert!(matches!(
        result,
        Err(ShoalProllyTreeError::DigestMismatch(_))
    ));

    assert_eq!(*tree.digest(), root_digest, "the root slot is untouched");

    Ok(())
}

#[tokio::test]
async fn internal_entries_link_their_children() -> Result<()> {
    let tree = tree_of(0..512).await?;
    assert!(tree.root().level() >= 1);

    let mut cursor = tree.cursor();
    cursor.jump_to(&entry(0).tuple(), 0).await?;
    loop {
        let path: Vec<_> = cursor.buckets().into_iter().collect();
        for pair in path.windows(2) {
            let (parent, child) = (&pair[0], &pair[1]);
            let link = parent
                .entries()
                .iter()
                .find(|entry| entry.message.as_slice() == child.digest().as_slice())
                .expect("every bucket on the path is linked by its parent");
            let boundary = child.boundary().expect("non-root buckets are never empty");
            assert_eq!(
                (link.timestamp, &link.hash),
                (boundary.timestamp, &boundary.hash),
                "links carry the child's boundary tuple"
            );
            for entry in child.entries() {
                assert!(entry.tuple() <= link.tuple());
            }
        }
        cursor.next_bucket(0).await?;
        if cursor.done() {
            break;
        }
    }

    Ok(())
}

#[tokio::test]
async fn rejects_unordered_batches() -> Result<()> {
    let mut tree = TestTree::empty(MemoryBlockStore::default(), TreeConfig::default()).await?;
    let baseline = *tree.digest();

    let result = tree
        .apply(vec![
            Update::Add(entry(2)),
            Update::Add(entry(1)),
        ])
        .await;
    assert!(matches!(
        result,
        Err(ShoalProllyTreeError::InvalidUpdates(_))
    ));

    let result = tree
        .apply(vec![
            Update::Add(entry(1)),
            Update::Rm(entry(1).tuple()),
        ])
        .await;
    assert!(matches!(
        result,
        Err(ShoalProllyTreeError::InvalidUpdates(_))
    ));

    assert_eq!(*tree.digest(), baseline, "failed batches change nothing");

    Ok(())
}

#[tokio::test]
async fn single_bucket_lookups_read_nothing() -> Result<()> {
    let store = MeasuredBlockStore::new(MemoryBlockStore::default());
    let mut tree = TestTree::<_>::empty(store.clone(), TreeConfig::default()).await?;
    assert_eq!(store.writes(), 1); // the empty root

    tree.insert(Entry::new(0, vec![0, 0, 0, 0], b"hi".to_vec()))
        .await?;
    assert_eq!(store.writes(), 2); // one new bucket

    let reads = store.reads();
    let _ = tree.get(&Tuple::new(0, vec![0, 0, 0, 0])).await?;
    assert_eq!(store.reads(), reads, "the root bucket is held in memory");

    Ok(())
}

#[tokio::test]
async fn mutation_reports_node_diffs() -> Result<()> {
    let mut tree = TestTree::empty(MemoryBlockStore::default(), TreeConfig::default()).await?;

    let diff = tree
        .apply(entries(0..4).into_iter().map(Update::Add).collect())
        .await?;
    let added: Vec<_> = diff
        .nodes
        .iter()
        .map(|(before, after)| {
            assert!(before.is_none());
            after.clone().unwrap()
        })
        .collect();
    assert_eq!(added, entries(0..4));

    let diff = tree.apply(vec![Update::Rm(entry(2).tuple())]).await?;
    assert_eq!(diff.nodes, vec![(Some(entry(2)), None)]);

    // Removing an absent tuple reports nothing.
    let diff = tree.apply(vec![Update::Rm(entry(17).tuple())]).await?;
    assert!(diff.nodes.is_empty());
    assert!(diff.buckets.is_empty());

    Ok(())
}
