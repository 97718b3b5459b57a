use serde::{Deserialize, Serialize};
use shoal_storage::{BlockStore, Cid, Digest, Hasher, display};

use crate::{BucketCodec, Entry, ShoalProllyTreeError};

/// The per-tree constants carried by every bucket: the configured
/// average bucket size, the identifiers of the codec and hasher that
/// produced the bucket's bytes and digest, and the bucket's level.
///
/// All buckets of one tree share every field except `level`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PrefixRepr", into = "PrefixRepr")]
pub struct Prefix {
    /// Expected number of entries per bucket at every level
    pub average: u32,
    /// The level of the bucket this prefix belongs to
    pub level: u32,
    /// Identifier of the codec that serializes buckets of this tree
    pub codec: u64,
    /// Identifier of the hasher that digests buckets of this tree
    pub hasher: u64,
}

impl Prefix {
    /// Create a new [`Prefix`] at the given level, taking the codec and
    /// hasher identifiers from the type parameters.
    pub fn new<C, H>(average: u32, level: u32) -> Self
    where
        C: BucketCodec,
        H: Hasher,
    {
        Prefix {
            average,
            level,
            codec: C::ID,
            hasher: H::ID,
        }
    }

    /// This prefix with the level swapped out.
    pub(crate) fn at_level(&self, level: u32) -> Self {
        Prefix {
            level,
            ..self.clone()
        }
    }

    /// The [`Cid`] of a bucket with the given digest under this prefix.
    pub fn cid_for(&self, digest: Digest) -> Cid {
        Cid::new(self.codec, self.hasher, digest)
    }
}

/// Wire shape of a [`Prefix`]: a four element array.
#[derive(Serialize, Deserialize)]
struct PrefixRepr(u32, u32, u64, u64);

impl From<PrefixRepr> for Prefix {
    fn from(PrefixRepr(average, level, codec, hasher): PrefixRepr) -> Self {
        Prefix {
            average,
            level,
            codec,
            hasher,
        }
    }
}

impl From<Prefix> for PrefixRepr {
    fn from(prefix: Prefix) -> Self {
        PrefixRepr(prefix.average, prefix.level, prefix.codec, prefix.hasher)
    }
}

/// An ordered run of entries at a fixed level, sealed into canonical
/// bytes and addressed by their digest.
///
/// A [`Bucket`] is immutable once sealed; mutation always produces new
/// buckets. Equality is digest equality.
#[derive(Clone, Debug)]
pub struct Bucket {
    prefix: Prefix,
    entries: Vec<Entry>,
    bytes: Vec<u8>,
    digest: Digest,
}

impl PartialEq for Bucket {
    fn eq(&self, other: &Self) -> bool {
        self.digest == other.digest
    }
}

impl Eq for Bucket {}

impl Bucket {
    /// Seal entries under a prefix: encode them with the codec and take
    /// the digest of the resulting bytes.
    pub fn seal<C, H>(prefix: Prefix, entries: Vec<Entry>) -> Result<Self, ShoalProllyTreeError>
    where
        C: BucketCodec,
        H: Hasher,
    {
        let bytes = C::encode(&prefix, &entries)?;
        let digest = H::digest(&bytes);
        Ok(Bucket {
            prefix,
            entries,
            bytes,
            digest,
        })
    }

    /// Assemble a bucket from parts that have already been verified
    /// against each other.
    pub(crate) fn assemble(
        prefix: Prefix,
        entries: Vec<Entry>,
        bytes: Vec<u8>,
        digest: Digest,
    ) -> Self {
        Bucket {
            prefix,
            entries,
            bytes,
            digest,
        }
    }

    /// The [`Prefix`] shared by this bucket's bytes.
    pub fn prefix(&self) -> &Prefix {
        &self.prefix
    }

    /// The level this bucket sits at; 0 is the leaf level.
    pub fn level(&self) -> u32 {
        self.prefix.level
    }

    /// The ordered entries of this bucket.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// The canonical serialized form of this bucket.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The digest of this bucket's bytes.
    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    /// The content identifier this bucket is stored under.
    pub fn cid(&self) -> Cid {
        self.prefix.cid_for(self.digest)
    }

    /// Whether this bucket holds no entries. Only the root of an empty
    /// tree may be empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The number of entries in this bucket.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// The first entry of this bucket.
    pub(crate) fn first(&self) -> Option<&Entry> {
        self.entries.first()
    }

    /// The boundary entry of this bucket: its last entry, or `None`
    /// when the bucket is empty.
    pub fn boundary(&self) -> Option<&Entry> {
        self.entries.last()
    }

    /// The entry this bucket contributes one level up: the boundary
    /// tuple with this bucket's digest as the message.
    pub fn parent_entry(&self) -> Option<Entry> {
        self.boundary()
            .map(|entry| Entry::new(entry.timestamp, entry.hash.clone(), self.digest.to_vec()))
    }
}

pub(crate) fn validate_entry_order(entries: &[Entry]) -> Result<(), ShoalProllyTreeError> {
    for pair in entries.windows(2) {
        if pair[0].tuple_ref() >= pair[1].tuple_ref() {
            return Err(ShoalProllyTreeError::UnexpectedTreeShape(
                "bucket entries are not strictly ascending".into(),
            ));
        }
    }
    Ok(())
}

/// Fetch the bucket with the given digest, verifying it end to end: the
/// bytes must hash back to the digest, decode canonically, carry the
/// expected prefix and hold strictly ascending entries.
///
/// The digest check runs before anything interprets the bytes, so a
/// tampered block always surfaces as [`ShoalProllyTreeError::DigestMismatch`].
pub async fn load_bucket<C, H, S>(
    store: &S,
    digest: Digest,
    expected: &Prefix,
) -> Result<Bucket, ShoalProllyTreeError>
where
    C: BucketCodec,
    H: Hasher,
    S: BlockStore,
{
    let cid = expected.cid_for(digest);
    let Some(bytes) = store.get(&cid).await? else {
        return Err(ShoalProllyTreeError::MissingBlock(format!("{cid}")));
    };

    let actual = H::digest(&bytes);
    if actual != digest {
        return Err(ShoalProllyTreeError::DigestMismatch(format!(
            "requested {} but bytes hash to {}",
            display(&digest),
            display(&actual)
        )));
    }

    let (prefix, entries) = C::decode(&bytes)?;

    if prefix != *expected {
        if prefix.level != expected.level {
            return Err(ShoalProllyTreeError::LevelMismatch(format!(
                "expected level {} but found {}",
                expected.level, prefix.level
            )));
        }
        return Err(ShoalProllyTreeError::PrefixMismatch(format!(
            "expected {expected:?} but found {prefix:?}"
        )));
    }

    validate_entry_order(&entries)?;

    Ok(Bucket::assemble(prefix, entries, bytes, digest))
}
