use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

/// The ordering key of an [`Entry`]: a timestamp, with ties broken by
/// lexicographic comparison of the entry's hash bytes.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tuple {
    /// The timestamp component of the key
    pub timestamp: i64,
    /// The hash component of the key
    pub hash: Vec<u8>,
}

impl Tuple {
    /// Create a new [`Tuple`].
    pub fn new(timestamp: i64, hash: Vec<u8>) -> Self {
        Tuple { timestamp, hash }
    }

    /// The smallest possible [`Tuple`]; orders before every entry.
    pub(crate) fn origin() -> Self {
        Tuple {
            timestamp: i64::MIN,
            hash: Vec::new(),
        }
    }

    pub(crate) fn to_ref(&self) -> TupleRef<'_> {
        TupleRef {
            timestamp: self.timestamp,
            hash: &self.hash,
        }
    }
}

/// A borrowed view of a [`Tuple`], used for allocation-free comparison
/// between entries, tuples and updates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct TupleRef<'a> {
    timestamp: i64,
    hash: &'a [u8],
}

/// A single item in a tree: the (timestamp, hash) tuple it is ordered
/// by, and a message payload.
///
/// At level 0 the message is caller data. At every level above, the
/// message is the digest of the child bucket the entry points down to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "EntryRepr", into = "EntryRepr")]
pub struct Entry {
    /// The timestamp component of this entry's tuple
    pub timestamp: i64,
    /// The hash component of this entry's tuple
    pub hash: Vec<u8>,
    /// The payload (or, above level 0, a child bucket digest)
    pub message: Vec<u8>,
}

impl Entry {
    /// Create a new [`Entry`].
    pub fn new(timestamp: i64, hash: Vec<u8>, message: Vec<u8>) -> Self {
        Entry {
            timestamp,
            hash,
            message,
        }
    }

    /// The ordering key of this entry.
    pub fn tuple(&self) -> Tuple {
        Tuple {
            timestamp: self.timestamp,
            hash: self.hash.clone(),
        }
    }

    pub(crate) fn tuple_ref(&self) -> TupleRef<'_> {
        TupleRef {
            timestamp: self.timestamp,
            hash: &self.hash,
        }
    }
}

/// Wire shape of an [`Entry`]: a three element array.
#[derive(Serialize, Deserialize)]
struct EntryRepr(i64, ByteBuf, ByteBuf);

impl From<EntryRepr> for Entry {
    fn from(EntryRepr(timestamp, hash, message): EntryRepr) -> Self {
        Entry {
            timestamp,
            hash: hash.into_vec(),
            message: message.into_vec(),
        }
    }
}

impl From<Entry> for EntryRepr {
    fn from(entry: Entry) -> Self {
        EntryRepr(
            entry.timestamp,
            ByteBuf::from(entry.hash),
            ByteBuf::from(entry.message),
        )
    }
}
