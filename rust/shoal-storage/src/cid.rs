use std::fmt::Display;

use base58::ToBase58;
use serde::{Deserialize, Serialize};

use crate::Digest;

/// A content identifier: a digest qualified by the codec that produced
/// the block's bytes and the hasher that produced the digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cid {
    codec: u64,
    hasher: u64,
    digest: Digest,
}

impl Cid {
    /// Create a new [`Cid`].
    pub fn new(codec: u64, hasher: u64, digest: Digest) -> Self {
        Cid {
            codec,
            hasher,
            digest,
        }
    }

    /// The codec identifier for the referenced block's bytes.
    pub fn codec(&self) -> u64 {
        self.codec
    }

    /// The hasher identifier for this [`Cid`]'s digest.
    pub fn hasher(&self) -> u64 {
        self.hasher
    }

    /// The digest of the referenced block's bytes.
    pub fn digest(&self) -> &Digest {
        &self.digest
    }
}

impl Display for Cid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:#x}:{:#x}:#{}",
            self.codec,
            self.hasher,
            self.digest.to_base58()
        )
    }
}
