use base58::ToBase58;

use crate::ConditionalSync;

/// The fixed-size digest produced by a [`Hasher`] over a block's bytes.
pub type Digest = [u8; 32];

/// Abbreviated base58 rendering of a digest, for logs and errors.
pub fn display(digest: &Digest) -> String {
    format!("#{}...", digest[0..6].to_base58())
}

/// A synchronous digest function over block bytes.
///
/// The `ID` is a multicodec-style identifier that travels with every
/// block reference, so that two peers can detect a hasher mismatch
/// before comparing digests.
pub trait Hasher: Clone + ConditionalSync + 'static {
    /// Identifier persisted alongside every digest produced by this hasher
    const ID: u64;

    /// Hash the given bytes
    fn digest(bytes: &[u8]) -> Digest;
}

/// The default [`Hasher`]: BLAKE3, identified by its multicodec code.
#[derive(Clone, Debug)]
pub struct Blake3Hasher;

impl Hasher for Blake3Hasher {
    const ID: u64 = 0x1e;

    fn digest(bytes: &[u8]) -> Digest {
        blake3::hash(bytes).into()
    }
}
