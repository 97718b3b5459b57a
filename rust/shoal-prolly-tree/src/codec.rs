use shoal_storage::ConditionalSync;

use crate::{BOUNDARY_WINDOW, Entry, Prefix, ShoalProllyTreeError};

/// A [`BucketCodec`] converts a bucket's prefix and entries to and from
/// canonical bytes.
///
/// Canonical means exactly one byte sequence per value: `decode` MUST
/// reject bytes that would not re-encode to themselves, because a
/// second encoding of the same bucket would carry a second digest and
/// silently break content addressing.
pub trait BucketCodec: Clone + ConditionalSync + 'static {
    /// Identifier persisted in every bucket prefix produced with this codec
    const ID: u64;

    /// Encode a prefix and its entries into bucket bytes.
    fn encode(prefix: &Prefix, entries: &[Entry]) -> Result<Vec<u8>, ShoalProllyTreeError>;

    /// Decode bucket bytes into a prefix and its entries.
    fn decode(bytes: &[u8]) -> Result<(Prefix, Vec<Entry>), ShoalProllyTreeError>;
}

/// The default [`BucketCodec`]: IPLD-compatible CBOR, identified by the
/// DAG-CBOR multicodec code. A bucket is one CBOR item: the prefix
/// followed by the entry list.
#[derive(Clone, Debug)]
pub struct DagCborCodec;

impl BucketCodec for DagCborCodec {
    const ID: u64 = 0x71;

    fn encode(prefix: &Prefix, entries: &[Entry]) -> Result<Vec<u8>, ShoalProllyTreeError> {
        serde_ipld_dagcbor::to_vec(&(prefix, entries))
            .map_err(|error| ShoalProllyTreeError::EncodeFailed(format!("{error}")))
    }

    fn decode(bytes: &[u8]) -> Result<(Prefix, Vec<Entry>), ShoalProllyTreeError> {
        let (prefix, entries): (Prefix, Vec<Entry>) = serde_ipld_dagcbor::from_slice(bytes)
            .map_err(|error| ShoalProllyTreeError::MalformedBlock(format!("{error}")))?;

        for entry in &entries {
            if entry.hash.len() < BOUNDARY_WINDOW {
                return Err(ShoalProllyTreeError::MalformedBlock(format!(
                    "entry hash is {} bytes, expected at least {}",
                    entry.hash.len(),
                    BOUNDARY_WINDOW
                )));
            }
        }

        let reencoded = Self::encode(&prefix, &entries)?;
        if reencoded != bytes {
            return Err(ShoalProllyTreeError::MalformedBlock(
                "non-canonical encoding".into(),
            ));
        }

        Ok((prefix, entries))
    }
}
