//! Deterministic chunk boundary decisions.
//!
//! Whether an entry closes its bucket is a pure function of the entry's
//! hash bytes, the bucket's level and the tree's configured average
//! bucket size. Identical contents therefore chunk identically on every
//! peer, which is the property the whole tree stands on. The scheme is
//! part of the wire format: changing it changes every tree shape.

use crate::Entry;

/// Number of leading hash bytes the predicate reads. Entries with
/// shorter hashes are rejected before they ever reach the predicate.
pub(crate) const BOUNDARY_WINDOW: usize = 4;

/// Whether `entry` closes a bucket at `level` in a tree with the given
/// average bucket size.
///
/// The first four bytes of the entry's hash are read as a big-endian
/// word, salted with the level and stirred through a 32-bit finalizer;
/// roughly `1/average` of entries qualify. The finalizer matters: at
/// levels above 0 every candidate hash already sits below the level-0
/// threshold, and without the stir no such word could ever pass a
/// salted comparison again, capping trees at two levels.
pub fn is_boundary(average: u32, level: u32, entry: &Entry) -> bool {
    let Some(window) = entry.hash.first_chunk::<BOUNDARY_WINDOW>() else {
        return false;
    };
    mix(u32::from_be_bytes(*window) ^ level_salt(level)) < threshold(average)
}

fn threshold(average: u32) -> u32 {
    u32::MAX / average.max(1)
}

fn level_salt(level: u32) -> u32 {
    level.wrapping_mul(0x9e37_79b9)
}

/// 32-bit avalanche finalizer (the murmur3 fmix32 routine). Maps 0 to 0
/// and spreads everything else uniformly across the word.
fn mix(value: u32) -> u32 {
    let mut word = value;
    word ^= word >> 16;
    word = word.wrapping_mul(0x85eb_ca6b);
    word ^= word >> 13;
    word = word.wrapping_mul(0xc2b2_ae35);
    word ^= word >> 16;
    word
}

#[cfg(test)]
mod tests {
    use rand::{Rng, thread_rng as rng};

    use super::*;

    fn entry_with_hash(hash: Vec<u8>) -> Entry {
        Entry::new(0, hash, Vec::new())
    }

    fn random_entry() -> Entry {
        let mut buffer = [0u8; 4];
        rng().fill(&mut buffer);
        entry_with_hash(buffer.to_vec())
    }

    #[test]
    fn it_has_expected_hit_rate() {
        let average = 30u32;
        let rounds = 500_000;

        let mut hits = 0u32;
        for _ in 0..rounds {
            if is_boundary(average, 0, &random_entry()) {
                hits += 1;
            }
        }
        let rate = f64::from(hits) / f64::from(rounds);
        let expected = 1.0 / f64::from(average);

        assert!((rate - expected).abs() < 0.005);
    }

    #[test]
    fn it_treats_the_zero_hash_as_a_level_zero_boundary() {
        assert!(is_boundary(30, 0, &entry_with_hash(vec![0, 0, 0, 0])));
    }

    #[test]
    fn it_salts_decisions_by_level() {
        let mut disagreements = 0;
        for _ in 0..10_000 {
            let entry = random_entry();
            if is_boundary(30, 0, &entry) != is_boundary(30, 1, &entry) {
                disagreements += 1;
            }
        }
        assert!(disagreements > 0);
    }

    #[test]
    fn it_lets_boundaries_chain_across_levels() {
        // Entries that close buckets at level 0 are the only hashes
        // that ever surface at level 1; some of them must close
        // buckets there too or no tree could grow past two levels.
        let mut level_zero = 0;
        let mut both = 0;
        for _ in 0..500_000 {
            let entry = random_entry();
            if is_boundary(30, 0, &entry) {
                level_zero += 1;
                if is_boundary(30, 1, &entry) {
                    both += 1;
                }
            }
        }
        assert!(level_zero > 0);
        assert!(both > 0);
    }

    #[test]
    fn it_rejects_short_hashes() {
        assert!(!is_boundary(30, 0, &entry_with_hash(vec![0, 0, 0])));
        assert!(!is_boundary(30, 0, &entry_with_hash(Vec::new())));
    }

    #[test]
    fn it_is_deterministic() {
        for _ in 0..1000 {
            let entry = random_entry();
            assert_eq!(
                is_boundary(30, 3, &entry),
                is_boundary(30, 3, &entry.clone())
            );
        }
    }
}
