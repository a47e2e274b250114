//! Zero-sized hash builder for the graph's edge sets.
//!
//! Keys are arena handles, never user input, so a fixed seed is fine.

use std::hash::BuildHasher;

use foldhash::fast::{FixedState, FoldHasher};

/// Seed shared by every [`FastHashBuilder`].
const SEED: u64 = 0x9e37_79b9_7f4a_7c15;

/// A zero-sized `BuildHasher` backed by foldhash with a fixed seed.
#[derive(Clone, Copy, Debug, Default)]
pub struct FastHashBuilder;

impl BuildHasher for FastHashBuilder {
    type Hasher = FoldHasher<'static>;

    #[inline]
    fn build_hasher(&self) -> Self::Hasher {
        FixedState::with_seed(SEED).build_hasher()
    }
}

/// Insertion-ordered set used for both directions of every graph edge.
pub type EdgeSet<K> = indexmap::IndexSet<K, FastHashBuilder>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_is_zero_sized() {
        assert_eq!(std::mem::size_of::<FastHashBuilder>(), 0);
    }

    #[test]
    fn builders_agree_on_hashes() {
        assert_eq!(FastHashBuilder.hash_one(42u64), FastHashBuilder.hash_one(42u64));
    }

    #[test]
    fn edge_set_keeps_insertion_order() {
        let mut set: EdgeSet<u32> = EdgeSet::default();
        for value in [7, 3, 9, 3, 1] {
            set.insert(value);
        }
        assert_eq!(set.iter().copied().collect::<Vec<_>>(), vec![7, 3, 9, 1]);
    }
}
