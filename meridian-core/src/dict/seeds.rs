use siphasher::sip::SipHasher13;
use std::hash::{BuildHasher, Hasher};

/// Explicit hash seed pair, replacing what the original keeps as a pair of process-global
/// seeds. Passed to [`crate::dict::Dict::with_hasher`] so callers (and tests) get
/// reproducible, non-global hashing.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct HashSeeds {
    pub k0: u64,
    pub k1: u64,
}

impl HashSeeds {
    pub fn new(k0: u64, k1: u64) -> Self {
        HashSeeds { k0, k1 }
    }
}

impl Default for HashSeeds {
    /// Fixed, non-random default so dict construction without an explicit seed is still
    /// deterministic across a process's lifetime (and across test runs).
    fn default() -> Self {
        HashSeeds { k0: 0x5bd1_e995, k1: 0x9e37_79b9 }
    }
}

impl BuildHasher for HashSeeds {
    type Hasher = SipHasher13;

    fn build_hasher(&self) -> SipHasher13 {
        SipHasher13::new_with_keys(self.k0, self.k1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeds_are_deterministic() {
        let seeds = HashSeeds::new(1, 2);
        let mut a = seeds.build_hasher();
        let mut b = seeds.build_hasher();
        a.write(b"same input");
        b.write(b"same input");
        assert_eq!(a.finish(), b.finish());
    }

    #[test]
    fn test_different_seeds_diverge() {
        let mut a = HashSeeds::new(1, 2).build_hasher();
        let mut b = HashSeeds::new(3, 4).build_hasher();
        a.write(b"same input");
        b.write(b"same input");
        assert_ne!(a.finish(), b.finish());
    }
}
