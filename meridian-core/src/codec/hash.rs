//! MD5, SHA-1 and Murmur3 digests. SipHash lives alongside the hash table at
//! [`crate::dict::HashSeeds`] since it is that structure's seeded hasher, not a
//! standalone digest.

use md5::{Digest as Md5Digest, Md5};
use sha1::{Digest as Sha1Digest, Sha1};
use std::io::Cursor;

pub fn md5(data: &[u8]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(data);
    hasher.finalize().into()
}

pub fn sha1(data: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Incremental MD5: `add(a); add(b)` must match a one-shot `md5(a ++ b)`.
#[derive(Default)]
pub struct Md5Incremental(Md5);

impl Md5Incremental {
    pub fn new() -> Self {
        Md5Incremental(Md5::new())
    }

    pub fn add(&mut self, chunk: &[u8]) {
        self.0.update(chunk);
    }

    pub fn finish(self) -> [u8; 16] {
        self.0.finalize().into()
    }
}

/// Incremental SHA-1, same contract as [`Md5Incremental`].
#[derive(Default)]
pub struct Sha1Incremental(Sha1);

impl Sha1Incremental {
    pub fn new() -> Self {
        Sha1Incremental(Sha1::new())
    }

    pub fn add(&mut self, chunk: &[u8]) {
        self.0.update(chunk);
    }

    pub fn finish(self) -> [u8; 20] {
        self.0.finalize().into()
    }
}

/// Murmur3 (x86, 32-bit variant) with an explicit seed — the hash table's other
/// process-global-in-the-original seed, per spec.md §9 "Globals" (exposed here as a
/// plain argument rather than a mutable global).
pub fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    murmur3::murmur3_32(&mut Cursor::new(data), seed).expect("in-memory cursor read cannot fail")
}

pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_md5_of_empty_string() {
        assert_eq!(to_hex(&md5(b"")), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_sha1_of_empty_string() {
        assert_eq!(to_hex(&sha1(b"")), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }

    #[test]
    fn test_md5_incremental_matches_one_shot() {
        let mut inc = Md5Incremental::new();
        inc.add(b"hello ");
        inc.add(b"world");
        assert_eq!(inc.finish(), md5(b"hello world"));
    }

    #[test]
    fn test_sha1_incremental_matches_one_shot() {
        let mut inc = Sha1Incremental::new();
        inc.add(b"hello ");
        inc.add(b"world");
        assert_eq!(inc.finish(), sha1(b"hello world"));
    }

    #[test]
    fn test_murmur3_is_seed_sensitive() {
        let a = murmur3_32(b"the quick brown fox", 0);
        let b = murmur3_32(b"the quick brown fox", 1);
        assert_ne!(a, b);
        assert_eq!(a, murmur3_32(b"the quick brown fox", 0));
    }
}
