//! Supporting codecs (spec.md §1, component "I"): Base64, MD5, SHA-1, Murmur3,
//! SipHash, Gzip framing and UTF conversion. spec.md places these out of scope for a
//! hand-rolled reimplementation ("reimplement from published references — their
//! algorithms are public domain and their interfaces trivial"); each wrapper here
//! reuses the corresponding published-reference crate rather than re-deriving the
//! algorithm.

pub mod base64;
pub mod gzip;
pub mod hash;
pub mod utf;
