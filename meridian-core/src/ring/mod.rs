//! Ring buffers (spec.md §3 "H"): the byte-oriented chunk ring that feeds the HTTP
//! parser and the reliable-protocol ingress/egress path, plus a lock-free single
//! producer/single consumer block ring for fixed-size items.

pub mod block;
pub mod bytes;

pub use block::BlockRing;
pub use bytes::ByteRing;
