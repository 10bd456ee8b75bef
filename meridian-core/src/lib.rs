//! Reliable-datagram, HTTP and concurrency substrate: an ARQ protocol over an
//! unreliable transport, an incremental-rehashing hash table, a cascading timing
//! wheel, an HTTP/1.x parser, a bounded MPMC queue, a fixed-worker thread pool, a
//! connector pool for a SQL driver, ring buffers feeding the byte-level components,
//! and the supporting codecs (Base64, MD5, SHA-1, Murmur3, SipHash, Gzip, UTF
//! conversion) the higher layers lean on.

pub mod arena;
pub mod codec;
pub mod db;
pub mod dict;
pub mod http;
pub mod pool;
pub mod prelude;
pub mod protocol;
pub mod queue;
pub mod ring;
pub mod timer;
