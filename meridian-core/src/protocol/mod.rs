//! Reliable datagram protocol: a connection-oriented ARQ layer riding on top of an
//! unreliable, unordered transport (typically UDP). Congestion control, RTT estimation,
//! fast-resend and dead-link detection are all driven by the caller invoking
//! [`Session::update`]/[`Session::input`] — there is no internal I/O or event loop.

pub mod config;
pub mod error;
pub mod segment;
pub mod session;

pub use config::SessionConfig;
pub use error::{Error, Result};
pub use segment::{Command, Segment};
pub use session::Session;
