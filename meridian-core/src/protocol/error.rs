use std::io;

#[derive(Debug, Eq, PartialEq)]
pub enum Error {
    /// Payload would need more than 255 fragments to send.
    TooManyFragments,
    /// `recv`'s destination buffer is smaller than the next reassembled message.
    PayloadTooLarge,
    /// `setMtu` called with a value too small to hold a single segment header.
    MtuTooSmall,
    /// The peer has been silent long enough to cross the dead-link threshold.
    DeadLink,
    /// A decoded segment's `conv` doesn't match this session's.
    BadConv,
    /// A segment header named a command byte outside {PUSH, ACK, ASK, TELL}.
    BadCommand,
    /// The input buffer ended mid-segment (a complete header or its declared payload
    /// never arrived).
    Truncated,
    Io(io::ErrorKind),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err.kind())
    }
}

pub type Result<T> = ::std::result::Result<T, Error>;
