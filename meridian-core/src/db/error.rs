#[derive(Debug)]
pub enum Error {
    /// A task was executed on a connector that has never connected and lazy-connect
    /// itself failed silently upstream (should not normally surface; kept for parity
    /// with the original's explicit "not open" status).
    NotOpen,
    /// An escaped fragment was appended with an empty argument.
    InvalidArg,
    /// The driver reported a failure; message is whatever the driver attached.
    DriverError(String),
    /// The task's read-timeout elapsed before the driver returned.
    Timeout,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::NotOpen => write!(f, "connector not open"),
            Error::InvalidArg => write!(f, "invalid argument"),
            Error::DriverError(msg) => write!(f, "driver error: {}", msg),
            Error::Timeout => write!(f, "task timed out"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = ::std::result::Result<T, Error>;
