//! Convenience re-exports of the most commonly used type from each component.

pub use crate::db::{ConnConfig, Connector, ConnectorPool, Driver, DriverFactory, Task, TaskBuilder};
pub use crate::dict::{Dict, DictError, HashSeeds};
pub use crate::http::{Parser, ParserHandler, ParserType, Request, Response, Url};
pub use crate::pool::ThreadPool;
pub use crate::protocol::{Session, SessionConfig};
pub use crate::queue::Queue;
pub use crate::ring::{BlockRing, ByteRing};
pub use crate::timer::Timer;
