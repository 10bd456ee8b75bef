//! DB connector pool (spec.md §4.7): handle recycling plus per-task execution. The
//! pool itself never touches SQL semantics — spec.md §1 explicitly treats statements as
//! opaque text (no SQL parser in scope); all the pool does is own connectors, rotate a
//! free ring, and enforce a per-task read-timeout.

pub mod config;
pub mod connector;
pub mod error;
pub mod pool;
pub mod task;
pub mod value;

pub use config::ConnConfig;
pub use connector::{Connector, Driver, DriverFactory, MysqlDriver, MysqlDriverFactory, Outcome};
pub use error::{Error, Result};
pub use pool::{ConnectorPool, PoolThreadHook};
pub use task::{Task, TaskBuilder};
pub use value::{Row, RowSet, Value};
