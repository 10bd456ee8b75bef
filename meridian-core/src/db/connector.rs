//! A single pooled connection plus the driver contract spec.md §6 names explicitly:
//! `connect`, `set_option(read_timeout)`, `real_query`, `store_result`,
//! `affected_rows`, `insert_id`, `escape_string`, and per-thread `init`/`end`.

use crate::db::config::{ConnConfig, Endpoint};
use crate::db::error::{Error, Result};
use crate::db::value::{Row, RowSet, Value};
use std::time::Duration;

/// What a successfully executed task produced: either a materialized rowset, or an
/// affected-row count plus the last auto-increment id.
#[derive(Debug)]
pub enum Outcome {
    Rows(RowSet),
    Affected { rows_affected: u64, last_insert_id: u64 },
}

/// The driver contract a connector drives. Object-safe so a [`Connector`] can hold
/// `Box<dyn Driver>` and the pool can be parameterized over any driver implementing it.
pub trait Driver: Send {
    fn connect(&mut self, cfg: &ConnConfig) -> Result<()>;
    fn set_read_timeout(&mut self, timeout: Duration) -> Result<()>;
    /// Execute `sql`; for statements that produce rows the result is buffered so the
    /// subsequent `store_result` call can hand it back (mirrors the C client's
    /// `mysql_real_query` + `mysql_store_result` split even where the underlying Rust
    /// driver fuses the two).
    fn real_query(&mut self, sql: &str) -> Result<()>;
    fn store_result(&mut self) -> Result<Option<RowSet>>;
    fn affected_rows(&self) -> u64;
    fn insert_id(&self) -> u64;
    fn escape_string(&self, input: &str) -> Result<String>;
}

/// Per-driver, per-thread lifecycle hooks (spec.md §4.7 "Thread model"): the pool's
/// [`crate::pool::ThreadHook`] bridges these onto worker-thread start/stop.
pub trait DriverFactory: Send + Sync {
    fn create(&self) -> Box<dyn Driver>;
    fn thread_init(&self) {}
    fn thread_end(&self) {}
}

/// A single connector: one driver handle, lazily connected, recycled by
/// [`crate::db::pool::ConnectorPool`].
pub struct Connector {
    driver: Box<dyn Driver>,
    cfg: ConnConfig,
    connected: bool,
    last_error: Option<String>,
    last_insert_id: u64,
}

impl Connector {
    pub fn new(driver: Box<dyn Driver>, cfg: ConnConfig) -> Self {
        Connector {
            driver,
            cfg,
            connected: false,
            last_error: None,
            last_insert_id: 0,
        }
    }

    /// Execute one task synchronously: connect lazily, apply the task's read-timeout,
    /// render and run the statement, materialize rows or record the affected count.
    pub fn execute(&mut self, task: &crate::db::task::Task) -> Result<Outcome> {
        let result = self.execute_inner(task);
        self.last_error = result.as_ref().err().map(|e| e.to_string());
        result
    }

    fn execute_inner(&mut self, task: &crate::db::task::Task) -> Result<Outcome> {
        if !self.connected {
            self.driver.connect(&self.cfg)?;
            self.connected = true;
        }

        self.driver.set_read_timeout(task.timeout)?;
        let sql = task.render(self.driver.as_ref())?;
        self.driver.real_query(&sql)?;

        match self.driver.store_result()? {
            Some(rowset) => Ok(Outcome::Rows(rowset)),
            None => {
                self.last_insert_id = self.driver.insert_id();
                Ok(Outcome::Affected {
                    rows_affected: self.driver.affected_rows(),
                    last_insert_id: self.last_insert_id,
                })
            }
        }
    }

    /// Whether the last executed task (if any) succeeded. The pool discards connectors
    /// that last errored rather than recycling them.
    pub fn is_healthy(&self) -> bool {
        self.last_error.is_none()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

/// `mysql`-crate-backed driver: the production [`Driver`] implementation.
pub struct MysqlDriver {
    conn: Option<mysql::Conn>,
    read_timeout: Option<Duration>,
    pending_rows: Option<RowSet>,
    pending_affected: u64,
    pending_insert_id: u64,
}

impl MysqlDriver {
    pub fn new() -> Self {
        MysqlDriver {
            conn: None,
            read_timeout: None,
            pending_rows: None,
            pending_affected: 0,
            pending_insert_id: 0,
        }
    }

    /// The `mysql` crate surfaces a socket read-timeout as a plain I/O error rather than
    /// a distinct variant; translate the ones that look like the configured
    /// read-timeout elapsing into [`Error::Timeout`] per spec.md §7's DB error list.
    fn classify_error(err: mysql::Error) -> Error {
        let msg = err.to_string();
        let lower = msg.to_ascii_lowercase();
        if lower.contains("timed out") || lower.contains("timeout") || lower.contains("wouldblock") {
            Error::Timeout
        } else {
            Error::DriverError(msg)
        }
    }

    fn convert(value: mysql::Value) -> Value {
        match value {
            mysql::Value::NULL => Value::Null,
            mysql::Value::Bytes(b) => Value::Bytes(b),
            mysql::Value::Int(i) => Value::Int(i),
            mysql::Value::UInt(u) => Value::UInt(u),
            mysql::Value::Float(f) => Value::Float(f as f64),
            mysql::Value::Double(d) => Value::Float(d),
            _ => Value::Null,
        }
    }
}

impl Default for MysqlDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for MysqlDriver {
    fn connect(&mut self, cfg: &ConnConfig) -> Result<()> {
        use mysql::OptsBuilder;

        let mut builder = OptsBuilder::new()
            .user(Some(cfg.user.clone()))
            .pass(Some(cfg.password.clone()))
            .db_name(Some(cfg.database.clone()));

        builder = match &cfg.endpoint {
            Endpoint::Tcp { host, port } => builder.ip_or_hostname(Some(host.clone())).tcp_port(*port),
            Endpoint::Socket { path } => builder.socket(Some(path.clone())),
        };

        if let Some(timeout) = self.read_timeout {
            builder = builder.read_timeout(Some(timeout));
        }

        let conn = mysql::Conn::new(builder).map_err(Self::classify_error)?;
        self.conn = Some(conn);
        Ok(())
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<()> {
        // The underlying driver only takes a read-timeout at connect time; stash it so
        // the next (re)connect picks it up, matching the "set option, effective on use"
        // contract from spec.md §6 closely enough for a pooled, lazily-connected client.
        self.read_timeout = Some(timeout);
        Ok(())
    }

    fn real_query(&mut self, sql: &str) -> Result<()> {
        use mysql::prelude::Queryable;

        let conn = self.conn.as_mut().ok_or(Error::NotOpen)?;
        let mut result = conn.query_iter(sql).map_err(Self::classify_error)?;

        if result.columns().is_some() && !result.columns().as_deref().unwrap_or(&[]).is_empty() {
            let field_names: Vec<String> = result
                .columns()
                .map(|cols| cols.as_ref().iter().map(|c| c.name_str().into_owned()).collect())
                .unwrap_or_default();

            let mut rows = Vec::new();
            for row in result.by_ref() {
                let row = row.map_err(Self::classify_error)?;
                let columns = row.unwrap().into_iter().map(Self::convert).collect();
                rows.push(Row { columns });
            }
            self.pending_rows = Some(RowSet { field_names, rows });
        } else {
            self.pending_rows = None;
            self.pending_affected = result.affected_rows();
            self.pending_insert_id = result.last_insert_id().unwrap_or(0);
        }

        Ok(())
    }

    fn store_result(&mut self) -> Result<Option<RowSet>> {
        Ok(self.pending_rows.take())
    }

    fn affected_rows(&self) -> u64 {
        self.pending_affected
    }

    fn insert_id(&self) -> u64 {
        self.pending_insert_id
    }

    fn escape_string(&self, input: &str) -> Result<String> {
        // `mysql_real_escape_string`-equivalent: backslash-escape the characters that
        // matter inside a single-quoted literal. The crate doesn't expose the C
        // client's raw escape routine, so this follows the same published character set.
        let mut out = String::with_capacity(input.len());
        for ch in input.chars() {
            match ch {
                '\'' | '"' | '\\' | '\0' => {
                    out.push('\\');
                    out.push(ch);
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                _ => out.push(ch),
            }
        }
        Ok(out)
    }
}

pub struct MysqlDriverFactory;

impl DriverFactory for MysqlDriverFactory {
    fn create(&self) -> Box<dyn Driver> {
        Box::new(MysqlDriver::new())
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::sync::Mutex;

    /// An in-memory driver standing in for a live server: `connect` always succeeds,
    /// `real_query` echoes back a single-row "ok" result unless the SQL contains the
    /// sentinel `FAIL`, which reports a driver error instead.
    pub struct MockDriver {
        connected: bool,
        next_insert_id: Mutex<u64>,
    }

    impl MockDriver {
        pub fn new() -> Self {
            MockDriver { connected: false, next_insert_id: Mutex::new(1) }
        }
    }

    impl Driver for MockDriver {
        fn connect(&mut self, _cfg: &ConnConfig) -> Result<()> {
            self.connected = true;
            Ok(())
        }

        fn set_read_timeout(&mut self, _timeout: Duration) -> Result<()> {
            Ok(())
        }

        fn real_query(&mut self, sql: &str) -> Result<()> {
            if !self.connected {
                return Err(Error::NotOpen);
            }
            if sql.contains("FAIL") {
                return Err(Error::DriverError("mock failure".into()));
            }
            Ok(())
        }

        fn store_result(&mut self) -> Result<Option<RowSet>> {
            Ok(Some(RowSet {
                field_names: vec!["ok".into()],
                rows: vec![Row { columns: vec![Value::Int(1)] }],
            }))
        }

        fn affected_rows(&self) -> u64 {
            1
        }

        fn insert_id(&self) -> u64 {
            let mut next = self.next_insert_id.lock().unwrap();
            let id = *next;
            *next += 1;
            id
        }

        fn escape_string(&self, input: &str) -> Result<String> {
            Ok(input.replace('\'', "\\'"))
        }
    }

    #[test]
    fn test_lazy_connect_then_execute() {
        let mut connector = Connector::new(Box::new(MockDriver::new()), ConnConfig::default());
        let task = crate::db::task::TaskBuilder::new(Duration::from_secs(1))
            .literal("SELECT 1")
            .build();

        let outcome = connector.execute(&task).unwrap();
        assert!(matches!(outcome, Outcome::Rows(_)));
        assert!(connector.is_healthy());
    }

    #[test]
    fn test_failed_query_marks_connector_unhealthy() {
        let mut connector = Connector::new(Box::new(MockDriver::new()), ConnConfig::default());
        let task = crate::db::task::TaskBuilder::new(Duration::from_secs(1))
            .literal("FAIL THIS")
            .build();

        assert!(connector.execute(&task).is_err());
        assert!(!connector.is_healthy());
    }
}
