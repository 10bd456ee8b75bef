//! Connector pool (spec.md §4.7): a ring of free connectors guarded by a single mutex.
//! `acquire` creates a connector on demand when the ring is empty; `release` returns a
//! healthy connector to the ring and discards one whose last task errored.

use crate::db::config::ConnConfig;
use crate::db::connector::{Connector, DriverFactory};
use std::sync::{Arc, Mutex};

pub struct ConnectorPool {
    free: Mutex<Vec<Connector>>,
    factory: Arc<dyn DriverFactory>,
    cfg: ConnConfig,
}

impl ConnectorPool {
    pub fn new(factory: Arc<dyn DriverFactory>, cfg: ConnConfig) -> Self {
        ConnectorPool {
            free: Mutex::new(Vec::new()),
            factory,
            cfg,
        }
    }

    /// Take a connector from the ring, creating a fresh one if it's empty.
    pub fn acquire(&self) -> Connector {
        let mut free = self.free.lock().unwrap();
        free.pop()
            .unwrap_or_else(|| Connector::new(self.factory.create(), self.cfg.clone()))
    }

    /// Return a connector to the ring, unless its last operation errored.
    pub fn release(&self, connector: Connector) {
        if connector.is_healthy() {
            self.free.lock().unwrap().push(connector);
        }
    }

    /// Drop every idle connector, returning how many were released.
    pub fn close(&self) -> usize {
        let mut free = self.free.lock().unwrap();
        let count = free.len();
        free.clear();
        count
    }

    pub fn idle_count(&self) -> usize {
        self.free.lock().unwrap().len()
    }
}

/// Bridges a [`DriverFactory`]'s per-thread init/end onto [`crate::pool::ThreadHook`],
/// so a [`crate::pool::ThreadPool`] dispatching acquire/execute/release cycles (spec.md
/// §4.7 "Thread model") runs the driver's thread-local setup on each worker it starts.
pub struct PoolThreadHook(pub Arc<dyn DriverFactory>);

impl crate::pool::ThreadHook for PoolThreadHook {
    fn on_start(&self) {
        self.0.thread_init();
    }

    fn on_stop(&self) {
        self.0.thread_end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connector::tests::MockDriver;
    use crate::db::task::TaskBuilder;
    use std::time::Duration;

    struct MockFactory;
    impl DriverFactory for MockFactory {
        fn create(&self) -> Box<dyn crate::db::connector::Driver> {
            Box::new(MockDriver::new())
        }
    }

    #[test]
    fn test_acquire_creates_when_empty_then_recycles() {
        let pool = ConnectorPool::new(Arc::new(MockFactory), ConnConfig::default());
        assert_eq!(pool.idle_count(), 0);

        let connector = pool.acquire();
        pool.release(connector);
        assert_eq!(pool.idle_count(), 1);

        let _ = pool.acquire();
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn test_unhealthy_connector_is_discarded_not_recycled() {
        let pool = ConnectorPool::new(Arc::new(MockFactory), ConnConfig::default());
        let mut connector = pool.acquire();

        let task = TaskBuilder::new(Duration::from_secs(1)).literal("FAIL").build();
        assert!(connector.execute(&task).is_err());

        pool.release(connector);
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn test_close_drains_idle_ring() {
        let pool = ConnectorPool::new(Arc::new(MockFactory), ConnConfig::default());
        for _ in 0..3 {
            let connector = pool.acquire();
            pool.release(connector);
        }
        assert_eq!(pool.close(), 1);
        assert_eq!(pool.idle_count(), 0);
    }
}
