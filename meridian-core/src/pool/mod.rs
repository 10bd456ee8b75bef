//! Fixed-worker thread pool (spec.md §4.6): a ready ring accepting both front
//! (urgent) and back (normal) insertion, and drain-on-stop semantics — a task already
//! dequeued when `stop()` observes an empty ring still runs to completion before its
//! worker exits. Submitted work is a boxed closure, not a struct the pool itself could
//! recycle; [`TaskRecycler`] is the capped free-list spec.md names, for callers that hand
//! the pool plain data rather than a closure and want the allocation reused.

use slog::{debug, o, Logger};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

type Task = Box<dyn FnOnce() + Send + 'static>;

const DEFAULT_FREE_LIST_CAP: usize = 1000;

struct Shared {
    ready: Mutex<VecDeque<Task>>,
    cv: Condvar,
    running: Mutex<bool>,
}

/// Optional per-worker-thread lifecycle hooks, invoked on the worker's own thread at
/// start and stop. Used by the DB connector pool (§4.7) to run driver thread-local
/// init/uninit around the tasks a worker executes.
pub trait ThreadHook: Send + Sync {
    fn on_start(&self) {}
    fn on_stop(&self) {}
}

struct NoopHook;
impl ThreadHook for NoopHook {}

/// A fixed-size worker pool. Submitted closures run on whichever worker picks them up
/// next; `urgent` submissions jump the ready ring's normal-priority backlog.
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
    logger: Logger,
}

impl ThreadPool {
    pub fn start(workers: usize) -> Self {
        Self::start_with_hook(workers, Arc::new(NoopHook), Logger::root(slog::Discard, o!()))
    }

    pub fn start_with_hook(workers: usize, hook: Arc<dyn ThreadHook>, logger: Logger) -> Self {
        let shared = Arc::new(Shared {
            ready: Mutex::new(VecDeque::new()),
            cv: Condvar::new(),
            running: Mutex::new(true),
        });

        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let shared = shared.clone();
            let hook = hook.clone();
            let logger = logger.new(o!("worker" => id));

            handles.push(thread::spawn(move || {
                hook.on_start();
                debug!(logger, "worker started");

                loop {
                    let mut ready = shared.ready.lock().unwrap();
                    loop {
                        if let Some(task) = ready.pop_front() {
                            drop(ready);
                            task();
                            break;
                        }

                        let running = *shared.running.lock().unwrap();
                        if !running {
                            hook.on_stop();
                            debug!(logger, "worker stopped");
                            return;
                        }

                        ready = shared.cv.wait(ready).unwrap();
                    }
                }
            }));
        }

        ThreadPool {
            shared,
            workers: handles,
            logger,
        }
    }

    /// Submit a task. `urgent` tasks are pulled before any normal task queued earlier.
    pub fn submit<F>(&self, task: F, urgent: bool) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if !*self.shared.running.lock().unwrap() {
            return false;
        }

        let mut ready = self.shared.ready.lock().unwrap();
        if urgent {
            ready.push_front(Box::new(task));
        } else {
            ready.push_back(Box::new(task));
        }
        drop(ready);
        self.shared.cv.notify_one();
        true
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Stop accepting further submissions and join every worker. Tasks still
    /// in the ready ring when the last worker observes it empty are drained (run) first
    /// — nothing queued is ever silently dropped.
    pub fn stop(mut self) {
        *self.shared.running.lock().unwrap() = false;
        self.shared.cv.notify_all();
        debug!(self.logger, "stopping pool"; "pending" => self.shared.ready.lock().unwrap().len());

        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        *self.shared.running.lock().unwrap() = false;
        self.shared.cv.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

/// A bounded free-list for caller-owned task payload structs, mirroring the original's
/// "recycle up to N task objects" policy for callers that hand plain data (rather than
/// closures) to the pool and want to reuse the allocation.
pub struct TaskRecycler<T> {
    free: Mutex<Vec<T>>,
    cap: usize,
}

impl<T> TaskRecycler<T> {
    pub fn new(cap: usize) -> Self {
        TaskRecycler {
            free: Mutex::new(Vec::new()),
            cap,
        }
    }

    /// A recycler capped at spec.md §4.6's own default ("a maximum free-list size
    /// (default 1000)").
    pub fn with_default_cap() -> Self {
        Self::new(DEFAULT_FREE_LIST_CAP)
    }

    pub fn acquire(&self, make: impl FnOnce() -> T) -> T {
        self.free.lock().unwrap().pop().unwrap_or_else(make)
    }

    pub fn release(&self, item: T) {
        let mut free = self.free.lock().unwrap();
        if free.len() < self.cap {
            free.push(item);
        }
    }

    pub fn len(&self) -> usize {
        self.free.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
