//! Bounded MPMC queue (spec.md §4.5): double-buffered so the common path only ever
//! takes one of the two mutexes. Consumers drain a private "read" list; once it runs
//! dry they swap in the producers' "write" list under the write mutex and keep going.
//! FIFO across the queue as a whole, and within a single swap, order is preserved.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

#[derive(Debug, Eq, PartialEq)]
pub enum Error {
    /// Queue at capacity and the caller asked for a non-blocking push.
    Full,
    /// Queue empty and the caller asked for a non-blocking pop.
    Empty,
    /// `shutdown()` was called; no further blocking is honored.
    ShuttingDown,
}

pub type Result<T> = ::std::result::Result<T, Error>;

struct ReadSide<T> {
    items: VecDeque<T>,
}

struct WriteSide<T> {
    items: VecDeque<T>,
}

/// A bounded multi-producer/multi-consumer queue. `max` bounds the *combined* size of
/// both internal halves, matching the original's single `count`/`max` pair.
pub struct Queue<T> {
    read: Mutex<ReadSide<T>>,
    read_cv: Condvar,
    write: Mutex<WriteSide<T>>,
    write_cv: Condvar,
    len: AtomicUsize,
    max: usize,
    shutdown: AtomicBool,
    block_push: AtomicBool,
    block_pop: AtomicBool,
}

impl<T> Queue<T> {
    pub fn new(max: usize) -> Self {
        Queue {
            read: Mutex::new(ReadSide { items: VecDeque::new() }),
            read_cv: Condvar::new(),
            write: Mutex::new(WriteSide { items: VecDeque::new() }),
            write_cv: Condvar::new(),
            len: AtomicUsize::new(0),
            max,
            shutdown: AtomicBool::new(false),
            block_push: AtomicBool::new(true),
            block_pop: AtomicBool::new(true),
        }
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Toggle whether `push`/`pop` are permitted to block at all, independent of the
    /// caller's own `block` argument — both must allow blocking for a call to suspend.
    pub fn set_blocking(&self, push: bool, pop: bool) {
        self.block_push.store(push, Ordering::Release);
        self.block_pop.store(pop, Ordering::Release);
        self.write_cv.notify_all();
        self.read_cv.notify_all();
    }

    /// Wake every waiter and make subsequent calls non-blocking no-ops that fail with
    /// [`Error::ShuttingDown`].
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.write_cv.notify_all();
        self.read_cv.notify_all();
    }

    fn may_block(&self, flag: &AtomicBool, block: bool) -> bool {
        block && flag.load(Ordering::Acquire) && !self.shutdown.load(Ordering::Acquire)
    }

    /// Append `item`. Blocks while the queue is at capacity unless `block` is false (or
    /// blocking has been disabled via [`Queue::set_blocking`]), in which case it fails
    /// with [`Error::Full`] instead.
    pub fn push(&self, item: T, block: bool) -> Result<()> {
        let mut side = self.write.lock().unwrap();

        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return Err(Error::ShuttingDown);
            }

            if self.len.load(Ordering::Acquire) < self.max {
                side.items.push_back(item);
                self.len.fetch_add(1, Ordering::AcqRel);
                drop(side);
                self.read_cv.notify_one();
                return Ok(());
            }

            if !self.may_block(&self.block_push, block) {
                return Err(Error::Full);
            }

            side = self.write_cv.wait(side).unwrap();
        }
    }

    /// Remove and return the oldest item. Blocks while the queue is empty unless
    /// `block` is false (or blocking has been disabled), in which case it fails with
    /// [`Error::Empty`] instead.
    pub fn pop(&self, block: bool) -> Result<T> {
        let mut read = self.read.lock().unwrap();

        loop {
            if let Some(item) = read.items.pop_front() {
                self.len.fetch_sub(1, Ordering::AcqRel);
                return Ok(item);
            }

            // Read side is dry: swap in whatever producers have accumulated.
            {
                let mut write = self.write.lock().unwrap();
                if !write.items.is_empty() {
                    std::mem::swap(&mut read.items, &mut write.items);
                    drop(write);
                    self.write_cv.notify_all();
                    continue;
                }
            }

            if self.shutdown.load(Ordering::Acquire) {
                return Err(Error::ShuttingDown);
            }

            if !self.may_block(&self.block_pop, block) {
                return Err(Error::Empty);
            }

            let (guard, timeout) = self.read_cv.wait_timeout(read, Duration::from_millis(50)).unwrap();
            read = guard;
            let _ = timeout;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_single_threaded() {
        let q = Queue::new(10);
        for i in 0..5 {
            q.push(i, false).unwrap();
        }
        for i in 0..5 {
            assert_eq!(q.pop(false).unwrap(), i);
        }
    }

    #[test]
    fn test_nonblocking_full_and_empty() {
        let q: Queue<u32> = Queue::new(1);
        q.push(1, false).unwrap();
        assert_eq!(q.push(2, false), Err(Error::Full));
        q.pop(false).unwrap();
        assert_eq!(q.pop(false), Err(Error::Empty));
    }

    #[test]
    fn test_shutdown_wakes_waiters() {
        let q = Arc::new(Queue::<u32>::new(1));
        let q2 = q.clone();
        let handle = thread::spawn(move || q2.pop(true));

        thread::sleep(Duration::from_millis(20));
        q.shutdown();

        assert_eq!(handle.join().unwrap(), Err(Error::ShuttingDown));
    }

    #[test]
    fn test_mpmc_preserves_total_count_and_per_producer_order() {
        const PRODUCERS: usize = 4;
        const CONSUMERS: usize = 4;
        const PER_PRODUCER: usize = 2_000;

        let q = Arc::new(Queue::<(usize, usize)>::new(64));

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let q = q.clone();
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        q.push((p, i), true).unwrap();
                    }
                })
            })
            .collect();

        let total = Arc::new(Mutex::new(Vec::new()));
        let consumers: Vec<_> = (0..CONSUMERS)
            .map(|_| {
                let q = q.clone();
                let total = total.clone();
                thread::spawn(move || loop {
                    match q.pop(true) {
                        Ok(item) => total.lock().unwrap().push(item),
                        Err(Error::ShuttingDown) => break,
                        Err(_) => continue,
                    }
                })
            })
            .collect();

        for p in producers {
            p.join().unwrap();
        }

        // Drain whatever remains, then shut down to release the consumers.
        while q.len() > 0 {
            thread::sleep(Duration::from_millis(5));
        }
        q.shutdown();

        for c in consumers {
            c.join().unwrap();
        }

        let observed = total.lock().unwrap();
        assert_eq!(observed.len(), PRODUCERS * PER_PRODUCER);

        let mut per_producer = vec![Vec::new(); PRODUCERS];
        for &(p, i) in observed.iter() {
            per_producer[p].push(i);
        }
        for seq in per_producer {
            assert!(seq.windows(2).all(|w| w[0] < w[1]), "producer order violated");
        }
    }
}
