//! The block-oriented ring (spec.md §3 "H", block variant): a power-of-two slot array
//! with atomic head/tail indices, lock-free for exactly one producer and one consumer.
//! Used where the byte ring's chunk bookkeeping is unwanted overhead — e.g. handing
//! fixed-size segments between a receive thread and a processing thread.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A lock-free single-producer/single-consumer ring of `T`. Capacity is rounded up to
/// the next power of two; `push`/`pop` never block and never allocate after
/// construction.
pub struct BlockRing<T> {
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    mask: usize,
    head: AtomicUsize,
    tail: AtomicUsize,
}

// SAFETY: `push` is only ever called by the producer and `pop` only by the consumer;
// the head/tail acquire/release pair establishes the happens-before edge needed for a
// slot written by the producer to be safely read by the consumer.
unsafe impl<T: Send> Send for BlockRing<T> {}
unsafe impl<T: Send> Sync for BlockRing<T> {}

impl<T> BlockRing<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        let mut slots = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            slots.push(UnsafeCell::new(MaybeUninit::uninit()));
        }

        BlockRing {
            slots: slots.into_boxed_slice(),
            mask: capacity - 1,
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    pub fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        tail.wrapping_sub(head)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Push a value. Returns the value back as `Err` if the ring is full.
    pub fn push(&self, value: T) -> Result<(), T> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);

        if tail.wrapping_sub(head) == self.capacity() {
            return Err(value);
        }

        let idx = tail & self.mask;
        // SAFETY: single producer owns the slot at `idx` until `tail` advances past it.
        unsafe {
            (*self.slots[idx].get()).write(value);
        }
        self.tail.store(tail.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Pop the oldest value, if any.
    pub fn pop(&self) -> Option<T> {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);

        if head == tail {
            return None;
        }

        let idx = head & self.mask;
        // SAFETY: single consumer owns the slot at `idx` until `head` advances past it,
        // and the producer's release-store of `tail` makes its prior write visible here.
        let value = unsafe { (*self.slots[idx].get()).assume_init_read() };
        self.head.store(head.wrapping_add(1), Ordering::Release);
        Some(value)
    }
}

impl<T> Drop for BlockRing<T> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_capacity_rounds_to_power_of_two() {
        let ring: BlockRing<u32> = BlockRing::with_capacity(5);
        assert_eq!(ring.capacity(), 8);
    }

    #[test]
    fn test_push_pop_fifo() {
        let ring: BlockRing<u32> = BlockRing::with_capacity(4);
        ring.push(1).unwrap();
        ring.push(2).unwrap();
        assert_eq!(ring.pop(), Some(1));
        assert_eq!(ring.pop(), Some(2));
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn test_full_ring_rejects_push() {
        let ring: BlockRing<u32> = BlockRing::with_capacity(2);
        ring.push(1).unwrap();
        ring.push(2).unwrap();
        assert_eq!(ring.push(3), Err(3));
        assert!(ring.is_full());
    }

    #[test]
    fn test_spsc_threaded_handoff() {
        let ring = Arc::new(BlockRing::<usize>::with_capacity(16));
        let producer_ring = ring.clone();

        let producer = thread::spawn(move || {
            for i in 0..10_000 {
                while producer_ring.push(i).is_err() {
                    thread::yield_now();
                }
            }
        });

        let mut received = Vec::with_capacity(10_000);
        while received.len() < 10_000 {
            if let Some(v) = ring.pop() {
                received.push(v);
            } else {
                thread::yield_now();
            }
        }

        producer.join().unwrap();
        assert_eq!(received, (0..10_000).collect::<Vec<_>>());
    }
}
