//! Bounded ring buffer feeding the matcher workers.
//!
//! One producer publishes sequences in order; consumers claim contiguous
//! ranges `[lower, upper)` and take the items out of their slots. A slot is
//! reused only after its item has been taken, which gives the producer
//! backpressure when consumers fall a full lap behind.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

pub struct Ring<T> {
    slots: Box<[Mutex<Option<T>>]>,
    mask: u64,
    published: AtomicU64,
    claimed: AtomicU64,
    closed: AtomicBool,
    readable: Notify,
    writable: Notify,
    producer: tokio::sync::Mutex<()>,
}

impl<T> Ring<T> {
    /// `capacity` is rounded up to a power of two.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2).next_power_of_two();
        let slots = (0..capacity).map(|_| Mutex::new(None)).collect::<Vec<_>>().into_boxed_slice();

        Self {
            slots,
            mask: capacity as u64 - 1,
            published: AtomicU64::new(0),
            claimed: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            readable: Notify::new(),
            writable: Notify::new(),
            producer: tokio::sync::Mutex::new(()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Items published but not yet claimed.
    pub fn pending(&self) -> u64 {
        self.published.load(Ordering::Acquire) - self.claimed.load(Ordering::Acquire)
    }

    fn slot(&self, sequence: u64) -> &Mutex<Option<T>> {
        &self.slots[(sequence & self.mask) as usize]
    }

    /// Publish an item, waiting while its slot is still occupied. Returns
    /// the item back once the ring is closed.
    pub async fn publish(&self, item: T) -> Result<u64, T> {
        let _producer = self.producer.lock().await;
        let sequence = self.published.load(Ordering::Acquire);

        loop {
            let writable = self.writable.notified();
            tokio::pin!(writable);
            writable.as_mut().enable();

            if self.is_closed() {
                return Err(item);
            }

            // Only the producer fills slots, so a free slot stays free here
            let free = self.slot(sequence).lock().unwrap_or_else(|e| e.into_inner()).is_none();
            if free {
                *self.slot(sequence).lock().unwrap_or_else(|e| e.into_inner()) = Some(item);
                self.published.store(sequence + 1, Ordering::Release);
                self.readable.notify_waiters();
                return Ok(sequence);
            }

            writable.await;
        }
    }

    /// Claim up to `max_batch` published items. Returns `None` once the ring
    /// is closed and drained.
    pub async fn claim(&self, max_batch: usize) -> Option<(u64, Vec<T>)> {
        let max_batch = max_batch.max(1) as u64;

        loop {
            let readable = self.readable.notified();
            tokio::pin!(readable);
            readable.as_mut().enable();

            let lower = self.claimed.load(Ordering::Acquire);
            let published = self.published.load(Ordering::Acquire);

            if lower < published {
                let upper = published.min(lower + max_batch);
                if self
                    .claimed
                    .compare_exchange(lower, upper, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    continue;
                }

                let items = (lower..upper)
                    .filter_map(|sequence| self.slot(sequence).lock().unwrap_or_else(|e| e.into_inner()).take())
                    .collect();
                self.writable.notify_waiters();
                return Some((lower, items));
            }

            if self.is_closed() {
                return None;
            }

            readable.await;
        }
    }

    /// Stop accepting items. Consumers drain what was published.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.readable.notify_waiters();
        self.writable.notify_waiters();
    }
}
