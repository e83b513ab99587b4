//! Mutex/condvar discipline layered over [`VirtualRing`] for the
//! producer/consumer handoff.
//!
//! The lock only ever guards the three offset fields and the fill-level
//! accounting — never the payload bytes themselves. Callers reserve a
//! window under the lock, release it, copy into (or out of) the window,
//! then reacquire the lock to commit. This is safe here specifically
//! because the ring is single-producer/single-consumer: the window handed
//! back by a reservation is never touched by the other side until the
//! matching commit advances `front`/`rear`.

use std::slice;
use std::sync::{Condvar, Mutex};
#[cfg(test)]
use std::time::Duration;

use super::{Result, VirtualRing};

struct Inner {
    ring: VirtualRing,
    max_fill: usize,
    fill_sum: u128,
    fill_samples: u64,
}

/// A [`VirtualRing`] plus the locking and fill-level bookkeeping the
/// producer and consumer threads share.
pub struct SharedRing {
    base: *mut u8,
    capacity: usize,
    inner: Mutex<Inner>,
    /// Signaled by the consumer after `commit_read` frees space.
    space_available: Condvar,
}

unsafe impl Sync for SharedRing {}

/// A reserved, not-yet-committed window into the ring's write side.
pub struct WriteSlot<'a> {
    ring: &'a SharedRing,
    offset: usize,
    len: usize,
}

impl<'a> WriteSlot<'a> {
    /// The reserved window, ready to be filled in by the caller.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.ring.base.add(self.offset), self.len) }
    }

    /// Advances `rear`/`fill` and updates the high-water and mean-fill
    /// accumulators, then wakes anyone waiting for more space to free up
    /// (a no-op unless the stdin producer is blocked in
    /// [`SharedRing::reserve_blocking`]).
    pub fn commit(self) {
        let mut inner = self.ring.inner.lock().unwrap();
        inner.ring.commit_write(self.len);
        let fill = inner.ring.fill();
        if fill > inner.max_fill {
            inner.max_fill = fill;
        }
        inner.fill_sum += fill as u128;
        inner.fill_samples += 1;
        drop(inner);
        self.ring.space_available.notify_all();
    }
}

/// A snapshot of the ring's current readable window, taken under the lock.
pub struct ReadSnapshot {
    pub offset: usize,
    pub len: usize,
}

impl SharedRing {
    /// See [`VirtualRing::create`].
    pub fn create(min_size: usize) -> Result<Self> {
        let ring = VirtualRing::create(min_size)?;
        let base = ring.base_ptr();
        let capacity = ring.capacity();
        Ok(Self {
            base,
            capacity,
            inner: Mutex::new(Inner {
                ring,
                max_fill: 0,
                fill_sum: 0,
                fill_samples: 0,
            }),
            space_available: Condvar::new(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn fill(&self) -> usize {
        self.inner.lock().unwrap().ring.fill()
    }

    pub fn max_fill(&self) -> usize {
        self.inner.lock().unwrap().max_fill
    }

    /// Mean fill level as a fraction of capacity, averaged over every
    /// successful enqueue.
    pub fn mean_fill_fraction(&self) -> f64 {
        let inner = self.inner.lock().unwrap();
        if inner.fill_samples == 0 || self.capacity == 0 {
            return 0.0;
        }
        (inner.fill_sum as f64 / inner.fill_samples as f64) / self.capacity as f64
    }

    /// Attempts to reserve `n` bytes without blocking. `None` means the
    /// ring is too full; the caller is responsible for counting the drop.
    pub fn try_reserve(&self, n: usize) -> Option<WriteSlot<'_>> {
        let inner = self.inner.lock().unwrap();
        if inner.ring.fill() + n > self.capacity {
            return None;
        }
        let offset = inner.ring.rear();
        Some(WriteSlot { ring: self, offset, len: n })
    }

    /// Blocks until `n` bytes can be reserved. Used by the stdin producer,
    /// which is never allowed to drop a record.
    pub fn reserve_blocking(&self, n: usize) -> WriteSlot<'_> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if inner.ring.fill() + n <= self.capacity {
                let offset = inner.ring.rear();
                return WriteSlot { ring: self, offset, len: n };
            }
            inner = self.space_available.wait(inner).unwrap();
        }
    }

    /// A snapshot of the currently readable bytes, or `None` if empty.
    /// Valid until the next `commit_read` on this ring.
    pub fn read_snapshot(&self) -> Option<ReadSnapshot> {
        let inner = self.inner.lock().unwrap();
        let len = inner.ring.fill();
        if len == 0 {
            return None;
        }
        Some(ReadSnapshot { offset: inner.ring.front(), len })
    }

    /// Borrows `len` bytes starting at `offset` from a [`ReadSnapshot`]
    /// taken from this ring. The caller must not hold the slice across a
    /// call to `commit_read`.
    pub fn slice_at(&self, offset: usize, len: usize) -> &[u8] {
        unsafe { slice::from_raw_parts(self.base.add(offset), len) }
    }

    /// Advances `front`/`fill` by `n` and wakes anyone blocked in
    /// [`reserve_blocking`](Self::reserve_blocking).
    pub fn commit_read(&self, n: usize) {
        let mut inner = self.inner.lock().unwrap();
        inner.ring.commit_read(n);
        drop(inner);
        self.space_available.notify_all();
    }

    /// Blocks the calling thread on `space_available` for at most
    /// `timeout`, for callers that want to wait without immediately
    /// reserving (not used by the stdin producer, which uses
    /// `reserve_blocking` directly, but convenient for tests).
    #[cfg(test)]
    pub fn wait_for_space(&self, timeout: Duration) {
        let inner = self.inner.lock().unwrap();
        let _ = self.space_available.wait_timeout(inner, timeout);
    }
}
