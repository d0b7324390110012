// uartbeat - Serial Echo Firmware
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use core::cell::UnsafeCell;
use core::fmt;
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// Returned when a byte is pushed into a full ring. The byte is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overflow;

impl fmt::Display for Overflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ring buffer full, newest byte dropped")
    }
}

/// Fixed-capacity byte ring shared by exactly one producer and one consumer.
///
/// `head` is the next slot to write and is only ever stored by the producer.
/// `tail` is the next slot to read and is only ever stored by the consumer.
/// `head == tail` means empty; the ring is full one slot early, so `N` slots
/// hold at most `N - 1` bytes.
///
/// When full, the newest byte is rejected and counted in [`RingBuffer::dropped`].
/// Indices are never advanced past each other.
pub struct RingBuffer<const N: usize> {
    slots: UnsafeCell<[u8; N]>,
    head: AtomicUsize,
    tail: AtomicUsize,
    dropped: AtomicU32,
}

// SAFETY: slot `i` is written by the producer only while `i == head` and read by
// the consumer only while `i == tail != head`. `head` is published with Release
// after the write and loaded with Acquire before the read, so the two roles never
// touch the same slot at the same time. Callers of `push`/`pop` uphold the
// single-producer/single-consumer contract.
unsafe impl<const N: usize> Sync for RingBuffer<N> {}

impl<const N: usize> RingBuffer<N> {
    const AT_LEAST_TWO_SLOTS: () = assert!(N >= 2, "a ring buffer needs at least two slots");

    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::AT_LEAST_TWO_SLOTS;
        Self {
            slots: UnsafeCell::new([0; N]),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            dropped: AtomicU32::new(0),
        }
    }

    /// Number of bytes the ring can hold at once.
    pub const fn capacity(&self) -> usize {
        N - 1
    }

    #[inline]
    const fn advance(index: usize) -> usize {
        (index + 1) % N
    }

    /// Append `byte` at `head`.
    ///
    /// # Safety
    ///
    /// Only one execution context may act as producer for this ring. No other
    /// call to `push` may run concurrently with this one.
    pub unsafe fn push(&self, byte: u8) -> Result<(), Overflow> {
        let head = self.head.load(Ordering::Relaxed);
        let next = Self::advance(head);
        if next == self.tail.load(Ordering::Acquire) {
            // Producer is the only writer of the counter, so load/store is enough
            // and stays available on cores without atomic read-modify-write.
            let dropped = self.dropped.load(Ordering::Relaxed);
            self.dropped
                .store(dropped.wrapping_add(1), Ordering::Relaxed);
            return Err(Overflow);
        }

        // SAFETY: `head < N`, and the consumer never reads slot `head` until the
        // store below publishes it.
        unsafe { self.slots.get().cast::<u8>().add(head).write(byte) };
        self.head.store(next, Ordering::Release);
        Ok(())
    }

    /// Remove the byte at `tail`, oldest first.
    ///
    /// # Safety
    ///
    /// Only one execution context may act as consumer for this ring. No other
    /// call to `pop` may run concurrently with this one.
    pub unsafe fn pop(&self) -> Option<u8> {
        let tail = self.tail.load(Ordering::Relaxed);
        if tail == self.head.load(Ordering::Acquire) {
            return None;
        }

        // SAFETY: `tail < N` and `tail != head`, so the producer finished writing
        // this slot before publishing the `head` we just acquired.
        let byte = unsafe { self.slots.get().cast::<u8>().add(tail).read() };
        self.tail.store(Self::advance(tail), Ordering::Release);
        Some(byte)
    }

    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire) == self.tail.load(Ordering::Acquire)
    }

    /// Bytes currently queued.
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        (head + N - tail) % N
    }

    /// Bytes rejected because the ring was full.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Current `(head, tail)` cursors.
    pub fn cursors(&self) -> (usize, usize) {
        (
            self.head.load(Ordering::Acquire),
            self.tail.load(Ordering::Acquire),
        )
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> fmt::Debug for RingBuffer<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (head, tail) = self.cursors();
        f.debug_struct("RingBuffer")
            .field("slots", &N)
            .field("head", &head)
            .field("tail", &tail)
            .field("dropped", &self.dropped())
            .finish()
    }
}
