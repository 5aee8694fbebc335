//! Circular byte buffer staging data between task code and the ISRs.
//!
//! Each ring has exactly one producing and one consuming context, assigned
//! by direction: the application fills a transmit ring that the transmit
//! ISR drains, and the receive ISR fills a receive ring that the
//! application drains. One slot of the backing array stays permanently
//! free, so the two cursors alone distinguish full from empty and neither
//! side ever needs to read a count the other side is writing.
//!
//! The producer may only [`push`](RingBuffer::push); the consumer may only
//! [`pop`](RingBuffer::pop) and [`clear`](RingBuffer::clear). Count queries
//! are safe from both sides, and the two contexts may preempt each other
//! freely.

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicUsize, Ordering};

/// A fixed-capacity circular byte buffer for one producer and one consumer.
///
/// Holds at most `N - 1` bytes; the reserved slot is what keeps the
/// full/empty test cursor-only.
pub struct RingBuffer<const N: usize> {
    buffer: [UnsafeCell<MaybeUninit<u8>>; N],
    /// Fill cursor, advanced only by the producer.
    head: AtomicUsize,
    /// Drain cursor, advanced only by the consumer.
    tail: AtomicUsize,
}

// SAFETY: the producer side owns `head` and the consumer side owns `tail`.
// Every slot access is fenced by the release store of the cursor covering
// it, so an ISR on one end and a task on the other always observe fully
// written bytes.
unsafe impl<const N: usize> Sync for RingBuffer<N> {}
unsafe impl<const N: usize> Send for RingBuffer<N> {}

impl<const N: usize> RingBuffer<N> {
    /// Create a new empty ring.
    pub const fn new() -> Self {
        assert!(N >= 2, "one slot is reserved, so N must be at least 2");

        RingBuffer {
            // SAFETY: MaybeUninit<u8> requires no initialization, and
            // UnsafeCell does not affect the validity of its contents.
            buffer: unsafe {
                MaybeUninit::<[UnsafeCell<MaybeUninit<u8>>; N]>::uninit().assume_init()
            },
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    /// Push one byte (producer side).
    ///
    /// Returns `Err(byte)` without touching the cursors if the ring is
    /// full. The caller decides whether that is an overflow condition or a
    /// reason to wait and retry.
    pub fn push(&self, byte: u8) -> Result<(), u8> {
        let head = self.head.load(Ordering::Relaxed);
        let next_head = (head + 1) % N;

        if next_head == self.tail.load(Ordering::Acquire) {
            return Err(byte);
        }

        // SAFETY: only this side writes slots, and the full check above
        // keeps `head` clear of everything the consumer has yet to drain.
        unsafe {
            (*self.buffer[head].get()).write(byte);
        }

        // The cursor advance is what hands the slot to the consumer.
        self.head.store(next_head, Ordering::Release);
        Ok(())
    }

    /// Pop one byte (consumer side). `None` on empty, cursors untouched.
    pub fn pop(&self) -> Option<u8> {
        let tail = self.tail.load(Ordering::Relaxed);

        if tail == self.head.load(Ordering::Acquire) {
            return None;
        }

        // SAFETY: only this side reads slots, and `tail != head` means the
        // producer has already handed this one over.
        let byte = unsafe { (*self.buffer[tail].get()).assume_init_read() };

        self.tail.store((tail + 1) % N, Ordering::Release);
        Some(byte)
    }

    /// Number of bytes currently stored.
    pub fn count(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        (head + N - tail) % N
    }

    /// Number of bytes that can still be pushed.
    pub fn free_count(&self) -> usize {
        (N - 1) - self.count()
    }

    /// Usable capacity (`N - 1`).
    pub const fn capacity(&self) -> usize {
        N - 1
    }

    pub fn is_empty(&self) -> bool {
        self.tail.load(Ordering::Acquire) == self.head.load(Ordering::Acquire)
    }

    /// Discard all stored bytes (consumer side).
    ///
    /// Must only be called while the producing side is quiescent for the
    /// result to be "empty"; concurrent pushes after the snapshot survive.
    pub fn clear(&self) {
        self.tail
            .store(self.head.load(Ordering::Acquire), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order() {
        let ring: RingBuffer<8> = RingBuffer::new();
        for b in 0..7u8 {
            ring.push(b).unwrap();
        }
        for b in 0..7u8 {
            assert_eq!(ring.pop(), Some(b));
        }
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn occupancy_never_exceeds_capacity() {
        let ring: RingBuffer<5> = RingBuffer::new();
        assert_eq!(ring.capacity(), 4);

        for b in 0..4u8 {
            ring.push(b).unwrap();
            assert!(ring.count() <= ring.capacity());
        }
        assert_eq!(ring.push(99), Err(99));
        assert_eq!(ring.count(), 4);
        assert_eq!(ring.free_count(), 0);
    }

    #[test]
    fn pop_on_empty_does_not_move_cursors() {
        let ring: RingBuffer<4> = RingBuffer::new();
        assert_eq!(ring.pop(), None);
        assert_eq!(ring.count(), 0);

        ring.push(7).unwrap();
        assert_eq!(ring.pop(), Some(7));
        assert_eq!(ring.pop(), None);

        // The failed pop must not have consumed anything.
        ring.push(8).unwrap();
        assert_eq!(ring.pop(), Some(8));
    }

    #[test]
    fn push_when_full_returns_byte() {
        let ring: RingBuffer<2> = RingBuffer::new();
        ring.push(1).unwrap();
        assert_eq!(ring.push(2), Err(2));
        assert_eq!(ring.pop(), Some(1));
        ring.push(2).unwrap();
        assert_eq!(ring.pop(), Some(2));
    }

    #[test]
    fn wraparound_many_rounds() {
        let ring: RingBuffer<4> = RingBuffer::new();

        for round in 0..50u32 {
            let base = (round * 3) as u8;
            ring.push(base).unwrap();
            ring.push(base.wrapping_add(1)).unwrap();
            ring.push(base.wrapping_add(2)).unwrap();
            assert_eq!(ring.free_count(), 0);

            assert_eq!(ring.pop(), Some(base));
            assert_eq!(ring.pop(), Some(base.wrapping_add(1)));
            assert_eq!(ring.pop(), Some(base.wrapping_add(2)));
            assert!(ring.is_empty());
        }
    }

    #[test]
    fn clear_drains_everything() {
        let ring: RingBuffer<8> = RingBuffer::new();
        for b in 0..5u8 {
            ring.push(b).unwrap();
        }
        ring.clear();
        assert!(ring.is_empty());
        assert_eq!(ring.pop(), None);
        assert_eq!(ring.free_count(), ring.capacity());
    }

    #[test]
    fn interleaved_push_pop() {
        let ring: RingBuffer<4> = RingBuffer::new();
        ring.push(1).unwrap();
        ring.push(2).unwrap();
        assert_eq!(ring.pop(), Some(1));
        ring.push(3).unwrap();
        ring.push(4).unwrap();
        assert_eq!(ring.pop(), Some(2));
        assert_eq!(ring.pop(), Some(3));
        assert_eq!(ring.pop(), Some(4));
        assert_eq!(ring.pop(), None);
    }
}
