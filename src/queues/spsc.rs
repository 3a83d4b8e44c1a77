//! This implements a bounded lock-free Single-Producer Single-Consumer Queue
//!
//! The Queue is backed by a fixed Ring-Buffer with two monotonic Counters,
//! `head` for the Consumer and `tail` for the Producer. Each Counter is only
//! ever written by its own side, so the Data-Path needs no CAS at all, only
//! Acquire/Release ordering on the Counters. Each side additionally keeps a
//! cached copy of the other side's Counter and only re-reads the shared
//! Counter when its local estimate says the Buffer might be full/empty,
//! which keeps the cross-core traffic to a minimum.
//!
//! # Example
//! ```
//! use scatterq::queues::spsc;
//!
//! // Creates a new Queue with room for at least 5 Items
//! let (mut rx, mut tx) = spsc::queue(5);
//!
//! // Enqueues the Value 13 on the Queue
//! assert_eq!(Ok(()), tx.try_enqueue(13));
//! // Dequeues 13 from the Queue again
//! assert_eq!(Ok(13), rx.try_dequeue());
//! ```
//!
//! # Reference:
//! * [FastForward for Efficient Pipeline Parallelism - A Cache-Optimized Concurrent Lock-Free Queue](https://www.researchgate.net/publication/213894711_FastForward_for_Efficient_Pipeline_Parallelism_A_Cache-Optimized_Concurrent_Lock-Free_Queue)

use std::{cell::UnsafeCell, fmt::Debug, sync::Arc};

#[cfg(not(loom))]
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(loom)]
use loom::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

use super::{capacity::round_to_pow2, DequeueError, EnqueueError};

/// The Buffer and Counters shared by both halves of the Queue
struct Ring<T> {
    /// The Slots of the Ring-Buffer, an empty Slot holds `None`
    buffer: Box<[UnsafeCell<Option<T>>]>,
    /// The Bit-Mask used to reduce a Counter to a Slot-Index, this is always
    /// `buffer.len() - 1` with the length being a power of two
    mask: usize,
    /// The Index of the next Slot to read, only advanced by the Consumer.
    /// Padded so that the two Counters never share a Cache-Line
    head: CachePadded<AtomicUsize>,
    /// The Index of the next Slot to write, only advanced by the Producer
    tail: CachePadded<AtomicUsize>,
}

impl<T> Ring<T> {
    fn capacity(&self) -> usize {
        self.mask + 1
    }
}

/// The Sending-Half of the Queue
///
/// There is exactly one Sender per Queue and all its Operations take
/// `&mut self`, so the single-producer requirement is enforced by the
/// Type-System instead of being an unchecked precondition
pub struct BoundedSender<T> {
    /// The shared Ring
    ring: Arc<Ring<T>>,
    /// The Producer's own monotonic write Counter, authoritative copy of
    /// `ring.tail`
    tail: usize,
    /// The Consumer's Position as it was last observed by the Producer
    cached_head: usize,
}

/// The Receiving-Half of the Queue
///
/// There is exactly one Receiver per Queue, see [`BoundedSender`]
pub struct BoundedReceiver<T> {
    /// The shared Ring
    ring: Arc<Ring<T>>,
    /// The Consumer's own monotonic read Counter, authoritative copy of
    /// `ring.head`
    head: usize,
    /// The Producer's Position as it was last observed by the Consumer
    cached_tail: usize,
}

impl<T> BoundedSender<T> {
    /// Attempts to Enqueue the given piece of Data
    ///
    /// # Returns
    /// * `Ok(())` if the Data was stored in the Queue
    /// * `Err((data, EnqueueError::Full))` if no Slot was free, handing the
    /// Data back to the Caller to retry with
    pub fn try_enqueue(&mut self, data: T) -> Result<(), (T, EnqueueError)> {
        let capacity = self.ring.capacity();

        // The occupancy is computed against the cached Consumer-Position
        // first, so the shared `head` Counter is only loaded when the local
        // estimate claims the Buffer is full
        if self.tail.wrapping_sub(self.cached_head) >= capacity {
            self.cached_head = self.ring.head.load(Ordering::Acquire);
            if self.tail.wrapping_sub(self.cached_head) >= capacity {
                return Err((data, EnqueueError::Full));
            }
        }

        let slot = &self.ring.buffer[self.tail & self.ring.mask];
        // Safety:
        // The Slots in the range [head, tail) belong to the Consumer, every
        // other Slot belongs to the Producer. `tail & mask` only enters the
        // Consumer's range with the Release-Store below, so until then this
        // is the only access to the Slot
        unsafe { *slot.get() = Some(data) };

        self.tail = self.tail.wrapping_add(1);
        // The Release-Store publishes the Slot-Write above, the Consumer can
        // never observe the advanced `tail` without the Data being visible
        self.ring.tail.store(self.tail, Ordering::Release);

        Ok(())
    }

    /// Checks if the Queue is currently full
    pub fn is_full(&self) -> bool {
        let head = self.ring.head.load(Ordering::Acquire);
        self.tail.wrapping_sub(head) >= self.ring.capacity()
    }

    /// The Capacity of the Queue, the requested Capacity rounded up to the
    /// next power of two
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }
}

impl<T> Debug for BoundedSender<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BoundedSender ()")
    }
}

unsafe impl<T: Send> Send for BoundedSender<T> {}
unsafe impl<T: Send> Sync for BoundedSender<T> {}

impl<T> BoundedReceiver<T> {
    /// Attempts to Dequeue the next piece of Data
    ///
    /// # Returns
    /// * `Ok(data)` with the oldest Element in the Queue
    /// * `Err(DequeueError::Empty)` if no Element was stored in the Queue
    pub fn try_dequeue(&mut self) -> Result<T, DequeueError> {
        // `head` never overtakes `cached_tail`, so equality means the Queue
        // looks empty and the shared `tail` Counter has to be re-read
        if self.cached_tail == self.head {
            self.cached_tail = self.ring.tail.load(Ordering::Acquire);
            if self.cached_tail == self.head {
                return Err(DequeueError::Empty);
            }
        }

        let slot = &self.ring.buffer[self.head & self.ring.mask];
        // Safety:
        // `head < cached_tail <= tail`, so the Producer has published this
        // Slot with a Release-Store that the Acquire-Load of `tail` above
        // synchronized with, and it will not touch the Slot again before
        // `head` is advanced past it
        let data = unsafe { (*slot.get()).take() }
            .expect("every Slot below the published tail holds a Value");

        self.head = self.head.wrapping_add(1);
        // Publishes the now empty Slot back to the Producer
        self.ring.head.store(self.head, Ordering::Release);

        Ok(data)
    }

    /// Checks if the Queue is currently empty
    pub fn is_empty(&self) -> bool {
        self.ring.tail.load(Ordering::Acquire) == self.head
    }

    /// The Capacity of the Queue, the requested Capacity rounded up to the
    /// next power of two
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }
}

impl<T> Debug for BoundedReceiver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BoundedReceiver ()")
    }
}

unsafe impl<T: Send> Send for BoundedReceiver<T> {}
unsafe impl<T: Send> Sync for BoundedReceiver<T> {}

/// Creates a new Queue with the given Capacity, rounded up to the next power
/// of two
pub fn queue<T>(capacity: usize) -> (BoundedReceiver<T>, BoundedSender<T>) {
    let capacity = round_to_pow2(capacity);

    let buffer = {
        let mut tmp = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            tmp.push(UnsafeCell::new(None));
        }
        tmp.into_boxed_slice()
    };

    let ring = Arc::new(Ring {
        buffer,
        mask: capacity - 1,
        head: CachePadded::new(AtomicUsize::new(0)),
        tail: CachePadded::new(AtomicUsize::new(0)),
    });

    (
        BoundedReceiver {
            ring: ring.clone(),
            head: 0,
            cached_tail: 0,
        },
        BoundedSender {
            ring,
            tail: 0,
            cached_head: 0,
        },
    )
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    #[test]
    fn enqueue_dequeue() {
        let (mut rx, mut tx) = queue(10);

        assert_eq!(Ok(()), tx.try_enqueue(13));
        assert_eq!(Ok(13), rx.try_dequeue());
    }

    #[test]
    fn enqueue_full() {
        let (_rx, mut tx) = queue(1);

        assert_eq!(Ok(()), tx.try_enqueue(13));
        assert_eq!(Err((14, EnqueueError::Full)), tx.try_enqueue(14));
    }

    #[test]
    fn dequeue_empty() {
        let (mut rx, _tx) = queue::<usize>(1);

        assert_eq!(Err(DequeueError::Empty), rx.try_dequeue());
    }

    #[test]
    fn capacity_is_rounded_up() {
        let (rx, tx) = queue::<usize>(1000);
        assert_eq!(1024, tx.capacity());
        assert_eq!(1024, rx.capacity());

        let (_, tx) = queue::<usize>(1024);
        assert_eq!(1024, tx.capacity());
    }

    #[test]
    fn capacity_bound() {
        let (mut rx, mut tx) = queue(8);

        for i in 0..8 {
            assert_eq!(Ok(()), tx.try_enqueue(i));
        }
        assert!(tx.is_full());
        assert_eq!(Err((8, EnqueueError::Full)), tx.try_enqueue(8));

        // a single Dequeue frees exactly one Slot again
        assert_eq!(Ok(0), rx.try_dequeue());
        assert_eq!(Ok(()), tx.try_enqueue(8));
        assert_eq!(Err((9, EnqueueError::Full)), tx.try_enqueue(9));
    }

    #[test]
    fn round_trip_below_capacity() {
        let (mut rx, mut tx) = queue(16);

        for i in 0..10 {
            assert_eq!(Ok(()), tx.try_enqueue(i));
        }
        for i in 0..10 {
            assert_eq!(Ok(i), rx.try_dequeue());
        }
        assert!(rx.is_empty());
    }

    #[test]
    fn round_trip_with_wraparound() {
        let (mut rx, mut tx) = queue(3);

        // 20 Elements through a Buffer of 4 wraps around several times
        for i in 0..20 {
            assert_eq!(Ok(()), tx.try_enqueue(i));
            assert_eq!(Ok(i), rx.try_dequeue());
        }
    }

    #[test]
    fn small_buffer_interleaving() {
        let (mut rx, mut tx) = queue(8);

        for i in 0..5 {
            assert_eq!(Ok(()), tx.try_enqueue(i));
        }
        for i in 0..3 {
            assert_eq!(Ok(i), rx.try_dequeue());
        }
        for i in 5..8 {
            assert_eq!(Ok(()), tx.try_enqueue(i));
        }
        for i in 3..8 {
            assert_eq!(Ok(i), rx.try_dequeue());
        }
        assert_eq!(Err(DequeueError::Empty), rx.try_dequeue());
    }
}
