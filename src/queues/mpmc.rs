//! This implements a bounded lock-free Multi-Producer Multi-Consumer Queue
//!
//! The Queue is a single shared Buffer of Slots, where every Slot is either
//! empty (a null Pointer) or holds exactly one in-flight Element. Producers
//! and Consumers claim Slots with an atomic Compare-and-Swap and every
//! Handle remembers the Slot where its last probe ended, so different
//! Threads keep working on different parts of the Buffer. Only every
//! `slot_spacing`-th Slot is actually used, which trades Buffer-Footprint
//! for fewer Cache-Lines that are shared between concurrently probing
//! Threads.
//!
//! Unlike the [`spsc`](super::spsc) Queue, this Queue makes *no* ordering
//! guarantee at all: where an Element lands depends on whichever free Slot
//! the Producer's probe reaches first, so Elements can be dequeued in any
//! order. The only guarantee is conservation, every successfully enqueued
//! Element is dequeued exactly once.
//!
//! # Example
//! ```
//! use scatterq::queues::mpmc;
//!
//! // A Queue with 16 Slots of which every 4th is used
//! let mut queue = mpmc::queue(16, 4);
//!
//! assert_eq!(Ok(()), queue.try_enqueue(13));
//! assert_eq!(Ok(13), queue.try_dequeue());
//! ```

use std::{fmt::Debug, ptr, sync::Arc};

#[cfg(not(loom))]
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

#[cfg(loom)]
use loom::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use super::{capacity::round_to_pow2, DequeueError, EnqueueError};

/// The State shared by all Handles of one Queue
struct Shared<T> {
    /// The Slots of the Queue. A null Pointer marks an empty Slot, everything
    /// else is a `Box::into_raw` Pointer to an in-flight Element
    buffer: Box<[AtomicPtr<T>]>,
    /// The Stride between two probed Slots, at least 1
    slot_spacing: usize,
    /// The number of Handles that have performed an Operation so far, used
    /// to spread the starting Cursors over the Buffer
    registered_threads: AtomicUsize,
}

impl<T> Shared<T> {
    fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// The Slot that follows the given one in the probe sequence, wrapping
    /// back to 0 at the end of the Buffer
    fn next_slot(&self, slot: usize) -> usize {
        let next = slot + self.slot_spacing;
        if next >= self.capacity() {
            0
        } else {
            next
        }
    }
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        for slot in self.buffer.iter() {
            let current = slot.load(Ordering::Relaxed);
            if !current.is_null() {
                // Safety:
                // All Handles are gone at this point, so the Queue holds the
                // only Pointer to every still enqueued Element
                unsafe { drop(Box::from_raw(current)) };
            }
        }
    }
}

/// A Handle for one Queue, used for both enqueueing and dequeueing
///
/// Every Thread working with the Queue should get its own Handle by cloning
/// an existing one. A Handle carries the Thread's probe Cursor, which is
/// assigned on its first Operation such that different Handles start their
/// probes in different parts of the Buffer
pub struct Queue<T> {
    /// The shared Buffer
    shared: Arc<Shared<T>>,
    /// The Slot where this Handle starts its next probe, `None` until the
    /// first Operation
    cursor: Option<usize>,
}

impl<T> Queue<T> {
    /// Attempts to Enqueue the given piece of Data
    ///
    /// Probes every `slot_spacing`-th Slot starting at the Handle's Cursor
    /// and claims the first empty one with a CAS. The Cursor is moved to the
    /// Slot following the last probed one, even when the probe came back
    /// around without finding a free Slot
    ///
    /// # Returns
    /// * `Ok(())` if a Slot was claimed for the Data
    /// * `Err((data, EnqueueError::Full))` if one full probe cycle found no
    /// free Slot
    pub fn try_enqueue(&mut self, data: T) -> Result<(), (T, EnqueueError)> {
        let value = Box::into_raw(Box::new(data));

        let start = self.probe_start();
        let mut slot = start;

        loop {
            let entry = &self.shared.buffer[slot];

            // The plain load is an unsynchronized hint to skip Slots that
            // look occupied without the cost of a CAS, it may be stale in
            // both directions. Only the CAS decides
            if entry.load(Ordering::Relaxed).is_null()
                && entry
                    .compare_exchange(ptr::null_mut(), value, Ordering::AcqRel, Ordering::Relaxed)
                    .is_ok()
            {
                self.cursor = Some(self.shared.next_slot(slot));
                return Ok(());
            }

            slot = self.shared.next_slot(slot);
            if slot == start {
                // looped all the way around with no free Slot
                self.cursor = Some(slot);
                // Safety:
                // The CAS never succeeded, so the Allocation is still owned
                // by this call
                let data = unsafe { *Box::from_raw(value) };
                return Err((data, EnqueueError::Full));
            }
        }
    }

    /// Attempts to Dequeue some piece of Data
    ///
    /// The counterpart to [`try_enqueue`](Self::try_enqueue): probes for a
    /// Slot that looks occupied and takes its Element out with a CAS back to
    /// the empty state
    ///
    /// # Returns
    /// * `Ok(data)` with the Element removed from the claimed Slot
    /// * `Err(DequeueError::Empty)` if one full probe cycle found no
    /// occupied Slot
    pub fn try_dequeue(&mut self) -> Result<T, DequeueError> {
        let start = self.probe_start();
        let mut slot = start;

        loop {
            let entry = &self.shared.buffer[slot];

            let current = entry.load(Ordering::Relaxed);
            if !current.is_null()
                && entry
                    .compare_exchange(current, ptr::null_mut(), Ordering::AcqRel, Ordering::Relaxed)
                    .is_ok()
            {
                self.cursor = Some(self.shared.next_slot(slot));
                // Safety:
                // The successful CAS removed the Pointer from the Buffer, so
                // ownership of the Element moved to this call
                let data = unsafe { *Box::from_raw(current) };
                return Ok(data);
            }

            slot = self.shared.next_slot(slot);
            if slot == start {
                self.cursor = Some(slot);
                return Err(DequeueError::Empty);
            }
        }
    }

    /// The Capacity of the Queue, the requested Capacity rounded up to the
    /// next power of two. Note that only every `slot_spacing`-th Slot is
    /// used, so the number of Elements the Queue can hold is smaller
    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    /// The Slot where the next probe of this Handle starts, assigning the
    /// initial Cursor on the first call
    fn probe_start(&mut self) -> usize {
        match self.cursor {
            Some(slot) => slot,
            None => {
                let slot = self.assign_cursor();
                self.cursor = Some(slot);
                slot
            }
        }
    }

    /// Picks the initial Cursor for this Handle
    ///
    /// The n-th registered Handle starts at `capacity / n` (n even) or
    /// `capacity - capacity / n` (n odd), rounded up to the next multiple of
    /// the Slot-Spacing. This spreads the starting positions over the Buffer
    /// so that fresh Threads do not all converge on Slot 0 and contend on
    /// the same Cache-Line
    fn assign_cursor(&self) -> usize {
        let capacity = self.shared.capacity();
        let spacing = self.shared.slot_spacing;

        // only the uniqueness of the ordinal matters here
        let n = self.shared.registered_threads.fetch_add(1, Ordering::Relaxed) + 1;

        let raw = if n % 2 == 0 {
            capacity / n
        } else {
            capacity - capacity / n
        };

        let rounded = ((raw + spacing - 1) / spacing) * spacing;
        if rounded >= capacity {
            0
        } else {
            rounded
        }
    }
}

impl<T> Clone for Queue<T> {
    fn clone(&self) -> Self {
        // the new Handle gets its own Cursor on its first Operation
        Self {
            shared: self.shared.clone(),
            cursor: None,
        }
    }
}

impl<T> Debug for Queue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Queue ()")
    }
}

unsafe impl<T: Send> Send for Queue<T> {}
unsafe impl<T: Send> Sync for Queue<T> {}

/// Creates a new Queue with the given Capacity, rounded up to the next power
/// of two, that probes every `slot_spacing`-th Slot
///
/// # Panics
/// Panics if `slot_spacing` is 0
pub fn queue<T>(capacity: usize, slot_spacing: usize) -> Queue<T> {
    assert!(slot_spacing > 0, "the Slot-Spacing must be at least 1");

    let capacity = round_to_pow2(capacity);

    let buffer = {
        let mut tmp = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            tmp.push(AtomicPtr::new(ptr::null_mut()));
        }
        tmp.into_boxed_slice()
    };

    Queue {
        shared: Arc::new(Shared {
            buffer,
            slot_spacing,
            registered_threads: AtomicUsize::new(0),
        }),
        cursor: None,
    }
}
