//! This module provides the two bounded Queue flavors of this Crate
//!
//! # SPSC
//! The [`spsc`] Queue has exactly one Producer and one Consumer and preserves
//! the order of its Elements, making it useful for pipelining work between
//! two Threads
//!
//! # MPMC
//! The [`mpmc`] Queue is shared by any number of Producers and Consumers and
//! trades the FIFO order for throughput that scales with the number of Cores

pub(crate) mod capacity;

pub mod mpmc;
pub mod spsc;

/// The Error for the Enqueue Operation
#[derive(Debug, PartialEq)]
pub enum EnqueueError {
    /// This means that the Queue is full and the Element could not be
    /// inserted in this Moment
    Full,
}

/// The Error for the Dequeue Operation
#[derive(Debug, PartialEq)]
pub enum DequeueError {
    /// This indicates that no Data could be dequeued as the Queue was
    /// observed empty
    Empty,
}
