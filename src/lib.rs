#![deny(missing_docs)]
#![warn(rust_2018_idioms, missing_debug_implementations)]
//! This crate provides two bounded lock-free Queue primitives for passing
//! owned Values between Threads with minimal latency
//!
//! # Queues
//! * [`queues::spsc`]: A Single-Producer Single-Consumer Ring-Buffer that
//! preserves the order of the Elements
//! * [`queues::mpmc`]: A Multi-Producer Multi-Consumer Queue that scatters
//! its Elements over spaced out Slots and makes no ordering guarantees
//!
//! Both Queues are non-blocking: the `try_enqueue`/`try_dequeue` Operations
//! always return immediately and any retry/backoff policy is left to the
//! Caller.

pub mod queues;
