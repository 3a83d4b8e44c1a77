//! Cross-thread stress tests that exercise both Queues with real Threads and
//! spin-retry loops
#![cfg(not(loom))]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use scatterq::queues::{mpmc, spsc};

#[test]
fn spsc_ordered_stream() {
    const REPETITIONS: usize = 1_000_000;

    let (mut rx, mut tx) = spsc::queue(1024);

    let producer = thread::spawn(move || {
        for i in 0..REPETITIONS {
            while tx.try_enqueue(i).is_err() {}
        }
    });

    // the consumer must observe the exact sequence the producer enqueued
    for expected in 0..REPETITIONS {
        let value = loop {
            if let Ok(v) = rx.try_dequeue() {
                break v;
            }
        };
        assert_eq!(expected, value);
    }

    producer.join().unwrap();
}

#[test]
fn mpmc_conservation_under_contention() {
    const PRODUCERS: usize = 2;
    const CONSUMERS: usize = 2;
    const PER_PRODUCER: usize = 1_000_000;
    const TOTAL: usize = PRODUCERS * PER_PRODUCER;

    let queue = mpmc::queue(131_072, 8);
    let dequeued = Arc::new(AtomicUsize::new(0));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let mut handle = queue.clone();
            thread::spawn(move || {
                // every producer enqueues its own disjoint value range
                for i in 0..PER_PRODUCER {
                    let value = p * PER_PRODUCER + i;
                    while handle.try_enqueue(value).is_err() {}
                }
            })
        })
        .collect();

    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let mut handle = queue.clone();
            let dequeued = Arc::clone(&dequeued);
            thread::spawn(move || {
                let mut values = Vec::new();
                while dequeued.load(Ordering::Relaxed) < TOTAL {
                    if let Ok(value) = handle.try_dequeue() {
                        values.push(value);
                        dequeued.fetch_add(1, Ordering::Relaxed);
                    }
                }
                values
            })
        })
        .collect();

    for th in producers {
        th.join().unwrap();
    }

    let mut seen = HashSet::with_capacity(TOTAL);
    for th in consumers {
        for value in th.join().unwrap() {
            assert!(value < TOTAL, "value {} was never enqueued", value);
            assert!(seen.insert(value), "value {} was dequeued twice", value);
        }
    }

    // no loss and no duplication, the dequeued multiset matches the enqueued one
    assert_eq!(TOTAL, seen.len());
}
