use std::thread;
use std::time::{Duration, Instant};

use scatterq::queues::{mpmc, spsc};

const RUNS: usize = 5;

const SPSC_REPETITIONS: usize = 10_000_000;
const SPSC_CAPACITY: usize = 64 * 1024;

const MPMC_REPETITIONS: usize = 4_000_000;
const MPMC_CAPACITY: usize = 64 * 2048;
const MPMC_SLOT_SPACING: usize = 8;
const MPMC_PRODUCERS: usize = 2;
const MPMC_CONSUMERS: usize = 2;

pub fn main() {
    println!(
        "spsc: 1 producer / 1 consumer, {} repetitions, capacity {}",
        SPSC_REPETITIONS, SPSC_CAPACITY
    );
    spsc_throughput();

    println!(
        "mpmc: {} producers / {} consumers, {} repetitions, capacity {}, spacing {}",
        MPMC_PRODUCERS, MPMC_CONSUMERS, MPMC_REPETITIONS, MPMC_CAPACITY, MPMC_SLOT_SPACING
    );
    mpmc_throughput();
}

fn spsc_throughput() {
    for run in 0..RUNS {
        let (mut rx, mut tx) = spsc::queue(SPSC_CAPACITY);

        let start = Instant::now();

        let consumer = thread::spawn(move || {
            for _ in 0..SPSC_REPETITIONS {
                while rx.try_dequeue().is_err() {}
            }
        });

        for i in 0..SPSC_REPETITIONS {
            while tx.try_enqueue(i).is_err() {}
        }

        consumer.join().unwrap();
        report(run, SPSC_REPETITIONS, start.elapsed());
    }
}

fn mpmc_throughput() {
    for run in 0..RUNS {
        let queue = mpmc::queue(MPMC_CAPACITY, MPMC_SLOT_SPACING);

        let start = Instant::now();

        let consumers: Vec<_> = (0..MPMC_CONSUMERS)
            .map(|_| {
                let mut handle = queue.clone();
                thread::spawn(move || {
                    for _ in 0..(MPMC_REPETITIONS / MPMC_CONSUMERS) {
                        while handle.try_dequeue().is_err() {}
                    }
                })
            })
            .collect();

        let producers: Vec<_> = (0..MPMC_PRODUCERS)
            .map(|_| {
                let mut handle = queue.clone();
                thread::spawn(move || {
                    for i in 0..(MPMC_REPETITIONS / MPMC_PRODUCERS) {
                        while handle.try_enqueue(i).is_err() {}
                    }
                })
            })
            .collect();

        for th in producers.into_iter().chain(consumers) {
            th.join().unwrap();
        }

        report(run, MPMC_REPETITIONS, start.elapsed());
    }
}

fn report(run: usize, repetitions: usize, elapsed: Duration) {
    let ops_per_sec = repetitions as f64 / elapsed.as_secs_f64();
    println!(
        "{} of {}: {:?} for {} repetitions, {:.0} ops/sec",
        run + 1,
        RUNS,
        elapsed,
        repetitions,
        ops_per_sec
    );
}
