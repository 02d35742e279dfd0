/*
    Adds through pre-bound counter handles, skipping the label lookup.

    cargo run --release --bin metrics_bound
*/

use lazy_static::lazy_static;
use opentelemetry_metrics::instruments::BoundCounter;
use opentelemetry_metrics::selectors::simple::Selector;
use opentelemetry_metrics::{accumulator, processors, Accumulator, KeyValue};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::cell::RefCell;

mod throughput;

lazy_static! {
    static ref ACCUMULATOR: Accumulator =
        accumulator(processors::basic(Selector::Inexpensive)).build();
    static ref HANDLES: Vec<BoundCounter<i64>> = bind_handles();
}

thread_local! {
    static CURRENT_RNG: RefCell<SmallRng> = RefCell::new(SmallRng::from_os_rng());
}

fn bind_handles() -> Vec<BoundCounter<i64>> {
    let counter = match ACCUMULATOR.new_i64_counter("stress.bound") {
        Ok(counter) => counter,
        Err(err) => {
            eprintln!("failed to create the stress counter: {}", err);
            return Vec::new();
        }
    };
    (0..10i64)
        .filter_map(|i| counter.bind(&[KeyValue::new("shard", i)]).ok())
        .collect()
}

fn main() {
    if HANDLES.is_empty() {
        return;
    }
    std::thread::spawn(|| loop {
        std::thread::sleep(std::time::Duration::from_secs(1));
        ACCUMULATOR.collect();
    });
    throughput::test_throughput(test_bound_counter);
}

fn test_bound_counter() {
    let index = CURRENT_RNG.with(|rng| rng.borrow_mut().random_range(0..HANDLES.len()));
    HANDLES[index].add(1);
}
