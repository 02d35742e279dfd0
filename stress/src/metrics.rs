/*
    One-shot counter adds over 1000 label combinations, with a push
    controller collecting every second in the background.

    cargo run --release --bin metrics
*/

use lazy_static::lazy_static;
use opentelemetry_metrics::controllers::{self, PushController};
use opentelemetry_metrics::instruments::Counter;
use opentelemetry_metrics::selectors::simple::Selector;
use opentelemetry_metrics::{accumulator, processors, KeyValue};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::cell::RefCell;
use std::time::Duration;

mod throughput;

lazy_static! {
    static ref CONTROLLER: PushController = controllers::push(
        accumulator(processors::basic(Selector::Inexpensive)).build()
    )
    .with_interval(Duration::from_secs(1))
    .build();
    static ref COUNTER: Option<Counter<i64>> =
        CONTROLLER.accumulator().new_i64_counter("stress.requests").ok();
}

static LABEL_VALUES: [&str; 10] = [
    "value1", "value2", "value3", "value4", "value5", "value6", "value7", "value8", "value9",
    "value10",
];

thread_local! {
    static CURRENT_RNG: RefCell<SmallRng> = RefCell::new(SmallRng::from_os_rng());
}

fn main() {
    if COUNTER.is_none() {
        eprintln!("failed to create the stress counter");
        return;
    }
    throughput::test_throughput(test_counter);
}

fn test_counter() {
    let len = LABEL_VALUES.len();
    let [first, second, third] = CURRENT_RNG.with(|rng| {
        let mut rng = rng.borrow_mut();
        [
            rng.random_range(0..len),
            rng.random_range(0..len),
            rng.random_range(0..len),
        ]
    });

    // each label has 10 possible values, so there are 1000 possible combinations
    if let Some(counter) = COUNTER.as_ref() {
        counter.add(
            1,
            &[
                KeyValue::new("label1", LABEL_VALUES[first]),
                KeyValue::new("label2", LABEL_VALUES[second]),
                KeyValue::new("label3", LABEL_VALUES[third]),
            ],
        );
    }
}
