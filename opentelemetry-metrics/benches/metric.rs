use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use opentelemetry_metrics::aggregators::DDSketchConfig;
use opentelemetry_metrics::export::{Processor, Record};
use opentelemetry_metrics::labels;
use opentelemetry_metrics::selectors::simple::Selector;
use opentelemetry_metrics::{accumulator, Accumulator, KeyValue, Result};
use rand::Rng;

// Run this benchmark with:
// cargo bench --bench metric

#[derive(Debug)]
struct DiscardProcessor;

impl Processor for DiscardProcessor {
    fn process(&mut self, _record: Record<'_>) -> Result<()> {
        Ok(())
    }

    fn finished_collection(&mut self) {}
}

fn new_accumulator(selector: Selector) -> Accumulator {
    accumulator(DiscardProcessor).with_selector(selector).build()
}

fn make_labels(n: usize) -> Vec<KeyValue> {
    let mut rng = rand::rng();
    (0..n)
        .map(|i| {
            KeyValue::new(
                format!("k{}", i),
                format!("v{}", rng.random_range(0..1_000_000_000u64)),
            )
        })
        .collect()
}

fn label_sets(c: &mut Criterion) {
    let mut group = c.benchmark_group("LabelSet");
    for n in [1, 2, 4, 8, 16] {
        let labels = make_labels(n);
        group.bench_with_input(BenchmarkId::new("New", n), &labels, |b, labels| {
            b.iter(|| labels::Set::new(labels))
        });
    }

    let set = labels::Set::new(&make_labels(8)).unwrap();
    group.bench_function("Iterator_8", |b| {
        b.iter(|| set.iter().map(|kv| kv.key.as_str().len()).sum::<usize>())
    });
    group.finish();
}

fn handles(c: &mut Criterion) {
    let mut group = c.benchmark_group("Handle");

    let acc = new_accumulator(Selector::Inexpensive);
    let counter = acc.new_i64_counter("acquire.new").unwrap();
    group.bench_function("AcquireNew", |b| {
        let mut i = 0i64;
        b.iter(|| {
            i += 1;
            counter.bind(&[KeyValue::new("id", i)])
        })
    });

    let counter = acc.new_i64_counter("acquire.existing").unwrap();
    let labels = make_labels(4);
    let _held = counter.bind(&labels).unwrap();
    group.bench_function("AcquireExisting", |b| b.iter(|| counter.bind(&labels)));

    let counter = acc.new_i64_counter("release").unwrap();
    group.bench_function("AcquireRelease", |b| {
        b.iter(|| {
            if let Ok(bound) = counter.bind(&labels) {
                let _ = bound.unbind();
            }
        })
    });
    group.finish();
}

fn counters(c: &mut Criterion) {
    let mut group = c.benchmark_group("Counter");
    let acc = new_accumulator(Selector::Inexpensive);
    let labels = make_labels(4);

    let i64_counter = acc.new_i64_counter("i64.counter").unwrap();
    group.bench_function("Int64Add", |b| b.iter(|| i64_counter.add(1, &labels)));
    let bound = i64_counter.bind(&labels).unwrap();
    group.bench_function("Int64AddBound", |b| b.iter(|| bound.add(1)));

    let f64_counter = acc.new_f64_counter("f64.counter").unwrap();
    group.bench_function("Float64Add", |b| b.iter(|| f64_counter.add(1.1, &labels)));
    let bound = f64_counter.bind(&labels).unwrap();
    group.bench_function("Float64AddBound", |b| b.iter(|| bound.add(1.1)));
    group.finish();
}

fn measures(c: &mut Criterion) {
    let mut group = c.benchmark_group("Measure");
    let labels = make_labels(1);
    for (name, selector) in [
        ("MinMaxSumCount", Selector::Inexpensive),
        ("Exact", Selector::Exact),
        ("DDSketch", Selector::Sketch(DDSketchConfig::default())),
    ] {
        let acc = new_accumulator(selector);
        let measure = acc.new_f64_measure("f64.measure").unwrap();
        let bound = measure.bind(&labels).unwrap();
        group.bench_function(format!("{}_Float64Record", name), |b| {
            let mut i = 0u64;
            b.iter(|| {
                i += 1;
                bound.record(i as f64);
                // The exact aggregator keeps a bounded number of points.
                if i % 4096 == 0 {
                    acc.collect();
                }
            })
        });
    }
    group.finish();
}

fn observers(c: &mut Criterion) {
    let mut group = c.benchmark_group("Observer");

    let acc = new_accumulator(Selector::Inexpensive);
    group.bench_function("Registration", |b| {
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            acc.register_i64_observer(format!("observer.{}", i), |_| {})
        })
    });

    let acc = new_accumulator(Selector::Inexpensive);
    let labels = make_labels(1);
    acc.register_f64_observer("observed", move |result| {
        for v in 0..1000 {
            result.observe(v as f64, &labels);
        }
    })
    .unwrap();
    group.bench_function("Observe1000", |b| b.iter(|| acc.collect()));
    group.finish();
}

fn batches(c: &mut Criterion) {
    let mut group = c.benchmark_group("BatchRecord");
    for instruments in [1, 2, 4, 8] {
        let acc = new_accumulator(Selector::Inexpensive);
        let labels = make_labels(8);
        let counters: Vec<_> = (0..instruments)
            .map(|i| acc.new_i64_counter(format!("batch.{}", i)).unwrap())
            .collect();
        group.bench_function(BenchmarkId::new("8Labels", instruments), |b| {
            b.iter(|| {
                acc.record_batch(&labels, counters.iter().map(|c| c.measurement(1)))
            })
        });
    }
    group.finish();
}

fn collection(c: &mut Criterion) {
    let acc = new_accumulator(Selector::Inexpensive);
    let counter = acc.new_i64_counter("collected").unwrap();
    c.bench_function("CollectTenRecords", |b| {
        b.iter(|| {
            for i in 0..10i64 {
                counter.add(1, &[KeyValue::new("K", i)]);
            }
            acc.collect()
        })
    });
}

criterion_group!(
    benches,
    label_sets,
    handles,
    counters,
    measures,
    observers,
    batches,
    collection
);
criterion_main!(benches);
