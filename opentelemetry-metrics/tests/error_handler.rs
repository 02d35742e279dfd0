use opentelemetry_metrics::export::{Processor, Record};
use opentelemetry_metrics::global;
use opentelemetry_metrics::{accumulator, KeyValue, MetricsError, Result};
use std::sync::{Arc, Mutex};

#[derive(Debug)]
struct RefusingProcessor;

impl Processor for RefusingProcessor {
    fn process(&mut self, _record: Record<'_>) -> Result<()> {
        Err(MetricsError::Other("refused".into()))
    }

    fn finished_collection(&mut self) {}
}

// Single test: the handler is process-wide.
#[test]
fn recording_errors_reach_the_global_handler() {
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    global::set_error_handler(move |err| sink.lock().unwrap().push(err)).unwrap();

    let acc = accumulator(RefusingProcessor).build();
    let counter = acc.new_f64_counter("errors.counter").unwrap();

    counter.add(-1.0, &[]);
    counter.add(f64::NAN, &[]);
    counter.add(1.0, &[KeyValue::new("", "empty key")]);

    let bound = counter.bind(&[]).unwrap();
    bound.unbind().unwrap();
    bound.add(1.0);

    counter.add(1.0, &[]);
    assert_eq!(acc.collect(), 1);

    let errors = errors.lock().unwrap();
    assert_eq!(errors.len(), 5, "{:?}", errors);
    assert!(matches!(errors[0], MetricsError::NegativeInput));
    assert!(matches!(errors[1], MetricsError::NaNInput));
    assert!(matches!(errors[2], MetricsError::InvalidLabelKey));
    assert!(matches!(errors[3], MetricsError::AlreadyUnbound));
    assert!(matches!(errors[4], MetricsError::Other(ref msg) if msg == "refused"));
}
