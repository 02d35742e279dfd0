use crate::descriptor::Descriptor;
use crate::error::{MetricsError, Result};
use crate::export::aggregation::{
    Aggregation, AggregationKind, Count, Max, Min, MinMaxSumCount, Sum, Temporality,
};
use crate::export::Aggregator;
use crate::number::{Number, NumberKind};
use std::any::Any;
use std::cmp::Ordering;
use std::sync::Mutex;

/// Create a new `MinMaxSumCountAggregator`
pub fn min_max_sum_count(descriptor: &Descriptor) -> MinMaxSumCountAggregator {
    MinMaxSumCountAggregator {
        inner: Mutex::new(Inner { state: None }),
        kind: *descriptor.number_kind(),
    }
}

#[derive(Debug)]
struct Inner {
    state: Option<State>,
}

/// An `Aggregator` that aggregates events that form a distribution, keeping
/// only the min, max, sum, and count.
#[derive(Debug)]
pub struct MinMaxSumCountAggregator {
    inner: Mutex<Inner>,
    kind: NumberKind,
}

impl Min for MinMaxSumCountAggregator {
    fn min(&self) -> Result<Number> {
        self.inner.lock().map_err(From::from).and_then(|inner| {
            inner
                .state
                .as_ref()
                .map(|state| state.min)
                .ok_or(MetricsError::NoDataCollected)
        })
    }
}

impl Max for MinMaxSumCountAggregator {
    fn max(&self) -> Result<Number> {
        self.inner.lock().map_err(From::from).and_then(|inner| {
            inner
                .state
                .as_ref()
                .map(|state| state.max)
                .ok_or(MetricsError::NoDataCollected)
        })
    }
}

impl Sum for MinMaxSumCountAggregator {
    fn sum(&self) -> Result<Number> {
        self.inner.lock().map_err(From::from).map(|inner| {
            inner
                .state
                .as_ref()
                .map_or(self.kind.zero(), |state| state.sum)
        })
    }
}

impl Count for MinMaxSumCountAggregator {
    fn count(&self) -> Result<u64> {
        self.inner
            .lock()
            .map_err(From::from)
            .map(|inner| inner.state.as_ref().map_or(0u64, |state| state.count))
    }
}

impl MinMaxSumCount for MinMaxSumCountAggregator {}

impl Aggregation for MinMaxSumCountAggregator {
    fn kind(&self) -> &AggregationKind {
        &AggregationKind::MIN_MAX_SUM_COUNT
    }

    fn as_sum(&self) -> Option<&dyn Sum> {
        Some(self)
    }

    fn as_min_max_sum_count(&self) -> Option<&dyn MinMaxSumCount> {
        Some(self)
    }
}

impl Aggregator for MinMaxSumCountAggregator {
    fn aggregation(&self) -> &dyn Aggregation {
        self
    }

    fn update(&self, number: &Number, descriptor: &Descriptor) -> Result<()> {
        self.inner
            .lock()
            .map(|mut inner| {
                if let Some(state) = &mut inner.state {
                    let kind = descriptor.number_kind();

                    state.count = state.count.saturating_add(1);
                    state.sum = state.sum.saturating_add(kind, *number);
                    if number.partial_cmp(kind, state.min) == Some(Ordering::Less) {
                        state.min = *number;
                    }
                    if number.partial_cmp(kind, state.max) == Some(Ordering::Greater) {
                        state.max = *number;
                    }
                } else {
                    inner.state = Some(State {
                        count: 1,
                        sum: *number,
                        min: *number,
                        max: *number,
                    })
                }
            })
            .map_err(From::from)
    }

    fn checkpoint(
        &self,
        destination: &(dyn Aggregator + Send + Sync),
        _descriptor: &Descriptor,
        temporality: Temporality,
    ) -> Result<()> {
        if let Some(other) = destination.as_any().downcast_ref::<Self>() {
            let snapshot = {
                let mut inner = self.inner.lock()?;
                if temporality.resets() {
                    inner.state.take()
                } else {
                    inner.state.clone()
                }
            };
            other.inner.lock()?.state = snapshot;
            Ok(())
        } else {
            Err(MetricsError::InconsistentAggregator(format!(
                "Expected {:?}, got: {:?}",
                self, destination
            )))
        }
    }

    fn merge(&self, aggregator: &(dyn Aggregator + Send + Sync), desc: &Descriptor) -> Result<()> {
        if let Some(other) = aggregator.as_any().downcast_ref::<Self>() {
            let incoming = match other.inner.lock()?.state.clone() {
                Some(state) => state,
                None => return Ok(()),
            };
            let mut inner = self.inner.lock()?;
            if let Some(state) = &mut inner.state {
                let kind = desc.number_kind();
                state.count = state.count.saturating_add(incoming.count);
                state.sum = state.sum.saturating_add(kind, incoming.sum);
                if state.min.partial_cmp(kind, incoming.min) == Some(Ordering::Greater) {
                    state.min = incoming.min;
                }
                if state.max.partial_cmp(kind, incoming.max) == Some(Ordering::Less) {
                    state.max = incoming.max;
                }
            } else {
                inner.state = Some(incoming);
            }
            Ok(())
        } else {
            Err(MetricsError::InconsistentAggregator(format!(
                "Expected {:?}, got: {:?}",
                self, aggregator
            )))
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Clone, Debug)]
struct State {
    count: u64,
    sum: Number,
    min: Number,
    max: Number,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::InstrumentKind;
    use rstest::rstest;

    fn measure() -> Descriptor {
        Descriptor::new("latency", InstrumentKind::Measure, NumberKind::I64)
    }

    fn record(agg: &MinMaxSumCountAggregator, values: &[i64]) {
        let descriptor = measure();
        for v in values {
            agg.update(&(*v).into(), &descriptor).unwrap();
        }
    }

    #[test]
    fn tracks_all_four_fields() {
        let agg = min_max_sum_count(&measure());
        record(&agg, &[5, -2, 9, 0]);

        let kind = NumberKind::I64;
        assert_eq!(agg.min().unwrap().to_i64(&kind), -2);
        assert_eq!(agg.max().unwrap().to_i64(&kind), 9);
        assert_eq!(agg.sum().unwrap().to_i64(&kind), 12);
        assert_eq!(agg.count().unwrap(), 4);
    }

    #[test]
    fn empty_aggregation() {
        let agg = min_max_sum_count(&measure());
        assert_eq!(agg.count().unwrap(), 0);
        assert_eq!(agg.sum().unwrap().to_i64(&NumberKind::I64), 0);
        assert!(matches!(agg.min(), Err(MetricsError::NoDataCollected)));
        assert!(matches!(agg.max(), Err(MetricsError::NoDataCollected)));
    }

    #[rstest]
    #[case(Temporality::Cumulative, 3, -2)]
    #[case(Temporality::Delta, 1, 4)]
    fn checkpoint_by_temporality(
        #[case] temporality: Temporality,
        #[case] count: u64,
        #[case] min: i64,
    ) {
        let descriptor = measure();
        let current = min_max_sum_count(&descriptor);
        let checkpoint = min_max_sum_count(&descriptor);

        record(&current, &[5, -2]);
        current
            .checkpoint(&checkpoint, &descriptor, temporality)
            .unwrap();
        assert_eq!(checkpoint.count().unwrap(), 2);

        record(&current, &[4]);
        current
            .checkpoint(&checkpoint, &descriptor, temporality)
            .unwrap();
        assert_eq!(checkpoint.count().unwrap(), count);
        assert_eq!(checkpoint.min().unwrap().to_i64(&NumberKind::I64), min);
    }

    #[test]
    fn merge_combines_states() {
        let descriptor = measure();
        let a = min_max_sum_count(&descriptor);
        let b = min_max_sum_count(&descriptor);
        record(&a, &[5, 6]);
        record(&b, &[-1, 10]);
        a.merge(&b, &descriptor).unwrap();

        let kind = NumberKind::I64;
        assert_eq!(a.min().unwrap().to_i64(&kind), -1);
        assert_eq!(a.max().unwrap().to_i64(&kind), 10);
        assert_eq!(a.sum().unwrap().to_i64(&kind), 20);
        assert_eq!(a.count().unwrap(), 4);
    }
}
