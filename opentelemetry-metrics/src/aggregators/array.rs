use crate::descriptor::Descriptor;
use crate::error::{MetricsError, Result};
use crate::export::aggregation::{
    Aggregation, AggregationKind, Count, Distribution, Max, Min, MinMaxSumCount, Points, Quantile,
    Sum, Temporality,
};
use crate::export::Aggregator;
use crate::number::{Number, NumberKind};
use std::any::Any;
use std::cmp::Ordering;
use std::mem;
use std::sync::Mutex;

/// The number of raw values an exact aggregator keeps per collection cycle
/// unless configured otherwise.
pub const DEFAULT_MAX_POINTS: usize = 8192;

/// Create a new `ArrayAggregator` holding up to [`DEFAULT_MAX_POINTS`] values.
pub fn array(descriptor: &Descriptor) -> ArrayAggregator {
    array_with_limit(descriptor, DEFAULT_MAX_POINTS)
}

/// Create a new `ArrayAggregator` holding up to `max_points` values per cycle.
pub fn array_with_limit(descriptor: &Descriptor, max_points: usize) -> ArrayAggregator {
    ArrayAggregator {
        inner: Mutex::new(Inner {
            sum: descriptor.number_kind().zero(),
            points: Vec::new(),
        }),
        kind: *descriptor.number_kind(),
        max_points,
    }
}

/// An aggregator which keeps every recorded value.
///
/// Every checkpoint drains the buffer regardless of temporality, and the
/// checkpointed copy is sorted so quantiles can be read from it directly.
/// Updates beyond the point limit are rejected until the next checkpoint.
#[derive(Debug)]
pub struct ArrayAggregator {
    inner: Mutex<Inner>,
    kind: NumberKind,
    max_points: usize,
}

impl Min for ArrayAggregator {
    fn min(&self) -> Result<Number> {
        self.inner.lock().map_err(Into::into).and_then(|inner| {
            inner
                .extreme(&self.kind, Ordering::Less)
                .ok_or(MetricsError::NoDataCollected)
        })
    }
}

impl Max for ArrayAggregator {
    fn max(&self) -> Result<Number> {
        self.inner.lock().map_err(Into::into).and_then(|inner| {
            inner
                .extreme(&self.kind, Ordering::Greater)
                .ok_or(MetricsError::NoDataCollected)
        })
    }
}

impl Sum for ArrayAggregator {
    fn sum(&self) -> Result<Number> {
        self.inner
            .lock()
            .map_err(Into::into)
            .map(|inner| inner.sum)
    }
}

impl Count for ArrayAggregator {
    fn count(&self) -> Result<u64> {
        self.inner
            .lock()
            .map_err(Into::into)
            .map(|inner| inner.points.len() as u64)
    }
}

impl MinMaxSumCount for ArrayAggregator {}

impl Quantile for ArrayAggregator {
    fn quantile(&self, q: f64) -> Result<Number> {
        self.inner
            .lock()
            .map_err(Into::into)
            .and_then(|inner| quantile(&inner.points, q))
    }
}

impl Distribution for ArrayAggregator {}

impl Points for ArrayAggregator {
    fn points(&self) -> Result<Vec<Number>> {
        self.inner
            .lock()
            .map_err(Into::into)
            .map(|inner| inner.points.clone())
    }
}

impl Aggregation for ArrayAggregator {
    fn kind(&self) -> &AggregationKind {
        &AggregationKind::EXACT
    }

    fn as_sum(&self) -> Option<&dyn Sum> {
        Some(self)
    }

    fn as_min_max_sum_count(&self) -> Option<&dyn MinMaxSumCount> {
        Some(self)
    }

    fn as_distribution(&self) -> Option<&dyn Distribution> {
        Some(self)
    }

    fn as_points(&self) -> Option<&dyn Points> {
        Some(self)
    }
}

impl Aggregator for ArrayAggregator {
    fn aggregation(&self) -> &dyn Aggregation {
        self
    }

    fn update(&self, number: &Number, descriptor: &Descriptor) -> Result<()> {
        let mut inner = self.inner.lock()?;
        if inner.points.len() >= self.max_points {
            return Err(MetricsError::PointsLimitReached(self.max_points));
        }
        inner.points.push(*number);
        inner.sum = inner.sum.saturating_add(descriptor.number_kind(), *number);
        Ok(())
    }

    fn checkpoint(
        &self,
        destination: &(dyn Aggregator + Send + Sync),
        descriptor: &Descriptor,
        _temporality: Temporality,
    ) -> Result<()> {
        if let Some(other) = destination.as_any().downcast_ref::<Self>() {
            let kind = descriptor.number_kind();
            let (mut points, sum) = {
                let mut inner = self.inner.lock()?;
                (
                    mem::take(&mut inner.points),
                    mem::replace(&mut inner.sum, kind.zero()),
                )
            };
            sort_points(&mut points, kind);

            let mut other = other.inner.lock()?;
            other.points = points;
            other.sum = sum;
            Ok(())
        } else {
            Err(MetricsError::InconsistentAggregator(format!(
                "Expected {:?}, got: {:?}",
                self, destination
            )))
        }
    }

    fn merge(&self, other: &(dyn Aggregator + Send + Sync), desc: &Descriptor) -> Result<()> {
        if let Some(other) = other.as_any().downcast_ref::<Self>() {
            let (other_points, other_sum) = {
                let other = other.inner.lock()?;
                (other.points.clone(), other.sum)
            };
            let kind = desc.number_kind();
            let mut inner = self.inner.lock()?;
            inner.sum = inner.sum.saturating_add(kind, other_sum);
            inner.points.extend(other_points);
            sort_points(&mut inner.points, kind);
            Ok(())
        } else {
            Err(MetricsError::InconsistentAggregator(format!(
                "Expected {:?}, got: {:?}",
                self, other
            )))
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
struct Inner {
    sum: Number,
    points: Vec<Number>,
}

impl Inner {
    fn extreme(&self, kind: &NumberKind, wanted: Ordering) -> Option<Number> {
        self.points.iter().copied().reduce(|best, n| {
            if n.partial_cmp(kind, best) == Some(wanted) {
                n
            } else {
                best
            }
        })
    }
}

fn sort_points(points: &mut [Number], kind: &NumberKind) {
    match kind {
        NumberKind::I64 => points.sort_by_key(|n| n.to_i64(kind)),
        NumberKind::F64 => points.sort_by(|a, b| a.to_f64(kind).total_cmp(&b.to_f64(kind))),
    }
}

/// Reads quantile `q` from sorted points.
fn quantile(points: &[Number], q: f64) -> Result<Number> {
    if points.is_empty() {
        return Err(MetricsError::NoDataCollected);
    }

    if !(0.0..=1.0).contains(&q) {
        return Err(MetricsError::InvalidQuantile);
    }

    let position = (points.len() as f64 - 1.0) * q;
    Ok(points[position.ceil() as usize])
}
