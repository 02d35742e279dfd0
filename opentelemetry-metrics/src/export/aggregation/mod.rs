//! Metrics aggregation
//!
//! Read-only views over a checkpointed aggregator. Processors reach them
//! through [`Aggregation`], testing for the strongest view first.
use std::time::SystemTime;

use crate::error::Result;
use crate::number::Number;

mod temporality;

pub use temporality::*;

/// An interface returned by an [`Aggregator`] containing an interval of metric
/// data.
///
/// [`Aggregator`]: crate::export::Aggregator
pub trait Aggregation {
    /// A short identifying string to identify the [`Aggregator`] that was used to
    /// produce the aggregation (e.g., [`AggregationKind::SUM`]).
    ///
    /// [`Aggregator`]: crate::export::Aggregator
    fn kind(&self) -> &AggregationKind;

    /// The sum view, if this aggregation keeps a sum.
    fn as_sum(&self) -> Option<&dyn Sum> {
        None
    }

    /// The last value view.
    fn as_last_value(&self) -> Option<&dyn LastValue> {
        None
    }

    /// The min/max/sum/count view.
    fn as_min_max_sum_count(&self) -> Option<&dyn MinMaxSumCount> {
        None
    }

    /// The quantile view, for sketches and exact aggregations.
    fn as_distribution(&self) -> Option<&dyn Distribution> {
        None
    }

    /// The raw points view.
    fn as_points(&self) -> Option<&dyn Points> {
        None
    }
}

/// Sum returns an aggregated sum.
pub trait Sum: Aggregation {
    /// The sum of the currently aggregated metrics
    fn sum(&self) -> Result<Number>;
}

/// Count returns the number of values that were aggregated.
pub trait Count: Aggregation {
    /// The count of the currently aggregated metrics
    fn count(&self) -> Result<u64>;
}

/// Min returns the minimum value over the set of values that were aggregated.
pub trait Min: Aggregation {
    /// The min of the currently aggregated metrics
    fn min(&self) -> Result<Number>;
}

/// Max returns the maximum value over the set of values that were aggregated.
pub trait Max: Aggregation {
    /// The max of the currently aggregated metrics
    fn max(&self) -> Result<Number>;
}

/// LastValue returns the latest value that was aggregated.
pub trait LastValue: Aggregation {
    /// The last value of the currently aggregated metrics and when it was
    /// recorded.
    fn last_value(&self) -> Result<(Number, SystemTime)>;
}

/// MinMaxSumCount supports the Min, Max, Sum, and Count interfaces.
pub trait MinMaxSumCount: Min + Max + Sum + Count {}

/// Quantile returns an exact or estimated quantile over the set of values that
/// were aggregated.
pub trait Quantile: Aggregation {
    /// The value at quantile `q`, with `q` in `[0, 1]`.
    fn quantile(&self, q: f64) -> Result<Number>;
}

/// Distribution supports the Min, Max, Sum, Count, and Quantile interfaces.
pub trait Distribution: MinMaxSumCount + Quantile {}

/// Points returns the raw set of values that were aggregated.
pub trait Points: Aggregation {
    /// Raw values, sorted ascending once checkpointed.
    fn points(&self) -> Result<Vec<Number>>;
}

/// A short name for the [`Aggregator`] that produces an [`Aggregation`].
///
/// Kind is a string to allow user-defined Aggregators.
///
/// [`Aggregator`]: crate::export::Aggregator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationKind(&'static str);

impl AggregationKind {
    /// Aggregations that return an aggregated sum.
    pub const SUM: Self = AggregationKind("SUM");

    /// Aggregations that return only the latest value.
    pub const LAST_VALUE: Self = AggregationKind("LAST_VALUE");

    /// Aggregations that return min, max, sum and count.
    pub const MIN_MAX_SUM_COUNT: Self = AggregationKind("MIN_MAX_SUM_COUNT");

    /// Aggregations that return quantile estimates from a sketch.
    pub const SKETCH: Self = AggregationKind("SKETCH");

    /// Aggregations that keep every raw value.
    pub const EXACT: Self = AggregationKind("EXACT");

    /// Create a new custom aggregation kind
    pub const fn new(name: &'static str) -> Self {
        AggregationKind(name)
    }

    /// The kind name.
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}
