//! DDSketch is a fast and fully-mergeable quantile sketch with relative-error
//! guarantees.
//!
//! The detail of this algorithm can be found in <https://arxiv.org/pdf/1908.10693>
//!
//! Values are mapped to logarithmic buckets: for a relative accuracy `alpha`,
//! bucket `k` covers `(gamma^(k-1), gamma^k]` with `gamma = (1 + alpha) / (1 - alpha)`,
//! so any value reported from a bucket is within `alpha` of every value the
//! bucket holds. Positive and negative values are kept in separate stores and
//! values within `key_epsilon` of zero are counted apart.
//!
//! Each store keeps at most `max_num_bins` buckets. When a new value would
//! exceed that, the lowest buckets are collapsed together, which keeps the
//! upper quantiles accurate at the cost of the lowest ones.
use crate::descriptor::Descriptor;
use crate::error::{MetricsError, Result};
use crate::export::aggregation::{
    Aggregation, AggregationKind, Count, Distribution, Max, Min, MinMaxSumCount, Quantile, Sum,
    Temporality,
};
use crate::export::Aggregator;
use crate::number::{Number, NumberKind};
use std::any::Any;
use std::cmp::Ordering;
use std::mem;
use std::sync::RwLock;

const DEFAULT_MAX_NUM_BINS: usize = 2048;
const DEFAULT_ALPHA: f64 = 0.01;
const DEFAULT_KEY_EPSILON: f64 = 1.0e-9;
// Bucket keys are clamped to this magnitude, infinite values land in the
// outermost bucket.
const MAX_KEY: i64 = i32::MAX as i64;

/// Precision settings for [`DDSketchAggregator`].
#[derive(Clone, Debug, PartialEq)]
pub struct DDSketchConfig {
    alpha: f64,
    max_num_bins: usize,
    key_epsilon: f64,
}

impl DDSketchConfig {
    /// Create a sketch configuration.
    ///
    /// `alpha` is the relative accuracy. It must lie in `(0, 1)` and be
    /// large enough to tell neighbouring buckets apart, otherwise the default
    /// of `0.01` is used. `max_num_bins` bounds the memory of each store.
    /// Values with an absolute value at or below `key_epsilon` are treated as
    /// zero.
    pub fn new(alpha: f64, max_num_bins: usize, key_epsilon: f64) -> Self {
        let alpha = if alpha > 0.0 && alpha < 1.0 && gamma_ln(alpha) > 0.0 {
            alpha
        } else {
            DEFAULT_ALPHA
        };
        DDSketchConfig {
            alpha,
            max_num_bins: max_num_bins.max(1),
            key_epsilon: key_epsilon.abs(),
        }
    }

    /// The relative accuracy.
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// The bucket limit per store.
    pub fn max_num_bins(&self) -> usize {
        self.max_num_bins
    }
}

fn gamma(alpha: f64) -> f64 {
    (1.0 + alpha) / (1.0 - alpha)
}

fn gamma_ln(alpha: f64) -> f64 {
    gamma(alpha).ln()
}

impl Default for DDSketchConfig {
    fn default() -> Self {
        DDSketchConfig::new(DEFAULT_ALPHA, DEFAULT_MAX_NUM_BINS, DEFAULT_KEY_EPSILON)
    }
}

/// Create a new DDSketch aggregator.
pub fn ddsketch(config: &DDSketchConfig, kind: NumberKind) -> DDSketchAggregator {
    DDSketchAggregator {
        inner: RwLock::new(Inner::new(config, kind)),
    }
}

/// DDSketch quantile sketch algorithm
///
/// It can give q-quantiles with α-accurate for any 0<=q<=1
#[derive(Debug)]
pub struct DDSketchAggregator {
    inner: RwLock<Inner>,
}

impl Sum for DDSketchAggregator {
    fn sum(&self) -> Result<Number> {
        self.inner
            .read()
            .map_err(From::from)
            .map(|inner| inner.sum)
    }
}

impl Min for DDSketchAggregator {
    fn min(&self) -> Result<Number> {
        self.inner
            .read()
            .map_err(From::from)
            .and_then(|inner| inner.min_max().map(|(min, _)| min))
    }
}

impl Max for DDSketchAggregator {
    fn max(&self) -> Result<Number> {
        self.inner
            .read()
            .map_err(From::from)
            .and_then(|inner| inner.min_max().map(|(_, max)| max))
    }
}

impl Count for DDSketchAggregator {
    fn count(&self) -> Result<u64> {
        self.inner
            .read()
            .map_err(From::from)
            .map(|inner| inner.count())
    }
}

impl MinMaxSumCount for DDSketchAggregator {}

impl Quantile for DDSketchAggregator {
    fn quantile(&self, q: f64) -> Result<Number> {
        self.inner
            .read()
            .map_err(From::from)
            .and_then(|inner| inner.quantile(q))
    }
}

impl Distribution for DDSketchAggregator {}

impl Aggregation for DDSketchAggregator {
    fn kind(&self) -> &AggregationKind {
        &AggregationKind::SKETCH
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
}

impl Aggregator for DDSketchAggregator {
    fn aggregation(&self) -> &dyn Aggregation {
        self
    }

    fn update(&self, number: &Number, descriptor: &Descriptor) -> Result<()> {
        let kind = descriptor.number_kind();
        if kind == &NumberKind::F64 && number.is_nan() {
            return Err(MetricsError::NaNInput);
        }
        self.inner
            .write()
            .map_err(From::from)
            .map(|mut inner| inner.add(*number))
    }

    fn checkpoint(
        &self,
        destination: &(dyn Aggregator + Send + Sync),
        _descriptor: &Descriptor,
        temporality: Temporality,
    ) -> Result<()> {
        if let Some(other) = destination.as_any().downcast_ref::<Self>() {
            let snapshot = {
                let mut inner = self.inner.write()?;
                if temporality.resets() {
                    let fresh = Inner::new(&inner.config, inner.kind);
                    mem::replace(&mut *inner, fresh)
                } else {
                    inner.clone()
                }
            };
            *other.inner.write()? = snapshot;
            Ok(())
        } else {
            Err(MetricsError::InconsistentAggregator(format!(
                "Expected {:?}, got: {:?}",
                self, destination
            )))
        }
    }

    fn merge(&self, other: &(dyn Aggregator + Send + Sync), _descriptor: &Descriptor) -> Result<()> {
        if let Some(other) = other.as_any().downcast_ref::<Self>() {
            let incoming = other.inner.read()?.clone();
            let mut inner = self.inner.write()?;
            if inner.config != incoming.config {
                return Err(MetricsError::InconsistentAggregator(format!(
                    "Cannot merge sketches with different configurations: {:?} and {:?}",
                    inner.config, incoming.config
                )));
            }
            inner.merge(&incoming);
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

#[derive(Clone, Debug)]
struct Inner {
    config: DDSketchConfig,
    gamma: f64,
    gamma_ln: f64,
    positive: Store,
    negative: Store,
    zero_count: u64,
    sum: Number,
    min_value: Number,
    max_value: Number,
    kind: NumberKind,
}

impl Inner {
    fn new(config: &DDSketchConfig, kind: NumberKind) -> Inner {
        Inner {
            config: config.clone(),
            gamma: gamma(config.alpha),
            gamma_ln: gamma_ln(config.alpha),
            positive: Store::new(config.max_num_bins),
            negative: Store::new(config.max_num_bins),
            zero_count: 0,
            sum: kind.zero(),
            min_value: kind.max(),
            max_value: kind.min(),
            kind,
        }
    }

    fn count(&self) -> u64 {
        self.negative.count + self.zero_count + self.positive.count
    }

    fn min_max(&self) -> Result<(Number, Number)> {
        if self.count() == 0 {
            Err(MetricsError::NoDataCollected)
        } else {
            Ok((self.min_value, self.max_value))
        }
    }

    fn key(&self, magnitude: f64) -> i64 {
        ((magnitude.ln() / self.gamma_ln).ceil() as i64).clamp(-MAX_KEY, MAX_KEY)
    }

    fn value(&self, key: i64) -> f64 {
        2.0 * (key as f64 * self.gamma_ln).exp() / (1.0 + self.gamma)
    }

    fn add(&mut self, number: Number) {
        let v = number.to_f64(&self.kind);
        if v > self.config.key_epsilon {
            let key = self.key(v);
            self.positive.add(key, 1);
        } else if v < -self.config.key_epsilon {
            let key = self.key(-v);
            self.negative.add(key, 1);
        } else {
            self.zero_count += 1;
        }

        self.sum = self.sum.saturating_add(&self.kind, number);
        if number.partial_cmp(&self.kind, self.min_value) == Some(Ordering::Less) {
            self.min_value = number;
        }
        if number.partial_cmp(&self.kind, self.max_value) == Some(Ordering::Greater) {
            self.max_value = number;
        }
    }

    fn merge(&mut self, other: &Inner) {
        if other.count() == 0 {
            return;
        }
        self.positive.merge(&other.positive);
        self.negative.merge(&other.negative);
        self.zero_count += other.zero_count;
        self.sum = self.sum.saturating_add(&self.kind, other.sum);
        if other.min_value.partial_cmp(&self.kind, self.min_value) == Some(Ordering::Less) {
            self.min_value = other.min_value;
        }
        if other.max_value.partial_cmp(&self.kind, self.max_value) == Some(Ordering::Greater) {
            self.max_value = other.max_value;
        }
    }

    fn quantile(&self, q: f64) -> Result<Number> {
        if !(0.0..=1.0).contains(&q) {
            return Err(MetricsError::InvalidQuantile);
        }
        let count = self.count();
        if count == 0 {
            return Err(MetricsError::NoDataCollected);
        }

        // the extremes are tracked exactly
        if q == 0.0 {
            return Ok(self.min_value);
        } else if q == 1.0 {
            return Ok(self.max_value);
        }

        // rank is zero based, values are ordered from the most negative up
        let rank = q * (count - 1) as f64;
        let negatives = self.negative.count as f64;
        let estimate = if rank < negatives {
            // the negative store holds magnitudes, so walk it from the top
            -self.value(self.negative.key_at_rank(negatives - 1.0 - rank))
        } else if rank < negatives + self.zero_count as f64 {
            0.0
        } else {
            self.value(
                self.positive
                    .key_at_rank(rank - negatives - self.zero_count as f64),
            )
        };

        let min = self.min_value.to_f64(&self.kind);
        let max = self.max_value.to_f64(&self.kind);
        let estimate = estimate.clamp(min, max);

        Ok(match self.kind {
            NumberKind::I64 => (estimate.round() as i64).into(),
            NumberKind::F64 => estimate.into(),
        })
    }
}

/// A dense run of bucket counters starting at `min_key`.
#[derive(Clone, Debug)]
struct Store {
    bins: Vec<u64>,
    min_key: i64,
    count: u64,
    max_num_bins: usize,
}

impl Store {
    fn new(max_num_bins: usize) -> Self {
        Store {
            bins: Vec::new(),
            min_key: 0,
            count: 0,
            max_num_bins,
        }
    }

    fn max_key(&self) -> i64 {
        self.min_key
            .saturating_add(self.bins.len() as i64)
            .saturating_sub(1)
    }

    fn add(&mut self, key: i64, n: u64) {
        if n == 0 {
            return;
        }

        if self.bins.is_empty() {
            self.bins.push(0);
            self.min_key = key;
        } else if key < self.min_key {
            self.grow_left(key);
        } else if key > self.max_key() {
            self.grow_right(key);
        }

        // keys below a full window fall into the lowest bucket
        let idx = key.saturating_sub(self.min_key).max(0) as usize;
        self.bins[idx] += n;
        self.count += n;
    }

    fn grow_left(&mut self, key: i64) {
        let lowest_allowed = self
            .max_key()
            .saturating_sub(self.max_num_bins as i64)
            .saturating_add(1);
        let new_min = key.max(lowest_allowed);
        if new_min < self.min_key {
            let grow_by = self.min_key.saturating_sub(new_min) as usize;
            self.bins.splice(0..0, std::iter::repeat(0).take(grow_by));
            self.min_key = new_min;
        }
    }

    fn grow_right(&mut self, key: i64) {
        let new_len = key.saturating_sub(self.min_key).saturating_add(1) as usize;
        if new_len <= self.max_num_bins {
            self.bins.resize(new_len, 0);
            return;
        }

        let shift = new_len - self.max_num_bins;
        if shift >= self.bins.len() {
            let total: u64 = self.bins.iter().sum();
            self.bins.clear();
            self.bins.resize(self.max_num_bins, 0);
            self.bins[0] = total;
        } else {
            let collapsed: u64 = self.bins.drain(..shift).sum();
            self.bins[0] += collapsed;
            self.bins.resize(self.max_num_bins, 0);
        }
        self.min_key = key
            .saturating_sub(self.max_num_bins as i64)
            .saturating_add(1);
    }

    /// The key of the bucket holding the value at zero based `rank`.
    fn key_at_rank(&self, rank: f64) -> i64 {
        let mut seen = 0u64;
        for (idx, count) in self.bins.iter().enumerate() {
            seen += count;
            if seen as f64 > rank {
                return self.min_key.saturating_add(idx as i64);
            }
        }
        self.max_key()
    }

    fn merge(&mut self, other: &Store) {
        for (idx, count) in other.bins.iter().enumerate() {
            self.add(other.min_key.saturating_add(idx as i64), *count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::InstrumentKind;

    fn measure(kind: NumberKind) -> Descriptor {
        Descriptor::new("latency", InstrumentKind::Measure, kind)
    }

    fn relative_error(estimate: f64, expected: f64) -> f64 {
        ((estimate - expected) / expected).abs()
    }

    #[test]
    fn quantiles_within_relative_error() {
        let descriptor = measure(NumberKind::F64);
        let config = DDSketchConfig::default();
        let agg = ddsketch(&config, NumberKind::F64);
        for i in 1..=1000 {
            agg.update(&(i as f64).into(), &descriptor).unwrap();
        }

        assert_eq!(agg.count().unwrap(), 1000);
        assert_eq!(agg.sum().unwrap().to_f64(&NumberKind::F64), 500_500.0);
        assert_eq!(agg.min().unwrap().to_f64(&NumberKind::F64), 1.0);
        assert_eq!(agg.max().unwrap().to_f64(&NumberKind::F64), 1000.0);

        for (q, expected) in [(0.5, 500.5), (0.9, 900.1), (0.99, 990.01)] {
            let estimate = agg.quantile(q).unwrap().to_f64(&NumberKind::F64);
            assert!(
                relative_error(estimate, expected) <= 0.02,
                "q={} estimate={} expected={}",
                q,
                estimate,
                expected
            );
        }
        assert_eq!(agg.quantile(0.0).unwrap().to_f64(&NumberKind::F64), 1.0);
        assert_eq!(agg.quantile(1.0).unwrap().to_f64(&NumberKind::F64), 1000.0);
    }

    #[test]
    fn handles_negative_and_zero_values() {
        let descriptor = measure(NumberKind::I64);
        let agg = ddsketch(&DDSketchConfig::default(), NumberKind::I64);
        for v in [-100i64, -10, 0, 0, 10, 100, 1000] {
            agg.update(&v.into(), &descriptor).unwrap();
        }

        let kind = NumberKind::I64;
        assert_eq!(agg.quantile(0.0).unwrap().to_i64(&kind), -100);
        assert_eq!(agg.quantile(0.5).unwrap().to_i64(&kind), 0);
        let high = agg.quantile(1.0).unwrap().to_i64(&kind);
        assert_eq!(high, 1000);
        let low_mid = agg.quantile(1.0 / 6.0).unwrap().to_i64(&kind);
        assert!((-11..=-9).contains(&low_mid), "got {}", low_mid);
    }

    #[test]
    fn invalid_queries() {
        let agg = ddsketch(&DDSketchConfig::default(), NumberKind::F64);
        assert!(matches!(agg.quantile(0.5), Err(MetricsError::NoDataCollected)));
        assert!(matches!(agg.min(), Err(MetricsError::NoDataCollected)));

        agg.update(&1.0.into(), &measure(NumberKind::F64)).unwrap();
        assert!(matches!(agg.quantile(1.5), Err(MetricsError::InvalidQuantile)));
        assert!(matches!(
            agg.update(&f64::NAN.into(), &measure(NumberKind::F64)),
            Err(MetricsError::NaNInput)
        ));
    }

    #[test]
    fn merge_matches_single_sketch() {
        let descriptor = measure(NumberKind::F64);
        let config = DDSketchConfig::default();
        let whole = ddsketch(&config, NumberKind::F64);
        let left = ddsketch(&config, NumberKind::F64);
        let right = ddsketch(&config, NumberKind::F64);
        for i in 1..=500 {
            let v = (i as f64) * 0.5;
            whole.update(&v.into(), &descriptor).unwrap();
            if i % 2 == 0 {
                left.update(&v.into(), &descriptor).unwrap();
            } else {
                right.update(&v.into(), &descriptor).unwrap();
            }
        }
        left.merge(&right, &descriptor).unwrap();

        assert_eq!(left.count().unwrap(), whole.count().unwrap());
        assert_eq!(left.sum().unwrap(), whole.sum().unwrap());
        for q in [0.1, 0.5, 0.75, 0.95] {
            assert_eq!(left.quantile(q).unwrap(), whole.quantile(q).unwrap());
        }

        let coarse = ddsketch(&DDSketchConfig::new(0.05, 128, 1e-9), NumberKind::F64);
        assert!(matches!(
            left.merge(&coarse, &descriptor),
            Err(MetricsError::InconsistentAggregator(_))
        ));
    }

    #[test]
    fn bin_limit_keeps_upper_quantiles() {
        let descriptor = measure(NumberKind::F64);
        let agg = ddsketch(&DDSketchConfig::new(0.01, 64, 1e-9), NumberKind::F64);
        for exp in 0..600 {
            agg.update(&(1.02f64.powi(exp)).into(), &descriptor).unwrap();
        }
        assert_eq!(agg.count().unwrap(), 600);
        let inner = agg.inner.read().unwrap();
        assert!(inner.positive.bins.len() <= 64);
        drop(inner);

        let expected = 1.02f64.powi(593);
        let estimate = agg.quantile(0.99).unwrap().to_f64(&NumberKind::F64);
        assert!(relative_error(estimate, expected) <= 0.02);
    }

    #[test]
    fn infinite_values_use_the_outermost_buckets() {
        let descriptor = measure(NumberKind::F64);
        let agg = ddsketch(&DDSketchConfig::default(), NumberKind::F64);
        for v in [1.0, f64::INFINITY, 2.0, f64::NEG_INFINITY, 3.0] {
            agg.update(&v.into(), &descriptor).unwrap();
        }
        // the store lock is still usable
        agg.update(&4.0.into(), &descriptor).unwrap();

        let kind = NumberKind::F64;
        assert_eq!(agg.count().unwrap(), 6);
        assert_eq!(agg.min().unwrap().to_f64(&kind), f64::NEG_INFINITY);
        assert_eq!(agg.max().unwrap().to_f64(&kind), f64::INFINITY);
        assert_eq!(agg.quantile(1.0).unwrap().to_f64(&kind), f64::INFINITY);
        assert!(!agg.quantile(0.5).unwrap().to_f64(&kind).is_nan());

        let inner = agg.inner.read().unwrap();
        assert!(inner.positive.bins.len() <= DEFAULT_MAX_NUM_BINS);
        assert_eq!(inner.positive.max_key(), MAX_KEY);
        assert_eq!(inner.negative.max_key(), MAX_KEY);
    }

    #[test]
    fn merging_far_apart_stores() {
        let descriptor = measure(NumberKind::F64);
        let config = DDSketchConfig::new(0.01, 16, 1e-9);
        let small = ddsketch(&config, NumberKind::F64);
        let huge = ddsketch(&config, NumberKind::F64);
        small.update(&1.0e-6.into(), &descriptor).unwrap();
        huge.update(&f64::INFINITY.into(), &descriptor).unwrap();

        small.merge(&huge, &descriptor).unwrap();
        huge.merge(&small, &descriptor).unwrap();
        assert_eq!(small.count().unwrap(), 2);
        assert_eq!(huge.count().unwrap(), 3);
        assert!(small.inner.read().unwrap().positive.bins.len() <= 16);
    }

    #[test]
    fn unusable_alpha_falls_back_to_default() {
        for alpha in [0.0, -0.5, 1.0, f64::NAN, 1.0e-17, 1.0e-300] {
            assert_eq!(
                DDSketchConfig::new(alpha, 64, 1e-9).alpha(),
                DEFAULT_ALPHA,
                "alpha {}",
                alpha
            );
        }
        assert_eq!(DDSketchConfig::new(0.05, 64, 1e-9).alpha(), 0.05);

        let descriptor = measure(NumberKind::F64);
        let agg = ddsketch(&DDSketchConfig::new(1.0e-17, 64, 1e-9), NumberKind::F64);
        agg.update(&10.0.into(), &descriptor).unwrap();
        let median = agg.quantile(0.5).unwrap().to_f64(&NumberKind::F64);
        assert_eq!(median, 10.0);
    }

    #[test]
    fn delta_checkpoint_resets() {
        let descriptor = measure(NumberKind::F64);
        let config = DDSketchConfig::default();
        let current = ddsketch(&config, NumberKind::F64);
        let checkpoint = ddsketch(&config, NumberKind::F64);
        current.update(&3.0.into(), &descriptor).unwrap();

        current
            .checkpoint(&checkpoint, &descriptor, Temporality::Cumulative)
            .unwrap();
        assert_eq!(current.count().unwrap(), 1);
        assert_eq!(checkpoint.count().unwrap(), 1);

        current
            .checkpoint(&checkpoint, &descriptor, Temporality::Delta)
            .unwrap();
        assert_eq!(current.count().unwrap(), 0);
        assert_eq!(checkpoint.count().unwrap(), 1);
    }
}
