//! Simple Metric Selectors
use crate::aggregators::{self, DDSketchConfig};
use crate::descriptor::{Descriptor, InstrumentKind};
use crate::export::{Aggregator, AggregatorSelector};
use std::sync::Arc;

/// Aggregation choices for measures. Counters always aggregate to a sum and
/// observers to their last value.
#[derive(Clone, Debug)]
pub enum Selector {
    /// Measures keep only min, max, sum and count. This selector is faster and
    /// uses less memory than the others.
    Inexpensive,
    /// Measures keep every value, so exact quantiles can be computed.
    Exact,
    /// Measures are summarized by a relative-error sketch.
    Sketch(DDSketchConfig),
}

impl AggregatorSelector for Selector {
    fn aggregator_for(&self, descriptor: &Descriptor) -> Option<Arc<dyn Aggregator + Send + Sync>> {
        match descriptor.instrument_kind() {
            InstrumentKind::Counter => Some(Arc::new(aggregators::sum())),
            InstrumentKind::Observer => Some(Arc::new(aggregators::last_value())),
            InstrumentKind::Measure => match self {
                Selector::Inexpensive => {
                    Some(Arc::new(aggregators::min_max_sum_count(descriptor)))
                }
                Selector::Exact => Some(Arc::new(aggregators::array(descriptor))),
                Selector::Sketch(config) => Some(Arc::new(aggregators::ddsketch(
                    config,
                    *descriptor.number_kind(),
                ))),
            },
        }
    }
}
