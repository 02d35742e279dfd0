//! Metric Aggregators
use crate::descriptor::Descriptor;
use crate::error::{MetricsError, Result};
use crate::number::{Number, NumberKind};

mod array;
mod ddsketch;
mod last_value;
mod min_max_sum_count;
mod sum;

pub use array::{array, array_with_limit, ArrayAggregator, DEFAULT_MAX_POINTS};
pub use ddsketch::{ddsketch, DDSketchAggregator, DDSketchConfig};
pub use last_value::{last_value, LastValueAggregator};
pub use min_max_sum_count::{min_max_sum_count, MinMaxSumCountAggregator};
pub use sum::{sum, SumAggregator};

/// RangeTest is a common routine for testing for valid input values. This
/// rejects NaN values. This rejects negative values when the metric instrument
/// does not support negative values, i.e. monotonic counters.
pub fn range_test(number: &Number, descriptor: &Descriptor) -> Result<()> {
    if descriptor.number_kind() == &NumberKind::F64 && number.is_nan() {
        return Err(MetricsError::NaNInput);
    }

    if descriptor.monotonic() && number.is_negative(descriptor.number_kind()) {
        return Err(MetricsError::NegativeInput);
    }

    Ok(())
}
