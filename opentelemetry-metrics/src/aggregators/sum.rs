use crate::descriptor::Descriptor;
use crate::error::{MetricsError, Result};
use crate::export::aggregation::{Aggregation, AggregationKind, Sum, Temporality};
use crate::export::Aggregator;
use crate::number::{AtomicNumber, Number};
use std::any::Any;

/// Create a new sum aggregator.
pub fn sum() -> SumAggregator {
    SumAggregator::default()
}

/// An aggregator for counter events.
///
/// Updates are a single compare-and-swap loop on an atomic, so recording never
/// takes a lock.
#[derive(Debug, Default)]
pub struct SumAggregator {
    value: AtomicNumber,
}

impl Sum for SumAggregator {
    fn sum(&self) -> Result<Number> {
        Ok(self.value.load())
    }
}

impl Aggregation for SumAggregator {
    fn kind(&self) -> &AggregationKind {
        &AggregationKind::SUM
    }

    fn as_sum(&self) -> Option<&dyn Sum> {
        Some(self)
    }
}

impl Aggregator for SumAggregator {
    fn aggregation(&self) -> &dyn Aggregation {
        self
    }

    fn update(&self, number: &Number, descriptor: &Descriptor) -> Result<()> {
        let kind = descriptor.number_kind();
        if descriptor.monotonic() && number.is_negative(kind) {
            return Err(MetricsError::NegativeInput);
        }
        self.value.saturating_add(kind, *number);
        Ok(())
    }

    fn checkpoint(
        &self,
        destination: &(dyn Aggregator + Send + Sync),
        descriptor: &Descriptor,
        temporality: Temporality,
    ) -> Result<()> {
        if let Some(other) = destination.as_any().downcast_ref::<Self>() {
            let snapshot = if temporality.resets() {
                self.value.swap(descriptor.number_kind().zero())
            } else {
                self.value.load()
            };
            other.value.store(snapshot);
            Ok(())
        } else {
            Err(MetricsError::InconsistentAggregator(format!(
                "Expected {:?}, got: {:?}",
                self, destination
            )))
        }
    }

    fn merge(&self, other: &(dyn Aggregator + Send + Sync), descriptor: &Descriptor) -> Result<()> {
        if let Some(other_sum) = other.as_any().downcast_ref::<Self>() {
            self.value
                .saturating_add(descriptor.number_kind(), other_sum.value.load());
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
