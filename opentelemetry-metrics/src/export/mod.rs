//! Metrics Export
//!
//! The seams between the accumulator and the components that decide how
//! measurements are aggregated and where the results go.
use crate::descriptor::Descriptor;
use crate::error::Result;
use crate::labels;
use crate::number::Number;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

pub mod aggregation;

use aggregation::{Aggregation, Temporality};

/// AggregatorSelector supports selecting the kind of `Aggregator` to use at
/// runtime for a specific metric instrument.
pub trait AggregatorSelector: fmt::Debug {
    /// This allocates an aggregator of a kind suitable for the instrument.
    ///
    /// When the call returns `None`, the instrument cannot be recorded and
    /// binding it fails.
    ///
    /// This must return a consistent type for a given descriptor, because
    /// aggregators only know how to checkpoint and merge with their own type.
    ///
    /// This call should not block.
    fn aggregator_for(&self, descriptor: &Descriptor) -> Option<Arc<dyn Aggregator + Send + Sync>>;
}

/// Aggregator implements a specific aggregation behavior, i.e., a behavior to
/// track a sequence of updates to an instrument.
///
/// Any aggregator may be attached to any instrument kind, the selector in use
/// decides which.
pub trait Aggregator: fmt::Debug {
    /// A read-only view of the aggregated state.
    fn aggregation(&self) -> &dyn Aggregation;

    /// Update receives a new measured value and incorporates it into the
    /// aggregation. Update calls may be called concurrently.
    ///
    /// `Descriptor::number_kind` should be consulted to determine whether the
    /// provided number is an `i64` or `f64`.
    fn update(&self, number: &Number, descriptor: &Descriptor) -> Result<()>;

    /// This method is called during collection to finish one period of
    /// aggregation by atomically saving the currently-updating state into the
    /// destination aggregator.
    ///
    /// With [`Temporality::Delta`] the source is reset in the same atomic step.
    /// Concurrent `update` calls land either before the snapshot or after it,
    /// never in neither.
    ///
    /// This method will return an `InconsistentAggregator` error if this
    /// `Aggregator` cannot be copied into the destination due to an incompatible
    /// type.
    fn checkpoint(
        &self,
        destination: &(dyn Aggregator + Send + Sync),
        descriptor: &Descriptor,
        temporality: Temporality,
    ) -> Result<()>;

    /// This combines the checkpointed state from the argument `Aggregator` into
    /// this `Aggregator`.
    fn merge(&self, other: &(dyn Aggregator + Send + Sync), descriptor: &Descriptor) -> Result<()>;

    /// Returns the implementing aggregator as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;
}

/// Processor receives the checkpointed state of every active record once per
/// collection cycle.
///
/// All methods are called from the collecting thread while the accumulator
/// holds its collection lock, so a processor never sees two cycles
/// interleaved.
pub trait Processor: fmt::Debug {
    /// Process is called once per record with a checkpointed aggregator.
    ///
    /// Errors are reported through the global error handler and do not stop
    /// the remaining records of the cycle from being processed.
    fn process(&mut self, record: Record<'_>) -> Result<()>;

    /// Called after every collection cycle, including cycles where `process`
    /// failed.
    fn finished_collection(&mut self);

    /// Access to a complete checkpoint of aggregated metrics, if this processor
    /// keeps one.
    fn checkpoint_set(&mut self) -> Option<&mut dyn CheckpointSet> {
        None
    }
}

/// CheckpointSet allows a controller or exporter to access a complete
/// checkpoint of aggregated metrics from the processor.
pub trait CheckpointSet: fmt::Debug {
    /// This iterates over aggregated checkpoints for all metrics that were
    /// processed during the last collection period. The first error returned
    /// by `f` stops the iteration and is returned to the caller.
    fn try_for_each(&mut self, f: &mut dyn FnMut(&Record<'_>) -> Result<()>) -> Result<()>;
}

/// Create a new `Record` instance.
pub fn record<'a>(
    descriptor: &'a Descriptor,
    labels: &'a labels::Set,
    aggregator: &'a Arc<dyn Aggregator + Send + Sync>,
) -> Record<'a> {
    Record::new(descriptor, labels, aggregator)
}

/// Record contains the exported data for a single metric instrument and label set.
#[derive(Debug)]
pub struct Record<'a> {
    descriptor: &'a Descriptor,
    labels: &'a labels::Set,
    aggregator: &'a Arc<dyn Aggregator + Send + Sync>,
}

impl<'a> Record<'a> {
    /// Create a new `Record` instance.
    pub fn new(
        descriptor: &'a Descriptor,
        labels: &'a labels::Set,
        aggregator: &'a Arc<dyn Aggregator + Send + Sync>,
    ) -> Self {
        Record {
            descriptor,
            labels,
            aggregator,
        }
    }

    /// The descriptor for this metric.
    pub fn descriptor(&self) -> &'a Descriptor {
        self.descriptor
    }

    /// The labels for this metric.
    pub fn labels(&self) -> &'a labels::Set {
        self.labels
    }

    /// The checkpointed aggregator for this metric.
    pub fn aggregator(&self) -> &'a Arc<dyn Aggregator + Send + Sync> {
        self.aggregator
    }
}
