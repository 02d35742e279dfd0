//! Instrument front-ends.
//!
//! Counters and measures record synchronously, either one-shot with a label
//! list or through a bound handle that skips the label lookup. Observers
//! report values from a callback run during collection.
use crate::accumulator::{Accumulator, AccumulatorCore, InstrumentCore, Record};
use crate::common::KeyValue;
use crate::descriptor::Descriptor;
use crate::error::{MetricsError, Result};
use crate::global;
use crate::labels;
use crate::number::Number;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// An untyped synchronous instrument registered with an [`Accumulator`].
#[derive(Clone)]
pub struct SyncInstrument {
    instrument: Arc<InstrumentCore>,
    accumulator: Accumulator,
}

impl fmt::Debug for SyncInstrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncInstrument")
            .field("descriptor", &self.instrument.descriptor)
            .finish()
    }
}

impl SyncInstrument {
    pub(crate) fn new(instrument: Arc<InstrumentCore>, accumulator: Accumulator) -> Self {
        SyncInstrument {
            instrument,
            accumulator,
        }
    }

    /// The descriptor this instrument was registered with.
    pub fn descriptor(&self) -> &Descriptor {
        &self.instrument.descriptor
    }

    pub(crate) fn accumulator(&self) -> &Accumulator {
        &self.accumulator
    }

    /// Record one value under `labels` without keeping a handle.
    ///
    /// Failures are reported to the global error handler.
    pub fn record(&self, number: Number, labels: &[KeyValue]) {
        if self.accumulator.0.is_shutdown() {
            return;
        }
        match labels::Set::new(labels) {
            Ok(labels) => self.record_with_labels(number, &labels),
            Err(err) => global::handle_error(err),
        }
    }

    pub(crate) fn record_with_labels(&self, number: Number, labels: &labels::Set) {
        if self.accumulator.0.is_shutdown() {
            return;
        }
        match self
            .accumulator
            .0
            .acquire_record(&self.instrument, labels, false)
        {
            Ok(record) => {
                record.record_one(number);
                record.refs.unref();
            }
            Err(err) => global::handle_error(err),
        }
    }

    /// Bind `labels` to this instrument, returning a handle that records
    /// without looking the labels up again.
    ///
    /// Binding the same labels twice yields handles sharing one aggregator.
    pub fn bind(&self, labels: &[KeyValue]) -> Result<BoundSyncInstrument> {
        let labels = labels::Set::new(labels)?;
        let record = self
            .accumulator
            .0
            .acquire_record(&self.instrument, &labels, false)?;

        Ok(BoundSyncInstrument {
            record,
            accumulator: self.accumulator.0.clone(),
            unbound: AtomicBool::new(false),
        })
    }

    /// Pair `number` with this instrument for use in
    /// [`Accumulator::record_batch`].
    pub fn measurement(&self, number: Number) -> Measurement {
        Measurement {
            number,
            instrument: self.clone(),
        }
    }
}

/// A synchronous instrument bound to one label set.
///
/// The handle keeps its registry record alive until it is unbound or dropped.
pub struct BoundSyncInstrument {
    record: Arc<Record>,
    accumulator: Arc<AccumulatorCore>,
    unbound: AtomicBool,
}

impl fmt::Debug for BoundSyncInstrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundSyncInstrument")
            .field("descriptor", &self.record.instrument.descriptor)
            .field("labels", &self.record.labels)
            .field("unbound", &self.unbound.load(Ordering::Relaxed))
            .finish()
    }
}

impl BoundSyncInstrument {
    /// Record one value on the bound label set.
    pub fn record_one(&self, number: Number) {
        if self.unbound.load(Ordering::Acquire) {
            return global::handle_error(MetricsError::AlreadyUnbound);
        }
        if self.accumulator.is_shutdown() {
            return;
        }
        self.record.record_one(number)
    }

    /// Release this handle's reference. Values already recorded are still
    /// reported at the next collection.
    ///
    /// Returns [`MetricsError::AlreadyUnbound`] if called more than once; the
    /// reference count is only released the first time.
    pub fn unbind(&self) -> Result<()> {
        if self.unbound.swap(true, Ordering::AcqRel) {
            return Err(MetricsError::AlreadyUnbound);
        }
        self.record.refs.unref();
        Ok(())
    }

    /// The labels this handle is bound to.
    pub fn labels(&self) -> &labels::Set {
        &self.record.labels
    }
}

impl Drop for BoundSyncInstrument {
    fn drop(&mut self) {
        if !self.unbound.swap(true, Ordering::AcqRel) {
            self.record.refs.unref();
        }
    }
}

/// A value paired with the instrument it belongs to, see
/// [`Accumulator::record_batch`].
#[derive(Debug)]
pub struct Measurement {
    number: Number,
    instrument: SyncInstrument,
}

impl Measurement {
    /// The value to record.
    pub fn number(&self) -> Number {
        self.number
    }

    /// The instrument the value is recorded on.
    pub fn instrument(&self) -> &SyncInstrument {
        &self.instrument
    }
}

/// A monotonic instrument that accepts increments.
#[derive(Clone)]
pub struct Counter<T> {
    instrument: SyncInstrument,
    _marker: PhantomData<T>,
}

impl<T> fmt::Debug for Counter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Counter<{}>({})",
            std::any::type_name::<T>(),
            self.instrument.descriptor().name()
        )
    }
}

impl<T: Into<Number>> Counter<T> {
    pub(crate) fn new(instrument: SyncInstrument) -> Self {
        Counter {
            instrument,
            _marker: PhantomData,
        }
    }

    /// Add `value` under `labels`. Negative values are rejected.
    pub fn add(&self, value: T, labels: &[KeyValue]) {
        self.instrument.record(value.into(), labels)
    }

    /// Bind `labels` for repeated adds.
    pub fn bind(&self, labels: &[KeyValue]) -> Result<BoundCounter<T>> {
        self.instrument.bind(labels).map(|bound| BoundCounter {
            bound,
            _marker: PhantomData,
        })
    }

    /// A measurement of `value` for [`Accumulator::record_batch`].
    pub fn measurement(&self, value: T) -> Measurement {
        self.instrument.measurement(value.into())
    }

    /// The descriptor this counter was registered with.
    pub fn descriptor(&self) -> &Descriptor {
        self.instrument.descriptor()
    }
}

/// A counter bound to one label set.
#[derive(Debug)]
pub struct BoundCounter<T> {
    bound: BoundSyncInstrument,
    _marker: PhantomData<T>,
}

impl<T: Into<Number>> BoundCounter<T> {
    /// Add `value` to the bound label set.
    pub fn add(&self, value: T) {
        self.bound.record_one(value.into())
    }

    /// See [`BoundSyncInstrument::unbind`].
    pub fn unbind(&self) -> Result<()> {
        self.bound.unbind()
    }
}

/// An instrument recording arbitrary values, e.g. latencies.
#[derive(Clone)]
pub struct Measure<T> {
    instrument: SyncInstrument,
    _marker: PhantomData<T>,
}

impl<T> fmt::Debug for Measure<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Measure<{}>({})",
            std::any::type_name::<T>(),
            self.instrument.descriptor().name()
        )
    }
}

impl<T: Into<Number>> Measure<T> {
    pub(crate) fn new(instrument: SyncInstrument) -> Self {
        Measure {
            instrument,
            _marker: PhantomData,
        }
    }

    /// Record `value` under `labels`.
    pub fn record(&self, value: T, labels: &[KeyValue]) {
        self.instrument.record(value.into(), labels)
    }

    /// Bind `labels` for repeated records.
    pub fn bind(&self, labels: &[KeyValue]) -> Result<BoundMeasure<T>> {
        self.instrument.bind(labels).map(|bound| BoundMeasure {
            bound,
            _marker: PhantomData,
        })
    }

    /// A measurement of `value` for [`Accumulator::record_batch`].
    pub fn measurement(&self, value: T) -> Measurement {
        self.instrument.measurement(value.into())
    }

    /// The descriptor this measure was registered with.
    pub fn descriptor(&self) -> &Descriptor {
        self.instrument.descriptor()
    }
}

/// A measure bound to one label set.
#[derive(Debug)]
pub struct BoundMeasure<T> {
    bound: BoundSyncInstrument,
    _marker: PhantomData<T>,
}

impl<T: Into<Number>> BoundMeasure<T> {
    /// Record `value` on the bound label set.
    pub fn record(&self, value: T) {
        self.bound.record_one(value.into())
    }

    /// See [`BoundSyncInstrument::unbind`].
    pub fn unbind(&self) -> Result<()> {
        self.bound.unbind()
    }
}

/// A registered observer. Its callback runs once per collection for as long as
/// the accumulator lives.
pub struct Observer<T> {
    pub(crate) instrument: Arc<InstrumentCore>,
    pub(crate) _marker: PhantomData<T>,
}

impl<T> fmt::Debug for Observer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Observer<{}>({})",
            std::any::type_name::<T>(),
            self.instrument.descriptor.name()
        )
    }
}

impl<T> Observer<T> {
    /// The descriptor this observer was registered with.
    pub fn descriptor(&self) -> &Descriptor {
        &self.instrument.descriptor
    }
}

/// Passed to observer callbacks to report the current values.
pub struct ObserverResult<'a, T> {
    core: &'a AccumulatorCore,
    instrument: &'a Arc<InstrumentCore>,
    _marker: PhantomData<T>,
}

impl<T> fmt::Debug for ObserverResult<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverResult")
            .field("descriptor", &self.instrument.descriptor)
            .finish()
    }
}

impl<'a, T: Into<Number>> ObserverResult<'a, T> {
    pub(crate) fn new(core: &'a AccumulatorCore, instrument: &'a Arc<InstrumentCore>) -> Self {
        ObserverResult {
            core,
            instrument,
            _marker: PhantomData,
        }
    }

    /// Report `value` for `labels` in the current collection.
    ///
    /// Observations are not kept across collections. When the same labels are
    /// observed more than once in one callback the last value wins.
    pub fn observe(&self, value: T, labels: &[KeyValue]) {
        let labels = match labels::Set::new(labels) {
            Ok(labels) => labels,
            Err(err) => return global::handle_error(err),
        };
        match self.core.acquire_record(self.instrument, &labels, true) {
            Ok(record) => {
                record.record_one(value.into());
                record.refs.unref();
            }
            Err(err) => global::handle_error(err),
        }
    }
}
