//! The accumulator owns every live record and drives collection.
use crate::common::KeyValue;
use crate::descriptor::{Descriptor, InstrumentKind};
use crate::error::{MetricsError, Result};
use crate::export::aggregation::Temporality;
use crate::export::{self, Aggregator, AggregatorSelector, CheckpointSet, Processor};
use crate::global;
use crate::instruments::{
    Counter, Measure, Measurement, Observer, ObserverResult, SyncInstrument,
};
use crate::labels;
use crate::number::{Number, NumberKind};
use crate::selectors::simple::Selector;
use crate::{otel_debug, otel_info, otel_warn};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::any::Any;
use std::borrow::Cow;
use std::cell::Cell;
use std::env;
use std::fmt;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

mod record;

pub(crate) use record::{InstrumentCore, MapKey, Record, RefcountMapped};

/// Environment variable selecting the default [`Temporality`], either
/// `cumulative` or `delta`.
pub const OTEL_METRICS_TEMPORALITY: &str = "OTEL_METRICS_TEMPORALITY";

type Registry = DashMap<MapKey, Arc<Record>, fnv::FnvBuildHasher>;
type Retained = DashMap<MapKey, Arc<dyn Aggregator + Send + Sync>, fnv::FnvBuildHasher>;
type ObserverCallback = Box<dyn Fn(&AccumulatorCore, &Arc<InstrumentCore>) + Send + Sync>;

thread_local! {
    /// Set while this thread runs observer callbacks.
    static IN_OBSERVER: Cell<bool> = Cell::new(false);
}

/// Whether the calling thread is inside an observer callback.
pub(crate) fn in_observer() -> bool {
    IN_OBSERVER.with(Cell::get)
}

struct ObserverScope;

impl ObserverScope {
    fn enter() -> Self {
        IN_OBSERVER.with(|flag| flag.set(true));
        ObserverScope
    }
}

impl Drop for ObserverScope {
    fn drop(&mut self) {
        IN_OBSERVER.with(|flag| flag.set(false));
    }
}

fn panic_message<'a>(payload: &'a (dyn Any + Send + 'static)) -> &'a str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Creates a new accumulator builder sending checkpoints to `processor`.
pub fn accumulator<P>(processor: P) -> AccumulatorBuilder
where
    P: Processor + Send + 'static,
{
    AccumulatorBuilder {
        processor: Box::new(processor),
        selector: Arc::new(Selector::Inexpensive),
        temporality: None,
    }
}

/// Configuration for an accumulator
#[derive(Debug)]
pub struct AccumulatorBuilder {
    processor: Box<dyn Processor + Send>,
    selector: Arc<dyn AggregatorSelector + Send + Sync>,
    temporality: Option<Temporality>,
}

impl AccumulatorBuilder {
    /// The selector choosing an aggregator for each new record.
    ///
    /// Defaults to [`Selector::Inexpensive`].
    pub fn with_selector<S>(self, selector: S) -> Self
    where
        S: AggregatorSelector + Send + Sync + 'static,
    {
        AccumulatorBuilder {
            selector: Arc::new(selector),
            ..self
        }
    }

    /// Whether checkpoints keep or reset aggregated state.
    ///
    /// Defaults to the value of `OTEL_METRICS_TEMPORALITY`, or
    /// [`Temporality::Cumulative`] when unset.
    pub fn with_temporality(self, temporality: Temporality) -> Self {
        AccumulatorBuilder {
            temporality: Some(temporality),
            ..self
        }
    }

    /// Create a new accumulator from this configuration
    pub fn build(self) -> Accumulator {
        let temporality = self.temporality.unwrap_or_else(temporality_from_env);
        otel_debug!(
            name: "Accumulator.Built",
            temporality = format!("{:?}", temporality)
        );
        Accumulator(Arc::new(AccumulatorCore {
            current: DashMap::with_hasher(fnv::FnvBuildHasher::default()),
            retained: DashMap::with_hasher(fnv::FnvBuildHasher::default()),
            instruments: DashMap::new(),
            async_instruments: Mutex::new(Vec::new()),
            processor: Mutex::new(self.processor),
            selector: self.selector,
            temporality,
            next_instrument_id: AtomicU64::new(0),
            is_shutdown: AtomicBool::new(false),
        }))
    }
}

fn temporality_from_env() -> Temporality {
    match env::var(OTEL_METRICS_TEMPORALITY) {
        Ok(value) => value.parse().unwrap_or_else(|err: MetricsError| {
            otel_warn!(
                name: "Accumulator.InvalidTemporality",
                error = format!("{}", err)
            );
            Temporality::default()
        }),
        Err(_) => Temporality::default(),
    }
}

/// Accumulator is the SDK coordinator: it creates instruments, owns the
/// registry of records behind them and runs collection cycles against its
/// single [`Processor`].
///
/// Push-based setups call [`Accumulator::collect`] on a timer, see
/// [`PushController`]. Pull-based setups call it when a pull request arrives.
///
/// Cloning an accumulator is cheap and every clone shares the same state.
///
/// [`PushController`]: crate::controllers::PushController
#[derive(Clone, Debug)]
pub struct Accumulator(pub(crate) Arc<AccumulatorCore>);

pub(crate) struct AsyncInstrument {
    instrument: Arc<InstrumentCore>,
    callback: ObserverCallback,
}

pub(crate) struct AccumulatorCore {
    /// A concurrent map of current sync instrument state.
    current: Registry,
    /// Cumulative state of reclaimed records, folded back into the record
    /// that next takes their key.
    retained: Retained,
    /// Registered instrument names.
    instruments: DashMap<String, Descriptor>,
    /// Observers in the order they were registered.
    async_instruments: Mutex<Vec<Arc<AsyncInstrument>>>,
    /// The configured processor, locked for the duration of a collection.
    processor: Mutex<Box<dyn Processor + Send>>,
    selector: Arc<dyn AggregatorSelector + Send + Sync>,
    temporality: Temporality,
    next_instrument_id: AtomicU64,
    is_shutdown: AtomicBool,
}

impl fmt::Debug for AccumulatorCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccumulatorCore")
            .field("records", &self.current.len())
            .field("retained", &self.retained.len())
            .field("instruments", &self.instruments.len())
            .field("selector", &self.selector)
            .field("temporality", &self.temporality)
            .field("is_shutdown", &self.is_shutdown.load(Ordering::Relaxed))
            .finish()
    }
}

impl Accumulator {
    /// Create a new integer counter.
    pub fn new_i64_counter<T>(&self, name: T) -> Result<Counter<i64>>
    where
        T: Into<Cow<'static, str>>,
    {
        self.new_sync_instrument(Descriptor::new(name, InstrumentKind::Counter, NumberKind::I64))
            .map(Counter::new)
    }

    /// Create a new floating point counter.
    pub fn new_f64_counter<T>(&self, name: T) -> Result<Counter<f64>>
    where
        T: Into<Cow<'static, str>>,
    {
        self.new_sync_instrument(Descriptor::new(name, InstrumentKind::Counter, NumberKind::F64))
            .map(Counter::new)
    }

    /// Create a new integer measure.
    pub fn new_i64_measure<T>(&self, name: T) -> Result<Measure<i64>>
    where
        T: Into<Cow<'static, str>>,
    {
        self.new_sync_instrument(Descriptor::new(name, InstrumentKind::Measure, NumberKind::I64))
            .map(Measure::new)
    }

    /// Create a new floating point measure.
    pub fn new_f64_measure<T>(&self, name: T) -> Result<Measure<f64>>
    where
        T: Into<Cow<'static, str>>,
    {
        self.new_sync_instrument(Descriptor::new(name, InstrumentKind::Measure, NumberKind::F64))
            .map(Measure::new)
    }

    /// Create a synchronous instrument from a full descriptor, e.g. one carrying
    /// a description or unit.
    pub fn new_sync_instrument(&self, descriptor: Descriptor) -> Result<SyncInstrument> {
        if !descriptor.instrument_kind().synchronous() {
            return Err(MetricsError::Config(format!(
                "{:?} is not a synchronous instrument kind",
                descriptor.instrument_kind()
            )));
        }
        let instrument = self.0.register(descriptor)?;
        Ok(SyncInstrument::new(instrument, self.clone()))
    }

    /// Register an integer observer. `callback` runs once per collection and
    /// reports the current values through its [`ObserverResult`].
    pub fn register_i64_observer<T, F>(&self, name: T, callback: F) -> Result<Observer<i64>>
    where
        T: Into<Cow<'static, str>>,
        F: Fn(&ObserverResult<'_, i64>) + Send + Sync + 'static,
    {
        self.register_observer(
            Descriptor::new(name, InstrumentKind::Observer, NumberKind::I64),
            callback,
        )
    }

    /// Register a floating point observer.
    pub fn register_f64_observer<T, F>(&self, name: T, callback: F) -> Result<Observer<f64>>
    where
        T: Into<Cow<'static, str>>,
        F: Fn(&ObserverResult<'_, f64>) + Send + Sync + 'static,
    {
        self.register_observer(
            Descriptor::new(name, InstrumentKind::Observer, NumberKind::F64),
            callback,
        )
    }

    /// Register an observer from a full descriptor.
    ///
    /// Callbacks run on the collecting thread while the cycle is in progress.
    /// Calling [`Accumulator::collect`], [`Accumulator::shutdown`] or
    /// [`Accumulator::checkpoint_set`] from a callback is refused with
    /// [`MetricsError::CollectInObserver`]. A panicking callback is reported to
    /// the error handler and the cycle continues with the next observer.
    pub fn register_observer<N, F>(&self, descriptor: Descriptor, callback: F) -> Result<Observer<N>>
    where
        N: Into<Number>,
        F: Fn(&ObserverResult<'_, N>) + Send + Sync + 'static,
    {
        if !descriptor.instrument_kind().asynchronous() {
            return Err(MetricsError::Config(format!(
                "{:?} is not an observer instrument kind",
                descriptor.instrument_kind()
            )));
        }
        let instrument = self.0.register(descriptor)?;
        let callback: ObserverCallback = Box::new(
            move |core: &AccumulatorCore, instrument: &Arc<InstrumentCore>| {
                callback(&ObserverResult::new(core, instrument))
            },
        );
        self.0
            .async_instruments
            .lock()?
            .push(Arc::new(AsyncInstrument {
                instrument: instrument.clone(),
                callback,
            }));
        otel_debug!(
            name: "Accumulator.ObserverRegistered",
            instrument = instrument.descriptor.name()
        );

        Ok(Observer {
            instrument,
            _marker: PhantomData,
        })
    }

    /// Record several measurements under one label set. The labels are
    /// normalized once and each measurement then updates its own instrument.
    ///
    /// A measurement that fails is reported to the error handler and does not
    /// prevent the others from being recorded.
    pub fn record_batch<I>(&self, labels: &[KeyValue], measurements: I)
    where
        I: IntoIterator<Item = Measurement>,
    {
        if self.0.is_shutdown() {
            return;
        }
        let labels = match labels::Set::new(labels) {
            Ok(labels) => labels,
            Err(err) => return global::handle_error(err),
        };

        for measurement in measurements {
            let instrument = measurement.instrument();
            if !Arc::ptr_eq(&instrument.accumulator().0, &self.0) {
                global::handle_error(MetricsError::Other(format!(
                    "measurement for {:?} belongs to a different accumulator",
                    instrument.descriptor().name()
                )));
                continue;
            }
            instrument.record_with_labels(measurement.number(), &labels);
        }
    }

    /// Run one collection cycle: invoke observers, checkpoint every record
    /// that has updates or live handles, hand each to the processor, reclaim
    /// records nobody references any more and finally signal the processor
    /// that the cycle finished.
    ///
    /// Concurrent calls are serialized. Returns the number of records
    /// checkpointed.
    pub fn collect(&self) -> usize {
        if self.0.is_shutdown() {
            return 0;
        }
        self.0.collect()
    }

    /// Run a final collection and stop accepting measurements.
    ///
    /// Recording on any instrument of this accumulator is a no-op afterwards.
    pub fn shutdown(&self) -> Result<()> {
        if in_observer() {
            return Err(MetricsError::CollectInObserver);
        }
        if self.0.is_shutdown.swap(true, Ordering::AcqRel) {
            return Err(MetricsError::AlreadyShutdown);
        }
        let checkpointed = self.0.collect();
        otel_info!(name: "Accumulator.Shutdown", checkpointed = checkpointed);
        Ok(())
    }

    /// Give `f` access to the processor's checkpoint set. Returns `Ok(None)`
    /// if the processor does not keep one.
    pub fn checkpoint_set<F, T>(&self, f: F) -> Result<Option<T>>
    where
        F: FnOnce(&mut dyn CheckpointSet) -> T,
    {
        if in_observer() {
            return Err(MetricsError::CollectInObserver);
        }
        let mut processor = self.0.processor.lock()?;
        Ok(processor.checkpoint_set().map(f))
    }

    /// The number of records currently held in the registry.
    pub fn record_count(&self) -> usize {
        self.0.current.len()
    }

    /// The temporality checkpoints are taken with.
    pub fn temporality(&self) -> Temporality {
        self.0.temporality
    }
}

impl AccumulatorCore {
    pub(crate) fn is_shutdown(&self) -> bool {
        self.is_shutdown.load(Ordering::Acquire)
    }

    fn register(&self, descriptor: Descriptor) -> Result<Arc<InstrumentCore>> {
        if descriptor.name().is_empty() {
            return Err(MetricsError::InvalidInstrumentName(
                descriptor.name().to_string(),
            ));
        }

        match self.instruments.entry(descriptor.name().to_string()) {
            Entry::Occupied(_) => Err(MetricsError::DuplicateInstrument(
                descriptor.name().to_string(),
            )),
            Entry::Vacant(entry) => {
                entry.insert(descriptor.clone());
                otel_debug!(
                    name: "Accumulator.InstrumentCreated",
                    instrument = descriptor.name(),
                    kind = format!("{:?}", descriptor.instrument_kind())
                );
                Ok(Arc::new(InstrumentCore {
                    id: self.next_instrument_id.fetch_add(1, Ordering::Relaxed),
                    descriptor,
                }))
            }
        }
    }

    /// Find the record for `labels` or create it, returning it with one
    /// reference taken for the caller.
    pub(crate) fn acquire_record(
        &self,
        instrument: &Arc<InstrumentCore>,
        labels: &labels::Set,
        transient: bool,
    ) -> Result<Arc<Record>> {
        let key = MapKey {
            instrument_id: instrument.id,
            labels: labels.equivalent().clone(),
        };

        loop {
            let existing = self.current.get(&key).map(|entry| entry.value().clone());
            if let Some(record) = existing {
                if record.refs.try_ref() {
                    return Ok(record);
                }
                // The collector unmapped this record and is about to remove it.
                self.current
                    .remove_if(&key, |_, mapped| Arc::ptr_eq(mapped, &record));
                continue;
            }

            let descriptor = &instrument.descriptor;
            let (current, checkpoint) = match (
                self.selector.aggregator_for(descriptor),
                self.selector.aggregator_for(descriptor),
            ) {
                (Some(current), Some(checkpoint)) => (current, checkpoint),
                _ => {
                    return Err(MetricsError::NoAggregator(
                        descriptor.name().to_string(),
                    ))
                }
            };

            let record = Arc::new(Record {
                refs: RefcountMapped::referenced(),
                update_count: AtomicU64::new(0),
                collected_count: AtomicU64::new(0),
                labels: labels.clone(),
                instrument: instrument.clone(),
                current,
                checkpoint,
                transient,
            });

            match self.current.entry(key.clone()) {
                // Lost the race to another thread, drop ours and use theirs.
                Entry::Occupied(_) => continue,
                Entry::Vacant(entry) => {
                    // Continue the total of a reclaimed record for this key.
                    if let Some((_, prior)) = self.retained.remove(&key) {
                        if let Err(err) = record.current.merge(prior.as_ref(), descriptor) {
                            global::handle_error(err);
                        }
                    }
                    entry.insert(record.clone());
                    return Ok(record);
                }
            }
        }
    }

    fn collect(&self) -> usize {
        if in_observer() {
            global::handle_error(MetricsError::CollectInObserver);
            return 0;
        }
        let mut processor = match self.processor.lock() {
            Ok(processor) => processor,
            Err(err) => {
                global::handle_error(err);
                return 0;
            }
        };

        let observers = self.observe_async_instruments();
        otel_debug!(name: "Accumulator.CollectStarted", observers = observers);

        let records: Vec<(MapKey, Arc<Record>)> = self
            .current
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let mut checkpointed = 0;
        let mut reclaimed = 0;
        for (key, record) in records {
            let mods = record.update_count.load(Ordering::Acquire);
            let coll = record.collected_count.load(Ordering::Acquire);

            if record.transient {
                if mods != coll {
                    checkpointed += self.checkpoint_record(&record, processor.as_mut());
                    record.collected_count.store(mods, Ordering::Release);
                }
                self.reclaim(&key, &record, false);
            } else if mods != coll || record.refs.in_use() {
                // Updates happened in this interval or handles are still
                // bound, checkpoint and continue.
                checkpointed += self.checkpoint_record(&record, processor.as_mut());
                record.collected_count.store(mods, Ordering::Release);
            } else if self.reclaim(&key, &record, !self.temporality.resets()) {
                // Unbound and idle since its last checkpoint.
                reclaimed += 1;

                // An update may have landed between loading the update count
                // and unmapping. Since this is the last we'll see of this
                // record, checkpoint it.
                if record.has_updates() {
                    checkpointed += self.checkpoint_record(&record, processor.as_mut());
                }
            }
        }

        processor.finished_collection();
        otel_debug!(
            name: "Accumulator.CollectCompleted",
            checkpointed = checkpointed,
            reclaimed = reclaimed
        );

        checkpointed
    }

    /// Unmap `record` and remove it from the registry if nothing references
    /// it. With `retain` its aggregated state is kept for the next record
    /// created under the same key.
    ///
    /// The shard lock is held throughout, so an acquirer either references the
    /// record before it is unmapped or finds the retained state afterwards.
    fn reclaim(&self, key: &MapKey, record: &Arc<Record>, retain: bool) -> bool {
        self.current
            .remove_if(key, |_, mapped| {
                if !Arc::ptr_eq(mapped, record) || !record.refs.try_unmap() {
                    return false;
                }
                if retain {
                    self.retained.insert(key.clone(), record.current.clone());
                }
                true
            })
            .is_some()
    }

    /// Runs every observer once, in registration order. Returns how many ran.
    fn observe_async_instruments(&self) -> usize {
        // Clone the list so callbacks may register further observers.
        let observers = match self.async_instruments.lock() {
            Ok(observers) => observers.clone(),
            Err(err) => {
                global::handle_error(err);
                return 0;
            }
        };

        let _scope = ObserverScope::enter();
        for observer in &observers {
            let observe = AssertUnwindSafe(|| (observer.callback)(self, &observer.instrument));
            if let Err(payload) = panic::catch_unwind(observe) {
                let name = observer.instrument.descriptor.name();
                let message = panic_message(payload.as_ref());
                otel_warn!(
                    name: "Accumulator.ObserverPanicked",
                    instrument = name,
                    error = message
                );
                global::handle_error(MetricsError::Other(format!(
                    "observer {:?} panicked: {}",
                    name, message
                )));
            }
        }

        observers.len()
    }

    fn checkpoint_record(&self, record: &Record, processor: &mut dyn Processor) -> usize {
        let descriptor = &record.instrument.descriptor;
        if let Err(err) =
            record
                .current
                .checkpoint(record.checkpoint.as_ref(), descriptor, self.temporality)
        {
            global::handle_error(err);
            return 0;
        }

        let accumulation = export::record(descriptor, &record.labels, &record.checkpoint);
        if let Err(err) = processor.process(accumulation) {
            otel_warn!(
                name: "Accumulator.ProcessFailed",
                instrument = descriptor.name(),
                error = format!("{}", err)
            );
            global::handle_error(err);
        }

        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::aggregation::{Aggregation, Sum};
    use crate::export::Record as ExportRecord;
    use std::thread;

    #[derive(Debug)]
    struct NoopProcessor;

    impl Processor for NoopProcessor {
        fn process(&mut self, _record: ExportRecord<'_>) -> Result<()> {
            Ok(())
        }

        fn finished_collection(&mut self) {}
    }

    #[test]
    fn temporality_from_environment() {
        temp_env::with_var(OTEL_METRICS_TEMPORALITY, Some("Delta"), || {
            let acc = accumulator(NoopProcessor).build();
            assert_eq!(acc.temporality(), Temporality::Delta);

            let acc = accumulator(NoopProcessor)
                .with_temporality(Temporality::Cumulative)
                .build();
            assert_eq!(acc.temporality(), Temporality::Cumulative);
        });
        temp_env::with_var(OTEL_METRICS_TEMPORALITY, Some("sideways"), || {
            let acc = accumulator(NoopProcessor).build();
            assert_eq!(acc.temporality(), Temporality::Cumulative);
        });
        temp_env::with_var_unset(OTEL_METRICS_TEMPORALITY, || {
            let acc = accumulator(NoopProcessor).build();
            assert_eq!(acc.temporality(), Temporality::Cumulative);
        });
    }

    #[test]
    fn racing_binds_create_one_record() {
        let acc = accumulator(NoopProcessor).build();
        let counter = acc.new_i64_counter("race").unwrap();
        let instrument = counter.descriptor().clone();
        let labels = labels::Set::new(&[KeyValue::new("k", "v")]).unwrap();
        let core = Arc::new(InstrumentCore {
            id: 0,
            descriptor: instrument,
        });

        let records: Vec<Arc<Record>> = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| acc.0.acquire_record(&core, &labels, false).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(acc.record_count(), 1);
        assert!(records.iter().all(|r| Arc::ptr_eq(r, &records[0])));
        for record in &records {
            record.refs.unref();
        }
        assert!(!records[0].refs.in_use());
    }

    #[test]
    fn unmapped_records_are_replaced() {
        let acc = accumulator(NoopProcessor).build();
        let counter = acc.new_i64_counter("replaced").unwrap();
        let core = Arc::new(InstrumentCore {
            id: 7,
            descriptor: counter.descriptor().clone(),
        });
        let labels = labels::Set::default();

        let first = acc.0.acquire_record(&core, &labels, false).unwrap();
        first.refs.unref();
        assert!(first.refs.try_unmap());

        // The stale entry is still in the map, acquiring must skip it.
        let second = acc.0.acquire_record(&core, &labels, false).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(acc.record_count(), 1);
        second.refs.unref();
    }

    #[test]
    fn observers_may_not_be_sync_instruments() {
        let acc = accumulator(NoopProcessor).build();
        let descriptor = Descriptor::new("c", InstrumentKind::Counter, NumberKind::I64);
        assert!(matches!(
            acc.register_observer(descriptor, |_: &ObserverResult<'_, i64>| {}),
            Err(MetricsError::Config(_))
        ));
    }

    #[test]
    fn reclaimed_cumulative_state_is_handed_to_the_next_record() {
        for (temporality, retained, expected) in [
            (Temporality::Cumulative, 1, 2),
            (Temporality::Delta, 0, 0),
        ] {
            let acc = accumulator(NoopProcessor)
                .with_temporality(temporality)
                .build();
            let counter = acc.new_i64_counter("requests").unwrap();
            counter.add(2, &[]);
            acc.collect();
            acc.collect();
            assert_eq!(acc.record_count(), 0);
            assert_eq!(acc.0.retained.len(), retained);

            let _bound = counter.bind(&[]).unwrap();
            assert!(acc.0.retained.is_empty());
            let total = acc
                .0
                .current
                .iter()
                .map(|entry| {
                    entry
                        .value()
                        .current
                        .aggregation()
                        .as_sum()
                        .and_then(|sum| sum.sum().ok())
                        .map(|n| n.to_i64(&NumberKind::I64))
                })
                .next()
                .flatten();
            assert_eq!(total, Some(expected));
        }
    }

    #[test]
    fn observer_callbacks_cannot_start_a_collection() {
        let acc = accumulator(NoopProcessor)
            .with_temporality(Temporality::Cumulative)
            .build();
        let outcomes = Arc::new(Mutex::new(Vec::new()));
        let (inner, seen) = (acc.clone(), outcomes.clone());
        acc.register_i64_observer("reentrant", move |result| {
            let mut seen = seen.lock().unwrap();
            seen.push(inner.collect() == 0);
            seen.push(matches!(
                inner.checkpoint_set(|_| ()),
                Err(MetricsError::CollectInObserver)
            ));
            seen.push(matches!(
                inner.shutdown(),
                Err(MetricsError::CollectInObserver)
            ));
            result.observe(1, &[]);
        })
        .unwrap();

        assert_eq!(acc.collect(), 1);
        assert_eq!(*outcomes.lock().unwrap(), vec![true, true, true]);
        assert!(!in_observer());

        // The refused shutdown left the accumulator running.
        assert_eq!(acc.collect(), 1);
        assert!(acc.checkpoint_set(|_| ()).is_ok());
    }

    #[test]
    fn panicking_observers_do_not_poison_collection() {
        let acc = accumulator(NoopProcessor)
            .with_temporality(Temporality::Cumulative)
            .build();
        acc.register_i64_observer("broken", |_| panic!("sensor offline"))
            .unwrap();
        acc.register_i64_observer("steady", |result| result.observe(1, &[]))
            .unwrap();

        for _ in 0..2 {
            assert_eq!(acc.collect(), 1);
        }
        assert!(!in_observer());
    }
}
