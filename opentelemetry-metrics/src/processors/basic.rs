use crate::descriptor::Descriptor;
use crate::error::{MetricsError, Result};
use crate::export::{self, Aggregator, AggregatorSelector, CheckpointSet, Processor, Record};
use crate::labels;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Create a new basic processor. `selector` allocates the processor's own
/// aggregators and must match the selector the accumulator uses.
pub fn basic<S>(selector: S) -> BasicProcessor
where
    S: AggregatorSelector + Send + Sync + 'static,
{
    BasicProcessor {
        aggregator_selector: Arc::new(selector),
        state: BasicProcessorState::default(),
    }
}

/// Basic metric integration strategy.
///
/// Each cycle's checkpointed records are merged into aggregators owned by the
/// processor, keyed by instrument name and label set. The result of the last
/// finished cycle is readable through [`CheckpointSet`] until the next cycle
/// starts.
pub struct BasicProcessor {
    aggregator_selector: Arc<dyn AggregatorSelector + Send + Sync>,
    state: BasicProcessorState,
}

impl fmt::Debug for BasicProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicProcessor")
            .field("state", &self.state)
            .finish()
    }
}

impl Processor for BasicProcessor {
    fn process(&mut self, record: Record<'_>) -> Result<()> {
        if !self.state.in_collection {
            self.state.values.clear();
            self.state.in_collection = true;
        }

        let desc = record.descriptor();
        let key = StateKey {
            name: desc.name().to_string(),
            labels: record.labels().equivalent().clone(),
        };
        let agg = record.aggregator();

        if let Some(value) = self.state.values.get(&key) {
            // Same key twice in one cycle, combine the two.
            return value.aggregator.merge(agg.as_ref(), desc);
        }

        let aggregator = self
            .aggregator_selector
            .aggregator_for(desc)
            .ok_or_else(|| MetricsError::NoAggregator(desc.name().to_string()))?;
        aggregator.merge(agg.as_ref(), desc)?;

        self.state.values.insert(
            key,
            StateValue {
                descriptor: desc.clone(),
                labels: record.labels().clone(),
                aggregator,
            },
        );

        Ok(())
    }

    fn finished_collection(&mut self) {
        if !self.state.in_collection {
            // Nothing was processed this cycle.
            self.state.values.clear();
        }
        self.state.in_collection = false;
    }

    fn checkpoint_set(&mut self) -> Option<&mut dyn CheckpointSet> {
        Some(self)
    }
}

impl CheckpointSet for BasicProcessor {
    fn try_for_each(&mut self, f: &mut dyn FnMut(&Record<'_>) -> Result<()>) -> Result<()> {
        self.state.values.values().try_for_each(|value| {
            let res = f(&export::record(
                &value.descriptor,
                &value.labels,
                &value.aggregator,
            ));
            if let Err(MetricsError::NoDataCollected) = res {
                Ok(())
            } else {
                res
            }
        })
    }
}

#[derive(Debug, Default)]
struct BasicProcessorState {
    values: HashMap<StateKey, StateValue>,
    in_collection: bool,
}

#[derive(Debug, PartialEq, Eq, Hash)]
struct StateKey {
    name: String,
    labels: labels::Distinct,
}

#[derive(Debug)]
struct StateValue {
    descriptor: Descriptor,
    labels: labels::Set,
    aggregator: Arc<dyn Aggregator + Send + Sync>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregators;
    use crate::common::KeyValue;
    use crate::descriptor::InstrumentKind;
    use crate::number::NumberKind;
    use crate::selectors::simple::Selector;

    fn checkpointed(descriptor: &Descriptor, value: i64) -> Arc<dyn Aggregator + Send + Sync> {
        let agg = aggregators::sum();
        agg.update(&value.into(), descriptor).unwrap();
        Arc::new(agg)
    }

    fn sums(processor: &mut BasicProcessor) -> Vec<(String, i64)> {
        let mut out = Vec::new();
        processor
            .try_for_each(&mut |record: &Record<'_>| {
                let sum = record
                    .aggregator()
                    .aggregation()
                    .as_sum()
                    .expect("sum view")
                    .sum()?;
                out.push((
                    record.descriptor().name().to_string(),
                    sum.to_i64(record.descriptor().number_kind()),
                ));
                Ok(())
            })
            .unwrap();
        out.sort();
        out
    }

    #[test]
    fn merges_within_a_cycle_and_resets_on_the_next() {
        let descriptor = Descriptor::new("requests", InstrumentKind::Counter, NumberKind::I64);
        let labels = labels::Set::new(&[KeyValue::new("route", "/")]).unwrap();
        let mut processor = basic(Selector::Inexpensive);

        let first = checkpointed(&descriptor, 3);
        let second = checkpointed(&descriptor, 4);
        processor
            .process(export::record(&descriptor, &labels, &first))
            .unwrap();
        processor
            .process(export::record(&descriptor, &labels, &second))
            .unwrap();
        processor.finished_collection();
        assert_eq!(sums(&mut processor), vec![("requests".to_string(), 7)]);

        let third = checkpointed(&descriptor, 1);
        processor
            .process(export::record(&descriptor, &labels, &third))
            .unwrap();
        processor.finished_collection();
        assert_eq!(sums(&mut processor), vec![("requests".to_string(), 1)]);

        processor.finished_collection();
        assert!(sums(&mut processor).is_empty());
    }

    #[test]
    fn checkpoint_set_is_exposed() {
        let mut processor = basic(Selector::Exact);
        assert!(processor.checkpoint_set().is_some());
    }
}
