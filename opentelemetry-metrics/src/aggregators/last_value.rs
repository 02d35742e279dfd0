use crate::descriptor::Descriptor;
use crate::error::{MetricsError, Result};
use crate::export::aggregation::{Aggregation, AggregationKind, LastValue, Temporality};
use crate::export::Aggregator;
use crate::number::Number;
use std::any::Any;
use std::sync::Mutex;
use std::time::SystemTime;

/// Create a new `LastValueAggregator`
pub fn last_value() -> LastValueAggregator {
    LastValueAggregator {
        inner: Mutex::new(Inner::default()),
    }
}

/// Aggregates last value events.
///
/// The stored value is replaced by every update in the order updates acquire
/// the lock, so racing writers resolve to exactly one of their values. State is
/// never reset by a checkpoint.
#[derive(Debug)]
pub struct LastValueAggregator {
    inner: Mutex<Inner>,
}

impl Aggregation for LastValueAggregator {
    fn kind(&self) -> &AggregationKind {
        &AggregationKind::LAST_VALUE
    }

    fn as_last_value(&self) -> Option<&dyn LastValue> {
        Some(self)
    }
}

impl Aggregator for LastValueAggregator {
    fn aggregation(&self) -> &dyn Aggregation {
        self
    }

    fn update(&self, number: &Number, _descriptor: &Descriptor) -> Result<()> {
        self.inner.lock().map_err(Into::into).map(|mut inner| {
            inner.state = Some(LastValueData {
                value: *number,
                timestamp: SystemTime::now(),
            });
        })
    }

    fn checkpoint(
        &self,
        destination: &(dyn Aggregator + Send + Sync),
        _descriptor: &Descriptor,
        _temporality: Temporality,
    ) -> Result<()> {
        if let Some(other) = destination.as_any().downcast_ref::<Self>() {
            let state = self.inner.lock()?.state.clone();
            other.inner.lock()?.state = state;
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
            let incoming = match other.inner.lock()?.state.clone() {
                Some(state) => state,
                None => return Ok(()),
            };
            let mut inner = self.inner.lock()?;
            let newer = inner
                .state
                .as_ref()
                .map_or(true, |current| incoming.timestamp >= current.timestamp);
            if newer {
                inner.state = Some(incoming);
            }
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

impl LastValue for LastValueAggregator {
    fn last_value(&self) -> Result<(Number, SystemTime)> {
        self.inner.lock().map_err(Into::into).and_then(|inner| {
            if let Some(data) = &inner.state {
                Ok((data.value, data.timestamp))
            } else {
                Err(MetricsError::NoDataCollected)
            }
        })
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: Option<LastValueData>,
}

#[derive(Clone, Debug)]
struct LastValueData {
    value: Number,
    timestamp: SystemTime,
}
