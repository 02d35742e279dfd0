use crate::aggregators;
use crate::descriptor::Descriptor;
use crate::export::Aggregator;
use crate::global;
use crate::labels;
use crate::number::Number;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// Registry key: one entry per instrument and distinct label set.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct MapKey {
    pub(crate) instrument_id: u64,
    pub(crate) labels: labels::Distinct,
}

/// The registered identity of an instrument.
#[derive(Debug)]
pub(crate) struct InstrumentCore {
    pub(crate) id: u64,
    pub(crate) descriptor: Descriptor,
}

/// Reference count and mapped state packed into one atomic.
///
/// Bit 0 is set once the record has been unmapped, i.e. chosen for removal
/// from the registry. The remaining bits count live references, two per
/// reference. A record can only be unmapped at zero references, and a
/// reference taken on an unmapped record is refused, so a caller never holds a
/// record that the collector has already retired.
#[derive(Debug)]
pub(crate) struct RefcountMapped {
    value: AtomicI64,
}

impl RefcountMapped {
    /// A mapped record holding one reference for its creator.
    pub(crate) fn referenced() -> Self {
        RefcountMapped {
            value: AtomicI64::new(2),
        }
    }

    /// Take a reference. Returns `false` if the record was unmapped.
    pub(crate) fn try_ref(&self) -> bool {
        self.value.fetch_add(2, Ordering::AcqRel) & 1 == 0
    }

    pub(crate) fn unref(&self) {
        self.value.fetch_sub(2, Ordering::AcqRel);
    }

    /// Whether any references are held.
    pub(crate) fn in_use(&self) -> bool {
        self.value.load(Ordering::Acquire) >= 2
    }

    /// Mark the record unmapped if it has no references.
    pub(crate) fn try_unmap(&self) -> bool {
        self.value
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Record maintains the state of one instrument and label set.
///
/// There may briefly be more than one record for a key while two threads race
/// to create it, but at most one is ever reachable from the registry.
#[derive(Debug)]
pub(crate) struct Record {
    pub(crate) refs: RefcountMapped,

    /// Incremented on every successful update.
    pub(crate) update_count: AtomicU64,

    /// Set to `update_count` on collection, supports checking for no updates
    /// during a round.
    pub(crate) collected_count: AtomicU64,

    pub(crate) labels: labels::Set,
    pub(crate) instrument: Arc<InstrumentCore>,

    /// Receives updates.
    pub(crate) current: Arc<dyn Aggregator + Send + Sync>,
    /// Receives the state of `current` at each collection.
    pub(crate) checkpoint: Arc<dyn Aggregator + Send + Sync>,

    /// Created by an observer during collection, removed once processed.
    pub(crate) transient: bool,
}

impl Record {
    pub(crate) fn record_one(&self, number: Number) {
        let descriptor = &self.instrument.descriptor;
        if let Err(err) = aggregators::range_test(&number, descriptor)
            .and_then(|_| self.current.update(&number, descriptor))
        {
            global::handle_error(err);
            return;
        }

        // Record was modified, inform the collect() that things need
        // to be collected while the record is still mapped.
        self.update_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Whether updates landed since the last collection.
    pub(crate) fn has_updates(&self) -> bool {
        self.update_count.load(Ordering::Acquire) != self.collected_count.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refcount_blocks_unmap_while_referenced() {
        let refs = RefcountMapped::referenced();
        assert!(refs.in_use());
        assert!(!refs.try_unmap());

        assert!(refs.try_ref());
        refs.unref();
        refs.unref();
        assert!(!refs.in_use());

        assert!(refs.try_unmap());
        assert!(!refs.try_ref());
        assert!(!refs.try_unmap());
    }
}
