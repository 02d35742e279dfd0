//! Label sets
use crate::common::KeyValue;
use crate::error::{MetricsError, Result};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Set is the representation for a distinct label set. It manages an
/// immutable, normalized set of labels: keys are unique and sorted, so two
/// sets built from the same pairs in any order are equal and iterate
/// identically.
///
/// When the input repeats a key, the last value given for that key wins.
///
/// Cloning a `Set` is cheap, the pairs are shared.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Set {
    equivalent: Distinct,
}

impl Set {
    /// Normalize `kvs` into a label set.
    ///
    /// Fails with [`MetricsError::InvalidLabelKey`] if any key is empty.
    pub fn new(kvs: &[KeyValue]) -> Result<Self> {
        if kvs.iter().any(|kv| kv.key.is_empty()) {
            return Err(MetricsError::InvalidLabelKey);
        }
        if kvs.is_empty() {
            return Ok(Set::default());
        }

        // Reversing first lets the stable sort and `dedup_by` (which keeps the
        // first of each run) retain the last value written for a key.
        let mut inner: Vec<KeyValue> = kvs.iter().rev().cloned().collect();
        inner.sort_by(|a, b| a.key.cmp(&b.key));
        inner.dedup_by(|a, b| a.key == b.key);

        Ok(Set {
            equivalent: Distinct(inner.into()),
        })
    }

    /// Construct a label set from an already normalized distinct set.
    pub fn with_equivalent(equivalent: Distinct) -> Self {
        Set { equivalent }
    }

    /// The label set length.
    pub fn len(&self) -> usize {
        self.equivalent.len()
    }

    /// Check if the set of labels is empty.
    pub fn is_empty(&self) -> bool {
        self.equivalent.is_empty()
    }

    /// Returns the underlying distinct set of labels for equivalence checks.
    pub fn equivalent(&self) -> &Distinct {
        &self.equivalent
    }

    /// A 64-bit hash of the normalized pairs. Equal sets always share an
    /// identity; unequal sets collide only with hash-collision probability.
    pub fn identity(&self) -> u64 {
        let mut hasher = fnv::FnvHasher::default();
        self.equivalent.hash(&mut hasher);
        hasher.finish()
    }

    /// Iterate over the label key value pairs in key order.
    pub fn iter(&self) -> Iter<'_> {
        self.into_iter()
    }
}

impl<'a> IntoIterator for &'a Set {
    type Item = &'a KeyValue;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        Iter(self.equivalent.0.iter())
    }
}

/// An iterator over the entries of a `Set`.
#[derive(Clone, Debug)]
pub struct Iter<'a>(std::slice::Iter<'a, KeyValue>);

impl<'a> Iterator for Iter<'a> {
    type Item = &'a KeyValue;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}

impl ExactSizeIterator for Iter<'_> {}

/// Distinct wraps the normalized pairs of a label set. It is used as a map
/// key and for equality checks between sets.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Distinct(Arc<[KeyValue]>);

impl Distinct {
    /// Check if the labels are empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The length of the set of labels
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl Default for Distinct {
    fn default() -> Self {
        Distinct(Arc::from(Vec::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Value;

    #[test]
    fn order_does_not_affect_identity() {
        let a = Set::new(&[KeyValue::new("b", 2), KeyValue::new("a", "x")]).unwrap();
        let b = Set::new(&[KeyValue::new("a", "x"), KeyValue::new("b", 2)]).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.identity(), b.identity());
        assert!(a.iter().eq(b.iter()));
        let keys: Vec<_> = a.iter().map(|kv| kv.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn duplicate_keys_keep_last_value() {
        let set = Set::new(&[
            KeyValue::new("k", 1),
            KeyValue::new("j", true),
            KeyValue::new("k", 2),
        ])
        .unwrap();

        assert_eq!(set.len(), 2);
        let k = set.iter().find(|kv| kv.key.as_str() == "k").unwrap();
        assert_eq!(k.value, Value::I64(2));
    }

    #[test]
    fn empty_key_is_rejected() {
        let err = Set::new(&[KeyValue::new(String::new(), 1)]).unwrap_err();
        assert!(matches!(err, MetricsError::InvalidLabelKey));
    }

    #[test]
    fn iterators_are_independent() {
        let set = Set::new(&[KeyValue::new("a", 1), KeyValue::new("b", 2)]).unwrap();
        let mut first = set.iter();
        let second = set.iter();
        first.next();
        assert_eq!(first.len(), 1);
        assert_eq!(second.count(), 2);
        assert_eq!(set.iter().count(), 2);
    }

    #[test]
    fn different_values_are_distinct() {
        let a = Set::new(&[KeyValue::new("a", 1)]).unwrap();
        let b = Set::new(&[KeyValue::new("a", 2)]).unwrap();
        assert_ne!(a, b);
        assert_eq!(Set::new(&[]).unwrap(), Set::default());
    }
}
