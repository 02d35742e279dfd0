use std::cmp;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Number represents either an integral or a floating point value. It
/// needs to be accompanied with a source of NumberKind that describes
/// the actual type of the value stored within Number.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Number(u64);

impl Number {
    /// Casts the number to `i64`. May result in data/precision loss.
    pub fn to_i64(self, number_kind: &NumberKind) -> i64 {
        match number_kind {
            NumberKind::F64 => u64_to_f64(self.0) as i64,
            NumberKind::I64 => self.0 as i64,
        }
    }

    /// Casts the number to `f64`. May result in data/precision loss.
    pub fn to_f64(self, number_kind: &NumberKind) -> f64 {
        match number_kind {
            NumberKind::I64 => (self.0 as i64) as f64,
            NumberKind::F64 => u64_to_f64(self.0),
        }
    }

    /// Adds two numbers of the same kind. Integer addition saturates at the
    /// bounds of `i64` instead of wrapping.
    pub fn saturating_add(self, number_kind: &NumberKind, other: Number) -> Number {
        match number_kind {
            NumberKind::I64 => Number((self.0 as i64).saturating_add(other.0 as i64) as u64),
            NumberKind::F64 => Number(f64_to_u64(u64_to_f64(self.0) + u64_to_f64(other.0))),
        }
    }

    /// Compares this number to the given other number. Both should be of the same kind.
    pub fn partial_cmp(self, number_kind: &NumberKind, other: Number) -> Option<cmp::Ordering> {
        match number_kind {
            NumberKind::I64 => (self.0 as i64).partial_cmp(&(other.0 as i64)),
            NumberKind::F64 => u64_to_f64(self.0).partial_cmp(&u64_to_f64(other.0)),
        }
    }

    /// Checks if this value is an f64 NaN value. Do not use on non-f64 values.
    pub fn is_nan(self) -> bool {
        u64_to_f64(self.0).is_nan()
    }

    /// `true` if the actual value is less than zero.
    pub fn is_negative(self, number_kind: &NumberKind) -> bool {
        match number_kind {
            NumberKind::I64 => (self.0 as i64).is_negative(),
            NumberKind::F64 => u64_to_f64(self.0).is_sign_negative(),
        }
    }

    /// Return the value for debugging purposes
    pub fn to_debug(self, kind: &NumberKind) -> Box<dyn fmt::Debug> {
        match kind {
            NumberKind::I64 => Box::new(self.0 as i64),
            NumberKind::F64 => Box::new(u64_to_f64(self.0)),
        }
    }
}

impl From<f64> for Number {
    fn from(f: f64) -> Self {
        Number(f64_to_u64(f))
    }
}

impl From<i64> for Number {
    fn from(i: i64) -> Self {
        Number(i as u64)
    }
}

/// A `Number` that can be updated from many threads at once.
#[derive(Debug, Default)]
pub struct AtomicNumber(AtomicU64);

impl AtomicNumber {
    /// Creates a new atomic holding `number`.
    pub fn new(number: Number) -> Self {
        AtomicNumber(AtomicU64::new(number.0))
    }

    /// Loads the current value.
    pub fn load(&self) -> Number {
        Number(self.0.load(Ordering::Acquire))
    }

    /// Stores a value.
    pub fn store(&self, number: Number) {
        self.0.store(number.0, Ordering::Release)
    }

    /// Stores a value, returning the previous one.
    pub fn swap(&self, number: Number) -> Number {
        Number(self.0.swap(number.0, Ordering::AcqRel))
    }

    /// Adds `other` to the stored value, see [`Number::saturating_add`].
    pub fn saturating_add(&self, number_kind: &NumberKind, other: Number) {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            let new = Number(current).saturating_add(number_kind, other).0;
            match self
                .0
                .compare_exchange_weak(current, new, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}

/// A descriptor for the encoded data type of a `Number`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NumberKind {
    /// A Number that stores `i64` values.
    I64,
    /// A Number that stores `f64` values.
    F64,
}

impl NumberKind {
    /// Returns the zero value for each kind
    pub fn zero(&self) -> Number {
        match self {
            NumberKind::I64 => 0i64.into(),
            NumberKind::F64 => 0f64.into(),
        }
    }

    /// Returns the max value for each kind
    pub fn max(&self) -> Number {
        match self {
            NumberKind::I64 => i64::MAX.into(),
            NumberKind::F64 => f64::MAX.into(),
        }
    }

    /// Returns the min value for each kind
    pub fn min(&self) -> Number {
        match self {
            NumberKind::I64 => i64::MIN.into(),
            NumberKind::F64 => f64::MIN.into(),
        }
    }
}

#[inline]
fn u64_to_f64(val: u64) -> f64 {
    f64::from_bits(val)
}

#[inline]
fn f64_to_u64(val: f64) -> u64 {
    f64::to_bits(val)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn integer_addition_saturates() {
        let kind = NumberKind::I64;
        let n = Number::from(i64::MAX - 1).saturating_add(&kind, 5i64.into());
        assert_eq!(n.to_i64(&kind), i64::MAX);

        let n = Number::from(i64::MIN).saturating_add(&kind, (-1i64).into());
        assert_eq!(n.to_i64(&kind), i64::MIN);
    }

    #[test]
    fn compares_by_kind() {
        assert_eq!(
            Number::from(-1i64).partial_cmp(&NumberKind::I64, 2i64.into()),
            Some(cmp::Ordering::Less)
        );
        assert_eq!(
            Number::from(f64::NAN).partial_cmp(&NumberKind::F64, 1.0.into()),
            None
        );
        assert!(Number::from(-0.5).is_negative(&NumberKind::F64));
        assert!(Number::from(f64::NAN).is_nan());
    }

    #[test]
    fn concurrent_atomic_adds() {
        let total = Arc::new(AtomicNumber::new(NumberKind::F64.zero()));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let total = total.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        total.saturating_add(&NumberKind::F64, 0.5.into());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(total.load().to_f64(&NumberKind::F64), 2000.0);
    }
}
