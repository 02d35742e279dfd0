use crate::number::NumberKind;
use std::borrow::Cow;

/// Kinds of metric instruments
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InstrumentKind {
    /// A synchronous, monotonic sum. Recorded values must be non-negative.
    Counter,
    /// A synchronous instrument recording arbitrary values.
    Measure,
    /// An asynchronous instrument observed once per collection cycle.
    Observer,
}

impl InstrumentKind {
    /// Whether this is a synchronous kind of instrument.
    pub fn synchronous(&self) -> bool {
        matches!(self, InstrumentKind::Counter | InstrumentKind::Measure)
    }

    /// Whether this is an asynchronous kind of instrument.
    pub fn asynchronous(&self) -> bool {
        !self.synchronous()
    }

    /// Whether this kind of instrument only accepts non-negative values.
    pub fn monotonic(&self) -> bool {
        matches!(self, InstrumentKind::Counter)
    }
}

/// Descriptor contains all the settings that describe an instrument, including
/// its name, instrument kind, number kind, and the optional metadata.
///
/// Descriptors are immutable once handed to an accumulator.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Descriptor {
    name: Cow<'static, str>,
    instrument_kind: InstrumentKind,
    number_kind: NumberKind,
    description: Option<Cow<'static, str>>,
    unit: Option<Cow<'static, str>>,
}

impl Descriptor {
    /// Create a new descriptor
    pub fn new<T: Into<Cow<'static, str>>>(
        name: T,
        instrument_kind: InstrumentKind,
        number_kind: NumberKind,
    ) -> Self {
        Descriptor {
            name: name.into(),
            instrument_kind,
            number_kind,
            description: None,
            unit: None,
        }
    }

    /// Attach a human-readable description.
    pub fn with_description<T: Into<Cow<'static, str>>>(mut self, description: T) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attach a unit such as `"ms"` or `"By"`.
    pub fn with_unit<T: Into<Cow<'static, str>>>(mut self, unit: T) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// The metric instrument's name.
    pub fn name(&self) -> &str {
        self.name.as_ref()
    }

    /// The specific kind of instrument.
    pub fn instrument_kind(&self) -> &InstrumentKind {
        &self.instrument_kind
    }

    /// Whether this instrument is declared over int64 or float64 values.
    pub fn number_kind(&self) -> &NumberKind {
        &self.number_kind
    }

    /// Whether recorded values must be non-negative.
    pub fn monotonic(&self) -> bool {
        self.instrument_kind.monotonic()
    }

    /// A human-readable description of the metric instrument.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Unit describes the units of the metric instrument.
    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }
}
