//! # OpenTelemetry Metrics Engine
//!
//! An in-process engine that turns measurements recorded by instrumented code
//! into periodic, aggregated records for an exporter.
//!
//! Applications create instruments from an [`Accumulator`]: counters and
//! measures are recorded synchronously, observers are called back once per
//! collection. Each distinct instrument and label set is backed by one
//! aggregator, chosen by an [`AggregatorSelector`]. A collection checkpoints
//! every active aggregator and hands the result to a [`Processor`].
//!
//! ```
//! use opentelemetry_metrics::processors;
//! use opentelemetry_metrics::selectors::simple::Selector;
//! use opentelemetry_metrics::{accumulator, KeyValue};
//!
//! let accumulator = accumulator(processors::basic(Selector::Inexpensive)).build();
//! let requests = accumulator.new_i64_counter("requests").unwrap();
//! requests.add(1, &[KeyValue::new("route", "/health")]);
//!
//! let bound = requests.bind(&[KeyValue::new("route", "/")]).unwrap();
//! bound.add(2);
//!
//! assert_eq!(accumulator.collect(), 2);
//! ```
//!
//! [`AggregatorSelector`]: export::AggregatorSelector
//! [`Processor`]: export::Processor
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod internal_logging;

pub mod accumulator;
pub mod aggregators;
mod common;
pub mod controllers;
pub mod descriptor;
pub mod error;
pub mod export;
pub mod global;
pub mod instruments;
pub mod labels;
pub mod number;
pub mod processors;
pub mod selectors;

pub use accumulator::{accumulator, Accumulator, AccumulatorBuilder};
pub use common::{Key, KeyValue, Value};
pub use descriptor::{Descriptor, InstrumentKind};
pub use error::{MetricsError, Result};
pub use number::{Number, NumberKind};

#[cfg(feature = "internal-logs")]
#[doc(hidden)]
pub mod _private {
    pub use tracing::{debug, error, info, warn};
}
