//! Metric controllers
mod push;

pub use push::{push, PushController, PushControllerBuilder, OTEL_METRIC_EXPORT_INTERVAL};
