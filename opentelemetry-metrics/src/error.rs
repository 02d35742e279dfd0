use std::result;
use std::sync::PoisonError;
use thiserror::Error;

/// A specialized `Result` type for metric operations.
pub type Result<T> = result::Result<T, MetricsError>;

/// Errors returned by the metrics engine.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum MetricsError {
    /// Other errors not covered by specific cases.
    #[error("Metrics error: {0}")]
    Other(String),
    /// Invalid configuration
    #[error("Config error {0}")]
    Config(String),
    /// Instrument names must be non-empty.
    #[error("Invalid instrument name: {0:?}")]
    InvalidInstrumentName(String),
    /// An instrument with this name is already registered with the accumulator.
    #[error("Instrument {0:?} is already registered")]
    DuplicateInstrument(String),
    /// Label keys must be non-empty.
    #[error("Label keys must not be empty")]
    InvalidLabelKey,
    /// The aggregator selector has no aggregator for this instrument.
    #[error("No aggregator available for instrument {0:?}")]
    NoAggregator(String),
    /// NaN values are not recorded.
    #[error("NaN value is an invalid input")]
    NaNInput,
    /// Monotonic instruments only accept non-negative values.
    #[error("Negative value is out of range for this instrument")]
    NegativeInput,
    /// Aggregators of different types were combined.
    #[error("Inconsistent aggregator types: {0}")]
    InconsistentAggregator(String),
    /// The aggregation holds no values.
    #[error("No data collected by this aggregator")]
    NoDataCollected,
    /// Quantiles must be in the range `[0, 1]`.
    #[error("The requested quantile is out of range")]
    InvalidQuantile,
    /// The bound instrument was already released.
    #[error("Bound instrument is already unbound")]
    AlreadyUnbound,
    /// An exact aggregator reached its point limit for this collection cycle.
    #[error("Point limit of {0} reached for this collection cycle")]
    PointsLimitReached(usize),
    /// The accumulator or controller has already been shut down.
    #[error("Already shut down")]
    AlreadyShutdown,
    /// Collection was requested from inside an observer callback.
    #[error("Cannot collect from inside an observer callback")]
    CollectInObserver,
    /// Fail to export metrics
    #[error("Metrics exporter {name} failed with {0}", name = .0.exporter_name())]
    ExportErr(Box<dyn ExportError>),
}

/// Trait for errors returned by processors and exporters.
pub trait ExportError: std::error::Error + Send + Sync + 'static {
    /// The name of the exporter that returned this error.
    fn exporter_name(&self) -> &'static str;
}

impl<T: ExportError> From<T> for MetricsError {
    fn from(err: T) -> Self {
        MetricsError::ExportErr(Box::new(err))
    }
}

impl<T> From<PoisonError<T>> for MetricsError {
    fn from(err: PoisonError<T>) -> Self {
        MetricsError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("connection refused")]
    struct RefusedError;

    impl ExportError for RefusedError {
        fn exporter_name(&self) -> &'static str {
            "stdout"
        }
    }

    #[test]
    fn export_errors_name_the_exporter() {
        let err: MetricsError = RefusedError.into();
        assert!(matches!(err, MetricsError::ExportErr(_)));
        assert_eq!(
            err.to_string(),
            "Metrics exporter stdout failed with connection refused"
        );
    }
}
