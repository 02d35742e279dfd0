use crate::error::{MetricsError, Result};
use std::sync::RwLock;

lazy_static::lazy_static! {
    /// The global error handler.
    static ref GLOBAL_ERROR_HANDLER: RwLock<Option<ErrorHandler>> = RwLock::new(None);
}

struct ErrorHandler(Box<dyn Fn(MetricsError) + Send + Sync>);

/// Handle error using the globally configured error handler.
///
/// Writes to stderr if unset.
pub fn handle_error<T: Into<MetricsError>>(err: T) {
    let err = err.into();
    match GLOBAL_ERROR_HANDLER.read() {
        Ok(handler) => match handler.as_ref() {
            Some(handler) => (handler.0)(err),
            None => eprintln!("OpenTelemetry metrics error occurred. {}", err),
        },
        Err(_) => eprintln!("OpenTelemetry metrics error occurred. {}", err),
    }
}

/// Set global error handler.
pub fn set_error_handler<F>(f: F) -> Result<()>
where
    F: Fn(MetricsError) + Send + Sync + 'static,
{
    GLOBAL_ERROR_HANDLER
        .write()
        .map(|mut handler| *handler = Some(ErrorHandler(Box::new(f))))
        .map_err(Into::into)
}
