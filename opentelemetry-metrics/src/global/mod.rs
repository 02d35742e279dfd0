//! Process-wide error reporting.
//!
//! Recording paths never return errors to the instrumented application.
//! Usage errors and export failures are instead routed to a single handler
//! that can be replaced with [`set_error_handler`].
mod error_handler;

pub use error_handler::{handle_error, set_error_handler};
