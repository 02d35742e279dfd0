//! Processors
mod basic;

pub use basic::{basic, BasicProcessor};
