//! Aggregator selectors
pub mod simple;
