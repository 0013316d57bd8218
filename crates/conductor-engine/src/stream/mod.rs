//! Streaming response aggregation.

mod aggregator;

pub use aggregator::{AggregatorState, StreamEnd};
