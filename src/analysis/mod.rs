//! Aggregation, alarm correlation and tag grouping.

pub mod aggregator;
pub mod grouping;
pub mod summary;

pub use aggregator::*;
pub use grouping::*;
pub use summary::*;
