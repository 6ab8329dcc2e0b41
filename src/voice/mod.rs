//! Voice transcript handling

mod aggregator;

pub use aggregator::{TranscriptAggregator, IDLE_FLUSH};
