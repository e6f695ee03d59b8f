//! Bar aggregation: streaming trades -> bars, and batch bars -> coarser bars.

pub mod batch;
pub mod incremental;
pub mod sharded;

pub use batch::aggregate;
pub use incremental::{AggregationBucket, CompletedBar, TradeAggregator};
pub use sharded::ShardedAggregator;
