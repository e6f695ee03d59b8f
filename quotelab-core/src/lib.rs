//! QuoteLab Core: the numeric market-data pipeline.
//!
//! - Domain types (bars, trade prints)
//! - Time bucketing across time zones and trading-session filters
//! - Incremental (per-trade) and batch bar aggregation
//! - Primary/secondary provider fallback with bounded backoff
//! - ATR/SuperTrend factor sweep, k-means factor selection, adaptive trend

pub mod aggregate;
pub mod config;
pub mod data;
pub mod domain;
pub mod indicators;
pub mod rng;
pub mod time;
pub mod trend;

pub use aggregate::{aggregate, CompletedBar, ShardedAggregator, TradeAggregator};
pub use config::{ConfigError, PipelineConfig};
pub use data::{BarProvider, BarsResponse, DataError, FallbackChain, ProviderError, ProviderKind};
pub use domain::{Bar, TradeEvent};
pub use time::{filter_by_session, floor, Interval, Session};
pub use trend::{compute_adaptive_trend, AdaptiveTrend, TrendOptions, TrendPoint};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: types handed across threads are Send + Sync.
    ///
    /// The sharded aggregator and the fallback chain are shared behind `Arc`
    /// by request handlers; trend output is computed on worker threads.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain types
        require_send::<domain::Bar>();
        require_sync::<domain::Bar>();
        require_send::<domain::TradeEvent>();
        require_sync::<domain::TradeEvent>();

        // Time
        require_send::<time::Interval>();
        require_sync::<time::Interval>();
        require_send::<time::Session>();
        require_sync::<time::Session>();

        // Aggregation
        require_send::<aggregate::TradeAggregator>();
        require_sync::<aggregate::TradeAggregator>();
        require_send::<aggregate::ShardedAggregator>();
        require_sync::<aggregate::ShardedAggregator>();
        require_send::<aggregate::CompletedBar>();
        require_sync::<aggregate::CompletedBar>();

        // Fallback chain
        require_send::<data::FallbackChain>();
        require_sync::<data::FallbackChain>();
        require_send::<data::DataError>();
        require_sync::<data::DataError>();
        require_send::<data::MemoryCache>();
        require_sync::<data::MemoryCache>();

        // Trend
        require_send::<trend::TrendOptions>();
        require_sync::<trend::TrendOptions>();
        require_send::<trend::AdaptiveTrend>();
        require_sync::<trend::AdaptiveTrend>();

        // RNG
        require_send::<rng::RngHierarchy>();
        require_sync::<rng::RngHierarchy>();
    }

    /// The chain is used behind `Arc` from spawned tasks, so its futures must be `Send`.
    #[allow(dead_code)]
    fn get_bars_future_is_send(chain: &data::FallbackChain) {
        fn require_send<F: Send>(_: F) {}
        let now = chrono::Utc::now();
        require_send(chain.get_bars("AAPL", now, now, "1m"));
    }
}
