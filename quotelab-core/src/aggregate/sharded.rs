//! Concurrent ingest: one lock per symbol shard.
//!
//! `ingest` reads and conditionally mutates a symbol's buckets, so it needs
//! exclusive access to that symbol. Sharding by symbol hash keeps ingests for
//! different symbols from contending on a single lock.

use super::incremental::{sort_completed, CompletedBar, TradeAggregator};
use crate::domain::TradeEvent;
use crate::time::Interval;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

#[derive(Debug)]
pub struct ShardedAggregator {
    shards: Vec<Mutex<TradeAggregator>>,
}

impl ShardedAggregator {
    /// `shards` is clamped to at least one.
    pub fn new(interval: Interval, timezone: Tz, shards: usize) -> Self {
        let shards = (0..shards.max(1))
            .map(|_| Mutex::new(TradeAggregator::new(interval, timezone)))
            .collect();
        Self { shards }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn shard_for(&self, symbol: &str) -> &Mutex<TradeAggregator> {
        let mut hasher = DefaultHasher::new();
        symbol.hash(&mut hasher);
        let idx = (hasher.finish() % self.shards.len() as u64) as usize;
        &self.shards[idx]
    }

    /// Same contract as [`TradeAggregator::ingest`]; locks only the symbol's shard.
    pub fn ingest(&self, event: &TradeEvent) -> Vec<CompletedBar> {
        self.shard_for(&event.symbol).lock().ingest(event)
    }

    /// Timer-driven flush across every shard, merged and sorted by bucket start.
    pub fn flush(&self, now: DateTime<Utc>) -> Vec<CompletedBar> {
        self.collect_shards(|agg| agg.flush(now))
    }

    pub fn drain(&self) -> Vec<CompletedBar> {
        self.collect_shards(TradeAggregator::drain)
    }

    pub fn open_buckets(&self) -> usize {
        self.shards.iter().map(|s| s.lock().open_buckets()).sum()
    }

    fn collect_shards(
        &self,
        mut f: impl FnMut(&mut TradeAggregator) -> Vec<CompletedBar>,
    ) -> Vec<CompletedBar> {
        let mut out = Vec::new();
        for shard in &self.shards {
            let mut guard = shard.lock();
            out.extend(f(&mut *guard));
        }
        sort_completed(&mut out);
        out
    }
}
