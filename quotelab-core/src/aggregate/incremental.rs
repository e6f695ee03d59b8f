//! Streaming trade prints -> OHLCV bars.
//!
//! Bucket closing is event driven: when a trade lands in a newer bucket for a
//! symbol, every older bucket of that symbol is complete and is emitted. A
//! symbol that stops trading keeps its last bucket open until
//! [`TradeAggregator::flush`] is called from a periodic timer, or
//! [`TradeAggregator::drain`] at end of stream.
//!
//! A flushed bucket is never reopened. A late print whose bucket is older than
//! the symbol's open bucket is folded into the open bucket. With no open
//! bucket, it starts the bucket after the newest one already closed.

use crate::domain::bar::clean_volume;
use crate::domain::{Bar, Symbol, TradeEvent};
use crate::time::{floor, next_bucket_start, Interval};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A finished bar for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedBar {
    pub symbol: Symbol,
    pub bar: Bar,
    pub trade_count: u64,
}

/// Mutable accumulator for one `(symbol, bucket_start)`.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationBucket {
    pub start: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub trade_count: u64,
}

impl AggregationBucket {
    fn seed(start: DateTime<Utc>, price: f64, volume: f64) -> Self {
        Self {
            start,
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
            trade_count: 1,
        }
    }

    fn update(&mut self, price: f64, volume: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.volume += volume;
        self.trade_count += 1;
    }

    fn finish(self, symbol: &str) -> CompletedBar {
        CompletedBar {
            symbol: symbol.to_string(),
            bar: Bar {
                timestamp: self.start,
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
                volume: self.volume,
            },
            trade_count: self.trade_count,
        }
    }
}

/// Single-owner incremental aggregator. Wrap in
/// [`ShardedAggregator`](super::ShardedAggregator) for concurrent ingest.
#[derive(Debug, Clone)]
pub struct TradeAggregator {
    interval: Interval,
    timezone: Tz,
    buckets: HashMap<Symbol, BTreeMap<DateTime<Utc>, AggregationBucket>>,
    /// Newest closed bucket start per symbol.
    closed: HashMap<Symbol, DateTime<Utc>>,
}

impl TradeAggregator {
    pub fn new(interval: Interval, timezone: Tz) -> Self {
        Self {
            interval,
            timezone,
            buckets: HashMap::new(),
            closed: HashMap::new(),
        }
    }

    /// One-minute bars, the streaming default.
    pub fn minute_bars(timezone: Tz) -> Self {
        Self::new(Interval::M1, timezone)
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Number of live accumulators across all symbols.
    pub fn open_buckets(&self) -> usize {
        self.buckets.values().map(BTreeMap::len).sum()
    }

    /// Fold one trade. Returns the bars this event completed for its symbol,
    /// oldest first.
    ///
    /// Events with an empty symbol or a non-finite price are rejected without
    /// touching state.
    pub fn ingest(&mut self, event: &TradeEvent) -> Vec<CompletedBar> {
        if !event.is_valid() {
            tracing::trace!(symbol = %event.symbol, price = event.price, "rejected trade event");
            return Vec::new();
        }

        let volume = clean_volume(event.volume);
        let mut bucket_start = floor(event.timestamp, self.interval, self.timezone);
        let last_closed = self.closed.get(&event.symbol).copied();
        let symbol_buckets = self.buckets.entry(event.symbol.clone()).or_default();

        if let Some((&newest, _)) = symbol_buckets.last_key_value() {
            if bucket_start < newest {
                bucket_start = newest;
            }
        } else if let Some(closed) = last_closed.filter(|c| bucket_start <= *c) {
            tracing::trace!(symbol = %event.symbol, %closed, "late trade after flush");
            bucket_start = next_bucket_start(closed, self.interval, self.timezone);
        }

        symbol_buckets
            .entry(bucket_start)
            .and_modify(|b| b.update(event.price, volume))
            .or_insert_with(|| AggregationBucket::seed(bucket_start, event.price, volume));

        let current = symbol_buckets.split_off(&bucket_start);
        let completed = std::mem::replace(symbol_buckets, current);

        if let Some((&newest, _)) = completed.last_key_value() {
            self.closed.insert(event.symbol.clone(), newest);
        }
        completed
            .into_values()
            .map(|b| b.finish(&event.symbol))
            .collect()
    }

    /// Close buckets whose start is at or before `floor(now) - interval`,
    /// across all symbols. Output is sorted by bucket start.
    pub fn flush(&mut self, now: DateTime<Utc>) -> Vec<CompletedBar> {
        let cutoff = floor(now, self.interval, self.timezone) - self.interval.duration();
        self.close_where(|start| start <= cutoff)
    }

    /// Close every open bucket.
    pub fn drain(&mut self) -> Vec<CompletedBar> {
        self.close_where(|_| true)
    }

    fn close_where(&mut self, is_done: impl Fn(DateTime<Utc>) -> bool) -> Vec<CompletedBar> {
        let mut out = Vec::new();
        for (symbol, symbol_buckets) in self.buckets.iter_mut() {
            let done: Vec<DateTime<Utc>> = symbol_buckets
                .keys()
                .copied()
                .take_while(|&start| is_done(start))
                .collect();
            for start in done {
                if let Some(bucket) = symbol_buckets.remove(&start) {
                    out.push(bucket.finish(symbol));
                    self.closed.insert(symbol.clone(), start);
                }
            }
        }
        self.buckets.retain(|_, b| !b.is_empty());
        sort_completed(&mut out);
        out
    }
}

/// Order by bucket start, then symbol, so output is deterministic.
pub(crate) fn sort_completed(bars: &mut [CompletedBar]) {
    bars.sort_by(|a, b| {
        a.bar
            .timestamp
            .cmp(&b.bar.timestamp)
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
}
