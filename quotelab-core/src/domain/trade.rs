//! Normalized trade print.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One trade print, consumed once by the incremental aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    pub symbol: String,
    pub price: f64,
    pub volume: f64,
    pub timestamp: DateTime<Utc>,
}

impl TradeEvent {
    pub fn new(
        symbol: impl Into<String>,
        price: f64,
        volume: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            volume,
            timestamp,
        }
    }

    /// Build an event from a vendor epoch-milliseconds timestamp.
    ///
    /// Returns `None` when the timestamp is non-finite or outside chrono's range.
    pub fn from_epoch_millis(
        symbol: impl Into<String>,
        price: f64,
        volume: f64,
        epoch_ms: f64,
    ) -> Option<Self> {
        if !epoch_ms.is_finite() {
            return None;
        }
        let timestamp = DateTime::from_timestamp_millis(epoch_ms.trunc() as i64)?;
        Some(Self::new(symbol, price, volume, timestamp))
    }

    /// An event the aggregator can fold: non-empty symbol and finite price.
    pub fn is_valid(&self) -> bool {
        !self.symbol.trim().is_empty() && self.price.is_finite()
    }
}
