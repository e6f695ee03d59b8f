//! Primary/secondary provider fallback with bounded exponential backoff.
//!
//! State machine: PRIMARY -> (retryable failure) -> FALLBACK -> SUCCESS or
//! EXHAUSTED. The primary is called once. A non-retryable primary failure is
//! returned as-is so a bad symbol is never reported as an outage. The
//! secondary is called up to `max_retries` times; the delay before fallback
//! attempt `k` (0-based) is `backoff_ms_initial * 2^k`.
//!
//! Every provider call runs under a timeout bounded by the remaining overall
//! deadline. A call timeout is a retryable failure; running out of deadline
//! is not, and no backoff sleep is started that would overrun it.

use super::cache::{cache_key, BarCache, CachedBars};
use super::provider::{BarProvider, DataError, ProviderError, ProviderKind};
use super::resolution::{parse_resolution, FallbackPlan};
use crate::aggregate::aggregate;
use crate::domain::Bar;
use crate::time::Interval;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const MAX_SYMBOL_LEN: usize = 32;

/// Retry, timeout and cache settings for [`FallbackChain`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub max_retries: u32,
    pub backoff_ms_initial: u64,
    pub call_timeout_ms: u64,
    /// Overall budget for one `get_bars` call.
    pub deadline_ms: Option<u64>,
    pub cache_ttl_secs: u64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_ms_initial: 1000,
            call_timeout_ms: 10_000,
            deadline_ms: Some(30_000),
            cache_ttl_secs: 300,
        }
    }
}

impl FallbackConfig {
    /// Sleep before fallback attempt `attempt` (0-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.backoff_ms_initial.saturating_mul(factor))
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Bars plus the side of the chain that served them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarsResponse {
    pub bars: Vec<Bar>,
    pub provider: ProviderKind,
}

enum CallFailure {
    Provider(ProviderError),
    Deadline,
}

pub struct FallbackChain {
    primary: Arc<dyn BarProvider>,
    secondary: Arc<dyn BarProvider>,
    config: FallbackConfig,
    timezone: Tz,
    cache: Option<Arc<dyn BarCache>>,
}

impl FallbackChain {
    pub fn new(
        primary: Arc<dyn BarProvider>,
        secondary: Arc<dyn BarProvider>,
        config: FallbackConfig,
    ) -> Self {
        Self {
            primary,
            secondary,
            config,
            timezone: chrono_tz::America::New_York,
            cache: None,
        }
    }

    /// Zone used to re-aggregate secondary bars.
    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn BarCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &FallbackConfig {
        &self.config
    }

    /// Fetch bars, falling back to the secondary on retryable failures.
    ///
    /// The secondary is tried at most `max_retries` times. A non-retryable
    /// secondary error ends the fallback early, so fewer calls are made and
    /// [`DataError::Exhausted`] reports the attempts actually made.
    ///
    /// The overall deadline comes from `deadline_ms` in the config. A
    /// successful result is written to the cache before returning; see
    /// [`BarCache`] for the latency expected of `set`.
    pub async fn get_bars(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        resolution: &str,
    ) -> Result<BarsResponse, DataError> {
        let deadline = self
            .config
            .deadline_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms));
        self.get_bars_until(symbol, from, to, resolution, deadline)
            .await
    }

    /// [`get_bars`](Self::get_bars) with a caller-supplied overall deadline.
    pub async fn get_bars_until(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        resolution: &str,
        deadline: Option<Instant>,
    ) -> Result<BarsResponse, DataError> {
        let symbol = validate_symbol(symbol)?;
        if from > to {
            return Err(DataError::InvalidRange { from, to });
        }
        let interval = parse_resolution(resolution)?;

        let key = cache_key(symbol, interval, from, to);
        if let Some(hit) = self.cached(&key) {
            tracing::debug!(symbol, %interval, provider = %hit.provider, "bars served from cache");
            return Ok(hit);
        }

        let primary_err = match self
            .call(&*self.primary, symbol, interval, from, to, deadline)
            .await
        {
            Ok(bars) => return Ok(self.finish(&key, bars, ProviderKind::Primary)),
            Err(CallFailure::Deadline) => {
                return Err(DataError::DeadlineExceeded {
                    primary: None,
                    secondary: None,
                    attempts: 0,
                })
            }
            Err(CallFailure::Provider(err)) => err,
        };

        if !primary_err.is_retryable() {
            tracing::debug!(symbol, error = %primary_err, "primary failed, not retryable");
            return Err(DataError::Provider {
                kind: ProviderKind::Primary,
                name: self.primary.name().to_string(),
                source: primary_err,
            });
        }

        let plan = FallbackPlan::for_interval(interval);
        tracing::info!(
            symbol,
            primary = self.primary.name(),
            secondary = self.secondary.name(),
            error = %primary_err,
            fetch = %plan.fetch,
            "primary failed, falling back"
        );

        let mut last_err: Option<ProviderError> = None;
        let mut attempts = 0;
        while attempts < self.config.max_retries {
            let delay = self.config.backoff_delay(attempts);
            if deadline.is_some_and(|d| Instant::now() + delay > d) {
                tracing::warn!(symbol, attempts, "deadline leaves no room for another backoff");
                return Err(DataError::DeadlineExceeded {
                    primary: Some(primary_err),
                    secondary: last_err,
                    attempts,
                });
            }
            tokio::time::sleep(delay).await;
            attempts += 1;

            match self
                .call(&*self.secondary, symbol, plan.fetch, from, to, deadline)
                .await
            {
                Ok(bars) => {
                    let fetched = bars.len();
                    let bars = if plan.needs_aggregation() {
                        aggregate(&bars, interval, self.timezone)
                    } else {
                        bars
                    };
                    tracing::info!(symbol, attempts, fetched, bars = bars.len(), "secondary served request");
                    return Ok(self.finish(&key, bars, ProviderKind::Secondary));
                }
                Err(CallFailure::Deadline) => {
                    return Err(DataError::DeadlineExceeded {
                        primary: Some(primary_err),
                        secondary: last_err,
                        attempts,
                    })
                }
                Err(CallFailure::Provider(err)) => {
                    tracing::warn!(symbol, attempt = attempts, error = %err, "secondary attempt failed");
                    let retryable = err.is_retryable();
                    last_err = Some(err);
                    if !retryable {
                        break;
                    }
                }
            }
        }

        Err(DataError::Exhausted {
            primary: primary_err,
            secondary: last_err,
            attempts,
        })
    }

    async fn call(
        &self,
        provider: &dyn BarProvider,
        symbol: &str,
        interval: Interval,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        deadline: Option<Instant>,
    ) -> Result<Vec<Bar>, CallFailure> {
        let mut budget = self.config.call_timeout();
        if let Some(deadline) = deadline {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(CallFailure::Deadline);
            }
            budget = budget.min(remaining);
        }

        tracing::debug!(provider = provider.name(), symbol, %interval, "fetching bars");
        match tokio::time::timeout(budget, provider.fetch_bars(symbol, interval, from, to)).await {
            Ok(Ok(bars)) => Ok(bars),
            Ok(Err(err)) => Err(CallFailure::Provider(err)),
            Err(_) if deadline.is_some_and(|d| Instant::now() >= d) => Err(CallFailure::Deadline),
            Err(_) => Err(CallFailure::Provider(ProviderError::call_timeout(budget))),
        }
    }

    fn cached(&self, key: &str) -> Option<BarsResponse> {
        let bytes = self.cache.as_ref()?.get(key)?;
        match serde_json::from_slice::<CachedBars>(&bytes) {
            Ok(entry) => Some(BarsResponse {
                bars: entry.bars,
                provider: entry.provider,
            }),
            Err(err) => {
                tracing::warn!(key, error = %err, "ignoring unreadable cache entry");
                None
            }
        }
    }

    fn finish(&self, key: &str, bars: Vec<Bar>, provider: ProviderKind) -> BarsResponse {
        let response = BarsResponse { bars, provider };
        if let Some(cache) = &self.cache {
            let entry = CachedBars {
                provider,
                bars: response.bars.clone(),
            };
            let written = serde_json::to_vec(&entry)
                .map_err(Into::into)
                .and_then(|bytes| cache.set(key, bytes, self.config.cache_ttl()));
            if let Err(err) = written {
                tracing::warn!(key, error = %err, "cache write failed");
            }
        }
        response
    }
}

/// Trimmed symbol, or `InvalidSymbol` when empty, too long or containing
/// characters no vendor ticker uses.
fn validate_symbol(raw: &str) -> Result<&str, DataError> {
    let symbol = raw.trim();
    let well_formed = !symbol.is_empty()
        && symbol.len() <= MAX_SYMBOL_LEN
        && symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '/' | '^' | '=' | '_' | ':'));
    if well_formed {
        Ok(symbol)
    } else {
        Err(DataError::InvalidSymbol(raw.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles() {
        let cfg = FallbackConfig::default();
        assert_eq!(cfg.backoff_delay(0), Duration::from_millis(1000));
        assert_eq!(cfg.backoff_delay(1), Duration::from_millis(2000));
        assert_eq!(cfg.backoff_delay(2), Duration::from_millis(4000));
        assert_eq!(cfg.backoff_delay(80), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn symbol_validation() {
        assert_eq!(validate_symbol(" AAPL ").unwrap(), "AAPL");
        assert!(validate_symbol("BRK.B").is_ok());
        assert!(validate_symbol("BTC/USD").is_ok());
        assert!(validate_symbol("^GSPC").is_ok());
        assert!(validate_symbol("").is_err());
        assert!(validate_symbol("AA PL").is_err());
        assert!(validate_symbol("DROP;TABLE").is_err());
        assert!(validate_symbol(&"X".repeat(40)).is_err());
    }

    #[test]
    fn config_defaults_from_partial_toml() {
        let cfg: FallbackConfig = toml::from_str("max_retries = 3").unwrap();
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.backoff_ms_initial, 1000);
        assert_eq!(cfg.deadline_ms, Some(30_000));
    }
}
