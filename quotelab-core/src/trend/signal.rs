//! Trade levels for trend flips.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One record per non-zero `signal` in the trend series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalMetric {
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    /// +1 long, -1 short.
    pub direction: i8,
    pub entry: f64,
    /// Supertrend level at the flip.
    pub stop: f64,
    /// Entry plus or minus ATR x factor x target multiplier.
    pub target: f64,
    pub confidence: f64,
    pub atr: f64,
    /// `|target - entry| / |entry - stop|`, zero when the stop sits on the entry.
    pub reward_risk: f64,
}

impl SignalMetric {
    pub fn is_long(&self) -> bool {
        self.direction > 0
    }
}

/// Inputs for one signal, gathered by the engine at a flip bar.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FlipContext {
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    pub direction: i8,
    pub close: f64,
    pub supertrend: f64,
    pub atr: f64,
}

/// Derive stop/target levels for a flip.
pub(crate) fn signal_metric(
    flip: FlipContext,
    factor: f64,
    target_multiplier: f64,
    confidence: f64,
) -> SignalMetric {
    let dir = f64::from(flip.direction.signum());
    let reach = flip.atr * factor * target_multiplier;
    let target = flip.close + dir * reach;
    let risk = (flip.close - flip.supertrend).abs();
    let reward_risk = if risk > 0.0 && risk.is_finite() {
        (target - flip.close).abs() / risk
    } else {
        0.0
    };

    SignalMetric {
        index: flip.index,
        timestamp: flip.timestamp,
        direction: flip.direction.signum(),
        entry: flip.close,
        stop: flip.supertrend,
        target,
        confidence: confidence.clamp(0.0, 1.0),
        atr: flip.atr,
        reward_risk,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn flip(direction: i8, close: f64, supertrend: f64) -> FlipContext {
        FlipContext {
            index: 7,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            direction,
            close,
            supertrend,
            atr: 2.0,
        }
    }

    #[test]
    fn long_levels() {
        let s = signal_metric(flip(1, 100.0, 96.0), 3.0, 1.0, 0.4);
        assert!(s.is_long());
        assert_eq!(s.stop, 96.0);
        assert_eq!(s.target, 106.0);
        assert_eq!(s.reward_risk, 1.5);
        assert_eq!(s.confidence, 0.4);
    }

    #[test]
    fn short_levels_with_multiplier() {
        let s = signal_metric(flip(-1, 100.0, 104.0), 2.0, 2.0, 1.7);
        assert_eq!(s.direction, -1);
        assert_eq!(s.target, 92.0);
        assert_eq!(s.reward_risk, 2.0);
        assert_eq!(s.confidence, 1.0);
    }

    #[test]
    fn stop_at_entry_has_zero_reward_risk() {
        let s = signal_metric(flip(1, 100.0, 100.0), 2.0, 1.0, 0.5);
        assert_eq!(s.reward_risk, 0.0);
    }
}
