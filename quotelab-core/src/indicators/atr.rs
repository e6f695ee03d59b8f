//! Average True Range (ATR).
//!
//! True Range: max(high-low, |high-prev_close|, |low-prev_close|)
//! Smoothing: EMA with span = length (alpha = 2/(length+1)), seeded at the
//! first true-range value so the series has no warmup and no cold-start bias
//! toward zero volatility.

use crate::domain::Bar;

/// Compute the True Range series from bars.
/// TR[0] = |high[0] - low[0]| (no previous close).
/// TR[t] = max(high[t]-low[t], |high[t]-close[t-1]|, |low[t]-close[t-1]|).
///
/// Expects finite input; see [`sanitize_bars`](super::sanitize::sanitize_bars).
pub fn true_range(bars: &[Bar]) -> Vec<f64> {
    let mut tr = Vec::with_capacity(bars.len());
    let Some(first) = bars.first() else {
        return tr;
    };
    tr.push((first.high - first.low).abs());

    for pair in bars.windows(2) {
        let pc = pair[0].close;
        let (h, l) = (pair[1].high, pair[1].low);
        tr.push((h - l).max((h - pc).abs()).max((l - pc).abs()));
    }
    tr
}

/// Smoothing factor for an EMA span.
pub fn span_alpha(span: f64) -> f64 {
    2.0 / (span + 1.0)
}

/// EMA seeded at the first value: out[0] = values[0],
/// out[t] = out[t-1] + alpha * (values[t] - out[t-1]).
pub fn ema_seeded(values: &[f64], alpha: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let mut prev = None;
    for &v in values {
        let next = match prev {
            None => v,
            Some(p) => p + alpha * (v - p),
        };
        out.push(next);
        prev = Some(next);
    }
    out
}

/// ATR with span `length` (clamped to at least 1).
pub fn atr(bars: &[Bar], length: usize) -> Vec<f64> {
    let alpha = span_alpha(length.max(1) as f64);
    ema_seeded(&true_range(bars), alpha)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_ohlc_bars, DEFAULT_EPSILON};

    #[test]
    fn true_range_basic() {
        let bars = make_ohlc_bars(&[
            (100.0, 105.0, 95.0, 102.0),  // TR = 105-95 = 10
            (102.0, 108.0, 100.0, 106.0), // TR = max(8, |108-102|, |100-102|) = 8
            (106.0, 107.0, 98.0, 99.0),   // TR = max(9, |107-106|, |98-106|) = 9
        ]);
        let tr = true_range(&bars);
        assert_approx(tr[0], 10.0, DEFAULT_EPSILON);
        assert_approx(tr[1], 8.0, DEFAULT_EPSILON);
        assert_approx(tr[2], 9.0, DEFAULT_EPSILON);
    }

    #[test]
    fn true_range_gap_up() {
        let bars = make_ohlc_bars(&[
            (98.0, 102.0, 97.0, 100.0),
            (110.0, 115.0, 108.0, 112.0), // TR = max(7, |115-100|, |108-100|) = 15
        ]);
        assert_approx(true_range(&bars)[1], 15.0, DEFAULT_EPSILON);
    }

    #[test]
    fn atr_seeds_at_first_true_range() {
        let bars = make_ohlc_bars(&[
            (100.0, 105.0, 95.0, 102.0),  // TR = 10
            (102.0, 108.0, 100.0, 106.0), // TR = 8
            (106.0, 107.0, 98.0, 99.0),   // TR = 9
        ]);
        let result = atr(&bars, 3); // alpha = 0.5
        assert_approx(result[0], 10.0, DEFAULT_EPSILON);
        assert_approx(result[1], 9.0, DEFAULT_EPSILON);
        assert_approx(result[2], 9.0, DEFAULT_EPSILON);
    }

    #[test]
    fn atr_has_no_warmup() {
        let bars = make_ohlc_bars(&[(1.0, 2.0, 0.5, 1.5); 4]);
        assert!(atr(&bars, 14).iter().all(|v| v.is_finite()));
    }

    #[test]
    fn empty_input() {
        assert!(atr(&[], 10).is_empty());
        assert!(true_range(&[]).is_empty());
    }

    #[test]
    fn inverted_first_bar_is_non_negative() {
        let bars = make_ohlc_bars(&[(100.0, 95.0, 105.0, 100.0)]);
        assert_approx(true_range(&bars)[0], 10.0, DEFAULT_EPSILON);
    }
}
