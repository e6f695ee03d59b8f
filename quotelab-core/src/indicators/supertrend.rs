//! SuperTrend bands swept over ATR multipliers, with an online performance score.
//!
//! Inherently sequential/stateful per factor: the final bands ratchet and the
//! direction flips on close-vs-band comparisons. Factors are independent of
//! each other, so the sweep fans out across factors.
//!
//! Ratchet rule:
//! - final upper = candidate upper if it is below the previous final upper or
//!   the previous close broke above the previous final upper, else unchanged.
//! - final lower = candidate lower if it is above the previous final lower or
//!   the previous close broke below the previous final lower, else unchanged.
//!
//! Direction starts neutral (0), flips to +1 on close > final upper and to -1
//! on close < final lower. The reported supertrend is the final lower band
//! while trending up and the final upper band otherwise.

use super::atr::{atr, span_alpha};
use crate::domain::Bar;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Bands and trend for one multiplier, aligned 1:1 with the input bars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorSeries {
    pub factor: f64,
    pub supertrend: Vec<f64>,
    pub trend: Vec<i8>,
    pub upper_band: Vec<f64>,
    pub lower_band: Vec<f64>,
    /// Online score after the last bar.
    pub performance: f64,
}

impl FactorSeries {
    pub fn len(&self) -> usize {
        self.supertrend.len()
    }

    pub fn is_empty(&self) -> bool {
        self.supertrend.is_empty()
    }
}

/// Performance smoothing factor: values above 1 are an EMA span, values in
/// (0, 1] are used directly. Anything else falls back to a span of 10.
pub fn performance_alpha(perf_alpha: f64) -> f64 {
    if perf_alpha.is_finite() && perf_alpha > 1.0 {
        span_alpha(perf_alpha)
    } else if perf_alpha.is_finite() && perf_alpha > 0.0 {
        perf_alpha
    } else {
        span_alpha(10.0)
    }
}

/// -1, 0 or +1; unlike `f64::signum`, zero maps to zero.
pub(crate) fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Bands, trend and performance for one factor over a precomputed ATR.
///
/// `bars` must be finite and `atr.len() == bars.len()`.
pub fn supertrend_for_factor(bars: &[Bar], atr: &[f64], factor: f64, alpha: f64) -> FactorSeries {
    let n = bars.len().min(atr.len());
    let mut series = FactorSeries {
        factor,
        supertrend: Vec::with_capacity(n),
        trend: Vec::with_capacity(n),
        upper_band: Vec::with_capacity(n),
        lower_band: Vec::with_capacity(n),
        performance: 0.0,
    };
    if n == 0 {
        return series;
    }

    let mut upper = 0.0;
    let mut lower = 0.0;
    let mut trend: i8 = 0;
    let mut perf = 0.0;

    for i in 0..n {
        let bar = &bars[i];
        let basis = (bar.high + bar.low) / 2.0;
        let candidate_upper = basis + atr[i] * factor;
        let candidate_lower = basis - atr[i] * factor;

        if i == 0 {
            upper = candidate_upper;
            lower = candidate_lower;
        } else {
            let prev_close = bars[i - 1].close;
            let prev_st = series.supertrend[i - 1];
            perf += alpha * ((bar.close - prev_close) * sign(prev_close - prev_st) - perf);

            if candidate_upper < upper || prev_close > upper {
                upper = candidate_upper;
            }
            if candidate_lower > lower || prev_close < lower {
                lower = candidate_lower;
            }
            if bar.close > upper {
                trend = 1;
            } else if bar.close < lower {
                trend = -1;
            }
        }

        series.upper_band.push(upper);
        series.lower_band.push(lower);
        series.trend.push(trend);
        series.supertrend.push(if trend == 1 { lower } else { upper });
    }

    series.performance = perf;
    series
}

/// ATR plus one [`FactorSeries`] per factor, in factor order.
pub fn compute_bands(
    bars: &[Bar],
    atr_length: usize,
    factors: &[f64],
    perf_alpha: f64,
    parallel: bool,
) -> (Vec<f64>, Vec<FactorSeries>) {
    let atr = atr(bars, atr_length);
    let alpha = performance_alpha(perf_alpha);

    let series = if parallel {
        factors
            .par_iter()
            .map(|&f| supertrend_for_factor(bars, &atr, f, alpha))
            .collect()
    } else {
        factors
            .iter()
            .map(|&f| supertrend_for_factor(bars, &atr, f, alpha))
            .collect()
    };

    (atr, series)
}
