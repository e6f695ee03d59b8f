//! Adaptive trend engine: sweep, select, then run the chosen factor forward.
//!
//! One call recomputes the whole series. The factor sweep fans out across
//! factors; the `ama` recurrence over the chosen factor is strictly
//! left-to-right.

use super::factors::{factor_grid, snap_to_grid};
use super::selector::{select_factor, ClusterLabel, ClusterStats, FactorSelection};
use super::signal::{signal_metric, FlipContext, SignalMetric};
use crate::domain::Bar;
use crate::indicators::{compute_bands, ema_seeded, performance_alpha, sanitize_bars, FactorSeries};
use crate::rng::RngHierarchy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const KMEANS_SCOPE: &str = "kmeans";

/// Engine parameters. Every field has a default so partial TOML works.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendOptions {
    pub atr_length: usize,
    pub min_multiplier: f64,
    pub max_multiplier: f64,
    pub step: f64,
    /// EMA span (> 1) or raw alpha in (0, 1] for the performance score.
    pub perf_alpha: f64,
    pub from_cluster: ClusterLabel,
    pub max_iter: usize,
    /// Scales ATR x factor when placing signal targets.
    pub target_multiplier: f64,
    /// k-means reseed source; `None` derives one from the series.
    pub seed: Option<u64>,
    pub parallel: bool,
}

impl Default for TrendOptions {
    fn default() -> Self {
        Self {
            atr_length: 10,
            min_multiplier: 1.0,
            max_multiplier: 5.0,
            step: 0.5,
            perf_alpha: 10.0,
            from_cluster: ClusterLabel::Best,
            max_iter: 1000,
            target_multiplier: 1.0,
            seed: None,
            parallel: true,
        }
    }
}

impl TrendOptions {
    /// The swept factor set.
    pub fn factors(&self) -> Vec<f64> {
        factor_grid(self.min_multiplier, self.max_multiplier, self.step)
    }

    fn neutral_factor(&self) -> f64 {
        if self.min_multiplier.is_finite() {
            self.min_multiplier
        } else {
            1.0
        }
    }

    fn effective_target_multiplier(&self) -> f64 {
        if self.target_multiplier.is_finite() && self.target_multiplier >= 0.0 {
            self.target_multiplier
        } else {
            1.0
        }
    }
}

/// One output row per input bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub date: DateTime<Utc>,
    pub close: f64,
    pub supertrend: f64,
    pub trend: i8,
    pub upper_band: f64,
    pub lower_band: f64,
    pub ama: f64,
    /// Direction on the bar the trend flipped, else 0.
    pub signal: i8,
    /// `close - supertrend`.
    pub distance: f64,
}

/// Non-fatal input conditions. The result is still well defined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DegenerateInput {
    EmptySeries,
    TooFewFactors { swept: usize },
    AllZeroAtr,
    NonFiniteInput { replaced: usize },
    EmptyCluster { requested: ClusterLabel, used: ClusterLabel },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendDiagnostics {
    pub target_factor: f64,
    pub factors_swept: usize,
    pub requested_cluster: ClusterLabel,
    pub used_cluster: ClusterLabel,
    /// Positive cluster performance over mean absolute bar change. Not clamped.
    pub performance_index: f64,
    pub cluster_perf_mean: f64,
    pub cluster_dispersion: f64,
    pub clusters: Vec<ClusterStats>,
    pub iterations: usize,
    pub converged: bool,
    pub seed: u64,
    pub warnings: Vec<DegenerateInput>,
}

impl TrendDiagnostics {
    fn neutral(options: &TrendOptions, seed: u64) -> Self {
        Self {
            target_factor: options.neutral_factor(),
            factors_swept: 0,
            requested_cluster: options.from_cluster,
            used_cluster: options.from_cluster,
            performance_index: 0.0,
            cluster_perf_mean: 0.0,
            cluster_dispersion: 0.0,
            clusters: Vec::new(),
            iterations: 0,
            converged: true,
            seed,
            warnings: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveTrend {
    pub series: Vec<TrendPoint>,
    pub signals: Vec<SignalMetric>,
    pub diagnostics: TrendDiagnostics,
}

impl AdaptiveTrend {
    pub fn latest(&self) -> Option<&TrendPoint> {
        self.series.last()
    }
}

/// Run the full sweep/select/trend pipeline over `bars`.
///
/// Total over any input: empty or non-finite data yields a neutral or
/// repaired result with the condition listed in `diagnostics.warnings`.
pub fn compute_adaptive_trend(bars: &[Bar], options: &TrendOptions) -> AdaptiveTrend {
    if bars.is_empty() {
        tracing::warn!("adaptive trend requested over an empty series");
        let mut diagnostics = TrendDiagnostics::neutral(options, options.seed.unwrap_or(0));
        diagnostics.warnings.push(DegenerateInput::EmptySeries);
        return AdaptiveTrend {
            series: Vec::new(),
            signals: Vec::new(),
            diagnostics,
        };
    }

    let mut warnings = Vec::new();
    let sanitized = sanitize_bars(bars);
    if sanitized.replaced > 0 {
        tracing::warn!(replaced = sanitized.replaced, "substituted non-finite prices");
        warnings.push(DegenerateInput::NonFiniteInput {
            replaced: sanitized.replaced,
        });
    }
    let bars = sanitized.bars;

    let factors = options.factors();
    if factors.len() < 3 {
        warnings.push(DegenerateInput::TooFewFactors {
            swept: factors.len(),
        });
    }

    let (atr, sweep) = compute_bands(
        &bars,
        options.atr_length.max(1),
        &factors,
        options.perf_alpha,
        options.parallel,
    );
    let seed = options
        .seed
        .unwrap_or_else(|| RngHierarchy::from_series(&bars).master_seed());
    let target_multiplier = options.effective_target_multiplier();

    if atr.iter().all(|v| *v == 0.0) {
        // Every factor scores the same; clustering would pick noise.
        tracing::warn!(bars = bars.len(), "zero ATR across the series, using the neutral factor");
        warnings.push(DegenerateInput::AllZeroAtr);
        let mut diagnostics = TrendDiagnostics::neutral(options, seed);
        diagnostics.factors_swept = factors.len();
        diagnostics.warnings = warnings;

        let neutral_idx = snap_to_grid(diagnostics.target_factor, &factors)
            .and_then(|f| factors.iter().position(|v| *v == f));
        let (series, signals) = match neutral_idx {
            Some(idx) => run_forward(&bars, &sweep[idx], &atr, diagnostics.target_factor, 0.0, target_multiplier, 0.0),
            None => (Vec::new(), Vec::new()),
        };
        return AdaptiveTrend {
            series,
            signals,
            diagnostics,
        };
    }

    let mut rng = RngHierarchy::new(seed).rng_for(KMEANS_SCOPE, 0);
    let performances: Vec<f64> = sweep.iter().map(|s| s.performance).collect();

    let Some(selection) = select_factor(
        &factors,
        &performances,
        options.from_cluster,
        options.max_iter,
        &mut rng,
    ) else {
        let mut diagnostics = TrendDiagnostics::neutral(options, seed);
        diagnostics.warnings = warnings;
        return AdaptiveTrend {
            series: Vec::new(),
            signals: Vec::new(),
            diagnostics,
        };
    };
    if selection.used != selection.requested {
        warnings.push(DegenerateInput::EmptyCluster {
            requested: selection.requested,
            used: selection.used,
        });
    }

    let chosen_idx = factors
        .iter()
        .position(|f| *f == selection.target_factor)
        .unwrap_or(0);

    let performance_index = performance_index(&bars, selection.cluster_perf_mean, options.perf_alpha);
    let smoothing = performance_index.clamp(0.0, 1.0);
    let confidence = (smoothing / (1.0 + selection.cluster_dispersion)).clamp(0.0, 1.0);

    let (series, signals) = run_forward(
        &bars,
        &sweep[chosen_idx],
        &atr,
        selection.target_factor,
        smoothing,
        target_multiplier,
        confidence,
    );

    tracing::debug!(
        bars = bars.len(),
        factors = factors.len(),
        target_factor = selection.target_factor,
        cluster = %selection.used,
        performance_index,
        signals = signals.len(),
        "adaptive trend computed"
    );

    AdaptiveTrend {
        series,
        signals,
        diagnostics: diagnostics_from(selection, factors.len(), performance_index, seed, warnings),
    }
}

/// The `ama` recurrence and flip scan over one factor's bands.
fn run_forward(
    bars: &[Bar],
    chosen: &FactorSeries,
    atr: &[f64],
    factor: f64,
    smoothing: f64,
    target_multiplier: f64,
    confidence: f64,
) -> (Vec<TrendPoint>, Vec<SignalMetric>) {
    let mut series: Vec<TrendPoint> = Vec::with_capacity(bars.len());
    let mut signals = Vec::new();

    for (i, bar) in bars.iter().enumerate() {
        let st = chosen.supertrend[i];
        let trend = chosen.trend[i];
        let ama = match series.last() {
            None => st,
            Some(prev) => prev.ama + smoothing * (st - prev.ama),
        };
        let signal = if i > 0 && trend != 0 && trend != chosen.trend[i - 1] {
            trend
        } else {
            0
        };

        if signal != 0 {
            let flip = FlipContext {
                index: i,
                timestamp: bar.timestamp,
                direction: signal,
                close: bar.close,
                supertrend: st,
                atr: atr[i],
            };
            signals.push(signal_metric(flip, factor, target_multiplier, confidence));
        }

        series.push(TrendPoint {
            date: bar.timestamp,
            close: bar.close,
            supertrend: st,
            trend,
            upper_band: chosen.upper_band[i],
            lower_band: chosen.lower_band[i],
            ama,
            signal,
            distance: bar.close - st,
        });
    }

    (series, signals)
}

/// Positive cluster performance normalised by the smoothed absolute bar change.
fn performance_index(bars: &[Bar], cluster_perf_mean: f64, perf_alpha: f64) -> f64 {
    let changes: Vec<f64> = bars
        .windows(2)
        .map(|w| (w[1].close - w[0].close).abs())
        .collect();
    let denom = ema_seeded(&changes, performance_alpha(perf_alpha))
        .last()
        .copied()
        .unwrap_or(0.0);
    let numer = cluster_perf_mean.max(0.0);
    if denom > 0.0 && denom.is_finite() && numer.is_finite() {
        numer / denom
    } else {
        0.0
    }
}

fn diagnostics_from(
    selection: FactorSelection,
    factors_swept: usize,
    performance_index: f64,
    seed: u64,
    warnings: Vec<DegenerateInput>,
) -> TrendDiagnostics {
    TrendDiagnostics {
        target_factor: selection.target_factor,
        factors_swept,
        requested_cluster: selection.requested,
        used_cluster: selection.used,
        performance_index,
        cluster_perf_mean: selection.cluster_perf_mean,
        cluster_dispersion: selection.cluster_dispersion,
        clusters: selection.clusters,
        iterations: selection.iterations,
        converged: selection.converged,
        seed,
        warnings,
    }
}
