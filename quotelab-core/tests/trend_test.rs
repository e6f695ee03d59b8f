//! Adaptive trend integration tests.

use chrono::{Duration, TimeZone, Utc};
use quotelab_core::domain::Bar;
use quotelab_core::trend::{
    compute_adaptive_trend, select_factor, ClusterLabel, DegenerateInput, TrendOptions, TrendPoint,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

// ── Helpers ──────────────────────────────────────────────────────────

/// Bars with open = high = low = close.
fn flat_bars(closes: impl IntoIterator<Item = f64>) -> Vec<Bar> {
    let base = Utc.with_ymd_and_hms(2023, 1, 3, 0, 0, 0).unwrap();
    closes
        .into_iter()
        .enumerate()
        .map(|(i, c)| Bar::flat(base + Duration::days(i as i64), c, 1_000.0))
        .collect()
}

/// Noisy oscillating series with a drift.
fn wave_bars(n: usize) -> Vec<Bar> {
    let base = Utc.with_ymd_and_hms(2023, 1, 3, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            let x = i as f64;
            let close = 200.0 + 30.0 * (x / 9.0).sin() + 8.0 * (x / 2.3).cos() + 0.05 * x;
            let open = close - 0.8 * (x / 3.0).sin();
            Bar {
                timestamp: base + Duration::days(i as i64),
                open,
                high: open.max(close) + 1.5,
                low: open.min(close) - 1.5,
                close,
                volume: 10_000.0,
            }
        })
        .collect()
}

fn all_finite(p: &TrendPoint) -> bool {
    [p.close, p.supertrend, p.upper_band, p.lower_band, p.ama, p.distance]
        .iter()
        .all(|v| v.is_finite())
}

// ── Trend direction ──────────────────────────────────────────────────

#[test]
fn rising_series_settles_long() {
    let bars = flat_bars((0..120).map(|i| 100.0 + i as f64));
    let out = compute_adaptive_trend(&bars, &TrendOptions::default());
    assert_eq!(out.series[0].trend, 0);
    assert!(out.series[1..].iter().all(|p| p.trend == 1));
    assert_eq!(out.signals.len(), 1);
    assert_eq!(out.signals[0].direction, 1);
}

#[test]
fn falling_series_settles_short() {
    let bars = flat_bars((0..120).map(|i| 500.0 - 2.0 * i as f64));
    let out = compute_adaptive_trend(&bars, &TrendOptions::default());
    assert!(out.series[1..].iter().all(|p| p.trend == -1));
    assert!(out.series[5..].iter().all(|p| p.supertrend > p.close));
}

// ── Numeric robustness ───────────────────────────────────────────────

#[test]
fn injected_nan_does_not_propagate() {
    let mut bars = wave_bars(250);
    bars[50].high = f64::NAN;
    bars[80].low = f64::NAN;
    bars[81].close = f64::INFINITY;

    let out = compute_adaptive_trend(&bars, &TrendOptions::default());
    assert_eq!(out.series.len(), bars.len());
    assert!(out.series.iter().all(all_finite));
    for s in &out.signals {
        assert!(s.entry.is_finite() && s.stop.is_finite() && s.target.is_finite());
        assert!(s.confidence.is_finite() && s.reward_risk.is_finite());
    }
    assert!(out
        .diagnostics
        .warnings
        .contains(&DegenerateInput::NonFiniteInput { replaced: 3 }));
}

#[test]
fn leading_nan_is_backfilled() {
    let mut bars = wave_bars(60);
    bars[0].open = f64::NAN;
    bars[0].close = f64::NAN;
    let out = compute_adaptive_trend(&bars, &TrendOptions::default());
    assert!(out.series.iter().all(all_finite));
}

#[test]
fn single_bar_is_well_defined() {
    let out = compute_adaptive_trend(&flat_bars([42.0]), &TrendOptions::default());
    assert_eq!(out.series.len(), 1);
    assert_eq!(out.series[0].trend, 0);
    assert_eq!(out.series[0].ama, out.series[0].supertrend);
    assert!(out.signals.is_empty());
}

// ── Selection ────────────────────────────────────────────────────────

#[test]
fn separated_performances_cluster_identically_for_every_seed() {
    let factors = [1.0, 1.5, 2.0, 2.5, 3.0, 3.5, 4.0, 4.5, 5.0];
    let perfs = [0.1, 0.1, 0.1, 0.5, 0.5, 0.5, 0.9, 0.9, 0.9];

    for seed in 0..200 {
        let mut rng = StdRng::seed_from_u64(seed);
        let sel = select_factor(&factors, &perfs, ClusterLabel::Best, 1000, &mut rng).unwrap();
        let by_label = |label| sel.cluster(label).unwrap().factors.clone();
        assert_eq!(by_label(ClusterLabel::Worst), vec![1.0, 1.5, 2.0], "seed {seed}");
        assert_eq!(by_label(ClusterLabel::Average), vec![2.5, 3.0, 3.5], "seed {seed}");
        assert_eq!(by_label(ClusterLabel::Best), vec![4.0, 4.5, 5.0], "seed {seed}");
        assert_eq!(sel.target_factor, 4.5);
    }
}

#[test]
fn selected_factor_is_always_swept() {
    let bars = wave_bars(300);
    for from_cluster in [ClusterLabel::Best, ClusterLabel::Average, ClusterLabel::Worst] {
        let opts = TrendOptions {
            from_cluster,
            seed: Some(11),
            ..TrendOptions::default()
        };
        let out = compute_adaptive_trend(&bars, &opts);
        assert!(opts.factors().contains(&out.diagnostics.target_factor));
        let sizes: usize = out.diagnostics.clusters.iter().map(|c| c.size).sum();
        assert_eq!(sizes, out.diagnostics.factors_swept);
    }
}

#[test]
fn explicit_seed_is_reported_and_reproducible() {
    let bars = wave_bars(150);
    let opts = TrendOptions {
        seed: Some(1234),
        ..TrendOptions::default()
    };
    let a = compute_adaptive_trend(&bars, &opts);
    let b = compute_adaptive_trend(&bars, &opts);
    assert_eq!(a.diagnostics.seed, 1234);
    assert_eq!(a, b);
}

#[test]
fn output_serializes_for_consumers() {
    let out = compute_adaptive_trend(&wave_bars(40), &TrendOptions::default());
    let json = serde_json::to_value(&out).unwrap();
    assert!(json["series"].is_array());
    assert!(json["diagnostics"]["target_factor"].is_number());
}
