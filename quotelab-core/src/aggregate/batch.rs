//! Batch re-bucketing of vendor bars to a coarser resolution.

use crate::domain::bar::{clean_volume, Bar};
use crate::time::{floor, Interval};
use chrono_tz::Tz;
use std::collections::BTreeMap;

/// Group `bars` by `floor(timestamp, target, tz)` and reduce each group to one bar.
///
/// open = first, high = max, low = min, close = last (in input order within a
/// group), volume = sum. Output is sorted by bucket start. Pure and total:
/// non-finite prices are skipped by the extrema, non-finite or negative volume
/// counts as zero.
pub fn aggregate(bars: &[Bar], target: Interval, tz: Tz) -> Vec<Bar> {
    let mut groups: BTreeMap<_, Bar> = BTreeMap::new();

    for bar in bars {
        let bucket = floor(bar.timestamp, target, tz);
        groups
            .entry(bucket)
            .and_modify(|acc| fold_into(acc, bar))
            .or_insert_with(|| Bar {
                timestamp: bucket,
                volume: bar.clean_volume(),
                ..*bar
            });
    }

    groups.into_values().collect()
}

fn fold_into(acc: &mut Bar, bar: &Bar) {
    acc.high = finite_max(acc.high, bar.high);
    acc.low = finite_min(acc.low, bar.low);
    if bar.close.is_finite() || !acc.close.is_finite() {
        acc.close = bar.close;
    }
    if !acc.open.is_finite() {
        acc.open = bar.open;
    }
    acc.volume += clean_volume(bar.volume);
}

/// `f64::max` already ignores NaN; infinities are treated the same way.
fn finite_max(a: f64, b: f64) -> f64 {
    match (a.is_finite(), b.is_finite()) {
        (true, true) => a.max(b),
        (true, false) => a,
        (false, true) => b,
        (false, false) => a,
    }
}

fn finite_min(a: f64, b: f64) -> f64 {
    match (a.is_finite(), b.is_finite()) {
        (true, true) => a.min(b),
        (true, false) => a,
        (false, true) => b,
        (false, false) => a,
    }
}
