//! Swept ATR multipliers.

/// Upper bound on swept factors; a tiny step over a wide range is a config mistake.
pub const MAX_FACTORS: usize = 10_000;

const FALLBACK_FACTOR: f64 = 1.0;

/// Multipliers `min, min+step, ..., <= max`.
///
/// Always returns at least one factor: an invalid range or step yields
/// `[min]` (or `[1.0]` when `min` itself is not finite).
pub fn factor_grid(min: f64, max: f64, step: f64) -> Vec<f64> {
    if !min.is_finite() {
        return vec![FALLBACK_FACTOR];
    }
    if !max.is_finite() || !step.is_finite() || step <= 0.0 || max < min {
        return vec![min];
    }

    // Small tolerance so 1.0..=5.0 step 0.5 includes 5.0 despite float drift.
    let count = (((max - min) / step) + 1e-9).floor() as usize + 1;
    (0..count.min(MAX_FACTORS))
        .map(|i| round_to_grid(min + step * i as f64))
        .collect()
}

fn round_to_grid(value: f64) -> f64 {
    (value * 1e9).round() / 1e9
}

/// The swept factor closest to `value`; ties go to the smaller factor.
pub fn snap_to_grid(value: f64, factors: &[f64]) -> Option<f64> {
    factors.iter().copied().fold(None, |best, f| match best {
        None => Some(f),
        Some(b) if (f - value).abs() < (b - value).abs() => Some(f),
        keep => keep,
    })
}
