//! Non-finite input repair.
//!
//! A single NaN high/low fed into the ATR or performance recurrences poisons
//! every later value. Each OHLC field is repaired independently: a non-finite
//! value is replaced by the last finite value of the same field. Leading
//! non-finite values take the first finite value of that field, falling back
//! to the close series, then to any finite price, then to zero.

use crate::domain::bar::{clean_volume, Bar};

/// Result of [`sanitize_bars`].
#[derive(Debug, Clone)]
pub struct Sanitized {
    pub bars: Vec<Bar>,
    /// Number of individual price fields that were substituted.
    pub replaced: usize,
}

pub fn sanitize_bars(bars: &[Bar]) -> Sanitized {
    let mut out: Vec<Bar> = bars.to_vec();
    if out.is_empty() {
        return Sanitized {
            bars: out,
            replaced: 0,
        };
    }

    let first_close = first_finite(bars, |b| b.close);
    let any_price = bars
        .iter()
        .flat_map(|b| [b.open, b.high, b.low, b.close])
        .find(|v| v.is_finite())
        .unwrap_or(0.0);
    let fallback = first_close.unwrap_or(any_price);

    let mut replaced = 0;
    replaced += repair(&mut out, fallback, |b| &mut b.open);
    replaced += repair(&mut out, fallback, |b| &mut b.high);
    replaced += repair(&mut out, fallback, |b| &mut b.low);
    replaced += repair(&mut out, fallback, |b| &mut b.close);

    for bar in &mut out {
        bar.volume = clean_volume(bar.volume);
    }

    Sanitized {
        bars: out,
        replaced,
    }
}

fn first_finite(bars: &[Bar], field: impl Fn(&Bar) -> f64) -> Option<f64> {
    bars.iter().map(field).find(|v| v.is_finite())
}

fn repair(bars: &mut [Bar], fallback: f64, field: impl Fn(&mut Bar) -> &mut f64) -> usize {
    let seed = bars
        .iter_mut()
        .map(|b| *field(b))
        .find(|v| v.is_finite())
        .unwrap_or(fallback);

    let mut last = seed;
    let mut replaced = 0;
    for bar in bars.iter_mut() {
        let value = field(bar);
        if value.is_finite() {
            last = *value;
        } else {
            *value = last;
            replaced += 1;
        }
    }
    replaced
}
