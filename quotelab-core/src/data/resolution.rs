//! Resolution canonicalization and the secondary fetch plan.

use super::provider::DataError;
use crate::time::{Interval, IntervalError};

/// Canonicalize a caller-supplied resolution token.
pub fn parse_resolution(token: &str) -> Result<Interval, DataError> {
    token.parse::<Interval>().map_err(|err| match err {
        IntervalError::Unsupported(t) => DataError::UnsupportedResolution(t),
        IntervalError::TooFine(t) => DataError::ResolutionTooFine(t),
    })
}

/// How a request is served by the secondary provider: fetch at `fetch`, then
/// aggregate up to `requested` when they differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackPlan {
    pub requested: Interval,
    pub fetch: Interval,
}

impl FallbackPlan {
    /// Fixed mapping table. 10m and 30m fetch 5m bars and 4h fetches 1h.
    pub fn for_interval(requested: Interval) -> Self {
        let fetch = match requested {
            Interval::M1 => Interval::M1,
            Interval::M5 | Interval::M10 | Interval::M30 => Interval::M5,
            Interval::M15 => Interval::M15,
            Interval::H1 | Interval::H4 => Interval::H1,
            Interval::D1 => Interval::D1,
        };
        Self { requested, fetch }
    }

    pub fn needs_aggregation(&self) -> bool {
        self.fetch != self.requested
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_canonicalize() {
        assert_eq!(parse_resolution("1").unwrap(), Interval::M1);
        assert_eq!(parse_resolution("60").unwrap(), Interval::H1);
        assert_eq!(parse_resolution("1h").unwrap(), Interval::H1);
        assert_eq!(parse_resolution("D").unwrap(), Interval::D1);
    }

    #[test]
    fn bad_tokens_are_input_errors() {
        let err = parse_resolution("7m").unwrap_err();
        assert!(matches!(err, DataError::UnsupportedResolution(_)));
        assert!(err.is_input_error());
        assert!(matches!(parse_resolution("30s"), Err(DataError::ResolutionTooFine(_))));
    }

    #[test]
    fn fallback_table() {
        let table: Vec<(Interval, Interval)> = Interval::ALL
            .into_iter()
            .map(|i| (i, FallbackPlan::for_interval(i).fetch))
            .collect();
        assert_eq!(
            table,
            vec![
                (Interval::M1, Interval::M1),
                (Interval::M5, Interval::M5),
                (Interval::M10, Interval::M5),
                (Interval::M15, Interval::M15),
                (Interval::M30, Interval::M5),
                (Interval::H1, Interval::H1),
                (Interval::H4, Interval::H1),
                (Interval::D1, Interval::D1),
            ]
        );
        assert!(FallbackPlan::for_interval(Interval::M30).needs_aggregation());
        assert!(!FallbackPlan::for_interval(Interval::D1).needs_aggregation());
    }
}
