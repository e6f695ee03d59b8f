//! Adaptive trend: factor sweep, k-means factor selection, trend series and signals.

pub mod engine;
pub mod factors;
pub mod selector;
pub mod signal;

pub use engine::{
    compute_adaptive_trend, AdaptiveTrend, DegenerateInput, TrendDiagnostics, TrendOptions,
    TrendPoint,
};
pub use factors::{factor_grid, snap_to_grid, MAX_FACTORS};
pub use selector::{select_factor, ClusterLabel, ClusterLabelError, ClusterStats, FactorSelection};
pub use signal::SignalMetric;
