//! Factor selection by 1-D k-means over per-factor performance.
//!
//! Three centroids are seeded at the 25th/50th/75th percentiles and refined
//! until the assignment stops changing or `max_iter` is reached. An empty
//! cluster is reseeded with a random member's performance; the random source
//! is injected so results are reproducible. Clusters are ranked by mean
//! performance into Worst / Average / Best and the requested cluster's mean
//! factor is snapped back onto the swept grid.

use super::factors::snap_to_grid;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const K: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterLabel {
    Worst,
    Average,
    #[default]
    Best,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown cluster label {0:?} (expected best, average or worst)")]
pub struct ClusterLabelError(String);

impl ClusterLabel {
    /// Labels in rank order, lowest mean performance first.
    pub const RANKED: [ClusterLabel; K] =
        [ClusterLabel::Worst, ClusterLabel::Average, ClusterLabel::Best];

    /// Other labels to try, nearest first, when this one's cluster is empty.
    fn substitutes(self) -> [ClusterLabel; 2] {
        match self {
            ClusterLabel::Best => [ClusterLabel::Average, ClusterLabel::Worst],
            ClusterLabel::Average => [ClusterLabel::Best, ClusterLabel::Worst],
            ClusterLabel::Worst => [ClusterLabel::Average, ClusterLabel::Best],
        }
    }
}

impl fmt::Display for ClusterLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ClusterLabel::Worst => "worst",
            ClusterLabel::Average => "average",
            ClusterLabel::Best => "best",
        })
    }
}

impl FromStr for ClusterLabel {
    type Err = ClusterLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "best" => Ok(ClusterLabel::Best),
            "average" | "avg" => Ok(ClusterLabel::Average),
            "worst" => Ok(ClusterLabel::Worst),
            _ => Err(ClusterLabelError(s.to_string())),
        }
    }
}

/// Per-cluster diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterStats {
    pub label: ClusterLabel,
    pub size: usize,
    pub centroid: f64,
    pub factors: Vec<f64>,
    pub factor_mean: f64,
    /// Population standard deviation of the member factors.
    pub factor_std: f64,
    pub perf_min: f64,
    pub perf_max: f64,
    pub perf_mean: f64,
}

/// Outcome of [`select_factor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorSelection {
    pub target_factor: f64,
    pub requested: ClusterLabel,
    /// Differs from `requested` only when the requested cluster ended empty.
    pub used: ClusterLabel,
    /// Mean performance of the cluster the factor came from.
    pub cluster_perf_mean: f64,
    /// Factor dispersion of that cluster.
    pub cluster_dispersion: f64,
    /// Ordered Worst, Average, Best. Empty when clustering was skipped.
    pub clusters: Vec<ClusterStats>,
    pub iterations: usize,
    pub converged: bool,
}

impl FactorSelection {
    pub fn clustered(&self) -> bool {
        !self.clusters.is_empty()
    }

    pub fn cluster(&self, label: ClusterLabel) -> Option<&ClusterStats> {
        self.clusters.iter().find(|c| c.label == label)
    }
}

/// Pick a factor from the `from` performance cluster.
///
/// Returns `None` only when `factors` is empty. With fewer than three factors
/// clustering is skipped and the best-performing factor is returned directly.
pub fn select_factor<R: Rng + ?Sized>(
    factors: &[f64],
    performances: &[f64],
    from: ClusterLabel,
    max_iter: usize,
    rng: &mut R,
) -> Option<FactorSelection> {
    let n = factors.len().min(performances.len());
    if n == 0 {
        return None;
    }
    let factors = &factors[..n];
    let perfs: Vec<f64> = performances[..n]
        .iter()
        .map(|&p| if p.is_finite() { p } else { 0.0 })
        .collect();

    if n < K {
        return Some(select_best_direct(factors, &perfs, from));
    }

    let fit = kmeans_1d(&perfs, max_iter.max(1), rng);
    let clusters = rank_clusters(factors, &perfs, &fit);

    let used = std::iter::once(from)
        .chain(from.substitutes())
        .find(|label| clusters.iter().any(|c| c.label == *label && c.size > 0))
        .unwrap_or(from);
    let chosen = clusters.iter().find(|c| c.label == used);

    let (mean_factor, perf_mean, dispersion) = match chosen {
        Some(c) if c.size > 0 => (c.factor_mean, c.perf_mean, c.factor_std),
        _ => (factors[0], perfs[0], 0.0),
    };
    let target_factor = snap_to_grid(mean_factor, factors).unwrap_or(factors[0]);

    if used != from {
        tracing::warn!(requested = %from, used = %used, "requested factor cluster is empty");
    }

    Some(FactorSelection {
        target_factor,
        requested: from,
        used,
        cluster_perf_mean: perf_mean,
        cluster_dispersion: dispersion,
        clusters,
        iterations: fit.iterations,
        converged: fit.converged,
    })
}

fn select_best_direct(factors: &[f64], perfs: &[f64], from: ClusterLabel) -> FactorSelection {
    let mut best = 0;
    for i in 1..perfs.len() {
        if perfs[i] > perfs[best] {
            best = i;
        }
    }
    FactorSelection {
        target_factor: factors[best],
        requested: from,
        used: from,
        cluster_perf_mean: perfs[best],
        cluster_dispersion: 0.0,
        clusters: Vec::new(),
        iterations: 0,
        converged: true,
    }
}

#[derive(Debug, Clone)]
struct KmeansFit {
    centroids: [f64; K],
    labels: Vec<usize>,
    iterations: usize,
    converged: bool,
}

fn kmeans_1d<R: Rng + ?Sized>(values: &[f64], max_iter: usize, rng: &mut R) -> KmeansFit {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mut centroids = [
        percentile_linear(&sorted, 0.25),
        percentile_linear(&sorted, 0.50),
        percentile_linear(&sorted, 0.75),
    ];

    let mut labels: Vec<usize> = Vec::new();
    let mut iterations = 0;
    let mut converged = false;

    while iterations < max_iter {
        iterations += 1;
        let assigned: Vec<usize> = values.iter().map(|&v| nearest(&centroids, v)).collect();
        if assigned == labels {
            converged = true;
            break;
        }
        labels = assigned;

        let mut sums = [0.0; K];
        let mut counts = [0usize; K];
        for (&label, &v) in labels.iter().zip(values) {
            sums[label] += v;
            counts[label] += 1;
        }
        for k in 0..K {
            centroids[k] = if counts[k] > 0 {
                sums[k] / counts[k] as f64
            } else {
                values[rng.gen_range(0..values.len())]
            };
        }
    }

    KmeansFit {
        centroids,
        labels,
        iterations,
        converged,
    }
}

/// Index of the closest centroid; ties go to the lower index.
fn nearest(centroids: &[f64; K], v: f64) -> usize {
    let mut best = 0;
    for k in 1..K {
        if (v - centroids[k]).abs() < (v - centroids[best]).abs() {
            best = k;
        }
    }
    best
}

/// Percentile with linear interpolation between closest ranks.
fn percentile_linear(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        len => {
            let pos = q.clamp(0.0, 1.0) * (len - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
        }
    }
}

fn rank_clusters(factors: &[f64], perfs: &[f64], fit: &KmeansFit) -> Vec<ClusterStats> {
    let mut raw: Vec<(f64, ClusterStats)> = (0..K)
        .map(|k| {
            let members: Vec<usize> = (0..fit.labels.len()).filter(|&i| fit.labels[i] == k).collect();
            let stats = cluster_stats(&members, factors, perfs, fit.centroids[k]);
            (stats.perf_mean, stats)
        })
        .collect();

    raw.sort_by(|a, b| a.0.total_cmp(&b.0));
    raw.into_iter()
        .zip(ClusterLabel::RANKED)
        .map(|((_, mut stats), label)| {
            stats.label = label;
            stats
        })
        .collect()
}

fn cluster_stats(
    members: &[usize],
    factors: &[f64],
    perfs: &[f64],
    centroid: f64,
) -> ClusterStats {
    let member_factors: Vec<f64> = members.iter().map(|&i| factors[i]).collect();
    let member_perfs: Vec<f64> = members.iter().map(|&i| perfs[i]).collect();

    if members.is_empty() {
        return ClusterStats {
            label: ClusterLabel::Average,
            size: 0,
            centroid,
            factors: Vec::new(),
            factor_mean: 0.0,
            factor_std: 0.0,
            perf_min: centroid,
            perf_max: centroid,
            perf_mean: centroid,
        };
    }

    let size = members.len() as f64;
    let factor_mean = member_factors.iter().sum::<f64>() / size;
    let variance = member_factors
        .iter()
        .map(|f| (f - factor_mean).powi(2))
        .sum::<f64>()
        / size;

    ClusterStats {
        label: ClusterLabel::Average,
        size: members.len(),
        centroid,
        factor_mean,
        factor_std: variance.sqrt(),
        perf_min: member_perfs.iter().copied().fold(f64::INFINITY, f64::min),
        perf_max: member_perfs.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        perf_mean: member_perfs.iter().sum::<f64>() / size,
        factors: member_factors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn grid9() -> Vec<f64> {
        vec![1.0, 1.5, 2.0, 2.5, 3.0, 3.5, 4.0, 4.5, 5.0]
    }

    #[test]
    fn separated_groups_cluster_cleanly() {
        let perfs = [0.1, 0.1, 0.1, 0.5, 0.5, 0.5, 0.9, 0.9, 0.9];
        let mut rng = StdRng::seed_from_u64(1);
        let sel = select_factor(&grid9(), &perfs, ClusterLabel::Best, 1000, &mut rng).unwrap();

        assert!(sel.converged);
        let best = sel.cluster(ClusterLabel::Best).unwrap();
        assert_eq!(best.factors, vec![4.0, 4.5, 5.0]);
        assert_eq!(sel.cluster(ClusterLabel::Worst).unwrap().factors, vec![1.0, 1.5, 2.0]);
        assert_eq!(sel.target_factor, 4.5);
        assert!((best.perf_mean - 0.9).abs() < 1e-12);
        assert!((best.factor_std - (1.0f64 / 6.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn average_and_worst_requests() {
        let perfs = [0.9, 0.9, 0.9, 0.1, 0.1, 0.1, 0.5, 0.5, 0.5];
        let mut rng = StdRng::seed_from_u64(1);
        let avg = select_factor(&grid9(), &perfs, ClusterLabel::Average, 1000, &mut rng).unwrap();
        assert_eq!(avg.target_factor, 4.5);
        let worst = select_factor(&grid9(), &perfs, ClusterLabel::Worst, 1000, &mut rng).unwrap();
        assert_eq!(worst.target_factor, 3.0);
    }

    #[test]
    fn fewer_than_three_factors_picks_best_directly() {
        let mut rng = StdRng::seed_from_u64(1);
        let sel = select_factor(&[1.0, 2.0], &[0.3, 0.7], ClusterLabel::Worst, 10, &mut rng).unwrap();
        assert_eq!(sel.target_factor, 2.0);
        assert!(!sel.clustered());
    }

    #[test]
    fn empty_input_selects_nothing() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(select_factor(&[], &[], ClusterLabel::Best, 10, &mut rng).is_none());
    }

    #[test]
    fn identical_performances_do_not_panic() {
        let perfs = [0.0; 9];
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let sel = select_factor(&grid9(), &perfs, ClusterLabel::Best, 50, &mut rng).unwrap();
            assert!(grid9().contains(&sel.target_factor));
            assert_eq!(sel.clusters.iter().map(|c| c.size).sum::<usize>(), 9);
        }
    }

    #[test]
    fn reseeding_is_reproducible_with_same_seed() {
        let perfs = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 2.0];
        let run = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            select_factor(&grid9(), &perfs, ClusterLabel::Best, 100, &mut rng).unwrap()
        };
        assert_eq!(run(9), run(9));
    }

    #[test]
    fn non_finite_performance_treated_as_zero() {
        let perfs = [f64::NAN, 0.1, 0.1, 0.5, 0.5, 0.5, 0.9, 0.9, f64::INFINITY];
        let mut rng = StdRng::seed_from_u64(3);
        let sel = select_factor(&grid9(), &perfs, ClusterLabel::Best, 100, &mut rng).unwrap();
        assert!(sel.target_factor.is_finite());
        assert!(sel.clusters.iter().all(|c| c.perf_mean.is_finite()));
    }

    #[test]
    fn percentile_interpolates() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile_linear(&sorted, 0.5), 2.5);
        assert_eq!(percentile_linear(&sorted, 0.25), 1.75);
        assert_eq!(percentile_linear(&[5.0], 0.75), 5.0);
    }

    #[test]
    fn label_parsing() {
        assert_eq!("Best".parse::<ClusterLabel>().unwrap(), ClusterLabel::Best);
        assert_eq!("avg".parse::<ClusterLabel>().unwrap(), ClusterLabel::Average);
        assert!("middle".parse::<ClusterLabel>().is_err());
    }
}
