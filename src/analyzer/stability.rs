// Stability scoring: how tightly a comparable group's metric clusters.
use crate::analyzer::comparables::ComparableGroups;
use crate::analyzer::stats;
use crate::model::{AnalyticsError, ListingTable, StabilityMetric};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::Ordering;

/// Quartiles below this many observations are too noisy to score.
const MIN_SCORE_OBSERVATIONS: usize = 4;
/// Below this many observations the bootstrap interval is skipped entirely.
const MIN_BOOTSTRAP_OBSERVATIONS: usize = 6;

#[derive(Debug, Clone)]
pub struct StabilityOptions {
    /// Seed for the bootstrap generator; fixed so identical input yields
    /// identical intervals.
    pub seed: u64,
    /// Upper bound on bootstrap replicates per group. The effective count
    /// is `min(max_replicates, 50 + observations)`.
    pub max_replicates: usize,
}

impl Default for StabilityOptions {
    fn default() -> Self {
        Self {
            seed: 7,
            max_replicates: 400,
        }
    }
}

/// Per-group stability result. Absent statistics mean the group was too
/// small or its median degenerate, never a computation failure.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupStability {
    pub group: String,
    /// Members with a defined metric value.
    pub observations: usize,
    pub median: Option<f64>,
    /// `max(0, 1 - IQR/median) * 100`; 100 means no spread at all.
    pub score: Option<f64>,
    /// Fraction of members outside the boxplot fences.
    pub outlier_share: Option<f64>,
    /// Bootstrap 95% interval for the score, `(low, high)`.
    pub confidence: Option<(f64, f64)>,
}

/// Scores each comparable group, most stable first; unscorable groups sort
/// last. One seeded generator streams through the groups in label order, so
/// a given dataset, metric and seed always reproduce the same intervals.
pub fn stability_by_group(
    table: &ListingTable,
    groups: &ComparableGroups,
    metric: StabilityMetric,
    options: &StabilityOptions,
) -> Result<Vec<GroupStability>, AnalyticsError> {
    table.schema.require(metric.required_fields())?;

    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut out = Vec::with_capacity(groups.len());
    for (label, members) in groups {
        let values = stats::sorted_finite(
            members
                .iter()
                .filter_map(|&i| metric.value(&table.listings[i])),
        );
        out.push(GroupStability {
            group: label.clone(),
            observations: values.len(),
            median: stats::median(&values),
            score: stability_score(&values),
            outlier_share: outlier_share(&values),
            confidence: bootstrap_interval(&values, options, &mut rng),
        });
    }

    out.sort_by(|a, b| score_order(a, b).then_with(|| a.group.cmp(&b.group)));
    Ok(out)
}

/// Stability of an ascending sample: 100 at zero spread, falling toward 0
/// as the interquartile range approaches the median. Undefined for fewer
/// than four observations or a non-positive median.
fn stability_score(sorted: &[f64]) -> Option<f64> {
    if sorted.len() < MIN_SCORE_OBSERVATIONS {
        return None;
    }
    let median = stats::median(sorted)?;
    if median <= 0.0 {
        return None;
    }
    let q1 = stats::quantile(sorted, 0.25)?;
    let q3 = stats::quantile(sorted, 0.75)?;
    Some((1.0 - (q3 - q1) / median).max(0.0) * 100.0)
}

/// Share of observations outside `[Q1 - 1.5 IQR, Q3 + 1.5 IQR]`.
fn outlier_share(sorted: &[f64]) -> Option<f64> {
    if sorted.len() < MIN_SCORE_OBSERVATIONS {
        return None;
    }
    let q1 = stats::quantile(sorted, 0.25)?;
    let q3 = stats::quantile(sorted, 0.75)?;
    let iqr = q3 - q1;
    let lo = q1 - 1.5 * iqr;
    let hi = q3 + 1.5 * iqr;
    let outside = sorted.iter().filter(|&&v| v < lo || v > hi).count();
    Some(outside as f64 / sorted.len() as f64)
}

/// Percentile bootstrap for the stability score: resample with replacement
/// at the group's own size, rescore, take the 2.5th and 97.5th percentiles
/// of the defined resample scores.
fn bootstrap_interval(
    sorted: &[f64],
    options: &StabilityOptions,
    rng: &mut StdRng,
) -> Option<(f64, f64)> {
    let n = sorted.len();
    if n < MIN_BOOTSTRAP_OBSERVATIONS {
        return None;
    }
    let replicates = options.max_replicates.min(50 + n);
    let mut scores = Vec::with_capacity(replicates);
    let mut resample = vec![0.0; n];
    for _ in 0..replicates {
        for slot in resample.iter_mut() {
            *slot = sorted[rng.random_range(0..n)];
        }
        resample.sort_by(f64::total_cmp);
        if let Some(score) = stability_score(&resample) {
            scores.push(score);
        }
    }
    scores.sort_by(f64::total_cmp);
    let lo = stats::quantile(&scores, 0.025)?;
    let hi = stats::quantile(&scores, 0.975)?;
    Some((lo, hi))
}

fn score_order(a: &GroupStability, b: &GroupStability) -> Ordering {
    match (a.score, b.score) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
