// Robust valuation scoring: flags listings priced far under their peers.
use crate::analyzer::comparables::ComparableGroups;
use crate::analyzer::stats;
use crate::model::{AnalyticsError, ListingTable, ValuationMetric};
use std::cmp::Ordering;

/// Normal-consistency factor turning a MAD into a standard-deviation-like
/// scale.
const MAD_SCALE: f64 = 1.4826;

/// One scored listing. `robust_z` and `discount_pct` are absent when the
/// group's scale, respectively median, degenerates to zero; absent values
/// rank after every defined one.
#[derive(Debug, Clone, PartialEq)]
pub struct ValuationRow {
    /// Index into the source table's listing vector.
    pub index: usize,
    pub group: String,
    pub metric: f64,
    pub group_median: f64,
    pub robust_z: Option<f64>,
    /// Average-rank percentile of the metric within the group, in (0, 1].
    pub percentile: f64,
    pub discount_pct: Option<f64>,
}

impl ValuationRow {
    /// Share of the group at or below this listing's metric, as a percent.
    pub fn below_median_pct(&self) -> f64 {
        self.percentile * 100.0
    }
}

/// Scores every listing against its comparable group and returns the top
/// `top_n` undervaluation candidates.
///
/// Ranking is ascending robust z, then descending discount, then ascending
/// percentile. The z-score leads because it is scale-free across groups
/// with very different price levels.
pub fn rank_undervalued(
    table: &ListingTable,
    groups: &ComparableGroups,
    metric: ValuationMetric,
    top_n: usize,
) -> Result<Vec<ValuationRow>, AnalyticsError> {
    table.schema.require(metric.required_fields())?;

    let mut rows = Vec::new();
    for (label, members) in groups {
        let scored: Vec<(usize, f64)> = members
            .iter()
            .filter_map(|&i| {
                metric
                    .value(&table.listings[i])
                    .filter(|v| v.is_finite())
                    .map(|v| (i, v))
            })
            .collect();
        if scored.is_empty() {
            continue;
        }

        let values: Vec<f64> = scored.iter().map(|&(_, v)| v).collect();
        let sorted = stats::sorted_finite(values.iter().copied());
        let Some(center) = stats::median(&sorted) else {
            continue;
        };
        let scale = stats::mad(&values, center).unwrap_or(0.0) * MAD_SCALE;
        let ranks = stats::percentile_ranks(&values);

        for (k, &(index, value)) in scored.iter().enumerate() {
            let robust_z = (scale > 0.0).then(|| (value - center) / scale);
            let discount_pct = (center != 0.0).then(|| (1.0 - value / center) * 100.0);
            rows.push(ValuationRow {
                index,
                group: label.clone(),
                metric: value,
                group_median: center,
                robust_z,
                percentile: ranks[k],
                discount_pct,
            });
        }
    }

    rows.sort_by(rank_order);
    rows.truncate(top_n);
    Ok(rows)
}

fn rank_order(a: &ValuationRow, b: &ValuationRow) -> Ordering {
    opt_asc(a.robust_z, b.robust_z)
        .then_with(|| opt_desc(a.discount_pct, b.discount_pct))
        .then_with(|| a.percentile.total_cmp(&b.percentile))
}

// In both orders an absent value loses to any defined one.
fn opt_asc(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn opt_desc(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
