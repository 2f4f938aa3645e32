// Trend aggregation: price level per categorical segment.
use crate::analyzer::stats;
use crate::model::{AnalyticsError, Field, ListingTable, TrendKey};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct TrendRow {
    pub key: String,
    pub count: usize,
    pub mean_price: f64,
    pub median_price: f64,
}

/// Groups listings by a categorical key and reports count, mean and median
/// price per segment, highest mean first.
///
/// Rows missing the key or the price stay in the dataset but are left out
/// of the aggregation. An unresolvable key or price column is an error.
pub fn price_trends(table: &ListingTable, key: TrendKey) -> Result<Vec<TrendRow>, AnalyticsError> {
    table.schema.require(&[key.required_field(), Field::Price])?;

    let mut buckets: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for listing in &table.listings {
        let Some(label) = key.value(listing) else {
            continue;
        };
        let Some(price) = listing.price else {
            continue;
        };
        buckets.entry(label).or_default().push(price);
    }

    let mut rows: Vec<TrendRow> = buckets
        .into_iter()
        .filter_map(|(label, prices)| {
            let sorted = stats::sorted_finite(prices.iter().copied());
            Some(TrendRow {
                count: prices.len(),
                mean_price: stats::mean(&prices)?,
                median_price: stats::median(&sorted)?,
                key: label,
            })
        })
        .collect();
    rows.sort_by(|a, b| {
        b.mean_price
            .total_cmp(&a.mean_price)
            .then_with(|| a.key.cmp(&b.key))
    });
    Ok(rows)
}
