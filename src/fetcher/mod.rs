// Fetcher module: listings API access plus post-fetch ordering.

pub mod client;
pub mod query;
pub mod traits;

pub use client::ListingApiClient;
pub use query::{ListingType, SearchQuery};
pub use traits::ListingSource;

use crate::model::RawRecord;
use serde_json::Value;
use std::cmp::Ordering;

/// Orders fetched records by squared distance to their coordinate centroid,
/// so the saved file reads from the middle of the searched area outward.
/// Records without coordinates keep their relative order at the end.
pub fn sort_by_centroid_proximity(records: &mut Vec<RawRecord>) {
    let coords: Vec<Option<(f64, f64)>> = records
        .iter()
        .map(|r| match (coord(r, "latitude"), coord(r, "longitude")) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        })
        .collect();
    let located: Vec<(f64, f64)> = coords.iter().flatten().copied().collect();
    if located.is_empty() {
        return;
    }
    let n = located.len() as f64;
    let center_lat = located.iter().map(|c| c.0).sum::<f64>() / n;
    let center_lon = located.iter().map(|c| c.1).sum::<f64>() / n;
    let distances: Vec<Option<f64>> = coords
        .iter()
        .map(|c| c.map(|(lat, lon)| (lat - center_lat).powi(2) + (lon - center_lon).powi(2)))
        .collect();

    let mut order: Vec<usize> = (0..records.len()).collect();
    order.sort_by(|&a, &b| match (distances[a], distances[b]) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });

    let mut slots: Vec<Option<RawRecord>> = std::mem::take(records).into_iter().map(Some).collect();
    *records = order.into_iter().filter_map(|i| slots[i].take()).collect();
}

fn coord(record: &RawRecord, key: &str) -> Option<f64> {
    match record.get(key) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}
