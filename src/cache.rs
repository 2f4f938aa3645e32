// Memoizes the heavy per-dataset computations between analytical passes.
use crate::analyzer::comparables::{ComparableGroups, group_listings};
use crate::analyzer::projection::{ReturnEstimates, estimate_returns};
use crate::model::{AnalyticsError, GroupKey, ListingTable, RawTable};
use crate::normalizer::normalize;
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tracing::debug;

/// Owns the current raw dataset and caches what is derived from it: the
/// normalized table, comparable groupings per key and size, and the
/// historical return estimates. Swapping in a dataset with a different
/// fingerprint drops every memo.
#[derive(Debug, Default)]
pub struct AnalysisCache {
    raw: RawTable,
    fingerprint: u64,
    normalized: Option<ListingTable>,
    groups: HashMap<(GroupKey, usize), ComparableGroups>,
    estimates: Option<ReturnEstimates>,
}

impl AnalysisCache {
    pub fn new(raw: RawTable) -> Self {
        let fingerprint = fingerprint_of(&raw);
        Self {
            raw,
            fingerprint,
            normalized: None,
            groups: HashMap::new(),
            estimates: None,
        }
    }

    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Installs a new raw dataset. Returns false (and keeps all memos) when
    /// its fingerprint matches the current one.
    pub fn replace(&mut self, raw: RawTable) -> bool {
        let fingerprint = fingerprint_of(&raw);
        if fingerprint == self.fingerprint {
            return false;
        }
        debug!(
            old = self.fingerprint,
            new = fingerprint,
            "dataset changed, clearing memos"
        );
        self.raw = raw;
        self.fingerprint = fingerprint;
        self.normalized = None;
        self.groups.clear();
        self.estimates = None;
        true
    }

    /// The normalized table, built on first use.
    pub fn table(&mut self) -> &ListingTable {
        self.normalized.get_or_insert_with(|| normalize(&self.raw))
    }

    /// Comparable groups for a key and minimum size, grouped on first use.
    pub fn groups(
        &mut self,
        key: GroupKey,
        min_group_size: usize,
    ) -> Result<ComparableGroups, AnalyticsError> {
        let cache_key = (key, min_group_size);
        if let Some(found) = self.groups.get(&cache_key) {
            return Ok(found.clone());
        }
        let table = self.normalized.get_or_insert_with(|| normalize(&self.raw));
        let groups = group_listings(table, key, min_group_size)?;
        self.groups.insert(cache_key, groups.clone());
        Ok(groups)
    }

    /// Historical return estimates, computed on first use.
    pub fn return_estimates(&mut self) -> ReturnEstimates {
        if let Some(found) = &self.estimates {
            return found.clone();
        }
        let table = self.normalized.get_or_insert_with(|| normalize(&self.raw));
        let estimates = estimate_returns(table);
        self.estimates = Some(estimates.clone());
        estimates
    }
}

/// Stable 64-bit digest of the dataset contents. Key order inside a record
/// is already sorted, so identical data always hashes identically.
fn fingerprint_of(raw: &RawTable) -> u64 {
    let mut hasher = DefaultHasher::new();
    raw.columns.hash(&mut hasher);
    raw.records.len().hash(&mut hasher);
    for record in &raw.records {
        for (key, value) in record {
            key.hash(&mut hasher);
            value.to_string().hash(&mut hasher);
        }
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dataset(price: i64) -> RawTable {
        let record = json!({"price": price, "zipCode": "90001"})
            .as_object()
            .cloned()
            .unwrap();
        RawTable {
            columns: vec!["price".to_string(), "zipCode".to_string()],
            records: vec![record.clone(), record],
        }
    }

    #[test]
    fn identical_datasets_share_a_fingerprint() {
        let a = AnalysisCache::new(dataset(100000));
        let b = AnalysisCache::new(dataset(100000));
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), AnalysisCache::new(dataset(100001)).fingerprint());
    }

    #[test]
    fn replacing_with_identical_data_keeps_the_cache() {
        let mut cache = AnalysisCache::new(dataset(100000));
        let before = cache.fingerprint();
        assert!(!cache.replace(dataset(100000)));
        assert_eq!(cache.fingerprint(), before);
    }

    #[test]
    fn replacing_with_new_data_rebuilds_derived_state() {
        let mut cache = AnalysisCache::new(dataset(100000));
        assert_eq!(cache.table().len(), 2);
        let groups = cache.groups(GroupKey::PostalCode, 1).unwrap();
        assert_eq!(groups["90001"].len(), 2);

        let mut bigger = dataset(200000);
        bigger.records.push(bigger.records[0].clone());
        assert!(cache.replace(bigger));
        assert_eq!(cache.table().len(), 3);
        let groups = cache.groups(GroupKey::PostalCode, 1).unwrap();
        assert_eq!(groups["90001"].len(), 3);
    }

    #[test]
    fn memoized_groups_are_stable_across_calls() {
        let mut cache = AnalysisCache::new(dataset(100000));
        let first = cache.groups(GroupKey::PostalCode, 1).unwrap();
        let second = cache.groups(GroupKey::PostalCode, 1).unwrap();
        assert_eq!(first, second);
        let estimates = cache.return_estimates();
        assert_eq!(estimates, cache.return_estimates());
    }
}
