// Explicit listing filter applied before the analytical views run.
use crate::model::{Listing, ListingTable, NumericRange};
use serde::Deserialize;
use tracing::info;

/// Filter criteria. Empty categorical sets and unbounded ranges constrain
/// nothing; a bounded range excludes listings missing that value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ListingFilter {
    pub states: Vec<String>,
    pub cities: Vec<String>,
    pub postal_codes: Vec<String>,
    pub statuses: Vec<String>,
    pub property_types: Vec<String>,
    pub price: NumericRange,
    pub bedrooms: NumericRange,
    pub sqft: NumericRange,
    pub year_built: NumericRange,
    pub price_per_sqft: NumericRange,
}

impl ListingFilter {
    /// True when no criterion is set, so callers can skip the pass.
    pub fn is_noop(&self) -> bool {
        self.states.is_empty()
            && self.cities.is_empty()
            && self.postal_codes.is_empty()
            && self.statuses.is_empty()
            && self.property_types.is_empty()
            && self.price.is_unbounded()
            && self.bedrooms.is_unbounded()
            && self.sqft.is_unbounded()
            && self.year_built.is_unbounded()
            && self.price_per_sqft.is_unbounded()
    }

    pub fn matches(&self, listing: &Listing) -> bool {
        in_set(&self.states, listing.state.as_deref())
            && in_set(&self.cities, listing.city.as_deref())
            && in_set(&self.postal_codes, listing.postal_code.as_deref())
            && in_set(&self.statuses, listing.status.as_deref())
            && in_set(&self.property_types, listing.property_type.as_deref())
            && in_range(&self.price, listing.price)
            && in_range(&self.bedrooms, listing.bedrooms.map(|b| b as f64))
            && in_range(&self.sqft, listing.sqft)
            && in_range(&self.year_built, listing.year_built.map(|y| y as f64))
            && in_range(&self.price_per_sqft, listing.price_per_sqft)
    }

    /// Returns the filtered table under the same schema.
    pub fn apply(&self, table: &ListingTable) -> ListingTable {
        let listings: Vec<Listing> = table
            .listings
            .iter()
            .filter(|l| self.matches(l))
            .cloned()
            .collect();
        info!(
            before = table.len(),
            after = listings.len(),
            "applied listing filter"
        );
        ListingTable {
            schema: table.schema.clone(),
            listings,
        }
    }
}

// Empty set means unconstrained; membership ignores case and stray spaces.
fn in_set(allowed: &[String], value: Option<&str>) -> bool {
    if allowed.is_empty() {
        return true;
    }
    let Some(value) = value else {
        return false;
    };
    allowed
        .iter()
        .any(|a| a.trim().eq_ignore_ascii_case(value.trim()))
}

fn in_range(range: &NumericRange, value: Option<f64>) -> bool {
    if range.is_unbounded() {
        return true;
    }
    match value {
        Some(v) => range.contains(v),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Field, Schema};

    fn sample() -> ListingTable {
        let build = |city: &str, status: &str, price: f64, beds: Option<i64>| Listing {
            city: Some(city.to_string()),
            status: Some(status.to_string()),
            price: Some(price),
            bedrooms: beds,
            ..Default::default()
        };
        let mut schema = Schema::default();
        schema.bind(Field::City, "city");
        schema.bind(Field::Status, "status");
        schema.bind(Field::Price, "price");
        schema.bind(Field::Bedrooms, "bedrooms");
        ListingTable {
            schema,
            listings: vec![
                build("Austin", "Active", 300000.0, Some(3)),
                build("Dallas", "Sold", 150000.0, Some(2)),
                build("Austin", "Active", 800000.0, None),
            ],
        }
    }

    #[test]
    fn empty_filter_is_a_noop() {
        let filter = ListingFilter::default();
        assert!(filter.is_noop());
        let table = sample();
        assert_eq!(filter.apply(&table).len(), table.len());
    }

    #[test]
    fn categorical_sets_match_case_insensitively() {
        let filter = ListingFilter {
            cities: vec!["austin".to_string()],
            ..Default::default()
        };
        assert!(!filter.is_noop());
        let filtered = filter.apply(&sample());
        assert_eq!(filtered.len(), 2);
        assert!(
            filtered
                .listings
                .iter()
                .all(|l| l.city.as_deref() == Some("Austin"))
        );
    }

    #[test]
    fn bounded_ranges_exclude_missing_values() {
        let filter = ListingFilter {
            bedrooms: NumericRange::new(Some(2.0), None),
            ..Default::default()
        };
        // the third listing has no bedroom count at all
        assert_eq!(filter.apply(&sample()).len(), 2);
    }

    #[test]
    fn unbounded_ranges_keep_missing_values() {
        let filter = ListingFilter {
            statuses: vec!["ACTIVE".to_string()],
            ..Default::default()
        };
        assert_eq!(filter.apply(&sample()).len(), 2);
    }

    #[test]
    fn criteria_combine_conjunctively() {
        let filter = ListingFilter {
            cities: vec!["Austin".to_string()],
            price: NumericRange::new(None, Some(500000.0)),
            ..Default::default()
        };
        let filtered = filter.apply(&sample());
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered.listings[0].price, Some(300000.0));
    }

    #[test]
    fn schema_survives_filtering() {
        let filtered = ListingFilter::default().apply(&sample());
        assert!(filtered.schema.has(Field::City));
    }
}
