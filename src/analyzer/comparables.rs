// Comparable-group construction: peer sets for relative valuation.
use crate::model::{AnalyticsError, GroupKey, ListingTable};
use std::collections::BTreeMap;

/// Group label mapped to the table indices of its members. Ordered so every
/// downstream pass walks groups deterministically.
pub type ComparableGroups = BTreeMap<String, Vec<usize>>;

/// Partitions listings by the chosen key and keeps groups with at least
/// `min_group_size` members.
///
/// Listings missing any part of the key join no group at all. Groups
/// falling under the size threshold are silently absent; zero surviving
/// groups is an empty result, not an error. Only an unresolvable key
/// column errors.
pub fn group_listings(
    table: &ListingTable,
    key: GroupKey,
    min_group_size: usize,
) -> Result<ComparableGroups, AnalyticsError> {
    table.schema.require(key.required_fields())?;

    let mut groups: ComparableGroups = BTreeMap::new();
    for (index, listing) in table.listings.iter().enumerate() {
        if let Some(label) = key.label_for(listing) {
            groups.entry(label).or_default().push(index);
        }
    }
    groups.retain(|_, members| members.len() >= min_group_size);
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Field, Listing, Schema};

    fn listing(zip: Option<&str>, beds: Option<i64>) -> Listing {
        Listing {
            postal_code: zip.map(str::to_string),
            bedrooms: beds,
            ..Default::default()
        }
    }

    fn table(listings: Vec<Listing>) -> ListingTable {
        let mut schema = Schema::default();
        schema.bind(Field::PostalCode, "zipCode");
        schema.bind(Field::Bedrooms, "bedrooms");
        ListingTable { schema, listings }
    }

    #[test]
    fn groups_by_postal_and_drops_small_groups() {
        let t = table(vec![
            listing(Some("90001"), Some(2)),
            listing(Some("90001"), Some(3)),
            listing(Some("90002"), Some(2)),
        ]);
        let groups = group_listings(&t, GroupKey::PostalCode, 2).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups["90001"], vec![0, 1]);
    }

    #[test]
    fn rows_missing_the_key_join_no_group() {
        let t = table(vec![
            listing(Some("90001"), None),
            listing(None, Some(3)),
            listing(Some("90001"), Some(3)),
        ]);
        let by_zip = group_listings(&t, GroupKey::PostalCode, 1).unwrap();
        assert_eq!(by_zip["90001"], vec![0, 2]);

        let composite = group_listings(&t, GroupKey::PostalCodeBedrooms, 1).unwrap();
        assert_eq!(composite.len(), 1);
        assert_eq!(composite["90001|3"], vec![2]);
    }

    #[test]
    fn missing_key_column_is_an_error() {
        let t = ListingTable {
            schema: Schema::default(),
            listings: vec![listing(Some("90001"), Some(2))],
        };
        assert_eq!(
            group_listings(&t, GroupKey::PostalCode, 1),
            Err(AnalyticsError::MissingColumn(Field::PostalCode))
        );
    }

    #[test]
    fn no_group_reaching_the_minimum_yields_an_empty_map() {
        let t = table(vec![
            listing(Some("90001"), Some(2)),
            listing(Some("90002"), Some(2)),
        ]);
        let groups = group_listings(&t, GroupKey::PostalCode, 5).unwrap();
        assert!(groups.is_empty());
    }

    #[test]
    fn group_labels_come_back_sorted() {
        let t = table(vec![
            listing(Some("90003"), None),
            listing(Some("90001"), None),
            listing(Some("90002"), None),
        ]);
        let groups = group_listings(&t, GroupKey::PostalCode, 1).unwrap();
        let labels: Vec<&String> = groups.keys().collect();
        assert_eq!(labels, vec!["90001", "90002", "90003"]);
    }
}
