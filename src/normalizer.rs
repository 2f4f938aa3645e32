//! Turns raw listing rows into a typed `ListingTable`.
//!
//! Column names are resolved once against a prioritized alias table; after
//! that every value is coerced field by field. Coercion never fails: a cell
//! that cannot be read as the target type simply becomes missing.
use crate::model::{Field, Listing, ListingTable, RawRecord, RawTable, Schema};
use crate::utils::parse_date;
use serde_json::Value;
use tracing::debug;

/// Accepted source-column aliases per canonical field, highest priority
/// first. Matching is case-insensitive.
const FIELD_ALIASES: &[(Field, &[&str])] = &[
    (
        Field::Price,
        &["price", "list_price", "listprice", "sale_price", "amount"],
    ),
    (
        Field::PostalCode,
        &["zipCode", "zip", "zip_code", "postal_code", "postalCode"],
    ),
    (Field::Bedrooms, &["bedrooms", "beds", "br", "num_bedrooms"]),
    (Field::Bathrooms, &["bathrooms", "baths"]),
    (
        Field::Sqft,
        &[
            "squareFootage",
            "sqft",
            "living_area",
            "livingArea",
            "square_footage",
        ],
    ),
    (Field::LotSize, &["lotSize", "lot_size"]),
    (Field::YearBuilt, &["yearBuilt", "year_built"]),
    (Field::DaysOnMarket, &["daysOnMarket", "days_on_market"]),
    (Field::HoaFee, &["hoa", "hoa_fee"]),
    (Field::Latitude, &["latitude", "lat", "y"]),
    (Field::Longitude, &["longitude", "lon", "lng", "x"]),
    (Field::City, &["city"]),
    (Field::State, &["state"]),
    (Field::Status, &["status"]),
    (
        Field::PropertyType,
        &["propertyType", "property_type", "type"],
    ),
    (
        Field::AddressLine,
        &[
            "addressLine1",
            "address",
            "street_address",
            "full_address",
            "addr",
            "street",
        ],
    ),
    (
        Field::FormattedAddress,
        &["formattedAddress", "formatted_address"],
    ),
    (Field::ListedDate, &["listedDate", "listed_date"]),
    (Field::CreatedDate, &["createdDate", "created_date"]),
    (Field::LastSeenDate, &["lastSeenDate", "last_seen_date"]),
];

/// Normalizes a raw table. Pure transform; an empty input yields an empty
/// output with whatever schema the columns allowed.
pub fn normalize(raw: &RawTable) -> ListingTable {
    let schema = resolve_schema(&raw.columns);
    debug!(
        columns = raw.columns.len(),
        bound = schema.len(),
        rows = raw.len(),
        "resolved dataset schema"
    );
    let listings = raw
        .records
        .iter()
        .map(|record| build_listing(record, &schema))
        .collect();
    ListingTable { schema, listings }
}

/// Binds each canonical field to the first alias that matches a column.
pub fn resolve_schema(columns: &[String]) -> Schema {
    let mut schema = Schema::default();
    for (field, aliases) in FIELD_ALIASES {
        'alias: for alias in *aliases {
            for column in columns {
                if column.eq_ignore_ascii_case(alias) {
                    schema.bind(*field, column.clone());
                    break 'alias;
                }
            }
        }
    }
    schema
}

fn build_listing(record: &RawRecord, schema: &Schema) -> Listing {
    let cell = |field: Field| schema.source(field).and_then(|col| record.get(col));

    let price = cell(Field::Price)
        .and_then(as_number)
        .filter(|p| *p >= 0.0);
    let sqft = cell(Field::Sqft).and_then(as_number);
    let price_per_sqft = match (price, sqft) {
        (Some(p), Some(s)) if s > 0.0 => Some(p / s),
        _ => None,
    };

    let postal_code = cell(Field::PostalCode)
        .and_then(as_text)
        .map(|s| canonical_postal(&s));
    let city = cell(Field::City).and_then(as_text);
    let state = cell(Field::State).and_then(as_text);
    let address_line = cell(Field::AddressLine).and_then(as_text);
    let formatted = cell(Field::FormattedAddress).and_then(as_text);
    let label = synthesize_label(formatted, &[&address_line, &city, &state, &postal_code]);

    Listing {
        label,
        city,
        state,
        postal_code,
        latitude: cell(Field::Latitude)
            .and_then(as_number)
            .filter(|v| (-90.0..=90.0).contains(v)),
        longitude: cell(Field::Longitude)
            .and_then(as_number)
            .filter(|v| (-180.0..=180.0).contains(v)),
        price,
        sqft,
        price_per_sqft,
        bedrooms: cell(Field::Bedrooms).and_then(as_integer),
        bathrooms: cell(Field::Bathrooms).and_then(as_number),
        property_type: cell(Field::PropertyType).and_then(as_text),
        status: cell(Field::Status).and_then(as_text),
        year_built: cell(Field::YearBuilt).and_then(as_integer),
        lot_size: cell(Field::LotSize).and_then(as_number),
        days_on_market: cell(Field::DaysOnMarket).and_then(as_number),
        hoa_fee: cell(Field::HoaFee).and_then(as_number),
        listed_date: cell(Field::ListedDate)
            .and_then(as_text)
            .and_then(|s| parse_date(&s)),
        created_date: cell(Field::CreatedDate)
            .and_then(as_text)
            .and_then(|s| parse_date(&s)),
        last_seen_date: cell(Field::LastSeenDate)
            .and_then(as_text)
            .and_then(|s| parse_date(&s)),
    }
}

/// Reads a cell as a finite number. Numeric strings are accepted; anything
/// else is missing.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

/// Reads a cell as an integer count. Fractional values are missing, not
/// rounded.
fn as_integer(value: &Value) -> Option<i64> {
    let v = as_number(value)?;
    if v.fract() == 0.0 && (i64::MIN as f64..=i64::MAX as f64).contains(&v) {
        Some(v as i64)
    } else {
        None
    }
}

/// Reads a cell as trimmed non-empty text. Numbers are rendered so numeric
/// postal-code columns still resolve.
fn as_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if text.is_empty() { None } else { Some(text) }
}

/// Extracts the first 5-digit run from a postal-code string, keeping the
/// trimmed original when none exists.
pub fn canonical_postal(raw: &str) -> String {
    let trimmed = raw.trim();
    let bytes = trimmed.as_bytes();
    if bytes.len() >= 5 {
        for start in 0..=bytes.len() - 5 {
            if bytes[start..start + 5].iter().all(u8::is_ascii_digit) {
                return trimmed[start..start + 5].to_string();
            }
        }
    }
    trimmed.to_string()
}

/// Uses the pre-formatted address when present, otherwise joins the parts
/// that exist with ", ".
fn synthesize_label(formatted: Option<String>, parts: &[&Option<String>]) -> String {
    if let Some(addr) = formatted {
        return addr;
    }
    let mut label = String::new();
    for part in parts.iter().filter_map(|p| p.as_deref()) {
        if !label.is_empty() {
            label.push_str(", ");
        }
        label.push_str(part);
    }
    label
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(columns: &[&str], rows: &[Value]) -> RawTable {
        RawTable {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            records: rows
                .iter()
                .map(|v| v.as_object().cloned().unwrap())
                .collect(),
        }
    }

    #[test]
    fn binds_aliases_case_insensitively_with_priority() {
        let schema = resolve_schema(&[
            "List_Price".to_string(),
            "ZIP".to_string(),
            "beds".to_string(),
            "squarefootage".to_string(),
        ]);
        assert_eq!(schema.source(Field::Price), Some("List_Price"));
        assert_eq!(schema.source(Field::PostalCode), Some("ZIP"));
        assert_eq!(schema.source(Field::Bedrooms), Some("beds"));
        assert_eq!(schema.source(Field::Sqft), Some("squarefootage"));
        assert!(!schema.has(Field::City));
    }

    #[test]
    fn derives_price_per_sqft_only_for_positive_area() {
        let table = raw(
            &["price", "sqft"],
            &[
                json!({"price": 200000, "sqft": 1000}),
                json!({"price": 200000, "sqft": 0}),
                json!({"price": 200000}),
            ],
        );
        let normalized = normalize(&table);
        assert_eq!(normalized.listings[0].price_per_sqft, Some(200.0));
        assert_eq!(normalized.listings[1].price_per_sqft, None);
        assert_eq!(normalized.listings[2].price_per_sqft, None);
    }

    #[test]
    fn coercion_failures_become_missing_not_errors() {
        let table = raw(
            &["price", "bedrooms", "bathrooms"],
            &[json!({"price": "oops", "bedrooms": 2.5, "bathrooms": "2.5"})],
        );
        let listing = &normalize(&table).listings[0];
        assert_eq!(listing.price, None);
        assert_eq!(listing.bedrooms, None);
        assert_eq!(listing.bathrooms, Some(2.5));
    }

    #[test]
    fn negative_prices_are_missing() {
        let table = raw(&["price"], &[json!({"price": -5000})]);
        assert_eq!(normalize(&table).listings[0].price, None);
    }

    #[test]
    fn numeric_strings_parse() {
        let table = raw(
            &["price", "beds"],
            &[json!({"price": " 250000 ", "beds": "3"})],
        );
        let listing = &normalize(&table).listings[0];
        assert_eq!(listing.price, Some(250000.0));
        assert_eq!(listing.bedrooms, Some(3));
    }

    #[test]
    fn postal_codes_keep_their_first_five_digit_run() {
        assert_eq!(canonical_postal("CA 90210-1234"), "90210");
        assert_eq!(canonical_postal(" 90001 "), "90001");
        assert_eq!(canonical_postal("K1A 0B1"), "K1A 0B1");
        assert_eq!(canonical_postal("1234"), "1234");
    }

    #[test]
    fn numeric_postal_columns_still_resolve() {
        let table = raw(&["zip"], &[json!({"zip": 90210})]);
        assert_eq!(
            normalize(&table).listings[0].postal_code.as_deref(),
            Some("90210")
        );
    }

    #[test]
    fn label_prefers_formatted_address() {
        let table = raw(
            &["formattedAddress", "address", "city"],
            &[json!({
                "formattedAddress": "123 Main St, Springfield, IL 62704",
                "address": "123 Main St",
                "city": "Springfield",
            })],
        );
        assert_eq!(
            normalize(&table).listings[0].label,
            "123 Main St, Springfield, IL 62704"
        );
    }

    #[test]
    fn label_joins_present_parts_without_stray_separators() {
        let table = raw(
            &["address", "city", "state", "zip"],
            &[json!({"address": "9 Elm Ct", "state": "TX", "zip": "75001"})],
        );
        assert_eq!(normalize(&table).listings[0].label, "9 Elm Ct, TX, 75001");
    }

    #[test]
    fn out_of_range_coordinates_are_dropped() {
        let table = raw(
            &["lat", "lon"],
            &[
                json!({"lat": 95.0, "lon": 10.0}),
                json!({"lat": 34.0, "lon": -181.0}),
                json!({"lat": 34.0, "lon": -118.0}),
            ],
        );
        let normalized = normalize(&table);
        assert_eq!(normalized.listings[0].latitude, None);
        assert_eq!(normalized.listings[1].longitude, None);
        assert!(normalized.listings[2].is_map_eligible());
    }

    #[test]
    fn dates_resolve_through_the_schema() {
        let table = raw(
            &["listedDate", "created_date"],
            &[json!({
                "listedDate": "2023-06-15T08:00:00Z",
                "created_date": "06/01/2023",
            })],
        );
        let listing = &normalize(&table).listings[0];
        assert_eq!(
            listing.listed_date,
            chrono::NaiveDate::from_ymd_opt(2023, 6, 15)
        );
        assert_eq!(
            listing.created_date,
            chrono::NaiveDate::from_ymd_opt(2023, 6, 1)
        );
    }

    #[test]
    fn empty_table_normalizes_to_empty_output() {
        let normalized = normalize(&RawTable::default());
        assert!(normalized.is_empty());
        assert!(normalized.schema.is_empty());
    }
}
