// Core structs: RawTable, Listing, Schema, selector enums, error types
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// One raw row as ingested from a CSV file or the listings API, before any
/// schema resolution. Keys are whatever the source called its columns.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// An untyped table of listing-like rows plus the column set they came with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub records: Vec<RawRecord>,
}

impl RawTable {
    /// Builds a table from API records; the column set is the sorted union
    /// of every key seen across the records.
    pub fn from_records(records: Vec<RawRecord>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for record in &records {
            for key in record.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
        columns.sort();
        Self { columns, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Canonical listing fields the normalizer can bind source columns to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Price,
    PostalCode,
    Bedrooms,
    Bathrooms,
    Sqft,
    LotSize,
    YearBuilt,
    DaysOnMarket,
    HoaFee,
    Latitude,
    Longitude,
    City,
    State,
    Status,
    PropertyType,
    AddressLine,
    FormattedAddress,
    ListedDate,
    CreatedDate,
    LastSeenDate,
}

impl Field {
    pub fn name(&self) -> &'static str {
        match self {
            Field::Price => "price",
            Field::PostalCode => "postal code",
            Field::Bedrooms => "bedrooms",
            Field::Bathrooms => "bathrooms",
            Field::Sqft => "square footage",
            Field::LotSize => "lot size",
            Field::YearBuilt => "year built",
            Field::DaysOnMarket => "days on market",
            Field::HoaFee => "hoa fee",
            Field::Latitude => "latitude",
            Field::Longitude => "longitude",
            Field::City => "city",
            Field::State => "state",
            Field::Status => "status",
            Field::PropertyType => "property type",
            Field::AddressLine => "address line",
            Field::FormattedAddress => "formatted address",
            Field::ListedDate => "listed date",
            Field::CreatedDate => "created date",
            Field::LastSeenDate => "last seen date",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Records which source column each canonical field was resolved from.
/// Downstream code asks the schema whether a field is available instead of
/// probing listings for sentinel values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    bound: BTreeMap<Field, String>,
}

impl Schema {
    pub fn bind(&mut self, field: Field, source: impl Into<String>) {
        self.bound.insert(field, source.into());
    }

    pub fn has(&self, field: Field) -> bool {
        self.bound.contains_key(&field)
    }

    /// Source column a field was bound to, if any.
    pub fn source(&self, field: Field) -> Option<&str> {
        self.bound.get(&field).map(String::as_str)
    }

    /// Errors with the first field that has no bound column.
    pub fn require(&self, fields: &[Field]) -> Result<(), AnalyticsError> {
        for field in fields {
            if !self.has(*field) {
                return Err(AnalyticsError::MissingColumn(*field));
            }
        }
        Ok(())
    }

    pub fn bound_fields(&self) -> impl Iterator<Item = (Field, &str)> {
        self.bound.iter().map(|(f, s)| (*f, s.as_str()))
    }

    pub fn len(&self) -> usize {
        self.bound.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bound.is_empty()
    }
}

/// One normalized property snapshot. Every attribute is optional; absent
/// means the source column was missing or the value failed coercion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Listing {
    /// Pre-formatted address when the source had one, otherwise synthesized
    /// from address line, city, state and postal code.
    pub label: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub price: Option<f64>,
    pub sqft: Option<f64>,
    /// price / sqft, defined only when both parts are present and sqft > 0.
    pub price_per_sqft: Option<f64>,
    pub bedrooms: Option<i64>,
    pub bathrooms: Option<f64>,
    pub property_type: Option<String>,
    pub status: Option<String>,
    pub year_built: Option<i64>,
    pub lot_size: Option<f64>,
    pub days_on_market: Option<f64>,
    pub hoa_fee: Option<f64>,
    pub listed_date: Option<NaiveDate>,
    pub created_date: Option<NaiveDate>,
    pub last_seen_date: Option<NaiveDate>,
}

impl Listing {
    /// A listing can be placed on a map when both coordinates are present,
    /// inside valid ranges, and not the (0, 0) null-island placeholder.
    pub fn is_map_eligible(&self) -> bool {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => {
                (-90.0..=90.0).contains(&lat)
                    && (-180.0..=180.0).contains(&lon)
                    && !(lat == 0.0 && lon == 0.0)
            }
            _ => false,
        }
    }
}

/// A normalized listing collection plus the schema it was resolved under.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingTable {
    pub schema: Schema,
    pub listings: Vec<Listing>,
}

impl ListingTable {
    pub fn len(&self) -> usize {
        self.listings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }
}

/// Comparable-group key selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKey {
    PostalCode,
    Bedrooms,
    PostalCodeBedrooms,
}

impl GroupKey {
    pub fn required_fields(&self) -> &'static [Field] {
        match self {
            GroupKey::PostalCode => &[Field::PostalCode],
            GroupKey::Bedrooms => &[Field::Bedrooms],
            GroupKey::PostalCodeBedrooms => &[Field::PostalCode, Field::Bedrooms],
        }
    }

    /// Group label for a listing, or None when any key part is missing
    /// (such listings join no group at all).
    pub fn label_for(&self, listing: &Listing) -> Option<String> {
        match self {
            GroupKey::PostalCode => listing.postal_code.clone(),
            GroupKey::Bedrooms => listing.bedrooms.map(|b| b.to_string()),
            GroupKey::PostalCodeBedrooms => match (&listing.postal_code, listing.bedrooms) {
                (Some(zip), Some(beds)) => Some(format!("{zip}|{beds}")),
                _ => None,
            },
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GroupKey::PostalCode => "postal_code",
            GroupKey::Bedrooms => "bedrooms",
            GroupKey::PostalCodeBedrooms => "postal_code_bedrooms",
        };
        f.write_str(name)
    }
}

/// Metric used for valuation ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValuationMetric {
    Price,
    PricePerSqft,
}

impl ValuationMetric {
    pub fn required_fields(&self) -> &'static [Field] {
        match self {
            ValuationMetric::Price => &[Field::Price],
            ValuationMetric::PricePerSqft => &[Field::Price, Field::Sqft],
        }
    }

    pub fn value(&self, listing: &Listing) -> Option<f64> {
        match self {
            ValuationMetric::Price => listing.price,
            ValuationMetric::PricePerSqft => listing.price_per_sqft,
        }
    }
}

impl fmt::Display for ValuationMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValuationMetric::Price => "price",
            ValuationMetric::PricePerSqft => "price_per_sqft",
        };
        f.write_str(name)
    }
}

/// Metric scored by the stability view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StabilityMetric {
    Price,
    PricePerSqft,
    DaysOnMarket,
}

impl StabilityMetric {
    pub fn required_fields(&self) -> &'static [Field] {
        match self {
            StabilityMetric::Price => &[Field::Price],
            StabilityMetric::PricePerSqft => &[Field::Price, Field::Sqft],
            StabilityMetric::DaysOnMarket => &[Field::DaysOnMarket],
        }
    }

    pub fn value(&self, listing: &Listing) -> Option<f64> {
        match self {
            StabilityMetric::Price => listing.price,
            StabilityMetric::PricePerSqft => listing.price_per_sqft,
            StabilityMetric::DaysOnMarket => listing.days_on_market,
        }
    }
}

impl fmt::Display for StabilityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StabilityMetric::Price => "price",
            StabilityMetric::PricePerSqft => "price_per_sqft",
            StabilityMetric::DaysOnMarket => "days_on_market",
        };
        f.write_str(name)
    }
}

/// Categorical key for the trends view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendKey {
    PostalCode,
    Bedrooms,
    PropertyType,
    Status,
    City,
}

impl TrendKey {
    pub fn required_field(&self) -> Field {
        match self {
            TrendKey::PostalCode => Field::PostalCode,
            TrendKey::Bedrooms => Field::Bedrooms,
            TrendKey::PropertyType => Field::PropertyType,
            TrendKey::Status => Field::Status,
            TrendKey::City => Field::City,
        }
    }

    pub fn value(&self, listing: &Listing) -> Option<String> {
        match self {
            TrendKey::PostalCode => listing.postal_code.clone(),
            TrendKey::Bedrooms => listing.bedrooms.map(|b| b.to_string()),
            TrendKey::PropertyType => listing.property_type.clone(),
            TrendKey::Status => listing.status.clone(),
            TrendKey::City => listing.city.clone(),
        }
    }
}

impl fmt::Display for TrendKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrendKey::PostalCode => "postal_code",
            TrendKey::Bedrooms => "bedrooms",
            TrendKey::PropertyType => "property_type",
            TrendKey::Status => "status",
            TrendKey::City => "city",
        };
        f.write_str(name)
    }
}

/// An optionally bounded numeric interval. Absent sides mean "no bound";
/// there is no 0-means-unset convention anywhere in the core.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct NumericRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl NumericRange {
    pub fn new(min: Option<f64>, max: Option<f64>) -> Self {
        Self { min, max }
    }

    pub fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    pub fn contains(&self, value: f64) -> bool {
        if let Some(min) = self.min {
            if value < min {
                return false;
            }
        }
        if let Some(max) = self.max {
            if value > max {
                return false;
            }
        }
        true
    }

    /// Wire form consumed by the listings API: `"min:max"` with `*` for an
    /// unbounded side, or None when both sides are open (parameter omitted).
    pub fn to_param(&self) -> Option<String> {
        if self.is_unbounded() {
            return None;
        }
        let lo = self.min.map_or_else(|| "*".to_string(), |v| v.to_string());
        let hi = self.max.map_or_else(|| "*".to_string(), |v| v.to_string());
        Some(format!("{lo}:{hi}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalyticsError {
    #[error("no column for {0} is present in this dataset")]
    MissingColumn(Field),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("listings endpoint returned status {0}")]
    Status(u16),
    #[error("unexpected response shape: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("could not parse {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
