// Search request shape consumed by the listings endpoints.
use crate::model::NumericRange;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingType {
    #[default]
    Sale,
    Rental,
}

impl ListingType {
    pub fn endpoint_path(&self) -> &'static str {
        match self {
            ListingType::Sale => "/listings/sale",
            ListingType::Rental => "/listings/rental/long-term",
        }
    }
}

/// One listings search. Unset fields are omitted from the request; numeric
/// ranges go out as `"min:max"` with `*` on unbounded sides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchQuery {
    pub listing_type: ListingType,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub status: Option<String>,
    pub property_type: Option<String>,
    pub price: NumericRange,
    pub bedrooms: NumericRange,
    pub bathrooms: NumericRange,
    pub sqft: NumericRange,
    pub lot_size: NumericRange,
    pub year_built: NumericRange,
    pub days_old: NumericRange,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl SearchQuery {
    /// Assembles the wire parameters. A postal code is the preferred
    /// location constraint; city and state are sent only without one.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(zip) = non_empty(&self.postal_code) {
            params.push(("zipCode", zip));
        } else {
            if let Some(city) = non_empty(&self.city) {
                params.push(("city", city));
            }
            if let Some(state) = non_empty(&self.state) {
                params.push(("state", state));
            }
        }
        if let Some(status) = non_empty(&self.status) {
            params.push(("status", status));
        }
        if let Some(property_type) = non_empty(&self.property_type) {
            params.push(("propertyType", property_type));
        }
        for (name, range) in [
            ("price", &self.price),
            ("bedrooms", &self.bedrooms),
            ("bathrooms", &self.bathrooms),
            ("squareFootage", &self.sqft),
            ("lotSize", &self.lot_size),
            ("yearBuilt", &self.year_built),
            ("daysOld", &self.days_old),
        ] {
            if let Some(value) = range.to_param() {
                params.push((name, value));
            }
        }
        if let Some(limit) = self.limit {
            params.push(("limit", limit.to_string()));
        }
        if let Some(offset) = self.offset {
            params.push(("offset", offset.to_string()));
        }
        params
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
