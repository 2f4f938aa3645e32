use crate::fetcher::query::SearchQuery;
use crate::fetcher::traits::ListingSource;
use crate::model::{FetchError, RawRecord};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::info;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for a RentCast-style listings API. Authentication is a
/// per-request `X-Api-Key` header.
pub struct ListingApiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl ListingApiClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl ListingSource for ListingApiClient {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawRecord>, FetchError> {
        let url = format!("{}{}", self.base_url, query.listing_type.endpoint_path());
        let response = self
            .client
            .get(&url)
            .header("X-Api-Key", &self.api_key)
            .header("Accept", "application/json")
            .query(&query.params())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let payload: Value = response.json().await?;
        let records = extract_records(payload)?;
        info!(count = records.len(), url, "fetched listings");
        Ok(records)
    }
}

/// Pulls the listing objects out of a response that is either a bare array
/// or an object wrapping one under `listings`.
fn extract_records(payload: Value) -> Result<Vec<RawRecord>, FetchError> {
    let items = match payload {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("listings") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(FetchError::InvalidResponse(
                    "object response without a listings array".to_string(),
                ));
            }
        },
        _ => {
            return Err(FetchError::InvalidResponse(
                "response is neither an array nor an object".to_string(),
            ));
        }
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(record) => Ok(record),
            _ => Err(FetchError::InvalidResponse(
                "non-object entry in listing array".to_string(),
            )),
        })
        .collect()
}
