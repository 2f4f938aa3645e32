use crate::fetcher::query::SearchQuery;
use crate::model::{FetchError, RawRecord};

#[async_trait::async_trait]
pub trait ListingSource: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawRecord>, FetchError>;
}
