use async_trait::async_trait;

use super::schema::Database;
use super::types::{Category, Source, StoreError};
use crate::feed::CandidateItem;

/// What the ingestion pipeline needs from persistent storage.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Sources the scheduler should visit this cycle.
    async fn list_active_sources(&self) -> Result<Vec<Source>, StoreError>;

    /// Whether an item with this content URL has already been stored.
    async fn is_content_url_known(&self, url: &str) -> Result<bool, StoreError>;

    /// Insert or update an item keyed by content URL, returning its id.
    async fn upsert_item(&self, item: &CandidateItem) -> Result<i64, StoreError>;

    /// Persist the status and failure count of a source.
    async fn update_source_health(&self, source: &Source) -> Result<(), StoreError>;
}

/// Read access to the category corpus used for scoring.
#[async_trait]
pub trait CategoryStore: Send + Sync {
    async fn list_categories(&self) -> Result<Vec<Category>, StoreError>;

    async fn get_category(&self, id: i64) -> Result<Option<Category>, StoreError>;
}

#[async_trait]
impl ContentStore for Database {
    async fn list_active_sources(&self) -> Result<Vec<Source>, StoreError> {
        self.get_active_sources().await
    }

    async fn is_content_url_known(&self, url: &str) -> Result<bool, StoreError> {
        self.item_exists_for_url(url).await
    }

    async fn upsert_item(&self, item: &CandidateItem) -> Result<i64, StoreError> {
        self.save_item(item).await
    }

    async fn update_source_health(&self, source: &Source) -> Result<(), StoreError> {
        self.save_source_health(source).await
    }
}

#[async_trait]
impl CategoryStore for Database {
    async fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        self.get_categories().await
    }

    async fn get_category(&self, id: i64) -> Result<Option<Category>, StoreError> {
        self.get_category_by_id(id).await
    }
}
