use std::sync::Arc;

use super::store::CategoryStore;
use super::types::{Category, CategorySnapshot, StoreError};
use crate::cache::Cache;

/// Cache-aside access to categories.
#[derive(Clone)]
pub struct CategoryServer {
    store: Arc<dyn CategoryStore>,
    cache: Arc<dyn Cache>,
}

impl CategoryServer {
    pub fn new(store: Arc<dyn CategoryStore>, cache: Arc<dyn Cache>) -> Self {
        Self { store, cache }
    }

    /// The category snapshot, from cache when present.
    ///
    /// A load failure is logged and yields an empty snapshot, which is not
    /// cached; items then import uncategorised.
    pub async fn snapshot(&self) -> CategorySnapshot {
        if let Some(snapshot) = self.cache.categories() {
            return snapshot;
        }

        match self.store.list_categories().await {
            Ok(categories) => {
                let snapshot: CategorySnapshot =
                    Arc::new(categories.into_iter().map(Arc::new).collect());
                self.cache.set_categories(Arc::clone(&snapshot));
                tracing::debug!(count = snapshot.len(), "Loaded category snapshot");
                snapshot
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to load categories");
                Arc::new(Vec::new())
            }
        }
    }

    pub async fn category(&self, id: i64) -> Result<Option<Arc<Category>>, StoreError> {
        if let Some(category) = self.cache.category(id) {
            return Ok(Some(category));
        }

        let category = self.store.get_category(id).await?.map(Arc::new);
        if let Some(category) = &category {
            self.cache.set_category(Arc::clone(category));
        }
        Ok(category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::storage::testing::FakeCategoryStore;
    use std::time::Duration;

    fn server(store: Arc<FakeCategoryStore>) -> CategoryServer {
        CategoryServer::new(store, Arc::new(MemoryCache::with_ttl(Duration::from_secs(60))))
    }

    #[tokio::test]
    async fn test_snapshot_loaded_once() {
        let store = Arc::new(FakeCategoryStore::new(vec![
            Category::new(1, "General"),
            Category::new(2, "Tech").with_tags(["rust"]),
        ]));
        let server = server(Arc::clone(&store));

        assert_eq!(server.snapshot().await.len(), 2);
        assert_eq!(server.snapshot().await.len(), 2);
        assert_eq!(store.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_load_is_empty_and_not_cached() {
        let store = Arc::new(FakeCategoryStore::failing());
        let server = server(Arc::clone(&store));

        assert!(server.snapshot().await.is_empty());
        assert!(server.snapshot().await.is_empty());
        assert_eq!(store.list_calls(), 2);
    }

    #[tokio::test]
    async fn test_category_by_id() {
        let store = Arc::new(FakeCategoryStore::new(vec![Category::new(4, "Four")]));
        let server = server(store);

        assert_eq!(server.category(4).await.unwrap().unwrap().name, "Four");
        assert!(server.category(5).await.unwrap().is_none());
    }
}
