//! In-memory store fakes for unit tests.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::store::{CategoryStore, ContentStore};
use super::types::{Category, Source, SourceStatus, StoreError};
use crate::feed::CandidateItem;

fn unavailable() -> StoreError {
    StoreError::Database(sqlx::Error::PoolTimedOut)
}

/// Records every call; can be primed with sources and known URLs.
#[derive(Default)]
pub(crate) struct RecordingStore {
    sources: Mutex<Vec<Source>>,
    known_urls: Mutex<HashSet<String>>,
    saved: Mutex<Vec<CandidateItem>>,
    health: Mutex<Vec<(i64, SourceStatus, u32)>>,
    lookups: AtomicUsize,
    /// Fail every upsert whose title contains this text.
    fail_upserts_matching: Option<String>,
    fail_source_listing: bool,
}

impl RecordingStore {
    pub fn with_sources(sources: Vec<Source>) -> Self {
        Self {
            sources: Mutex::new(sources),
            ..Self::default()
        }
    }

    pub fn failing_upserts_matching(pattern: &str) -> Self {
        Self {
            fail_upserts_matching: Some(pattern.to_owned()),
            ..Self::default()
        }
    }

    pub fn failing_source_listing() -> Self {
        Self {
            fail_source_listing: true,
            ..Self::default()
        }
    }

    pub fn know(&self, url: &str) {
        self.known_urls.lock().unwrap().insert(url.to_owned());
    }

    pub fn saved(&self) -> Vec<CandidateItem> {
        self.saved.lock().unwrap().clone()
    }

    pub fn health_updates(&self) -> Vec<(i64, SourceStatus, u32)> {
        self.health.lock().unwrap().clone()
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentStore for RecordingStore {
    async fn list_active_sources(&self) -> Result<Vec<Source>, StoreError> {
        if self.fail_source_listing {
            return Err(unavailable());
        }
        Ok(self.sources.lock().unwrap().clone())
    }

    async fn is_content_url_known(&self, url: &str) -> Result<bool, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.known_urls.lock().unwrap().contains(url))
    }

    async fn upsert_item(&self, item: &CandidateItem) -> Result<i64, StoreError> {
        if let Some(pattern) = &self.fail_upserts_matching {
            if item.title.contains(pattern.as_str()) {
                return Err(unavailable());
            }
        }
        self.known_urls
            .lock()
            .unwrap()
            .insert(item.content_url.to_string());
        let mut saved = self.saved.lock().unwrap();
        saved.push(item.clone());
        Ok(saved.len() as i64)
    }

    async fn update_source_health(&self, source: &Source) -> Result<(), StoreError> {
        self.health
            .lock()
            .unwrap()
            .push((source.id, source.status, source.failed_get_count));
        Ok(())
    }
}

pub(crate) struct FakeCategoryStore {
    categories: Option<Vec<Category>>,
    list_calls: AtomicUsize,
}

impl FakeCategoryStore {
    pub fn new(categories: Vec<Category>) -> Self {
        Self {
            categories: Some(categories),
            list_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            categories: None,
            list_calls: AtomicUsize::new(0),
        }
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CategoryStore for FakeCategoryStore {
    async fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.categories.clone().ok_or_else(unavailable)
    }

    async fn get_category(&self, id: i64) -> Result<Option<Category>, StoreError> {
        let categories = self.categories.as_ref().ok_or_else(unavailable)?;
        Ok(categories.iter().find(|c| c.id == id).cloned())
    }
}
