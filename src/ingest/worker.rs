use std::sync::Arc;
use thiserror::Error;

use super::categorizer::Categorizer;
use super::images::ImageResolver;
use super::markup::strip_markup;
use crate::feed::CandidateItem;
use crate::storage::{CategoryServer, ContentStore, Source, StoreError};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Failed to store item {url}: {error}")]
    Persist {
        url: String,
        #[source]
        error: StoreError,
    },
}

/// Outcome of one source's import run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub source_id: i64,
    pub candidates: usize,
    pub new_items: usize,
    pub persisted: usize,
    /// New items left with nothing to store once markup was stripped.
    pub dropped: usize,
    pub failed: usize,
}

/// Turns a parsed source's candidates into stored items.
///
/// Items are processed one after another: newness check, categorisation,
/// markup stripping, image resolution, then the write.
#[derive(Clone)]
pub struct ImportWorker {
    store: Arc<dyn ContentStore>,
    categories: CategoryServer,
    images: ImageResolver,
    propagate_persistence_errors: bool,
}

impl ImportWorker {
    pub fn new(store: Arc<dyn ContentStore>, categories: CategoryServer, images: ImageResolver) -> Self {
        Self {
            store,
            categories,
            images,
            propagate_persistence_errors: false,
        }
    }

    pub fn propagate_persistence_errors(mut self, propagate: bool) -> Self {
        self.propagate_persistence_errors = propagate;
        self
    }

    /// Set `is_new` on every candidate whose content URL the store has not
    /// seen. A failed lookup is logged and counts as already known.
    pub async fn mark_new_items(store: &dyn ContentStore, items: &mut [CandidateItem]) -> usize {
        let mut fresh = 0;
        for item in items.iter_mut() {
            item.feed_data.is_new = match store.is_content_url_known(item.content_url.as_str()).await {
                Ok(known) => !known,
                Err(e) => {
                    tracing::error!(url = %item.content_url, error = %e, "Failed to check item newness");
                    false
                }
            };
            if item.feed_data.is_new {
                fresh += 1;
            }
        }
        fresh
    }

    /// Import every new candidate of `source`.
    ///
    /// A failed write is logged and the next item is processed, unless the
    /// worker propagates persistence errors, in which case the run stops
    /// there.
    pub async fn import(&self, mut source: Source) -> Result<ImportReport, ImportError> {
        let mut items = std::mem::take(&mut source.candidate_items);
        let mut report = ImportReport {
            source_id: source.id,
            candidates: items.len(),
            ..ImportReport::default()
        };

        report.new_items = Self::mark_new_items(self.store.as_ref(), &mut items).await;
        if report.new_items == 0 {
            tracing::debug!(source = %source.name, candidates = report.candidates, "No new items");
            return Ok(report);
        }

        let categorizer = Categorizer::new(&self.categories.snapshot().await);

        for mut item in items.into_iter().filter(|i| i.feed_data.is_new) {
            categorizer.categorize(&mut item);

            let raw_description = std::mem::take(&mut item.description);
            item.description = strip_markup(&raw_description);
            if !item.is_valid() {
                report.dropped += 1;
                tracing::debug!(
                    source = %source.name,
                    url = %item.content_url,
                    "Dropping item with no text after markup removal"
                );
                continue;
            }

            self.images.resolve(&mut item, &raw_description).await;

            match self.store.upsert_item(&item).await {
                Ok(id) => {
                    report.persisted += 1;
                    tracing::debug!(source = %source.name, id = id, url = %item.content_url, "Stored item");
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(
                        source = %source.name,
                        url = %item.content_url,
                        error = %e,
                        "Failed to store item"
                    );
                    if self.propagate_persistence_errors {
                        return Err(ImportError::Persist {
                            url: item.content_url.to_string(),
                            error: e,
                        });
                    }
                }
            }
        }

        tracing::info!(
            source = %source.name,
            new = report.new_items,
            stored = report.persisted,
            dropped = report.dropped,
            failed = report.failed,
            "Imported items"
        );
        Ok(report)
    }
}
