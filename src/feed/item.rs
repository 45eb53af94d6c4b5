use chrono::{DateTime, Utc};
use std::sync::Arc;
use url::Url;

use crate::storage::{Category, Tag};
use crate::util::UniqueSet;

/// Feed-specific facts about an entry, as declared by the feed itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedData {
    pub guid: String,
    /// Category names declared on the entry, or inherited from the channel.
    pub categories: Vec<String>,
    /// Image enclosures with a web image media type.
    pub image_urls: Vec<Url>,
    /// Set by the deduplication step; only new items are imported.
    pub is_new: bool,
}

/// A parsed feed entry on its way through the import pipeline.
#[derive(Debug, Clone)]
pub struct CandidateItem {
    pub source_id: i64,
    pub title: String,
    pub description: String,
    /// Deduplication key.
    pub content_url: Url,
    pub publication_time: DateTime<Utc>,
    pub import_time: DateTime<Utc>,
    pub feed_data: FeedData,
    pub category: Option<Arc<Category>>,
    pub tags: UniqueSet<Tag>,
    pub image_filename: Option<String>,
}

impl CandidateItem {
    /// An item may only be persisted with a title and a description.
    ///
    /// The content URL is guaranteed by construction.
    pub fn is_valid(&self) -> bool {
        !self.title.trim().is_empty() && !self.description.trim().is_empty()
    }

    pub fn category_id(&self) -> Option<i64> {
        self.category.as_ref().map(|c| c.id)
    }

    pub fn category_name(&self) -> Option<&str> {
        self.category.as_ref().map(|c| c.name.as_str())
    }
}
