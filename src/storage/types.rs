use std::sync::Arc;
use thiserror::Error;

use crate::feed::{CandidateItem, FeedFormat, XmlDocument};
use crate::util::UniqueSet;

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised by content and category stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// A record was rejected before reaching the database
    #[error("Invalid {kind}: {reason}")]
    Invalid { kind: &'static str, reason: String },

    /// Generic database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

// ============================================================================
// Sources
// ============================================================================

/// Health of a source as tracked across scan cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SourceStatus {
    #[default]
    New,
    Active,
    Inactive,
    NotResponding,
}

impl SourceStatus {
    pub(crate) fn as_i64(self) -> i64 {
        match self {
            Self::New => 0,
            Self::Active => 1,
            Self::Inactive => 2,
            Self::NotResponding => 3,
        }
    }

    /// Unknown codes read back as `Inactive` so a corrupted row is never scanned.
    pub(crate) fn from_i64(code: i64) -> Self {
        match code {
            0 => Self::New,
            1 => Self::Active,
            3 => Self::NotResponding,
            _ => Self::Inactive,
        }
    }

    /// Whether the scheduler should visit a source in this state.
    pub fn is_scannable(self) -> bool {
        matches!(self, Self::New | Self::Active)
    }
}

/// A configured feed endpoint plus the transient state of the current cycle.
///
/// `feed_format`, `latest_document` and `candidate_items` are never
/// persisted; they are filled in by the fetch, detect and parse steps.
#[derive(Debug, Clone, Default)]
pub struct Source {
    pub id: i64,
    pub name: String,
    pub homepage_url: String,
    pub feed_url: String,
    pub status: SourceStatus,
    pub failed_get_count: u32,
    pub feed_format: Option<FeedFormat>,
    pub latest_document: Option<XmlDocument>,
    pub candidate_items: Vec<CandidateItem>,
}

impl Source {
    pub fn new(name: &str, homepage_url: &str, feed_url: &str) -> Self {
        Self {
            name: name.to_owned(),
            homepage_url: homepage_url.to_owned(),
            feed_url: feed_url.to_owned(),
            ..Self::default()
        }
    }

    /// A source needs a name and a feed URL before it can be stored.
    pub fn is_valid(&self) -> bool {
        !self.name.trim().is_empty() && !self.feed_url.trim().is_empty()
    }
}

/// Internal row type for source queries
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SourceDbRow {
    pub id: i64,
    pub name: String,
    pub homepage_url: String,
    pub feed_url: String,
    pub status: i64,
    pub failed_get_count: i64,
}

impl SourceDbRow {
    pub(crate) fn into_source(self) -> Source {
        Source {
            id: self.id,
            name: self.name,
            homepage_url: self.homepage_url,
            feed_url: self.feed_url,
            status: SourceStatus::from_i64(self.status),
            failed_get_count: u32::try_from(self.failed_get_count).unwrap_or(0),
            ..Source::default()
        }
    }
}

// ============================================================================
// Items
// ============================================================================

/// An item as read back from the store.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct StoredItem {
    pub id: i64,
    pub source_id: i64,
    pub guid: String,
    pub title: String,
    pub description: String,
    pub content_url: String,
    pub publication_time: i64,
    pub import_time: i64,
    pub category_id: Option<i64>,
    pub image_filename: Option<String>,
    /// Matched tag names joined with `", "`.
    pub tags: String,
    pub declared_categories: String,
}

// ============================================================================
// Categories
// ============================================================================

/// A whole-word keyword that votes for its category.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag {
    pub name: String,
}

impl Tag {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
        }
    }

    /// Tags are identified by name alone.
    pub fn same_name(a: &Tag, b: &Tag) -> bool {
        a.name == b.name
    }

    /// An empty tag set that rejects duplicate names.
    pub fn set() -> UniqueSet<Tag> {
        UniqueSet::new(Tag::same_name)
    }

    /// Parse a comma-separated tag list, trimming names and dropping blanks
    /// and duplicates.
    pub fn parse_list(csv: &str) -> UniqueSet<Tag> {
        let mut tags = Self::set();
        tags.extend(
            csv.split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(Tag::new),
        );
        tags
    }

    /// Join tag names with `", "`, the stored list format.
    pub fn join(tags: &UniqueSet<Tag>) -> String {
        tags.iter()
            .map(|t| t.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CategoryStatus {
    Inactive,
    #[default]
    Active,
}

impl CategoryStatus {
    pub(crate) fn as_i64(self) -> i64 {
        match self {
            Self::Inactive => 0,
            Self::Active => 1,
        }
    }

    pub(crate) fn from_i64(code: i64) -> Self {
        if code == 1 {
            Self::Active
        } else {
            Self::Inactive
        }
    }
}

#[derive(Debug, Clone)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub parent_id: Option<i64>,
    pub status: CategoryStatus,
    pub tags: UniqueSet<Tag>,
}

impl Category {
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            id,
            name: name.to_owned(),
            parent_id: None,
            status: CategoryStatus::Active,
            tags: Tag::set(),
        }
    }

    pub fn with_tags<'a>(mut self, names: impl IntoIterator<Item = &'a str>) -> Self {
        self.tags.extend(names.into_iter().map(Tag::new));
        self
    }
}

/// The read-only category list a worker scores against for one run.
pub type CategorySnapshot = Arc<Vec<Arc<Category>>>;

/// Internal row type for category queries
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct CategoryDbRow {
    pub id: i64,
    pub name: String,
    pub parent_id: Option<i64>,
    pub status: i64,
    pub tags: String,
}

impl CategoryDbRow {
    pub(crate) fn into_category(self) -> Category {
        Category {
            id: self.id,
            name: self.name,
            parent_id: self.parent_id,
            status: CategoryStatus::from_i64(self.status),
            tags: Tag::parse_list(&self.tags),
        }
    }
}
