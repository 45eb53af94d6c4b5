use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;

use super::atom::AtomParser;
use super::format::FeedFormat;
use super::item::{CandidateItem, FeedData};
use super::rdf::RdfParser;
use super::rss::RssParser;
use super::xml::{XmlDocument, XmlElement};
use crate::storage::{Source, Tag};
use crate::util::{is_web_image_mime, parse_http_url};

/// Errors raised while interpreting a feed document.
///
/// `Format` and `Contents` concern the document as a whole and abort the
/// source; `Entry` is confined to a single item.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Unrecognised {kind} version \"{version}\" for {url}")]
    Format {
        kind: &'static str,
        url: String,
        version: String,
    },

    #[error("Missing <{node}> element in {url}")]
    Contents { node: &'static str, url: String },

    #[error("Bad entry: {0}")]
    Entry(String),
}

impl FeedError {
    pub(crate) fn missing(element: &str) -> Self {
        Self::Entry(format!("missing <{element}>"))
    }
}

/// Turns a parsed document into candidate items for one source.
///
/// Implementations isolate per-entry failures: a bad entry is logged and
/// skipped, and only document-level problems surface as errors.
pub trait FeedParser: Send + Sync {
    fn extract_items(
        &self,
        document: &XmlDocument,
        source: &Source,
    ) -> Result<Vec<CandidateItem>, FeedError>;
}

pub fn parser_for(format: FeedFormat) -> Box<dyn FeedParser> {
    match format {
        FeedFormat::Rss090
        | FeedFormat::Rss091
        | FeedFormat::Rss092
        | FeedFormat::Rss10
        | FeedFormat::Rss20 => Box::new(RssParser::new(format)),
        FeedFormat::Atom03 | FeedFormat::Atom10 => Box::new(AtomParser::new(format)),
        FeedFormat::Rdf => Box::new(RdfParser),
    }
}

/// Run the parser matching the source's detected format over its latest
/// document and store the result as the source's candidate items.
///
/// Returns the number of candidates kept. A source without a document or
/// format yields zero candidates.
pub fn parse_source(source: &mut Source) -> Result<usize, FeedError> {
    let items = match (&source.latest_document, source.feed_format) {
        (Some(document), Some(format)) => parser_for(format).extract_items(document, source)?,
        _ => Vec::new(),
    };
    source.candidate_items = items;
    Ok(source.candidate_items.len())
}

// ============================================================================
// Shared extraction helpers
// ============================================================================

/// Entry fields as read by a format-specific parser, before fallbacks.
#[derive(Debug, Default)]
pub(crate) struct EntryFields {
    pub title: String,
    pub description: String,
    pub content_url: Option<Url>,
    pub published: Option<DateTime<Utc>>,
    pub categories: Vec<String>,
    pub guid: Option<String>,
    pub image_urls: Vec<Url>,
}

/// Channel- or feed-level values entries fall back on.
#[derive(Debug, Default)]
pub(crate) struct ChannelDefaults {
    /// Candidate dates in priority order.
    pub dates: Vec<Option<DateTime<Utc>>>,
    pub categories: Vec<String>,
}

/// Extract every entry, logging and skipping those that fail, then apply the
/// channel fallbacks and drop candidates that fail validation.
pub(crate) fn collect_entries<'a, F>(
    entries: impl Iterator<Item = &'a XmlElement>,
    source: &Source,
    defaults: &ChannelDefaults,
    mut extract: F,
) -> Vec<CandidateItem>
where
    F: FnMut(&XmlElement) -> Result<EntryFields, FeedError>,
{
    let now = Utc::now();
    let mut items = Vec::new();

    for (index, entry) in entries.enumerate() {
        match extract(entry) {
            Ok(fields) => {
                if let Some(item) = finish_entry(fields, source, defaults, now) {
                    items.push(item);
                }
            }
            Err(e) => {
                tracing::error!(
                    source = %source.name,
                    url = %source.feed_url,
                    entry = index,
                    error = %e,
                    "Failed to read feed entry, skipping"
                );
            }
        }
    }

    items
}

fn finish_entry(
    fields: EntryFields,
    source: &Source,
    defaults: &ChannelDefaults,
    now: DateTime<Utc>,
) -> Option<CandidateItem> {
    let content_url = fields.content_url?;
    let publication_time = resolve_publication_time(fields.published, &defaults.dates, now);

    let categories = if fields.categories.is_empty() {
        defaults.categories.clone()
    } else {
        fields.categories
    };

    let guid = match fields.guid.filter(|g| !g.is_empty()) {
        Some(guid) => guid,
        None => derive_guid(content_url.as_str(), &fields.title, fields.published),
    };

    let item = CandidateItem {
        source_id: source.id,
        title: fields.title,
        description: fields.description,
        content_url,
        publication_time,
        import_time: now,
        feed_data: FeedData {
            guid,
            categories,
            image_urls: fields.image_urls,
            is_new: false,
        },
        category: None,
        tags: Tag::set(),
        image_filename: None,
    };

    item.is_valid().then_some(item)
}

/// The entry's own date, else the first channel date available, else `now`.
pub fn resolve_publication_time(
    entry: Option<DateTime<Utc>>,
    channel: &[Option<DateTime<Utc>>],
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    entry
        .or_else(|| channel.iter().flatten().next().copied())
        .unwrap_or(now)
}

/// Parse the date formats found in the wild: RFC 2822 (RSS), RFC 3339
/// (Atom, Dublin Core) and a few zone-less ISO-8601 shapes read as UTC.
pub fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Parse a required content link; failure rejects the entry.
pub(crate) fn content_url(raw: &str) -> Result<Url, FeedError> {
    parse_http_url(raw).map_err(|e| FeedError::Entry(format!("content URL \"{raw}\": {e}")))
}

/// A declared image enclosure, kept only for web image types with a usable URL.
pub(crate) fn declared_image(url: Option<&str>, mime: Option<&str>) -> Option<Url> {
    if !mime.is_some_and(is_web_image_mime) {
        return None;
    }
    let raw = url?;
    match parse_http_url(raw) {
        Ok(url) => Some(url),
        Err(e) => {
            tracing::debug!(url = %raw, error = %e, "Ignoring unusable image enclosure");
            None
        }
    }
}

/// Lowercased, trimmed, non-empty text of an element.
pub(crate) fn normalized(el: &XmlElement) -> Option<String> {
    let text = el.text().trim().to_lowercase();
    (!text.is_empty()).then_some(text)
}

fn derive_guid(url: &str, title: &str, published: Option<DateTime<Utc>>) -> String {
    let input = format!(
        "{}|{}|{}",
        url,
        title,
        published.map(|p| p.timestamp().to_string()).unwrap_or_default()
    );
    format!("{:x}", Sha256::digest(input.as_bytes()))
}
