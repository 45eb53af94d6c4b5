use super::format::FeedFormat;
use super::item::CandidateItem;
use super::parser::{
    collect_entries, content_url, declared_image, normalized, parse_date, ChannelDefaults,
    EntryFields, FeedError, FeedParser,
};
use super::xml::{XmlDocument, XmlElement};
use crate::storage::Source;

/// Atom 0.3 and 1.0 (`feed/entry`).
pub struct AtomParser {
    format: FeedFormat,
}

impl AtomParser {
    pub fn new(format: FeedFormat) -> Self {
        Self { format }
    }

    fn read_entry(&self, entry: &XmlElement) -> Result<EntryFields, FeedError> {
        match self.format {
            FeedFormat::Atom03 => read_atom03_entry(entry),
            _ => read_atom10_entry(entry),
        }
    }

    fn defaults(&self, feed: &XmlElement) -> ChannelDefaults {
        match self.format {
            FeedFormat::Atom03 => ChannelDefaults {
                dates: vec![feed.child_text("modified").as_deref().and_then(parse_date)],
                categories: Vec::new(),
            },
            _ => ChannelDefaults {
                dates: vec![feed.child_text("updated").as_deref().and_then(parse_date)],
                categories: feed
                    .children("category")
                    .filter_map(category_label)
                    .collect(),
            },
        }
    }
}

impl FeedParser for AtomParser {
    fn extract_items(
        &self,
        document: &XmlDocument,
        source: &Source,
    ) -> Result<Vec<CandidateItem>, FeedError> {
        let feed = document.root();
        let defaults = self.defaults(feed);

        Ok(collect_entries(
            feed.children("entry"),
            source,
            &defaults,
            |entry| self.read_entry(entry),
        ))
    }
}

fn read_atom10_entry(entry: &XmlElement) -> Result<EntryFields, FeedError> {
    let title = entry
        .child_text("title")
        .ok_or_else(|| FeedError::missing("title"))?;

    let href = alternate_link(entry)
        .or_else(|| entry.children("link").find_map(|l| l.attr("href")))
        .ok_or_else(|| FeedError::missing("link"))?;

    let description = entry
        .child_text("summary")
        .ok_or_else(|| FeedError::missing("summary"))?;

    let mut categories: Vec<String> = entry
        .children("category")
        .filter_map(category_label)
        .map(|c| c.to_lowercase())
        .collect();
    categories.extend(entry.children("dc:subject").filter_map(normalized));

    Ok(EntryFields {
        title,
        description,
        content_url: Some(content_url(href)?),
        published: entry.child_text("published").as_deref().and_then(parse_date),
        categories,
        guid: entry.child("id").and_then(normalized),
        image_urls: entry
            .children("link")
            .filter(|l| l.attr("rel") == Some("enclosure"))
            .filter_map(|l| declared_image(l.attr("href"), l.attr("type")))
            .collect(),
    })
}

fn read_atom03_entry(entry: &XmlElement) -> Result<EntryFields, FeedError> {
    let title = entry
        .child_text("title")
        .ok_or_else(|| FeedError::missing("title"))?;

    let href = alternate_link(entry).ok_or_else(|| FeedError::missing("link"))?;

    let description = entry
        .child_text("summary")
        .or_else(|| entry.child_text("content"))
        .ok_or_else(|| FeedError::missing("summary"))?;

    Ok(EntryFields {
        title,
        description,
        content_url: Some(content_url(href)?),
        published: entry.child_text("issued").as_deref().and_then(parse_date),
        categories: entry.children("dc:subject").filter_map(normalized).collect(),
        guid: entry.child("id").and_then(normalized),
        image_urls: Vec::new(),
    })
}

fn alternate_link(entry: &XmlElement) -> Option<&str> {
    entry
        .children("link")
        .filter(|l| l.attr("rel") == Some("alternate"))
        .find_map(|l| l.attr("href"))
}

/// Atom categories carry their label in `term`; some feeds use element text.
fn category_label(el: &XmlElement) -> Option<String> {
    let text = el.text();
    let label = match text.trim() {
        "" => el.attr("term")?.trim(),
        trimmed => trimmed,
    };
    (!label.is_empty()).then(|| label.to_owned())
}
