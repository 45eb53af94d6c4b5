use super::format::FeedFormat;
use super::item::CandidateItem;
use super::parser::{
    collect_entries, content_url, declared_image, normalized, parse_date, ChannelDefaults,
    EntryFields, FeedError, FeedParser,
};
use super::xml::{XmlDocument, XmlElement};
use crate::storage::Source;

/// RSS 0.9x and 2.0 (`rss/channel/item`).
pub struct RssParser {
    format: FeedFormat,
}

impl RssParser {
    pub fn new(format: FeedFormat) -> Self {
        Self { format }
    }

    /// Only RSS 2.0 makes `description` mandatory on items.
    fn requires_description(&self) -> bool {
        self.format == FeedFormat::Rss20
    }

    fn read_entry(&self, item: &XmlElement, source: &Source) -> Result<EntryFields, FeedError> {
        let title = item
            .child_text("title")
            .unwrap_or_else(|| format!("{}: Untitled", source.name));

        let link = item.child_text("link").ok_or_else(|| FeedError::missing("link"))?;

        let description = match item.child("description") {
            Some(el) => el.text().trim().to_owned(),
            None if self.requires_description() => return Err(FeedError::missing("description")),
            None => String::new(),
        };

        Ok(EntryFields {
            title,
            description,
            content_url: Some(content_url(&link)?),
            published: item.child_text("pubDate").as_deref().and_then(parse_date),
            categories: item.child("category").and_then(normalized).into_iter().collect(),
            guid: item.child("guid").and_then(normalized),
            image_urls: item
                .children("enclosure")
                .filter_map(|enc| declared_image(enc.attr("url"), enc.attr("type")))
                .collect(),
        })
    }
}

impl FeedParser for RssParser {
    fn extract_items(
        &self,
        document: &XmlDocument,
        source: &Source,
    ) -> Result<Vec<CandidateItem>, FeedError> {
        let channel = document
            .root()
            .child("channel")
            .ok_or_else(|| FeedError::Contents {
                node: "channel",
                url: source.feed_url.clone(),
            })?;

        let defaults = ChannelDefaults {
            dates: vec![
                channel.child_text("pubDate").as_deref().and_then(parse_date),
                channel.child_text("lastBuildDate").as_deref().and_then(parse_date),
            ],
            categories: channel
                .children("category")
                .map(|c| c.text().trim().to_owned())
                .filter(|c| !c.is_empty())
                .collect(),
        };

        Ok(collect_entries(
            channel.children("item"),
            source,
            &defaults,
            |item| self.read_entry(item, source),
        ))
    }
}
