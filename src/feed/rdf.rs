use super::item::CandidateItem;
use super::parser::{
    collect_entries, content_url, parse_date, ChannelDefaults, EntryFields, FeedError, FeedParser,
};
use super::xml::{XmlDocument, XmlElement};
use crate::storage::Source;

/// RDF Site Summary (RSS 1.0): `rdf:RDF/channel` plus sibling `item`s.
pub struct RdfParser;

impl FeedParser for RdfParser {
    fn extract_items(
        &self,
        document: &XmlDocument,
        source: &Source,
    ) -> Result<Vec<CandidateItem>, FeedError> {
        let root = document.root();
        let channel = rss_child(root, "channel").ok_or_else(|| FeedError::Contents {
            node: "channel",
            url: source.feed_url.clone(),
        })?;

        let defaults = ChannelDefaults {
            dates: vec![channel.child_text("dc:date").as_deref().and_then(parse_date)],
            categories: Vec::new(),
        };

        let items = root
            .elements()
            .filter(|el| el.name() == "item" || el.name() == "rss:item");

        Ok(collect_entries(items, source, &defaults, read_entry))
    }
}

fn read_entry(item: &XmlElement) -> Result<EntryFields, FeedError> {
    let required = |name: &'static str| {
        rss_child(item, name)
            .map(|el| el.text().trim().to_owned())
            .ok_or_else(|| FeedError::missing(name))
    };

    let title = required("title")?;
    let link = required("link")?;
    let description = required("description")?;

    Ok(EntryFields {
        title,
        description,
        content_url: Some(content_url(&link)?),
        published: item.child_text("dc:date").as_deref().and_then(parse_date),
        ..EntryFields::default()
    })
}

/// RSS 1.0 vocabulary is usually the default namespace but may carry an
/// explicit `rss:` prefix.
fn rss_child<'a>(el: &'a XmlElement, name: &str) -> Option<&'a XmlElement> {
    el.child(name)
        .or_else(|| el.child(&format!("rss:{name}")))
}
