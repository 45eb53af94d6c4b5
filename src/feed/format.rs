use std::fmt;

use super::parser::FeedError;
use super::xml::XmlElement;

/// The feed dialects the ingestion pipeline understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedFormat {
    Rss090,
    Rss091,
    Rss092,
    /// Never produced by detection (RSS 1.0 documents are `rdf:RDF`), but
    /// dispatches to the RSS parser if a source is configured with it.
    Rss10,
    Rss20,
    Atom03,
    Atom10,
    Rdf,
}

impl FeedFormat {
    pub fn is_rss(self) -> bool {
        matches!(
            self,
            Self::Rss090 | Self::Rss091 | Self::Rss092 | Self::Rss10 | Self::Rss20
        )
    }

    pub fn is_atom(self) -> bool {
        matches!(self, Self::Atom03 | Self::Atom10)
    }
}

impl fmt::Display for FeedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Rss090 => "RSS 0.90",
            Self::Rss091 => "RSS 0.91",
            Self::Rss092 => "RSS 0.92",
            Self::Rss10 => "RSS 1.0",
            Self::Rss20 => "RSS 2.0",
            Self::Atom03 => "Atom 0.3",
            Self::Atom10 => "Atom 1.0",
            Self::Rdf => "RDF",
        };
        f.write_str(name)
    }
}

/// Classify a document by its root element and `version` attribute.
///
/// Returns `Ok(None)` when the root is not a feed root at all; the caller
/// skips the source for this cycle. A recognised root carrying a version
/// this pipeline does not know is an error rather than a skip.
///
/// | Root      | `version`                  | Result              |
/// |-----------|----------------------------|---------------------|
/// | `rdf:RDF` | any                        | `Rdf`               |
/// | `rss`     | 0.90 / 0.91 / 0.92 / 2.0   | matching `Rss*`     |
/// | `rss`     | absent                     | `Rss20`             |
/// | `feed`    | 0.3 / 1.0                  | `Atom03` / `Atom10` |
/// | `feed`    | absent                     | `Atom10`            |
/// | other     | any                        | `None`              |
///
/// # Errors
///
/// [`FeedError::Format`] for an `rss` or `feed` root with an unrecognised
/// version value.
pub fn detect_format(root: &XmlElement, feed_url: &str) -> Result<Option<FeedFormat>, FeedError> {
    let root_name = root.name().to_ascii_lowercase();
    let version = root.attr("version").map(str::trim);

    let format = match root_name.as_str() {
        "rdf:rdf" => FeedFormat::Rdf,
        "rss" => match version {
            None => FeedFormat::Rss20,
            Some("0.90") => FeedFormat::Rss090,
            Some("0.91") => FeedFormat::Rss091,
            Some("0.92") => FeedFormat::Rss092,
            Some("2.0") => FeedFormat::Rss20,
            Some(other) => {
                return Err(FeedError::Format {
                    kind: "RSS",
                    url: feed_url.to_owned(),
                    version: other.to_owned(),
                })
            }
        },
        "feed" => match version {
            None | Some("1.0") => FeedFormat::Atom10,
            Some("0.3") => FeedFormat::Atom03,
            Some(other) => {
                return Err(FeedError::Format {
                    kind: "Atom",
                    url: feed_url.to_owned(),
                    version: other.to_owned(),
                })
            }
        },
        _ => {
            tracing::warn!(
                url = %feed_url,
                root = %root.name(),
                "Could not determine feed format, skipping source"
            );
            return Ok(None);
        }
    };

    Ok(Some(format))
}
