//! Feed retrieval and interpretation.
//!
//! - [`xml`] - owned XML tree the parsers navigate
//! - [`format`] - detects the dialect from the document root
//! - [`parser`] - the [`FeedParser`] trait, dispatch and shared fallbacks
//! - `rss`, `atom`, `rdf` - one parser per dialect family
//! - [`fetcher`] - HTTP retrieval with a fixed retry budget and source health tracking

mod atom;
pub mod fetcher;
pub mod format;
mod item;
pub mod parser;
mod rdf;
mod rss;
pub mod xml;

pub use fetcher::{FeedFetcher, FetchError, FAILURE_THRESHOLD, SOURCE_RETRY_LIMIT};
pub use format::{detect_format, FeedFormat};
pub use item::{CandidateItem, FeedData};
pub use parser::{parse_date, parse_source, parser_for, FeedError, FeedParser};
pub use xml::{XmlDocument, XmlElement, XmlError};
