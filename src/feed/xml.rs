//! A small owned XML tree for feed documents.
//!
//! Feeds are navigated by element path (`rss/channel/item`, `rdf:RDF/item`,
//! `entry/link[@rel]`), so they are read into a tree of elements rather than
//! streamed. Names are kept exactly as they appear in the document,
//! including namespace prefixes, and lookups match on that qualified name.
//!
//! DTD entity declarations are never expanded (quick-xml does not process
//! them), which keeps the reader safe from XXE and entity-expansion attacks.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

/// Maximum element nesting accepted from a feed.
const MAX_XML_DEPTH: usize = 256;

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("XML syntax error at byte {position}: {message}")]
    Syntax { position: u64, message: String },

    #[error("Malformed document: {0}")]
    Malformed(&'static str),

    #[error("Document has no root element")]
    Empty,

    #[error("Element nesting exceeds maximum depth of {0}")]
    TooDeep(usize),
}

#[derive(Debug, Clone, PartialEq)]
enum XmlNode {
    Element(XmlElement),
    Text(String),
}

/// An element with its attributes and children, in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlElement {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<XmlNode>,
}

impl XmlElement {
    /// The qualified name, e.g. `dc:date`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The name without its namespace prefix.
    pub fn local_name(&self) -> &str {
        self.name
            .rsplit_once(':')
            .map_or(self.name.as_str(), |(_, local)| local)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Child elements in document order.
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(el) => Some(el),
            XmlNode::Text(_) => None,
        })
    }

    /// The first child element with the given qualified name.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.elements().find(|el| el.name == name)
    }

    /// All child elements with the given qualified name.
    pub fn children<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.elements().filter(move |el| el.name == name)
    }

    /// Concatenated text and CDATA content of this element and its
    /// descendants, untrimmed.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for node in &self.children {
            match node {
                XmlNode::Text(t) => out.push_str(t),
                XmlNode::Element(el) => el.collect_text(out),
            }
        }
    }

    /// Trimmed text of the first child named `name`, when that child exists.
    ///
    /// An existing but empty child yields `Some("")`.
    pub fn child_text(&self, name: &str) -> Option<String> {
        self.child(name).map(|el| el.text().trim().to_owned())
    }
}

/// A parsed XML document.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlDocument {
    root: XmlElement,
}

impl XmlDocument {
    pub fn root(&self) -> &XmlElement {
        &self.root
    }

    /// Parse a complete document from raw bytes.
    ///
    /// # Errors
    ///
    /// - [`XmlError::Syntax`] for ill-formed markup or mismatched end tags
    /// - [`XmlError::Malformed`] for unclosed elements or several roots
    /// - [`XmlError::Empty`] when no element is present
    /// - [`XmlError::TooDeep`] when nesting exceeds 256 levels
    pub fn parse(bytes: &[u8]) -> Result<Self, XmlError> {
        let mut reader = Reader::from_reader(bytes);
        reader.config_mut().trim_text(false);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => {
                    if stack.len() >= MAX_XML_DEPTH {
                        return Err(XmlError::TooDeep(MAX_XML_DEPTH));
                    }
                    stack.push(element_from(e, &reader));
                }
                Ok(Event::Empty(ref e)) => {
                    let element = element_from(e, &reader);
                    attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::End(_)) => {
                    let element = stack
                        .pop()
                        .ok_or(XmlError::Malformed("unexpected closing tag"))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::Text(ref e)) => {
                    if let Some(parent) = stack.last_mut() {
                        // Undeclared HTML entities are common in feeds; keep them verbatim
                        let text = match e.unescape() {
                            Ok(text) => text.into_owned(),
                            Err(_) => String::from_utf8_lossy(e).into_owned(),
                        };
                        parent.children.push(XmlNode::Text(text));
                    }
                }
                Ok(Event::CData(ref e)) => {
                    if let Some(parent) = stack.last_mut() {
                        parent
                            .children
                            .push(XmlNode::Text(String::from_utf8_lossy(e).into_owned()));
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(XmlError::Syntax {
                        position: reader.error_position(),
                        message: e.to_string(),
                    })
                }
                _ => {}
            }
            buf.clear();
        }

        if !stack.is_empty() {
            return Err(XmlError::Malformed("unclosed element at end of document"));
        }

        root.map(|root| Self { root }).ok_or(XmlError::Empty)
    }
}

impl std::str::FromStr for XmlDocument {
    type Err = XmlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s.as_bytes())
    }
}

fn element_from(start: &BytesStart<'_>, reader: &Reader<&[u8]>) -> XmlElement {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let attributes = start
        .attributes()
        .flatten()
        .map(|attr| {
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = match attr.decode_and_unescape_value(reader.decoder()) {
                Ok(value) => value.into_owned(),
                Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
            };
            (key, value)
        })
        .collect();

    XmlElement {
        name,
        attributes,
        children: Vec::new(),
    }
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(XmlNode::Element(element)),
        None if root.is_some() => return Err(XmlError::Malformed("multiple root elements")),
        None => *root = Some(element),
    }
    Ok(())
}
