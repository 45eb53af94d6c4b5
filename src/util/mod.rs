//! Utility functions for common operations.
//!
//! This module provides reusable utilities for:
//!
//! - **URL validation**: http(s) parsing and the host policy for outbound image requests
//! - **Text processing**: control-character stripping, entity decoding, whitespace folding
//! - **Media types**: web image mime and extension checks
//! - **Collections**: [`UniqueSet`], a set keyed by a caller-supplied equality predicate

mod media;
mod text;
mod unique_set;
mod url_validator;

pub use media::{
    extension_for_mime, is_image_filename, is_web_image_mime, mime_essence, IMAGE_EXTENSIONS,
};
pub use text::{collapse_whitespace, decode_html_entities, strip_control_chars};
pub use unique_set::UniqueSet;
pub use url_validator::{parse_http_url, validate_url, UrlValidationError};
