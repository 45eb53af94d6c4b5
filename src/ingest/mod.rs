//! Turning parsed candidates into stored items.
//!
//! - [`worker`] - per-source import run: newness, categorisation, markup, images, write
//! - [`categorizer`] - whole-word tag scoring against the category snapshot
//! - [`images`] - image candidate probing, selection and the on-disk cache
//! - [`markup`] - HTML to plain text

pub mod categorizer;
pub mod images;
mod markup;
pub mod worker;

pub use categorizer::{Categorizer, CategoryScore, FALLBACK_CATEGORY};
pub use images::{ImageError, ImageProbe, ImageResolver};
pub use markup::strip_markup;
pub use worker::{ImportError, ImportReport, ImportWorker};
