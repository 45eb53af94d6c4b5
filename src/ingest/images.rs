use chrono::{DateTime, Datelike, Utc};
use futures::StreamExt;
use regex::Regex;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::Config;
use crate::feed::CandidateItem;
use crate::util::{
    extension_for_mime, is_image_filename, is_web_image_mime, mime_essence, validate_url,
    UniqueSet, UrlValidationError,
};

/// Full download budget for the winning image.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(10);

const MAX_IMAGE_SIZE: usize = 20 * 1024 * 1024; // 20MB
const MAX_STEM_LEN: usize = 100;
const MAX_NAME_ATTEMPTS: u32 = 10_000;

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Errors that can occur when probing or downloading an image.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    HttpStatus(u16),

    #[error("Request timed out")]
    Timeout,

    #[error("URL not allowed: {0}")]
    Blocked(#[from] UrlValidationError),

    #[error("Unacceptable image: {length:?} bytes of \"{mime}\"")]
    Unacceptable { length: Option<u64>, mime: String },

    #[error("Image exceeds {0} bytes")]
    TooLarge(usize),
}

/// What a header-only request said about a candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageProbe {
    pub url: Url,
    pub content_length: Option<u64>,
    pub mime: String,
}

/// Finds, downloads and caches a representative image for an item.
#[derive(Clone)]
pub struct ImageResolver {
    client: reqwest::Client,
    cache_root: PathBuf,
    minimum_size: u64,
    probe_timeout: Duration,
    allow_private_hosts: bool,
}

impl ImageResolver {
    pub fn new(client: reqwest::Client, cache_root: PathBuf, minimum_size: u64) -> Self {
        Self {
            client,
            cache_root,
            minimum_size,
            probe_timeout: Duration::from_secs(10),
            allow_private_hosts: false,
        }
    }

    pub fn from_config(client: reqwest::Client, config: &Config) -> Self {
        Self {
            probe_timeout: config.probe_timeout(),
            allow_private_hosts: config.allow_private_hosts,
            ..Self::new(
                client,
                config.media_cache_path.clone(),
                config.minimum_image_size_bytes,
            )
        }
    }

    pub fn with_private_hosts(mut self, allow: bool) -> Self {
        self.allow_private_hosts = allow;
        self
    }

    /// Declared images first, then URLs mined from the raw description,
    /// without duplicates.
    pub fn candidate_urls(item: &CandidateItem, raw_description: &str) -> Vec<Url> {
        let mut urls = UniqueSet::new(|a: &Url, b: &Url| a == b);
        urls.extend(item.feed_data.image_urls.iter().cloned());
        urls.extend(find_image_urls(raw_description));
        urls.into_vec()
    }

    /// Large enough and a web image type.
    pub fn is_acceptable(&self, content_length: Option<u64>, mime: &str) -> bool {
        content_length.is_some_and(|len| len > self.minimum_size) && is_web_image_mime(mime)
    }

    /// The acceptable probe with the greatest content length; the earliest
    /// wins a tie.
    pub fn select_best(&self, probes: impl IntoIterator<Item = ImageProbe>) -> Option<ImageProbe> {
        let mut best: Option<ImageProbe> = None;
        for probe in probes {
            if !self.is_acceptable(probe.content_length, &probe.mime) {
                continue;
            }
            let larger = best
                .as_ref()
                .map_or(true, |b| probe.content_length > b.content_length);
            if larger {
                best = Some(probe);
            }
        }
        best
    }

    /// Issue a HEAD request and read the advertised length and type.
    pub async fn probe(&self, url: &Url) -> Result<ImageProbe, ImageError> {
        validate_url(url, self.allow_private_hosts)?;

        let response = tokio::time::timeout(self.probe_timeout, self.client.head(url.as_str()).send())
            .await
            .map_err(|_| ImageError::Timeout)??;

        if !response.status().is_success() {
            return Err(ImageError::HttpStatus(response.status().as_u16()));
        }

        Ok(ImageProbe {
            url: url.clone(),
            content_length: header_length(&response),
            mime: header_mime(&response),
        })
    }

    /// Probe every candidate in order and pick the best acceptable one.
    pub async fn best_candidate(&self, candidates: &[Url]) -> Option<ImageProbe> {
        let mut probes = Vec::with_capacity(candidates.len());
        for url in candidates {
            match self.probe(url).await {
                Ok(probe) => probes.push(probe),
                Err(e) => tracing::debug!(url = %url, error = %e, "Image probe failed"),
            }
        }
        self.select_best(probes)
    }

    /// Download `url` into the date partition for `import_time` and return
    /// the stored file name.
    pub async fn download(&self, url: &Url, import_time: DateTime<Utc>) -> Result<String, ImageError> {
        validate_url(url, self.allow_private_hosts)?;

        let body = tokio::time::timeout(DOWNLOAD_TIMEOUT, async {
            let response = self.client.get(url.as_str()).send().await?;
            if !response.status().is_success() {
                return Err(ImageError::HttpStatus(response.status().as_u16()));
            }
            let mime = header_mime(&response);
            let bytes = read_limited_bytes(response, MAX_IMAGE_SIZE).await?;
            Ok((mime, bytes))
        })
        .await
        .map_err(|_| ImageError::Timeout)?;
        let (mime, bytes) = body?;

        let length = Some(bytes.len() as u64);
        if !self.is_acceptable(length, &mime) {
            return Err(ImageError::Unacceptable { length, mime });
        }

        let dir = partition_dir(&self.cache_root, import_time);
        tokio::fs::create_dir_all(&dir).await?;

        let base = image_base_name(url, &mime);

        // Write a private temp file, then link it under the first free name
        let tmp_path = dir.join(format!(
            ".{}.tmp.{}.{}",
            base,
            std::process::id(),
            TEMP_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        tokio::fs::write(&tmp_path, &bytes).await?;

        let claimed = claim_filename(&dir, &base, &tmp_path).await;
        let _ = tokio::fs::remove_file(&tmp_path).await;
        let filename = claimed?;

        tracing::debug!(
            url = %url,
            path = %dir.join(&filename).display(),
            bytes = bytes.len(),
            "Saved image"
        );
        Ok(filename)
    }

    /// Attach the best available image to `item`.
    ///
    /// Never fails: probe and download problems are logged at debug level
    /// and leave the item without an image.
    pub async fn resolve(&self, item: &mut CandidateItem, raw_description: &str) {
        let candidates = Self::candidate_urls(item, raw_description);
        if candidates.is_empty() {
            return;
        }

        let Some(best) = self.best_candidate(&candidates).await else {
            tracing::debug!(
                url = %item.content_url,
                candidates = candidates.len(),
                "No acceptable image candidate"
            );
            return;
        };

        match self.download(&best.url, item.import_time).await {
            Ok(filename) => item.image_filename = Some(filename),
            Err(e) => {
                tracing::debug!(image = %best.url, error = %e, "Image download failed");
            }
        }
    }
}

fn header_length(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

fn header_mime(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(mime_essence)
        .unwrap_or_default()
}

async fn read_limited_bytes(response: reqwest::Response, limit: usize) -> Result<Vec<u8>, ImageError> {
    if header_length(&response).is_some_and(|len| len > limit as u64) {
        return Err(ImageError::TooLarge(limit));
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(ImageError::TooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

fn image_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)https?://[^\s"'<>()?#]+\.(?:jpe?g|gif|png|webp|bmp)\b(?:[?#][^\s"'<>]*)?"#)
            .expect("image URL pattern is valid")
    })
}

/// Absolute image URLs mentioned anywhere in `text`, in order of first
/// appearance. The path must end in an image extension; a query string or
/// fragment after it is kept.
pub fn find_image_urls(text: &str) -> Vec<Url> {
    let mut urls = UniqueSet::new(|a: &Url, b: &Url| a == b);
    urls.extend(
        image_url_regex()
            .find_iter(text)
            .filter_map(|m| Url::parse(m.as_str()).ok()),
    );
    urls.into_vec()
}

/// `<root>/i/<year>/<month>/<day>`, without zero padding.
pub fn partition_dir(root: &Path, at: DateTime<Utc>) -> PathBuf {
    root.join("i")
        .join(at.year().to_string())
        .join(at.month().to_string())
        .join(at.day().to_string())
}

/// Choose a file name for an image downloaded from `url` that is safe on
/// disk and not yet taken in `dir`.
///
/// The last path segment is used when it already looks like an image file.
/// Otherwise its alphanumeric characters form the stem and the extension
/// comes from the media type.
pub fn resolve_image_filename(dir: &Path, url: &Url, mime: &str) -> String {
    let base = image_base_name(url, mime);
    let found = numbered_names(&base)
        .take(MAX_NAME_ATTEMPTS as usize)
        .find(|candidate| !dir.join(candidate).exists());
    found.unwrap_or(base)
}

fn image_base_name(url: &Url, mime: &str) -> String {
    let page = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .unwrap_or("");

    let base = if is_image_filename(page) {
        page.to_owned()
    } else {
        let stem: String = page.chars().filter(char::is_ascii_alphanumeric).collect();
        let stem = if stem.is_empty() { "image".to_owned() } else { stem };
        format!("{}{}", stem, extension_for_mime(mime).unwrap_or(".img"))
    };

    safe_filename(&base)
}

fn safe_filename(name: &str) -> String {
    let mapped: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let trimmed = mapped.trim_start_matches(['.', '-']);

    let (stem, ext) = match trimmed.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (trimmed, None),
    };
    let stem: String = stem.chars().take(MAX_STEM_LEN).collect();
    let stem = if stem.is_empty() { "image".to_owned() } else { stem };

    match ext {
        Some(ext) => format!("{}.{}", stem, ext),
        None => stem,
    }
}

/// `name`, then `stem-1.ext`, `stem-2.ext`, ...
fn numbered_names(name: &str) -> impl Iterator<Item = String> + '_ {
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) => (stem, format!(".{}", ext)),
        None => (name, String::new()),
    };
    std::iter::once(name.to_owned()).chain((1u32..).map(move |n| format!("{}-{}{}", stem, n, ext)))
}

/// Hard-link `tmp_path` under the first name in `dir` that nobody holds.
///
/// Creating the link fails when the target exists, so concurrent downloads
/// of same-named images each end up with their own file.
async fn claim_filename(dir: &Path, base: &str, tmp_path: &Path) -> Result<String, ImageError> {
    for candidate in numbered_names(base).take(MAX_NAME_ATTEMPTS as usize) {
        match tokio::fs::hard_link(tmp_path, dir.join(&candidate)).await {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        format!("no free file name for {}", base),
    )
    .into())
}
