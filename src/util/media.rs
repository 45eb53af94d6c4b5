//! Image media-type helpers shared by the feed parsers and the image
//! resolver.

/// File extensions treated as web images, lowercase and without the dot.
pub const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "gif", "png", "webp", "bmp"];

/// Normalises a `Content-Type` style value: parameters dropped, trimmed,
/// lowercased.
pub fn mime_essence(mime: &str) -> String {
    mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase()
}

/// Whether a media type is an image format browsers render inline.
///
/// # Examples
///
/// ```
/// use reaper::util::is_web_image_mime;
///
/// assert!(is_web_image_mime("image/jpeg"));
/// assert!(is_web_image_mime("Image/PNG; charset=binary"));
/// assert!(!is_web_image_mime("image/tiff"));
/// assert!(!is_web_image_mime("text/html"));
/// ```
pub fn is_web_image_mime(mime: &str) -> bool {
    extension_for_mime(mime).is_some()
}

/// The file extension (with leading dot) for a web image media type.
pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    let ext = match mime_essence(mime).as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => ".jpg",
        "image/gif" => ".gif",
        "image/png" | "image/x-png" => ".png",
        "image/webp" => ".webp",
        "image/bmp" | "image/x-ms-bmp" => ".bmp",
        _ => return None,
    };
    Some(ext)
}

/// Whether a file name already carries a web image extension.
pub fn is_image_filename(name: &str) -> bool {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => IMAGE_EXTENSIONS
            .iter()
            .any(|known| ext.eq_ignore_ascii_case(known)),
        _ => false,
    }
}
