//! Extraction of transferable media links from playlist text.

use percent_encoding::percent_decode_str;
use serde::Serialize;

/// Substrings that mark a line as a media file worth transferring.
const MEDIA_MARKERS: &[&str] = &[".mkv", ".mp4"];

/// Hosts whose links are transferred regardless of extension.
const TRUSTED_HOST_MARKERS: &[&str] = &["seedr"];

const NESTED_PLAYLIST_SUFFIX: &str = ".m3u8";

/// One entry of a pending batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferItem {
    pub url: String,
    pub name: String,
}

impl TransferItem {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let name = display_name(&url);
        Self { url, name }
    }
}

/// Returns the media URLs of `text`, in source order. Duplicates are kept.
pub fn extract_links(text: &str) -> Vec<String> {
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| has_http_scheme(line))
        .filter(|line| !is_nested_playlist(line))
        .filter(|line| is_media_link(line))
        .map(str::to_string)
        .collect()
}

/// Same as [`extract_links`], with display names attached.
pub fn extract_items(text: &str) -> Vec<TransferItem> {
    extract_links(text).into_iter().map(TransferItem::new).collect()
}

/// Last path segment of `url` without its query, percent-decoded.
pub fn display_name(url: &str) -> String {
    let segment = url.rsplit('/').next().unwrap_or(url);
    let segment = segment.split('?').next().unwrap_or(segment);
    let name = percent_decode_str(segment).decode_utf8_lossy().into_owned();
    if name.is_empty() {
        "file.bin".to_string()
    } else {
        name
    }
}

fn has_http_scheme(line: &str) -> bool {
    let lower = line.get(..8).unwrap_or(line).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn is_nested_playlist(line: &str) -> bool {
    let path = line.split(['?', '#']).next().unwrap_or(line);
    path.to_ascii_lowercase().ends_with(NESTED_PLAYLIST_SUFFIX)
}

fn is_media_link(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    MEDIA_MARKERS
        .iter()
        .chain(TRUSTED_HOST_MARKERS)
        .any(|marker| lower.contains(marker))
}
