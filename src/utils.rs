//! Utility functions for output naming and path validation

use crate::error::{Error, Result};
use std::path::{Component, Path};

/// Series name used when the supplied one sanitizes to nothing
pub const FALLBACK_COLLECTION_NAME: &str = "Manga";

/// Chapter name used when the supplied one sanitizes to nothing
pub const FALLBACK_UNIT_NAME: &str = "Chapter";

/// Extension used when neither the transfer nor the page reports a usable type
pub const DEFAULT_EXTENSION: &str = "png";

/// Characters that are not allowed in any output path component
const RESERVED_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Make a name safe to use as a single path component
///
/// Removes reserved characters and control characters, then trims
/// surrounding whitespace. Returns `fallback` when nothing is left.
///
/// # Examples
///
/// ```
/// use chapter_dl::utils::sanitize_component;
///
/// assert_eq!(sanitize_component("Vol. 2: Dawn?", "Chapter"), "Vol. 2 Dawn");
/// assert_eq!(sanitize_component(" /// ", "Chapter"), "Chapter");
/// ```
#[must_use]
pub fn sanitize_component(name: &str, fallback: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !RESERVED_CHARS.contains(c) && !c.is_control())
        .collect();
    let trimmed = cleaned.trim();
    // "." and ".." are valid after stripping but would walk the directory tree
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '.') {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

/// File extension for a MIME type, taken from its subtype
///
/// Parameters and structured-syntax suffixes are dropped (`image/svg+xml`
/// yields `svg`). Returns `None` when no usable subtype remains.
///
/// # Examples
///
/// ```
/// use chapter_dl::utils::extension_from_mime;
///
/// assert_eq!(extension_from_mime("image/webp").as_deref(), Some("webp"));
/// assert_eq!(extension_from_mime("image/jpeg; q=0.9").as_deref(), Some("jpeg"));
/// assert_eq!(extension_from_mime("garbage"), None);
/// ```
#[must_use]
pub fn extension_from_mime(mime: &str) -> Option<String> {
    let essence = mime.split(';').next()?.trim();
    let (_, subtype) = essence.split_once('/')?;
    let subtype = subtype.split('+').next()?.trim().to_ascii_lowercase();
    if subtype.is_empty() || !subtype.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(subtype)
}

/// Pick an extension from a list of MIME candidates, first usable wins
///
/// Falls back to [`DEFAULT_EXTENSION`].
#[must_use]
pub fn resolve_extension<'a>(candidates: impl IntoIterator<Item = Option<&'a str>>) -> String {
    candidates
        .into_iter()
        .flatten()
        .find_map(extension_from_mime)
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

/// Page file name for a 0-based asset index: `NNN.<ext>`, numbered from 1
///
/// # Examples
///
/// ```
/// use chapter_dl::utils::page_file_name;
///
/// assert_eq!(page_file_name(0, "png"), "001.png");
/// assert_eq!(page_file_name(41, "webp"), "042.webp");
/// assert_eq!(page_file_name(1203, "jpeg"), "1204.jpeg");
/// ```
#[must_use]
pub fn page_file_name(index: usize, extension: &str) -> String {
    format!("{:03}.{}", index + 1, extension)
}

/// Reject paths that could escape the output root
///
/// Only plain relative components are accepted: no root, prefix, `.` or `..`.
pub fn ensure_relative(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(Error::InvalidPath {
            path: path.to_path_buf(),
            reason: "path is empty".to_string(),
        });
    }
    for component in path.components() {
        match component {
            Component::Normal(_) => {}
            Component::ParentDir => {
                return Err(Error::InvalidPath {
                    path: path.to_path_buf(),
                    reason: "parent directory components are not allowed".to_string(),
                });
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(Error::InvalidPath {
                    path: path.to_path_buf(),
                    reason: "absolute paths are not allowed".to_string(),
                });
            }
            Component::CurDir => {
                return Err(Error::InvalidPath {
                    path: path.to_path_buf(),
                    reason: "current directory components are not allowed".to_string(),
                });
            }
        }
    }
    Ok(())
}
