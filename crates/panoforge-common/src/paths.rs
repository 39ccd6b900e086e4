//! Path utilities for source discovery and derivative naming.
//!
//! Sources are addressed by `/`-separated paths relative to the library root.
//! Derivatives live under a flat name built from that relative path so every
//! tier directory has the same layout.

use std::path::Path;

/// Extensions accepted as panorama sources.
const SOURCE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Character that replaces path separators and spaces in output names.
pub const JOIN_CHAR: char = '-';

/// Extension of every generated derivative.
pub const DERIVATIVE_EXTENSION: &str = "jpg";

/// Check if a path has a supported source image extension.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use panoforge_common::paths::is_source_image;
///
/// assert!(is_source_image(Path::new("pano.jpeg")));
/// assert!(is_source_image(Path::new("/photos/ROOM.PNG")));
/// assert!(!is_source_image(Path::new("notes.txt")));
/// ```
pub fn is_source_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SOURCE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Convert a relative filesystem path into the `/`-separated form used for
/// identifiers and manifest entries.
pub fn to_slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Check a root-anchored, `/`-separated path against a skip list.
///
/// Matching is a plain substring test against the whole path, so `/cache`
/// skips `A/cache/x` while `_BUILD` skips any path mentioning it.
///
/// # Examples
///
/// ```
/// use panoforge_common::paths::matches_skip_list;
///
/// let skip = vec!["_BUILD".to_string(), "/cache".to_string()];
/// assert!(matches_skip_list("/_BUILD/4K", &skip));
/// assert!(matches_skip_list("/Trips/cache", &skip));
/// assert!(!matches_skip_list("/Trips/cached-old", &["/cache/".to_string()]));
/// assert!(!matches_skip_list("/Trips", &skip));
/// ```
pub fn matches_skip_list(anchored_path: &str, skip: &[String]) -> bool {
    skip.iter()
        .any(|pattern| !pattern.is_empty() && anchored_path.contains(pattern.as_str()))
}

/// Build the flat derivative file name for a source relative path.
///
/// Path separators and spaces become [`JOIN_CHAR`] and the extension is
/// replaced by [`DERIVATIVE_EXTENSION`].
///
/// # Examples
///
/// ```
/// use panoforge_common::paths::flat_output_name;
///
/// assert_eq!(flat_output_name("A/b c.jpg"), "A-b-c.jpg");
/// assert_eq!(flat_output_name("room.png"), "room.jpg");
/// ```
pub fn flat_output_name(relative_path: &str) -> String {
    let stem = match relative_path.rfind('.') {
        Some(dot) if dot > relative_path.rfind('/').map_or(0, |s| s + 1) => {
            &relative_path[..dot]
        }
        _ => relative_path,
    };
    let flat: String = stem
        .chars()
        .map(|c| if c == '/' || c == ' ' { JOIN_CHAR } else { c })
        .collect();
    format!("{}.{}", flat, DERIVATIVE_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_is_source_image() {
        assert!(is_source_image(Path::new("a.jpg")));
        assert!(is_source_image(Path::new("a.JPEG")));
        assert!(is_source_image(Path::new("a.png")));
        assert!(!is_source_image(Path::new("a.gif")));
        assert!(!is_source_image(Path::new("jpg")));
    }

    #[test]
    fn test_to_slash_path() {
        let path: PathBuf = ["A", "b c.jpg"].iter().collect();
        assert_eq!(to_slash_path(&path), "A/b c.jpg");
    }

    #[test]
    fn test_flat_output_name_nested() {
        assert_eq!(flat_output_name("Trips/2024/north cape.jpeg"), "Trips-2024-north-cape.jpg");
    }

    #[test]
    fn test_flat_output_name_dot_in_directory() {
        assert_eq!(flat_output_name("v1.2/room"), "v1.2-room.jpg");
    }

    #[test]
    fn test_flat_output_name_hidden_file() {
        assert_eq!(flat_output_name(".pano"), ".pano.jpg");
    }

    #[test]
    fn test_skip_list_empty_pattern_ignored() {
        assert!(!matches_skip_list("/anything", &[String::new()]));
    }

    #[test]
    fn test_skip_list_substring_of_full_path() {
        let skip = vec!["tiles_diffused".to_string()];
        assert!(matches_skip_list("/Trips/tiles_diffused/level1", &skip));
    }
}
