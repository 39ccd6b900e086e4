//! Source tree walk.

use panoforge_common::paths::{is_source_image, matches_skip_list, to_slash_path};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// A candidate source file found by the walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    /// `/`-separated path relative to the walk root
    pub relative_path: String,
    pub absolute_path: PathBuf,
}

/// Find source images under `root`, in relative-path order.
///
/// A directory is pruned when its root-anchored path (`/A/cache` for
/// `<root>/A/cache`) contains any entry of `skip`, or when it is `exclude`
/// itself, so previous output is never read back as input.
pub fn walk_sources(root: &Path, skip: &[String], exclude: Option<&Path>) -> Vec<SourceEntry> {
    // Compared canonically so `.`-relative roots still match an absolute output dir
    let exclude = exclude.and_then(|ex| ex.canonicalize().ok());
    let is_pruned = |entry: &DirEntry| -> bool {
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            return false;
        }
        if let Some(ex) = &exclude {
            if entry.path() == ex.as_path()
                || entry.path().canonicalize().is_ok_and(|p| p == *ex)
            {
                return true;
            }
        }
        let anchored = match entry.path().strip_prefix(root) {
            Ok(rel) => format!("/{}", to_slash_path(rel)),
            Err(_) => return false,
        };
        let pruned = matches_skip_list(&anchored, skip);
        if pruned {
            debug!("Skipping directory {}", anchored);
        }
        pruned
    };

    let mut entries: Vec<SourceEntry> = WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_pruned(e))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_source_image(e.path()))
        .filter_map(|e| {
            let rel = e.path().strip_prefix(root).ok()?;
            Some(SourceEntry {
                relative_path: to_slash_path(rel),
                absolute_path: e.path().to_path_buf(),
            })
        })
        .collect();

    entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    entries
}
