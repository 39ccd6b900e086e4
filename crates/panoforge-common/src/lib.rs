//! Panoforge-Common: Shared identifiers and path utilities.
//!
//! This crate provides functionality used across panoforge:
//!
//! - **Content IDs**: Stable 8-hex-char identifiers derived from a source's relative path
//! - **Path Utilities**: Source image detection, skip-list matching, and output naming
//! - **Filesystem**: Atomic write-then-rename for generated files
//!
//! # Examples
//!
//! ```
//! use panoforge_common::ContentId;
//! use panoforge_common::paths::{flat_output_name, is_source_image};
//! use std::path::Path;
//!
//! let id = ContentId::from_relative_path("A/b c.jpg");
//! assert_eq!(id.as_str().len(), 8);
//!
//! assert!(is_source_image(Path::new("pano.JPG")));
//! assert_eq!(flat_output_name("A/b c.jpg"), "A-b-c.jpg");
//! ```

pub mod fs;
pub mod ids;
pub mod paths;

pub use ids::ContentId;
