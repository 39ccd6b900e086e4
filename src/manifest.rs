//! Library manifest.
//!
//! The scheduler returns a flat list of [`ManifestRecord`]s. This module
//! projects that list into the JSON documents viewers load: the nested v3
//! shape grouped by top-level directory, or a flat image list.

use crate::config::{Config, TierSpec};
use crate::scheduler::{DerivativeRecord, ManifestRecord};
use anyhow::{Context, Result};
use panoforge_common::fs::write_atomic;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

pub const MANIFEST_VERSION: &str = "3.0.0";

/// Category for sources directly under the library root.
pub const ROOT_CATEGORY: &str = "Root";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Library {
    #[serde(rename = "_metadata")]
    pub metadata: LibraryMetadata,
    #[serde(rename = "_categories")]
    pub categories: BTreeMap<String, Category>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlatLibrary {
    #[serde(rename = "_metadata")]
    pub metadata: LibraryMetadata,
    pub images: Vec<ImageEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LibraryMetadata {
    pub version: String,
    pub total_images: usize,
    pub total_categories: usize,
    pub image_format: String,
    pub resolution_presets: BTreeMap<String, PresetEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresetEntry {
    pub width: u32,
    pub height: u32,
    pub quality: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bandwidth: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Category {
    pub name: String,
    pub images: Vec<ImageEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageEntry {
    pub id: String,
    pub name: String,
    pub filename: String,
    pub path: String,
    pub thumbnail: Option<ThumbnailEntry>,
    pub resolutions: Vec<ResolutionEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SourceMetadata>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThumbnailEntry {
    pub path: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionEntry {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub path: String,
    pub file_size: u64,
    pub quality: u8,
    pub recommended: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bandwidth: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub default: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMetadata {
    pub original_width: u32,
    pub original_height: u32,
    pub format: Option<String>,
    pub mode: String,
    pub is_panorama: bool,
    pub file_size: u64,
}

/// Builds manifest documents from scheduler records.
#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    tiers: BTreeMap<String, TierSpec>,
    include_metadata: bool,
}

impl ManifestBuilder {
    pub fn new(config: &Config) -> Self {
        Self {
            tiers: config
                .tiers
                .iter()
                .map(|t| (t.id.clone(), t.clone()))
                .collect(),
            include_metadata: config.include_metadata,
        }
    }

    pub fn include_metadata(mut self, include: bool) -> Self {
        self.include_metadata = include;
        self
    }

    /// Nested v3 document, one category per top-level directory.
    pub fn build(&self, records: &[ManifestRecord]) -> Library {
        let mut categories: BTreeMap<String, Category> = BTreeMap::new();
        for record in records {
            let name = category_of(&record.relative_path);
            categories
                .entry(name.to_string())
                .or_insert_with(|| Category {
                    name: name.to_string(),
                    images: Vec::new(),
                })
                .images
                .push(self.entry(record));
        }

        Library {
            metadata: self.metadata(records.len(), categories.len()),
            categories,
        }
    }

    /// Flat document, images in relative-path order.
    pub fn build_flat(&self, records: &[ManifestRecord]) -> FlatLibrary {
        let categories = records
            .iter()
            .map(|r| category_of(&r.relative_path))
            .collect::<std::collections::BTreeSet<_>>()
            .len();
        FlatLibrary {
            metadata: self.metadata(records.len(), categories),
            images: records.iter().map(|r| self.entry(r)).collect(),
        }
    }

    fn metadata(&self, total_images: usize, total_categories: usize) -> LibraryMetadata {
        LibraryMetadata {
            version: MANIFEST_VERSION.to_string(),
            total_images,
            total_categories,
            image_format: panoforge_jpeg::packet::PROJECTION_EQUIRECTANGULAR.to_string(),
            resolution_presets: self
                .tiers
                .values()
                .map(|t| {
                    (
                        t.id.to_lowercase(),
                        PresetEntry {
                            width: t.width,
                            height: t.height,
                            quality: t.quality,
                            label: t.label.clone(),
                            bandwidth: t.bandwidth.clone(),
                        },
                    )
                })
                .collect(),
        }
    }

    fn entry(&self, record: &ManifestRecord) -> ImageEntry {
        let filename = record
            .relative_path
            .rsplit('/')
            .next()
            .unwrap_or(&record.relative_path)
            .to_string();
        let name = match filename.rfind('.') {
            Some(dot) if dot > 0 => filename[..dot].to_string(),
            _ => filename.clone(),
        };

        let source = &record.source;
        let metadata = self.include_metadata.then(|| SourceMetadata {
            original_width: source.width,
            original_height: source.height,
            format: source.format.clone(),
            mode: source.color_mode.clone(),
            is_panorama: source.is_panorama(),
            file_size: source.file_size,
        });

        ImageEntry {
            id: record.content_id.to_string(),
            name,
            filename,
            path: record.relative_path.clone(),
            thumbnail: record.thumbnail.as_ref().map(|t| ThumbnailEntry {
                path: t.path.clone(),
                width: t.width,
                height: t.height,
            }),
            resolutions: record
                .derivatives
                .iter()
                .map(|d| self.resolution(d))
                .collect(),
            metadata,
        }
    }

    fn resolution(&self, derivative: &DerivativeRecord) -> ResolutionEntry {
        let tier = self.tiers.get(&derivative.tier_id);
        ResolutionEntry {
            id: derivative.tier_id.to_lowercase(),
            label: tier.and_then(|t| t.label.clone()),
            width: derivative.width,
            height: derivative.height,
            path: derivative.output_path.clone(),
            file_size: derivative.byte_size,
            quality: tier.map(|t| t.quality).unwrap_or_default(),
            recommended: tier.map(|t| t.recommended.clone()).unwrap_or_default(),
            bandwidth: tier.and_then(|t| t.bandwidth.clone()),
            default: tier.is_some_and(|t| t.default),
        }
    }
}

/// Top-level directory of a relative path, or [`ROOT_CATEGORY`].
pub fn category_of(relative_path: &str) -> &str {
    match relative_path.split_once('/') {
        Some((first, _)) if !first.is_empty() => first,
        _ => ROOT_CATEGORY,
    }
}

/// Serialize `value` and replace `path` atomically.
pub fn write_manifest<T: Serialize>(path: &Path, value: &T, pretty: bool) -> Result<()> {
    let mut bytes = if pretty {
        serde_json::to_vec_pretty(value)
    } else {
        serde_json::to_vec(value)
    }
    .context("Failed to serialize manifest")?;
    bytes.push(b'\n');

    write_atomic(path, &bytes)
        .with_context(|| format!("Failed to write manifest: {}", path.display()))?;
    Ok(())
}
