use panoforge_jpeg::PacketForm;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Output directory for derivatives, relative to the library root unless absolute
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Manifest file, relative to the library root unless absolute
    #[serde(default = "default_manifest")]
    pub manifest: PathBuf,

    /// Directories whose root-anchored path contains any of these strings are not scanned
    #[serde(default = "default_skip_dirs")]
    pub skip_dirs: Vec<String>,

    #[serde(default)]
    pub packet_form: PacketFormSetting,

    /// Center-crop sources to 2:1 before resizing. Discards pixels on
    /// non-equirectangular sources; every crop is reported.
    #[serde(default = "default_true")]
    pub crop_to_equirectangular: bool,

    /// Include source dimensions/format/mode in the manifest
    #[serde(default = "default_true")]
    pub include_metadata: bool,

    /// Worker threads; each source is processed entirely by one worker
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_tiers")]
    pub tiers: Vec<TierSpec>,

    #[serde(default)]
    pub thumbnail: ThumbnailSpec,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("_BUILD")
}

fn default_manifest() -> PathBuf {
    PathBuf::from("library.json")
}

fn default_skip_dirs() -> Vec<String> {
    ["_BUILD", "/output", "/tiles", "tiles_diffused", "/temp", "/cache"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_true() -> bool {
    true
}

fn default_workers() -> usize {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            manifest: default_manifest(),
            skip_dirs: default_skip_dirs(),
            packet_form: PacketFormSetting::default(),
            crop_to_equirectangular: true,
            include_metadata: true,
            workers: default_workers(),
            tiers: default_tiers(),
            thumbnail: ThumbnailSpec::default(),
        }
    }
}

/// Serialized name of [`PacketForm`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PacketFormSetting {
    #[default]
    Attribute,
    Element,
}

impl From<PacketFormSetting> for PacketForm {
    fn from(setting: PacketFormSetting) -> Self {
        match setting {
            PacketFormSetting::Attribute => PacketForm::Attribute,
            PacketFormSetting::Element => PacketForm::Element,
        }
    }
}

/// A named target resolution/quality.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TierSpec {
    /// Tier id, also the name of the tier's output directory
    pub id: String,

    pub width: u32,

    pub height: u32,

    /// JPEG quality, 1-100
    pub quality: u8,

    #[serde(default)]
    pub label: Option<String>,

    /// Bandwidth class hint for adaptive loading ("low", "medium", "high")
    #[serde(default)]
    pub bandwidth: Option<String>,

    /// Device classes this tier is recommended for
    #[serde(default)]
    pub recommended: Vec<String>,

    /// Tier a viewer should load first
    #[serde(default)]
    pub default: bool,
}

impl TierSpec {
    pub fn new(id: impl Into<String>, width: u32, height: u32, quality: u8) -> Self {
        Self {
            id: id.into(),
            width,
            height,
            quality,
            label: None,
            bandwidth: None,
            recommended: Vec::new(),
            default: false,
        }
    }
}

fn default_tiers() -> Vec<TierSpec> {
    vec![
        TierSpec {
            label: Some("8K Ultra HD".to_string()),
            bandwidth: Some("high".to_string()),
            recommended: vec!["vr-headset".to_string(), "desktop-4k".to_string()],
            ..TierSpec::new("8K", 8192, 4096, 95)
        },
        TierSpec {
            label: Some("4K High Quality".to_string()),
            bandwidth: Some("medium".to_string()),
            recommended: vec!["desktop".to_string(), "tablet".to_string()],
            default: true,
            ..TierSpec::new("4K", 4096, 2048, 90)
        },
        TierSpec {
            label: Some("2K Standard".to_string()),
            bandwidth: Some("low".to_string()),
            recommended: vec!["mobile".to_string(), "slow-connection".to_string()],
            ..TierSpec::new("2K", 2048, 1024, 85)
        },
    ]
}

/// Bounding box for thumbnails; aspect ratio is kept and images are never enlarged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct ThumbnailSpec {
    #[serde(default = "default_thumb_width", alias = "width")]
    pub max_width: u32,

    #[serde(default = "default_thumb_height", alias = "height")]
    pub max_height: u32,

    #[serde(default = "default_thumb_quality")]
    pub quality: u8,
}

fn default_thumb_width() -> u32 {
    512
}

fn default_thumb_height() -> u32 {
    256
}

fn default_thumb_quality() -> u8 {
    80
}

impl Default for ThumbnailSpec {
    fn default() -> Self {
        Self {
            max_width: default_thumb_width(),
            max_height: default_thumb_height(),
            quality: default_thumb_quality(),
        }
    }
}

/// Legacy `resolutions.json` layout: presets keyed by tier id.
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyResolutions {
    #[serde(default)]
    pub presets: Option<BTreeMap<String, LegacyPreset>>,

    #[serde(default)]
    pub thumbnail: Option<ThumbnailSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LegacyPreset {
    pub width: u32,
    pub height: u32,
    pub quality: u8,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub bandwidth: Option<String>,
    #[serde(default)]
    pub recommended: Vec<String>,
    #[serde(default)]
    pub default: bool,
}

impl From<LegacyResolutions> for Config {
    fn from(legacy: LegacyResolutions) -> Self {
        let mut config = Config::default();
        if let Some(presets) = legacy.presets {
            config.tiers = presets
                .into_iter()
                .map(|(id, p)| TierSpec {
                    id,
                    width: p.width,
                    height: p.height,
                    quality: p.quality,
                    label: p.label,
                    bandwidth: p.bandwidth,
                    recommended: p.recommended,
                    default: p.default,
                })
                .collect();
        }
        if let Some(thumbnail) = legacy.thumbnail {
            config.thumbnail = thumbnail;
        }
        config
    }
}
