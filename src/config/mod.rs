mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;

/// Load configuration from a TOML file, or a legacy `resolutions.json`
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    let config: Config = if is_json {
        let legacy: LegacyResolutions = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        legacy.into()
    } else {
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?
    };

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./panoforge.toml",
        "./resolutions.json",
        "~/.config/panoforge/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.tiers.is_empty() {
        anyhow::bail!("At least one tier must be configured");
    }

    let mut seen = HashSet::new();
    for tier in &config.tiers {
        if tier.id.is_empty() {
            anyhow::bail!("Tier ids cannot be empty");
        }
        if tier.id.contains(|c: char| c == '/' || c == '\\') || tier.id == "." || tier.id == ".." {
            anyhow::bail!("Tier id '{}' must be a plain directory name", tier.id);
        }
        // Manifest presets are keyed by the lowercased id
        if !seen.insert(tier.id.to_lowercase()) {
            anyhow::bail!("Duplicate tier id '{}' (ids are case-insensitive)", tier.id);
        }
        if tier.width == 0 || tier.height == 0 {
            anyhow::bail!("Tier '{}' has a zero dimension", tier.id);
        }
        if !(1..=100).contains(&tier.quality) {
            anyhow::bail!("Tier '{}' quality {} is outside 1-100", tier.id, tier.quality);
        }
    }

    if config.thumbnail.max_width == 0 || config.thumbnail.max_height == 0 {
        anyhow::bail!("Thumbnail bounding box cannot have a zero dimension");
    }
    if !(1..=100).contains(&config.thumbnail.quality) {
        anyhow::bail!(
            "Thumbnail quality {} is outside 1-100",
            config.thumbnail.quality
        );
    }

    if config.workers == 0 {
        anyhow::bail!("workers must be at least 1");
    }

    if config.tiers.iter().filter(|t| t.default).count() > 1 {
        tracing::warn!("More than one tier is marked default; viewers will use the first");
    }

    Ok(())
}
