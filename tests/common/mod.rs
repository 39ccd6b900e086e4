//! Shared fixtures for integration tests.

#![allow(dead_code)]

use image::{Rgb, RgbImage, Rgba, RgbaImage};
use panoforge::config::{Config, TierSpec};
use std::path::{Path, PathBuf};

/// Gradient RGB image so encoders have something to compress.
pub fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            128,
        ])
    })
}

fn prepare(root: &Path, relative: &str) -> PathBuf {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    path
}

/// Write an RGB source; the format follows the extension.
pub fn write_source(root: &Path, relative: &str, width: u32, height: u32) -> PathBuf {
    let path = prepare(root, relative);
    gradient(width, height).save(&path).unwrap();
    path
}

/// Write a PNG with a partly transparent alpha channel.
pub fn write_rgba_png(root: &Path, relative: &str, width: u32, height: u32) -> PathBuf {
    let path = prepare(root, relative);
    RgbaImage::from_fn(width, height, |x, _| Rgba([200, 80, 40, (x % 256) as u8]))
        .save(&path)
        .unwrap();
    path
}

/// Write raw bytes under the root.
pub fn write_bytes(root: &Path, relative: &str, bytes: &[u8]) -> PathBuf {
    let path = prepare(root, relative);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Config with two small tiers so tests stay fast.
pub fn small_config() -> Config {
    Config {
        tiers: vec![
            TierSpec {
                default: true,
                ..TierSpec::new("M", 128, 64, 85)
            },
            TierSpec::new("S", 64, 32, 80),
        ],
        ..Config::default()
    }
}
