//! Pixel work: probing, cropping, resizing and JPEG encoding.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, ImageDecoder, ImageReader, ImageResult};
use std::path::Path;

/// Header information read without decoding pixel data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbedImage {
    pub width: u32,
    pub height: u32,
    pub format: Option<String>,
    pub color_mode: String,
    pub file_size: u64,
}

/// Read dimensions, format and color layout from the image header.
pub fn probe_source(path: &Path) -> ImageResult<ProbedImage> {
    let file_size = std::fs::metadata(path)?.len();
    let reader = ImageReader::open(path)?.with_guessed_format()?;
    let format = reader.format().map(|f| format!("{:?}", f).to_uppercase());
    let decoder = reader.into_decoder()?;
    let (width, height) = decoder.dimensions();

    Ok(ProbedImage {
        width,
        height,
        format,
        color_mode: color_mode(decoder.color_type()).to_string(),
        file_size,
    })
}

fn color_mode(color: ColorType) -> &'static str {
    match color {
        ColorType::L8 | ColorType::L16 => "L",
        ColorType::La8 | ColorType::La16 => "LA",
        ColorType::Rgb8 | ColorType::Rgb16 | ColorType::Rgb32F => "RGB",
        ColorType::Rgba8 | ColorType::Rgba16 | ColorType::Rgba32F => "RGBA",
        _ => "UNKNOWN",
    }
}

/// Centered 2:1 crop rectangle `(x, y, width, height)`, or `None` when the
/// image is already 2:1 or too small to crop.
pub fn equirect_crop_rect(width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    if width < 2 || height == 0 {
        return None;
    }
    let (cw, ch) = if width > height.saturating_mul(2) {
        (height * 2, height)
    } else {
        let ch = width / 2;
        (ch * 2, ch)
    };
    if (cw, ch) == (width, height) {
        return None;
    }
    Some(((width - cw) / 2, (height - ch) / 2, cw, ch))
}

/// Dimensions after the optional 2:1 crop.
pub fn effective_dimensions(width: u32, height: u32, crop: bool) -> (u32, u32) {
    match crop.then(|| equirect_crop_rect(width, height)).flatten() {
        Some((_, _, cw, ch)) => (cw, ch),
        None => (width, height),
    }
}

/// Scale `(width, height)` down to fit the box, keeping the aspect ratio.
/// Never enlarges.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width == 0 || height == 0 || (width <= max_width && height <= max_height) {
        return (width, height);
    }
    let scale = f64::min(
        max_width as f64 / width as f64,
        max_height as f64 / height as f64,
    );
    let w = ((width as f64 * scale).round() as u32).clamp(1, max_width.max(1));
    let h = ((height as f64 * scale).round() as u32).clamp(1, max_height.max(1));
    (w, h)
}

/// Drop any alpha channel and normalize to 8-bit RGB or grayscale.
pub fn flatten_alpha(img: DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageLuma8(_) => img,
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

/// Resize to exactly `width` x `height`; a no-op when the size already matches.
pub fn resize_to(img: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    if img.width() == width && img.height() == height {
        return img.clone();
    }
    img.resize_exact(width, height, FilterType::Lanczos3)
}

/// Baseline JPEG at the given quality.
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> ImageResult<Vec<u8>> {
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    img.write_with_encoder(encoder)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    #[test]
    fn test_crop_rect_wide() {
        assert_eq!(equirect_crop_rect(3000, 1000), Some((500, 0, 2000, 1000)));
    }

    #[test]
    fn test_crop_rect_tall() {
        assert_eq!(equirect_crop_rect(1000, 1000), Some((0, 250, 1000, 500)));
    }

    #[test]
    fn test_crop_rect_odd_width() {
        assert_eq!(equirect_crop_rect(1001, 600), Some((0, 50, 1000, 500)));
    }

    #[test]
    fn test_crop_rect_already_equirect() {
        assert_eq!(equirect_crop_rect(4096, 2048), None);
        assert_eq!(equirect_crop_rect(1, 1), None);
        assert_eq!(effective_dimensions(4000, 1000, false), (4000, 1000));
        assert_eq!(effective_dimensions(4000, 1000, true), (2000, 1000));
    }

    #[test]
    fn test_fit_within() {
        assert_eq!(fit_within(4096, 2048, 512, 256), (512, 256));
        assert_eq!(fit_within(3000, 1000, 512, 256), (512, 171));
        assert_eq!(fit_within(300, 100, 512, 256), (300, 100));
        assert_eq!(fit_within(10000, 2, 512, 256), (512, 1));
    }

    #[test]
    fn test_flatten_alpha() {
        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 2, Rgba([10, 20, 30, 0])));
        let flat = flatten_alpha(rgba);
        assert_eq!(flat.color(), ColorType::Rgb8);
        assert_eq!(flat.as_rgb8().unwrap().get_pixel(0, 0), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_resize_and_encode() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 32, Rgb([200, 100, 50])));
        let small = resize_to(&img, 16, 8);
        assert_eq!((small.width(), small.height()), (16, 8));

        let jpeg = encode_jpeg(&small, 85).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
    }

    #[test]
    fn test_probe_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pano.png");
        RgbaImage::from_pixel(40, 20, Rgba([1, 2, 3, 255]))
            .save(&path)
            .unwrap();

        let probed = probe_source(&path).unwrap();
        assert_eq!((probed.width, probed.height), (40, 20));
        assert_eq!(probed.format.as_deref(), Some("PNG"));
        assert_eq!(probed.color_mode, "RGBA");
        assert!(probed.file_size > 0);
    }

    #[test]
    fn test_probe_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"not an image").unwrap();
        assert!(probe_source(&path).is_err());
    }
}
