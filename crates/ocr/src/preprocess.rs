use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("Failed to load image: {0}")]
    Load(#[from] image::ImageError),
    #[error("Failed to encode processed image: {0}")]
    Encode(String),
}

/// How the grayscale image is split into black and white before OCR.
///
/// Written in config as `"otsu"` or as a fixed level `0..=255`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "ThresholdRepr", into = "ThresholdRepr")]
pub enum Threshold {
    /// Pick the level per image from its histogram.
    #[default]
    Otsu,
    /// Pixels strictly above this level become white.
    Fixed(u8),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ThresholdRepr {
    Level(u8),
    Name(String),
}

impl TryFrom<ThresholdRepr> for Threshold {
    type Error = String;
    fn try_from(repr: ThresholdRepr) -> Result<Self, Self::Error> {
        match repr {
            ThresholdRepr::Level(level) => Ok(Threshold::Fixed(level)),
            ThresholdRepr::Name(name) if name.eq_ignore_ascii_case("otsu") => Ok(Threshold::Otsu),
            ThresholdRepr::Name(other) => Err(format!("Unknown threshold: '{other}'")),
        }
    }
}

impl From<Threshold> for ThresholdRepr {
    fn from(t: Threshold) -> Self {
        match t {
            Threshold::Otsu => ThresholdRepr::Name("otsu".to_string()),
            Threshold::Fixed(level) => ThresholdRepr::Level(level),
        }
    }
}

/// Load an image file, binarize it, and return PNG bytes ready for OCR.
pub fn prepare_for_ocr(path: &Path, threshold: Threshold) -> Result<Vec<u8>, PreprocessError> {
    let img = image::open(path)?;
    encode_as_png(normalize(img, threshold))
}

/// Process raw image bytes (JPEG / PNG / WEBP / …) and return binarized PNG bytes.
pub fn prepare_for_ocr_from_bytes(
    data: &[u8],
    threshold: Threshold,
) -> Result<Vec<u8>, PreprocessError> {
    let img = image::load_from_memory(data)?;
    encode_as_png(normalize(img, threshold))
}

/// Grayscale + binary threshold.
fn normalize(img: DynamicImage, threshold: Threshold) -> DynamicImage {
    // Down-scale if the image is very large (Tesseract works best at 300 DPI / ~2000 px).
    let img = if img.width() > 2800 || img.height() > 2800 {
        img.resize(2800, 2800, image::imageops::FilterType::Lanczos3)
    } else {
        img
    };

    let gray: GrayImage = img.to_luma8();

    let (min_px, max_px) = gray
        .pixels()
        .fold((255u8, 0u8), |(mn, mx), p| (mn.min(p[0]), mx.max(p[0])));

    if max_px == min_px {
        // Uniform image — nothing to separate.
        return DynamicImage::ImageLuma8(gray);
    }

    let level = match threshold {
        Threshold::Otsu => otsu_level(&gray),
        Threshold::Fixed(level) => level,
    };

    DynamicImage::ImageLuma8(binarize(&gray, level))
}

/// Otsu's method: the level that maximizes the between-class variance of the
/// dark (`<= level`) and light (`> level`) pixel populations.
pub fn otsu_level(gray: &GrayImage) -> u8 {
    let mut hist = [0u64; 256];
    for p in gray.pixels() {
        hist[p[0] as usize] += 1;
    }

    let total: u64 = hist.iter().sum();
    let sum_all: f64 = hist.iter().enumerate().map(|(i, &n)| i as f64 * n as f64).sum();

    let mut weight_bg = 0u64;
    let mut sum_bg = 0.0f64;
    let mut best_level = 0u8;
    let mut best_variance = 0.0f64;

    for (level, &count) in hist.iter().enumerate() {
        weight_bg += count;
        if weight_bg == 0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0 {
            break;
        }
        sum_bg += level as f64 * count as f64;

        let mean_bg = sum_bg / weight_bg as f64;
        let mean_fg = (sum_all - sum_bg) / weight_fg as f64;
        let variance = weight_bg as f64 * weight_fg as f64 * (mean_bg - mean_fg).powi(2);

        if variance > best_variance {
            best_variance = variance;
            best_level = level as u8;
        }
    }

    best_level
}

fn binarize(gray: &GrayImage, level: u8) -> GrayImage {
    ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
        let p = gray.get_pixel(x, y)[0];
        Luma([if p > level { 255 } else { 0 }])
    })
}

fn encode_as_png(img: DynamicImage) -> Result<Vec<u8>, PreprocessError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| PreprocessError::Encode(e.to_string()))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, ImageBuffer, Luma, Rgb, RgbImage};

    fn solid_gray(width: u32, height: u32, value: u8) -> DynamicImage {
        let img: GrayImage = ImageBuffer::from_fn(width, height, |_, _| Luma([value]));
        DynamicImage::ImageLuma8(img)
    }

    fn gradient_gray(width: u32, height: u32) -> DynamicImage {
        let img: GrayImage = ImageBuffer::from_fn(width, height, |x, _| {
            Luma([(x * 255 / width) as u8])
        });
        DynamicImage::ImageLuma8(img)
    }

    /// Left half dark ink, right half light paper.
    fn two_tone(dark: u8, light: u8) -> GrayImage {
        ImageBuffer::from_fn(20, 4, |x, _| Luma([if x < 10 { dark } else { light }]))
    }

    #[test]
    fn normalize_uniform_image_returns_same() {
        let img = solid_gray(10, 10, 128);
        let result = normalize(img, Threshold::Otsu).to_luma8();
        assert_eq!(result.dimensions(), (10, 10));
        assert!(result.pixels().all(|p| p[0] == 128));
    }

    #[test]
    fn normalize_gradient_is_two_level() {
        let result = normalize(gradient_gray(256, 1), Threshold::Otsu).to_luma8();
        assert!(result.pixels().all(|p| p[0] == 0 || p[0] == 255));
        assert!(result.pixels().any(|p| p[0] == 0));
        assert!(result.pixels().any(|p| p[0] == 255));
    }

    #[test]
    fn normalize_converts_color_to_gray() {
        let rgb: RgbImage = ImageBuffer::from_fn(8, 8, |x, _| {
            if x < 4 { Rgb([10, 20, 30]) } else { Rgb([240, 230, 220]) }
        });
        let result = normalize(DynamicImage::ImageRgb8(rgb), Threshold::Otsu);
        assert!(matches!(result, DynamicImage::ImageLuma8(_)));
        let gray = result.to_luma8();
        assert_eq!(gray.get_pixel(0, 0)[0], 0);
        assert_eq!(gray.get_pixel(7, 0)[0], 255);
    }

    #[test]
    fn otsu_splits_bimodal_histogram() {
        let img = two_tone(50, 200);
        let level = otsu_level(&img);
        assert!((50..200).contains(&level), "level was {level}");
        let bin = binarize(&img, level);
        assert_eq!(bin.get_pixel(0, 0)[0], 0);
        assert_eq!(bin.get_pixel(19, 0)[0], 255);
    }

    #[test]
    fn fixed_threshold_is_strictly_above() {
        let img = DynamicImage::ImageLuma8(two_tone(100, 101));
        let result = normalize(img, Threshold::Fixed(100)).to_luma8();
        assert_eq!(result.get_pixel(0, 0)[0], 0);
        assert_eq!(result.get_pixel(19, 0)[0], 255);
    }

    #[test]
    fn prepare_from_bytes_produces_png_header() {
        let img = DynamicImage::ImageLuma8(two_tone(30, 220));
        let mut jpeg_bytes = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut jpeg_bytes), image::ImageFormat::Jpeg)
            .unwrap();
        let result = prepare_for_ocr_from_bytes(&jpeg_bytes, Threshold::Otsu).unwrap();
        // PNG magic bytes: 0x89 0x50 0x4E 0x47
        assert_eq!(&result[..4], b"\x89PNG");
    }

    #[test]
    fn prepare_from_bytes_rejects_garbage() {
        let err = prepare_for_ocr_from_bytes(b"definitely not an image", Threshold::Otsu);
        assert!(matches!(err, Err(PreprocessError::Load(_))));
    }

    #[test]
    fn prepare_from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("receipt.png");
        DynamicImage::ImageLuma8(two_tone(30, 220)).save(&path).unwrap();
        let result = prepare_for_ocr(&path, Threshold::Fixed(128)).unwrap();
        assert_eq!(&result[..4], b"\x89PNG");
    }

    #[test]
    fn large_image_is_resized() {
        let img: GrayImage = ImageBuffer::from_fn(3000, 3000, |_, _| Luma([200u8]));
        let result = normalize(DynamicImage::ImageLuma8(img), Threshold::Otsu);
        assert!(result.width() <= 2800 && result.height() <= 2800);
    }

    #[test]
    fn threshold_reads_name_or_level() {
        #[derive(Deserialize)]
        struct Wrap {
            threshold: Threshold,
        }
        let w: Wrap = toml::from_str(r#"threshold = "otsu""#).unwrap();
        assert_eq!(w.threshold, Threshold::Otsu);
        let w: Wrap = toml::from_str("threshold = 140").unwrap();
        assert_eq!(w.threshold, Threshold::Fixed(140));
        assert!(toml::from_str::<Wrap>(r#"threshold = "adaptive""#).is_err());
    }
}
