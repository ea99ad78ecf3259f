//! Image preprocessing: grayscale + contrast stretch before OCR.
//!
//! Brokerage apps render light-grey text on tinted cards, which Tesseract
//! reads poorly. Dropping colour and stretching the luminance histogram to
//! the full 0–255 range makes glyph edges crisp. The optional upscale and
//! unsharp mask help with the tiny fonts of phone screenshots.
//!
//! Decoding and resampling run on tokio's blocking pool.

use crate::config::PreprocessOptions;
use crate::error::StockscanError;
use crate::pipeline::scratch::ScratchSpace;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageFormat, ImageReader};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Preprocess the scratch area's original upload into its preprocessed path.
///
/// Returns the output dimensions.
pub async fn preprocess(
    scratch: &Arc<ScratchSpace>,
    options: &PreprocessOptions,
) -> Result<(u32, u32), StockscanError> {
    let scratch = Arc::clone(scratch);
    let options = options.clone();

    tokio::task::spawn_blocking(move || {
        preprocess_file(scratch.original(), scratch.preprocessed(), &options)
    })
    .await
    .map_err(|e| StockscanError::Internal(format!("Preprocess task panicked: {}", e)))?
}

/// Blocking implementation: decode `src`, prepare it, write a PNG to `dst`.
///
/// The source format is sniffed from the file contents, so `src` does not
/// need a meaningful extension.
pub fn preprocess_file(
    src: &Path,
    dst: &Path,
    options: &PreprocessOptions,
) -> Result<(u32, u32), StockscanError> {
    let io_failure = |path: &Path, detail: String| StockscanError::IoFailure {
        path: path.to_path_buf(),
        detail,
    };

    let image = ImageReader::open(src)
        .map_err(|e| io_failure(src, format!("cannot open image: {e}")))?
        .with_guessed_format()
        .map_err(|e| io_failure(src, format!("cannot read image: {e}")))?
        .decode()
        .map_err(|e| io_failure(src, format!("cannot decode image: {e}")))?;

    debug!(
        "Decoded upload {}x{} ({:?})",
        image.width(),
        image.height(),
        image.color()
    );

    let prepared = prepare(image, options);
    prepared
        .save_with_format(dst, ImageFormat::Png)
        .map_err(|e| io_failure(dst, format!("cannot write preprocessed image: {e}")))?;

    info!(
        "Image preprocessing completed: {}x{} → {}",
        prepared.width(),
        prepared.height(),
        dst.display()
    );
    Ok(prepared.dimensions())
}

/// Grayscale, optionally upscale and sharpen, then stretch contrast.
pub fn prepare(image: DynamicImage, options: &PreprocessOptions) -> GrayImage {
    let mut image = image.grayscale();

    if options.upscale > 1 {
        let scaled = (
            image.width().checked_mul(options.upscale),
            image.height().checked_mul(options.upscale),
        );
        match scaled {
            (Some(w), Some(h)) => image = image.resize_exact(w, h, FilterType::CatmullRom),
            _ => warn!(
                "Skipping {}x upscale of {}x{} image: dimensions overflow",
                options.upscale,
                image.width(),
                image.height()
            ),
        }
    }

    if options.sharpen {
        image = image.unsharpen(1.0, 2);
    }

    let mut luma = image.into_luma8();
    normalize_contrast(&mut luma, options.clip_percent);
    luma
}

/// Linearly map the `[low, high]` luminance window onto `[0, 255]`.
///
/// `low`/`high` are the values below/above which `clip_percent` percent of
/// pixels fall. Flat images (`high <= low`) are left untouched.
pub fn normalize_contrast(image: &mut GrayImage, clip_percent: f32) {
    let total = u64::from(image.width()) * u64::from(image.height());
    if total == 0 {
        return;
    }

    let mut histogram = [0u64; 256];
    for pixel in image.pixels() {
        histogram[pixel.0[0] as usize] += 1;
    }

    let clip = ((total as f64) * f64::from(clip_percent) / 100.0).floor() as u64;
    let low = lower_bound(&histogram, clip);
    let high = upper_bound(&histogram, clip);
    if high <= low {
        debug!("Contrast window is flat ({low}..={high}); leaving image unchanged");
        return;
    }

    let range = f32::from(high - low);
    for pixel in image.pixels_mut() {
        let v = pixel.0[0].clamp(low, high);
        pixel.0[0] = (f32::from(v - low) * 255.0 / range).round() as u8;
    }
}

fn lower_bound(histogram: &[u64; 256], clip: u64) -> u8 {
    let mut seen = 0;
    for (value, &count) in histogram.iter().enumerate() {
        seen += count;
        if seen > clip {
            return value as u8;
        }
    }
    u8::MAX
}

fn upper_bound(histogram: &[u64; 256], clip: u64) -> u8 {
    let mut seen = 0;
    for (value, &count) in histogram.iter().enumerate().rev() {
        seen += count;
        if seen > clip {
            return value as u8;
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};

    fn gradient(lo: u8, hi: u8) -> GrayImage {
        GrayImage::from_fn(u32::from(hi - lo) + 1, 1, |x, _| Luma([lo + x as u8]))
    }

    #[test]
    fn stretches_narrow_range_to_full_scale() {
        let mut img = gradient(100, 150);
        normalize_contrast(&mut img, 0.0);
        assert_eq!(img.get_pixel(0, 0).0[0], 0);
        assert_eq!(img.get_pixel(img.width() - 1, 0).0[0], 255);
    }

    #[test]
    fn flat_image_is_unchanged() {
        let mut img = GrayImage::from_pixel(4, 4, Luma([77]));
        normalize_contrast(&mut img, 1.0);
        assert!(img.pixels().all(|p| p.0[0] == 77));
    }

    #[test]
    fn clipping_ignores_outliers() {
        // 98 mid-grey pixels between two single extreme outliers.
        let mut img = GrayImage::from_fn(100, 1, |x, _| match x {
            0 => Luma([0]),
            99 => Luma([255]),
            x => Luma([100 + (x % 2) as u8 * 20]),
        });
        normalize_contrast(&mut img, 1.0);
        assert_eq!(img.get_pixel(1, 0).0[0], 255);
        assert_eq!(img.get_pixel(2, 0).0[0], 0);
    }

    #[test]
    fn prepare_grayscales_and_upscales() {
        let rgb = DynamicImage::ImageRgb8(RgbImage::from_fn(3, 2, |x, _| {
            Rgb([x as u8 * 100, 50, 200])
        }));
        let out = prepare(
            rgb,
            &PreprocessOptions {
                upscale: 2,
                sharpen: true,
                ..Default::default()
            },
        );
        assert_eq!(out.dimensions(), (6, 4));
    }

    #[test]
    fn preprocess_file_sniffs_format_and_writes_png() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("upload.bin");
        let dst = dir.path().join("out.png");
        RgbImage::from_fn(8, 8, |x, y| Rgb([(x * 30) as u8, (y * 30) as u8, 90]))
            .save_with_format(&src, ImageFormat::Jpeg)
            .unwrap();

        let dims = preprocess_file(&src, &dst, &PreprocessOptions::default()).unwrap();
        assert_eq!(dims, (8, 8));

        let written = image::open(&dst).unwrap();
        assert!(matches!(written, DynamicImage::ImageLuma8(_)));
    }

    #[test]
    fn undecodable_source_is_io_failure() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("upload.bin");
        std::fs::write(&src, b"definitely not an image").unwrap();
        let err = preprocess_file(&src, &dir.path().join("out.png"), &Default::default())
            .unwrap_err();
        assert!(matches!(err, StockscanError::IoFailure { .. }), "got {err:?}");
    }

    #[test]
    fn missing_source_is_io_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = preprocess_file(
            &dir.path().join("nope.png"),
            &dir.path().join("out.png"),
            &Default::default(),
        )
        .unwrap_err();
        assert!(matches!(err, StockscanError::IoFailure { .. }));
    }

    #[tokio::test]
    async fn preprocess_writes_into_scratch_space() {
        let root = tempfile::tempdir().unwrap();
        let scratch = Arc::new(ScratchSpace::create(root.path()).unwrap());
        GrayImage::from_fn(5, 5, |x, _| Luma([x as u8 * 10]))
            .save_with_format(scratch.original(), ImageFormat::Png)
            .unwrap();

        let dims = preprocess(&scratch, &PreprocessOptions::default()).await.unwrap();
        assert_eq!(dims, (5, 5));
        assert!(scratch.preprocessed().exists());
    }
}
