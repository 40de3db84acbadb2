//! Image compression: bound payload size before upload.
//!
//! Phone photos of statements routinely come in at 12 MP / 5 MB. Vision APIs
//! gain nothing from that resolution and upload latency dominates the run, so
//! every raster input is resized so its longest edge fits `max_dimension`
//! (never upscaled) and re-encoded as JPEG. Non-image inputs such as PDFs are
//! passed through byte for byte.
//!
//! When an extraction attempt times out the orchestrator asks for the next
//! [escalation level](CompressOptions::escalated): a smaller edge and a lower
//! quality, trading legibility for a faster round trip.

use crate::config::ScanConfig;
use crate::error::ImageError;
use crate::model::{CompressedImage, SourceImage};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use tracing::debug;

const MIN_DIMENSION: u32 = 512;
const MIN_QUALITY: u8 = 40;
const QUALITY_STEP: u8 = 15;

/// Target size and quality for one compression pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressOptions {
    pub max_dimension: u32,
    pub quality: u8,
}

impl CompressOptions {
    /// Level-0 options from the config.
    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            max_dimension: config.max_dimension,
            quality: config.jpeg_quality,
        }
    }

    /// Options for escalation `level` (0 = unchanged).
    ///
    /// Each level scales the edge by `step` and drops quality by 15, floored
    /// at 512 px and quality 40.
    pub fn escalated(self, step: f32, level: u32) -> Self {
        if level == 0 {
            return self;
        }
        let scale = step.powi(level as i32);
        let dim = ((self.max_dimension as f32) * scale).round() as u32;
        let drop = QUALITY_STEP.saturating_mul(level.min(u8::MAX as u32) as u8);
        Self {
            max_dimension: dim.max(MIN_DIMENSION).min(self.max_dimension),
            quality: self.quality.saturating_sub(drop).max(MIN_QUALITY).min(self.quality),
        }
    }
}

/// Compress one image on the blocking pool.
///
/// `image` is the 1-indexed batch position used in the error.
pub async fn compress(
    source: &SourceImage,
    options: CompressOptions,
    image: usize,
) -> Result<CompressedImage, ImageError> {
    let source = source.clone();
    tokio::task::spawn_blocking(move || compress_image(&source, options))
        .await
        .map_err(|e| ImageError::Decode {
            image,
            detail: format!("compression task panicked: {e}"),
        })?
        .map_err(|detail| ImageError::Decode { image, detail })
}

/// Blocking implementation: decode, downscale, re-encode.
pub fn compress_image(
    source: &SourceImage,
    options: CompressOptions,
) -> Result<CompressedImage, String> {
    if !source.is_raster() {
        debug!("{}: {} passes through uncompressed", source.name, source.mime_type);
        return Ok(CompressedImage {
            name: source.name.clone(),
            mime_type: source.mime_type.clone(),
            bytes: source.bytes.clone(),
            dimensions: None,
        });
    }

    let img = image::load_from_memory(&source.bytes).map_err(|e| e.to_string())?;
    let img = fit_within(img, options.max_dimension);
    let (width, height) = (img.width(), img.height());

    let mut bytes = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut bytes, options.quality);
    DynamicImage::ImageRgb8(img.to_rgb8())
        .write_with_encoder(encoder)
        .map_err(|e| e.to_string())?;

    debug!(
        "{}: {} → {} bytes at {}x{} q{}",
        source.name,
        source.original_size(),
        bytes.len(),
        width,
        height,
        options.quality
    );

    Ok(CompressedImage {
        name: source.name.clone(),
        mime_type: "image/jpeg".to_string(),
        bytes,
        dimensions: Some((width, height)),
    })
}

/// Scale down proportionally so the longest edge is at most `max_dimension`.
fn fit_within(img: DynamicImage, max_dimension: u32) -> DynamicImage {
    if img.width().max(img.height()) <= max_dimension {
        return img;
    }
    img.resize(max_dimension, max_dimension, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([200, 30, 30])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        buf
    }

    fn opts() -> CompressOptions {
        CompressOptions {
            max_dimension: 1600,
            quality: 80,
        }
    }

    #[test]
    fn large_image_is_scaled_to_bound() {
        let src = SourceImage::new("big.png", "image/png", png_bytes(3200, 1000));
        let out = compress_image(&src, opts()).unwrap();
        assert_eq!(out.dimensions, Some((1600, 500)));
        assert_eq!(out.mime_type, "image/jpeg");
        assert_eq!(out.name, "big.png");
        assert!(out.bytes.starts_with(b"\xFF\xD8\xFF"));
    }

    #[test]
    fn small_image_is_not_upscaled() {
        let src = SourceImage::new("small.png", "image/png", png_bytes(300, 200));
        let out = compress_image(&src, opts()).unwrap();
        assert_eq!(out.dimensions, Some((300, 200)));
    }

    #[test]
    fn pdf_passes_through() {
        let src = SourceImage::new("s.pdf", "application/pdf", b"%PDF-1.4 ...".to_vec());
        let out = compress_image(&src, opts()).unwrap();
        assert_eq!(out.bytes, src.bytes);
        assert_eq!(out.mime_type, "application/pdf");
        assert_eq!(out.dimensions, None);
    }

    #[test]
    fn heic_passes_through() {
        let bytes = b"\0\0\0\x18ftypheic\0\0\0\0".to_vec();
        let src = SourceImage::new("IMG_0042.HEIC", "image/heic", bytes);
        let out = compress_image(&src, opts()).unwrap();
        assert_eq!(out.bytes, src.bytes);
        assert_eq!(out.mime_type, "image/heic");
        assert_eq!(out.dimensions, None);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let src = SourceImage::new("x.jpg", "image/jpeg", b"not an image".to_vec());
        assert!(compress_image(&src, opts()).is_err());
    }

    #[tokio::test]
    async fn async_decode_failure_maps_to_image_error() {
        let src = SourceImage::new("x.jpg", "image/jpeg", b"nope".to_vec());
        let err = compress(&src, opts(), 4).await.unwrap_err();
        assert!(matches!(err, ImageError::Decode { image: 4, .. }));
    }

    #[test]
    fn escalation_shrinks_and_floors() {
        let base = opts();
        assert_eq!(base.escalated(0.75, 0), base);

        let l1 = base.escalated(0.75, 1);
        assert_eq!(l1.max_dimension, 1200);
        assert_eq!(l1.quality, 65);

        let l2 = base.escalated(0.75, 2);
        assert_eq!(l2.max_dimension, 900);
        assert_eq!(l2.quality, 50);

        let l9 = base.escalated(0.75, 9);
        assert_eq!(l9.max_dimension, 512);
        assert_eq!(l9.quality, 40);
    }
}
