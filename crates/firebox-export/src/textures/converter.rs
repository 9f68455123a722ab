//! Image file encoder
//!
//! JPEG (quality, no alpha) or PNG through the `image` crate.

use crate::textures::{TextureError, TextureResult};
use firebox_core::config::TextureFormat;
use firebox_core::services::{ImageEncodeOptions, ImageEncoder};
use firebox_core::Error;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat as ImgFormat, RgbaImage};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::trace;

/// Writes images to disk
#[derive(Debug, Default)]
pub struct ImageFileEncoder;

impl ImageFileEncoder {
    pub fn new() -> Self {
        Self
    }

    /// Write image to file
    pub fn write_image(&self, img: &RgbaImage, options: &ImageEncodeOptions, output_path: &Path) -> TextureResult<()> {
        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return Err(TextureError::InvalidDimensions { width, height });
        }

        let dynamic_img = DynamicImage::ImageRgba8(img.clone());
        match options.format {
            TextureFormat::Jpg => {
                let mut writer = BufWriter::new(File::create(output_path)?);
                let encoder = JpegEncoder::new_with_quality(&mut writer, options.quality.clamp(1, 100));
                dynamic_img.to_rgb8().write_with_encoder(encoder)?;
                writer.flush()?;
            }
            TextureFormat::Png if options.keep_alpha => {
                dynamic_img.save_with_format(output_path, ImgFormat::Png)?;
            }
            TextureFormat::Png => {
                DynamicImage::ImageRgb8(dynamic_img.to_rgb8()).save_with_format(output_path, ImgFormat::Png)?;
            }
        }
        trace!(path = %output_path.display(), width, height, "wrote image");
        Ok(())
    }
}

impl ImageEncoder for ImageFileEncoder {
    fn encode(&mut self, pixels: &RgbaImage, options: &ImageEncodeOptions, path: &Path) -> firebox_core::Result<()> {
        self.write_image(pixels, options, path)
            .map_err(|e| Error::encoding(path.display().to_string(), e))
    }

    fn copy(&mut self, source: &Path, destination: &Path) -> firebox_core::Result<()> {
        if !source.exists() {
            return Err(Error::encoding(
                destination.display().to_string(),
                format!("source {} does not exist", source.display()),
            ));
        }
        std::fs::copy(source, destination).map_err(|e| Error::encoding(destination.display().to_string(), e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use tempfile::TempDir;

    fn options(format: TextureFormat, keep_alpha: bool) -> ImageEncodeOptions {
        ImageEncodeOptions {
            format,
            quality: 70,
            keep_alpha,
        }
    }

    #[test]
    fn test_png_keeps_alpha_only_when_asked() {
        let dir = TempDir::new().unwrap();
        let img = RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 40]));
        let mut encoder = ImageFileEncoder::new();

        let kept = dir.path().join("kept.png");
        encoder.encode(&img, &options(TextureFormat::Png, true), &kept).unwrap();
        assert_eq!(image::open(&kept).unwrap().to_rgba8().get_pixel(0, 0).0, [10, 20, 30, 40]);

        let opaque = dir.path().join("opaque.png");
        encoder.encode(&img, &options(TextureFormat::Png, false), &opaque).unwrap();
        assert_eq!(image::open(&opaque).unwrap().to_rgba8().get_pixel(0, 0).0[3], 255);
    }

    #[test]
    fn test_jpeg_is_written() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("flat.jpg");
        let img = RgbaImage::from_pixel(8, 8, Rgba([200, 100, 50, 0]));
        ImageFileEncoder::new()
            .encode(&img, &options(TextureFormat::Jpg, false), &path)
            .unwrap();
        let decoded = image::open(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 8));
    }

    #[test]
    fn test_copy_overwrites() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.png");
        let destination = dir.path().join("b.png");
        std::fs::write(&source, b"new").unwrap();
        std::fs::write(&destination, b"old contents").unwrap();

        let mut encoder = ImageFileEncoder::new();
        encoder.copy(&source, &destination).unwrap();
        assert_eq!(std::fs::read(&destination).unwrap(), b"new");

        let err = encoder.copy(&dir.path().join("missing.png"), &destination).unwrap_err();
        assert!(err.is_encoding());
    }

    #[test]
    fn test_empty_image_is_rejected() {
        let dir = TempDir::new().unwrap();
        let err = ImageFileEncoder::new()
            .encode(&RgbaImage::new(0, 0), &options(TextureFormat::Png, false), &dir.path().join("x.png"))
            .unwrap_err();
        assert!(err.is_encoding());
    }
}
