use async_trait::async_trait;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ImageFormat, ImageReader};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use super::format::FormatTag;
use crate::config::ConversionConfig;

/// Failure of a single format conversion
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("image codec error: {0}")]
    Codec(#[from] image::ImageError),

    #[error("{format} encoder failed: {reason}")]
    Encoder { format: FormatTag, reason: String },

    #[error("{0} encoder produced no output")]
    EmptyOutput(FormatTag),

    #[error("encode timed out after {0:?}")]
    Timeout(Duration),

    #[error("encode task aborted: {0}")]
    Aborted(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Turns a source image into bytes of one target format.
///
/// Implementations must not touch the filesystem apart from reading
/// `source`; the orchestrator owns where and how results are written.
#[async_trait]
pub trait FormatEncoder: Send + Sync {
    async fn encode(&self, source: &Path, format: FormatTag) -> Result<Bytes, EncodeError>;
}

/// Encoder backed by the `image` crate, with `ravif` for AVIF
#[derive(Debug, Clone, Copy)]
pub struct ImageEncoder {
    jpeg_quality: u8,
    avif_quality: u8,
    avif_speed: u8,
}

impl ImageEncoder {
    pub fn new(jpeg_quality: u8, avif_quality: u8, avif_speed: u8) -> Self {
        Self {
            jpeg_quality,
            avif_quality,
            avif_speed,
        }
    }

    pub fn from_config(config: &ConversionConfig) -> Self {
        Self::new(config.jpeg_quality, config.avif_quality, config.avif_speed)
    }

    fn encode_blocking(&self, source: &Path, format: FormatTag) -> Result<Bytes, EncodeError> {
        let img = ImageReader::open(source)?.with_guessed_format()?.decode()?;

        match format {
            FormatTag::Jpeg => self.encode_jpeg(&img),
            FormatTag::Png => encode_png(&img),
            FormatTag::Webp => encode_webp(&img),
            FormatTag::Avif => self.encode_avif(&img),
        }
    }

    fn encode_jpeg(&self, img: &DynamicImage) -> Result<Bytes, EncodeError> {
        // JPEG has no alpha channel
        let rgb = DynamicImage::ImageRgb8(img.to_rgb8());

        let mut out = Vec::new();
        rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, self.jpeg_quality))?;
        Ok(Bytes::from(out))
    }

    fn encode_avif(&self, img: &DynamicImage) -> Result<Bytes, EncodeError> {
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();

        let pixels: Vec<rgb::RGBA8> = rgba
            .as_raw()
            .chunks_exact(4)
            .map(|px| rgb::RGBA8::new(px[0], px[1], px[2], px[3]))
            .collect();

        let encoded = ravif::Encoder::new()
            .with_quality(self.avif_quality as f32)
            .with_speed(self.avif_speed)
            .encode_rgba(ravif::Img::new(pixels.as_slice(), width as usize, height as usize))
            .map_err(|e| EncodeError::Encoder {
                format: FormatTag::Avif,
                reason: e.to_string(),
            })?;

        Ok(Bytes::from(encoded.avif_file))
    }
}

impl Default for ImageEncoder {
    fn default() -> Self {
        Self::from_config(&ConversionConfig::default())
    }
}

fn encode_png(img: &DynamicImage) -> Result<Bytes, EncodeError> {
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)?;
    Ok(Bytes::from(out))
}

fn encode_webp(img: &DynamicImage) -> Result<Bytes, EncodeError> {
    // The WebP encoder only takes 8-bit RGB(A)
    let img = if img.color().has_alpha() {
        DynamicImage::ImageRgba8(img.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(img.to_rgb8())
    };

    let mut out = Vec::new();
    img.write_with_encoder(WebPEncoder::new_lossless(&mut out))?;
    Ok(Bytes::from(out))
}

#[async_trait]
impl FormatEncoder for ImageEncoder {
    async fn encode(&self, source: &Path, format: FormatTag) -> Result<Bytes, EncodeError> {
        let encoder = *self;
        let source: PathBuf = source.to_path_buf();

        tokio::task::spawn_blocking(move || encoder.encode_blocking(&source, format))
            .await
            .map_err(|e| EncodeError::Aborted(e.to_string()))?
    }
}
