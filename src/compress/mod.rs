//! Adaptive image compression
//!
//! Re-encodes an uploaded image at decreasing quality until the output fits
//! a size budget or the quality floor is reached. The routine is a pure
//! transform over the provided bytes: no I/O and no shared state, so
//! concurrent requests can run it independently.

pub mod format;

pub use format::{format_label, select_output_format, supports_quality, DEFAULT_OUTPUT_FORMAT};

use crate::{Error, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use tracing::debug;

pub const DEFAULT_MAX_SIZE_KB: f64 = 50.0;
pub const DEFAULT_INITIAL_QUALITY: u8 = 95;
pub const DEFAULT_QUALITY_STEP: u8 = 5;
pub const DEFAULT_QUALITY_FLOOR: u8 = 10;

const MIN_QUALITY: u8 = 1;
const MAX_QUALITY: u8 = 100;

/// Parameters of the quality loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressionSettings {
    /// Target upper bound on output size, in kilobytes (1 KB = 1024 bytes).
    pub max_size_kb: f64,
    pub initial_quality: u8,
    pub quality_step: u8,
    /// Lowest quality the loop will encode at.
    pub quality_floor: u8,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            max_size_kb: DEFAULT_MAX_SIZE_KB,
            initial_quality: DEFAULT_INITIAL_QUALITY,
            quality_step: DEFAULT_QUALITY_STEP,
            quality_floor: DEFAULT_QUALITY_FLOOR,
        }
    }
}

impl CompressionSettings {
    /// Default quality parameters with the given budget.
    pub fn new(max_size_kb: f64) -> Self {
        Self {
            max_size_kb,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.max_size_kb.is_finite() || self.max_size_kb <= 0.0 {
            return Err(Error::Validation(format!(
                "max size must be a positive number of kilobytes, got {}",
                self.max_size_kb
            )));
        }
        for (name, value) in [
            ("initial quality", self.initial_quality),
            ("quality floor", self.quality_floor),
        ] {
            if !(MIN_QUALITY..=MAX_QUALITY).contains(&value) {
                return Err(Error::Validation(format!(
                    "{} must be between {} and {}, got {}",
                    name, MIN_QUALITY, MAX_QUALITY, value
                )));
            }
        }
        if self.quality_step == 0 {
            return Err(Error::Validation(
                "quality step must be at least 1".to_string(),
            ));
        }
        if self.quality_floor > self.initial_quality {
            return Err(Error::Validation(format!(
                "quality floor {} is above initial quality {}",
                self.quality_floor, self.initial_quality
            )));
        }
        Ok(())
    }

    /// Upper bound on encode attempts: `ceil((initial - floor) / step) + 1`.
    pub fn max_attempts(&self) -> u32 {
        let span = u32::from(self.initial_quality.saturating_sub(self.quality_floor));
        span.div_ceil(u32::from(self.quality_step.max(1))) + 1
    }
}

/// Output of [`compress_with`].
#[derive(Debug, Clone)]
pub struct CompressionResult {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
    pub final_quality: u8,
    pub attempts: u32,
}

impl CompressionResult {
    pub fn size_kb(&self) -> f64 {
        self.bytes.len() as f64 / 1024.0
    }

    pub fn format_label(&self) -> &'static str {
        format_label(self.format)
    }

    pub fn content_type(&self) -> &'static str {
        self.format.to_mime_type()
    }
}

/// Compress with the default quality parameters (95, step 5, floor 10).
pub fn compress(image_bytes: &[u8], max_size_kb: f64) -> Result<CompressionResult> {
    compress_with(image_bytes, &CompressionSettings::new(max_size_kb))
}

/// Re-encode `image_bytes` at decreasing quality until the result fits
/// `settings.max_size_kb` or the floor is reached.
///
/// Missing the budget is not an error: when even the floor quality is too
/// large, the floor-quality encoding is returned. Encoder failures are
/// returned immediately.
pub fn compress_with(
    image_bytes: &[u8],
    settings: &CompressionSettings,
) -> Result<CompressionResult> {
    settings.validate()?;

    let source_format = image::guess_format(image_bytes).ok();
    let decoded = image::load_from_memory(image_bytes).map_err(Error::Decode)?;
    let format = select_output_format(source_format);
    let image = prepare_for(decoded, format);

    // One scratch buffer per invocation, cleared before every attempt.
    let mut buffer = Vec::new();
    let mut quality = settings.initial_quality;
    let mut attempts = 0u32;

    loop {
        buffer.clear();
        encode_into(&image, format, quality, &mut buffer)?;
        attempts += 1;

        let size_kb = buffer.len() as f64 / 1024.0;
        debug!(
            quality,
            size_kb,
            budget_kb = settings.max_size_kb,
            attempts,
            "Encoded compression attempt"
        );

        if size_kb <= settings.max_size_kb || quality <= settings.quality_floor {
            break;
        }
        quality = quality
            .saturating_sub(settings.quality_step)
            .max(settings.quality_floor);
    }

    Ok(CompressionResult {
        bytes: buffer,
        format,
        final_quality: quality,
        attempts,
    })
}

/// Encode `image` once at `quality`.
pub fn encode_at(image: &DynamicImage, format: ImageFormat, quality: u8) -> Result<Vec<u8>> {
    let image = prepare_for(image.clone(), format);
    let mut buffer = Vec::new();
    encode_into(&image, format, quality, &mut buffer)?;
    Ok(buffer)
}

fn encode_into(
    image: &DynamicImage,
    format: ImageFormat,
    quality: u8,
    buffer: &mut Vec<u8>,
) -> Result<()> {
    match format {
        ImageFormat::Jpeg => image
            .write_with_encoder(JpegEncoder::new_with_quality(buffer, quality))
            .map_err(Error::Encode),
        other => image
            .write_to(&mut Cursor::new(buffer), other)
            .map_err(Error::Encode),
    }
}

/// Convert pixel layouts the target encoder rejects. The JPEG encoder only
/// takes 8-bit gray or RGB, so alpha and 16-bit channels are dropped.
fn prepare_for(image: DynamicImage, format: ImageFormat) -> DynamicImage {
    if format != ImageFormat::Jpeg {
        return image;
    }
    match image {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => image,
        DynamicImage::ImageLumaA8(_)
        | DynamicImage::ImageLuma16(_)
        | DynamicImage::ImageLumaA16(_) => DynamicImage::ImageLuma8(image.to_luma8()),
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}
