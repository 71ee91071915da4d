//! Output format policy.
//!
//! The compressor prefers the source format, but only formats whose encoder
//! exposes a quality parameter can take part in the size/quality loop.
//! Everything else (PNG, GIF, BMP, TIFF, and WebP, whose encoder is
//! lossless-only) is re-encoded as JPEG.

use image::ImageFormat;

/// Format used when the source format cannot be detected or has no quality knob.
pub const DEFAULT_OUTPUT_FORMAT: ImageFormat = ImageFormat::Jpeg;

/// Whether the encoder for `format` accepts a lossy quality setting.
pub fn supports_quality(format: ImageFormat) -> bool {
    matches!(format, ImageFormat::Jpeg)
}

/// Pick the encoding used for the compression loop.
pub fn select_output_format(source: Option<ImageFormat>) -> ImageFormat {
    match source {
        Some(format) if supports_quality(format) => format,
        _ => DEFAULT_OUTPUT_FORMAT,
    }
}

/// Short uppercase tag for a format, e.g. "JPEG".
pub fn format_label(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "JPEG",
        ImageFormat::Png => "PNG",
        ImageFormat::Gif => "GIF",
        ImageFormat::Bmp => "BMP",
        ImageFormat::WebP => "WEBP",
        ImageFormat::Tiff => "TIFF",
        ImageFormat::Avif => "AVIF",
        _ => "UNKNOWN",
    }
}
