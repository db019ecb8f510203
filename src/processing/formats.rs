//! Image format detection and handling

use std::path::Path;
use crate::config::ImageFormat;
use crate::error::{Result, ThumbnailError};

/// Extensions the job enumerator and the transform recognize
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif"];

/// Detect image format from file extension
pub fn detect_format_from_path<P: AsRef<Path>>(path: P) -> Result<ImageFormat> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .ok_or_else(|| ThumbnailError::unsupported_format(
            "(none)",
            Some(path.to_path_buf()),
        ))?;

    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
        "png" => Ok(ImageFormat::Png),
        "bmp" => Ok(ImageFormat::Bmp),
        "gif" => Ok(ImageFormat::Gif),
        _ => Err(ThumbnailError::unsupported_format(
            extension,
            Some(path.to_path_buf()),
        )),
    }
}

/// Check if a file extension is recognized, ignoring case
pub fn is_supported_input_format(extension: &str) -> bool {
    SUPPORTED_EXTENSIONS
        .iter()
        .any(|&fmt| fmt.eq_ignore_ascii_case(extension))
}

/// Check if a path carries a recognized image extension
pub fn has_supported_extension<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(is_supported_input_format)
}

/// Encoder selection for the image crate
pub(crate) fn output_format(format: ImageFormat, quality: u8) -> image::ImageOutputFormat {
    match format {
        ImageFormat::Jpeg => image::ImageOutputFormat::Jpeg(quality.clamp(1, 100)),
        ImageFormat::Png => image::ImageOutputFormat::Png,
        ImageFormat::Bmp => image::ImageOutputFormat::Bmp,
        ImageFormat::Gif => image::ImageOutputFormat::Gif,
    }
}
