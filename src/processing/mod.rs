//! Image transform: decode, fit-within resize, re-encode

use std::borrow::Cow;
use std::io::Cursor;
use std::path::Path;
use image::DynamicImage;
use tracing::debug;

use crate::config::{ImageFormat, DEFAULT_QUALITY};
use crate::error::{ErrorContext, Result, ThumbnailError};

pub mod formats;
pub mod resize;

pub use formats::*;
pub use resize::*;

/// Contract the batch scheduler depends on.
///
/// Implementations must be shareable across worker threads. Every error
/// returned here is treated as a per-job failure.
pub trait ImageTransform: Send + Sync {
    /// Produce an encoded thumbnail of `source` fitting `width` x `height`
    fn transform(&self, source: &Path, width: u32, height: u32) -> Result<EncodedImage>;
}

/// Encoded thumbnail ready to be written out
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub source_width: u32,
    pub source_height: u32,
}

/// Production transform backed by the `image` crate
#[derive(Debug, Clone)]
pub struct ImageTransformer {
    resizer: ImageResizer,
    quality: u8,
}

impl ImageTransformer {
    /// Create a transformer with default quality and filter
    pub fn new() -> Self {
        Self {
            resizer: ImageResizer::new(),
            quality: DEFAULT_QUALITY,
        }
    }

    /// Set JPEG quality (1-100)
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }

    /// Set the resampling filter
    pub fn with_filter(mut self, filter: FilterType) -> Self {
        self.resizer = ImageResizer::with_filter(filter);
        self
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Load an image, detecting the codec from its content
    fn load_image(&self, path: &Path) -> Result<DynamicImage> {
        debug!("Loading image: {:?}", path);

        let reader = image::io::Reader::open(path)
            .with_file_context(path.to_path_buf())?
            .with_guessed_format()
            .with_file_context(path.to_path_buf())?;

        // Read failures past this point mean truncated data, not a missing file
        reader
            .decode()
            .map_err(|e| ThumbnailError::decode(e.to_string(), Some(path.to_path_buf())))
    }

    /// Encode an image into memory in the requested format
    fn encode_image(&self, image: &DynamicImage, format: ImageFormat, path: &Path) -> Result<Vec<u8>> {
        let prepared = prepare_for_encoder(image, format);

        let mut bytes = Vec::new();
        prepared
            .write_to(&mut Cursor::new(&mut bytes), output_format(format, self.quality))
            .map_err(|e| ThumbnailError::encode(e.to_string(), Some(path.to_path_buf())))?;

        debug!("Encoded {:?} thumbnail: {} bytes", format, bytes.len());
        Ok(bytes)
    }
}

impl Default for ImageTransformer {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageTransform for ImageTransformer {
    fn transform(&self, source: &Path, width: u32, height: u32) -> Result<EncodedImage> {
        // Format is chosen by extension before paying for a decode
        let format = detect_format_from_path(source)?;

        let image = self.load_image(source)?;
        let (source_width, source_height) = (image.width(), image.height());

        let resized = self
            .resizer
            .fit(&image, width, height)
            .with_file_context(source.to_path_buf())?;

        let bytes = self.encode_image(&resized, format, source)?;

        Ok(EncodedImage {
            bytes,
            format,
            width: resized.width(),
            height: resized.height(),
            source_width,
            source_height,
        })
    }
}

/// Convert pixel layouts the target encoder cannot take
fn prepare_for_encoder(image: &DynamicImage, format: ImageFormat) -> Cow<'_, DynamicImage> {
    match (format, image) {
        (ImageFormat::Jpeg, DynamicImage::ImageRgb8(_) | DynamicImage::ImageLuma8(_)) => Cow::Borrowed(image),
        (ImageFormat::Jpeg, _) => Cow::Owned(DynamicImage::ImageRgb8(image.to_rgb8())),
        (
            ImageFormat::Bmp,
            DynamicImage::ImageRgb8(_)
            | DynamicImage::ImageRgba8(_)
            | DynamicImage::ImageLuma8(_)
            | DynamicImage::ImageLumaA8(_),
        ) => Cow::Borrowed(image),
        (ImageFormat::Bmp, _) => Cow::Owned(DynamicImage::ImageRgba8(image.to_rgba8())),
        _ => Cow::Borrowed(image),
    }
}
