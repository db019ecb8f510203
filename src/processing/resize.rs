//! Fit-within resizing

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, ThumbnailError};

/// Resizer that scales images to fit inside a bounding box
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageResizer {
    filter: FilterType,
}

/// Available resize filters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterType {
    /// Nearest neighbor (fastest, lowest quality)
    Nearest,
    /// Triangle (linear interpolation)
    Triangle,
    /// Catmull-Rom cubic spline
    #[default]
    CatmullRom,
    /// Gaussian blur
    Gaussian,
    /// Lanczos with radius 3 (sharpest, slowest)
    Lanczos3,
}

impl From<FilterType> for image::imageops::FilterType {
    fn from(filter: FilterType) -> Self {
        match filter {
            FilterType::Nearest => image::imageops::FilterType::Nearest,
            FilterType::Triangle => image::imageops::FilterType::Triangle,
            FilterType::CatmullRom => image::imageops::FilterType::CatmullRom,
            FilterType::Gaussian => image::imageops::FilterType::Gaussian,
            FilterType::Lanczos3 => image::imageops::FilterType::Lanczos3,
        }
    }
}

impl ImageResizer {
    /// Create a resizer with the default filter
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a resizer with custom filter
    pub fn with_filter(filter: FilterType) -> Self {
        Self { filter }
    }

    pub fn filter(&self) -> FilterType {
        self.filter
    }

    /// Resize `image` to the largest size that fits `max_width` x `max_height`
    pub fn fit(&self, image: &DynamicImage, max_width: u32, max_height: u32) -> Result<DynamicImage> {
        let (target_width, target_height) =
            fit_dimensions(image.width(), image.height(), max_width, max_height)?;

        debug!(
            "Resizing {}x{} -> {}x{} using {:?}",
            image.width(),
            image.height(),
            target_width,
            target_height,
            self.filter
        );

        if target_width == image.width() && target_height == image.height() {
            return Ok(image.clone());
        }

        Ok(image.resize_exact(target_width, target_height, self.filter.into()))
    }
}

/// Calculate the largest dimensions inside the box that keep the aspect ratio.
///
/// The binding side always equals its box side, so small sources are
/// scaled up and large ones down. Neither side exceeds the box or drops
/// below one pixel.
pub fn fit_dimensions(
    original_width: u32,
    original_height: u32,
    max_width: u32,
    max_height: u32,
) -> Result<(u32, u32)> {
    if max_width == 0 || max_height == 0 {
        return Err(ThumbnailError::config(
            "Width and height must be greater than 0",
        ));
    }
    if original_width == 0 || original_height == 0 {
        return Err(ThumbnailError::decode(
            format!("Image has empty dimensions {}x{}", original_width, original_height),
            None,
        ));
    }

    let scale_x = f64::from(max_width) / f64::from(original_width);
    let scale_y = f64::from(max_height) / f64::from(original_height);

    if scale_x <= scale_y {
        // Width binds
        let height = (f64::from(original_height) * scale_x).round() as u32;
        Ok((max_width, height.clamp(1, max_height)))
    } else {
        // Height binds
        let width = (f64::from(original_width) * scale_y).round() as u32;
        Ok((width.clamp(1, max_width), max_height))
    }
}
