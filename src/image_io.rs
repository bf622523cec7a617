//! Image file I/O
//!
//! Loads files as normalized 3-channel RGB float images and writes restored
//! images back as 8-bit files in the format implied by the extension.

use image::{DynamicImage, RgbImage};
use ndarray::Array3;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::pipeline::Image;

/// File extensions accepted as input (lowercase)
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff"];

/// Image I/O error types
#[derive(Debug, Error)]
pub enum ImageIoError {
    #[error("Image not found: {0}")]
    ImageNotFound(PathBuf),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Failed to save image: {0}")]
    SaveFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ImageIoError>;

/// Is `path` a supported image by extension (case-insensitive)?
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Load an image file as RGB with samples in [0, 1].
///
/// Grayscale inputs are replicated to three channels and alpha is dropped.
pub fn load_image_rgb(path: &Path) -> Result<Image> {
    if !path.exists() {
        return Err(ImageIoError::ImageNotFound(path.to_path_buf()));
    }

    let img = image::open(path).map_err(|e| ImageIoError::InvalidImage(e.to_string()))?;
    from_dynamic(&img)
}

/// Convert a decoded image to a normalized RGB float image
pub fn from_dynamic(img: &DynamicImage) -> Result<Image> {
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();
    let data = Array3::from_shape_fn((height as usize, width as usize, 3), |(r, c, k)| {
        rgb.get_pixel(c as u32, r as u32).0[k] as f32 / 255.0
    });
    Image::new(data).map_err(|e| ImageIoError::InvalidImage(e.to_string()))
}

/// Convert a float image to 8-bit RGB.
///
/// Samples are clamped to [0, 1], scaled by 255 and truncated. Single-channel
/// images are replicated; channels past the third are ignored.
pub fn to_rgb8(image: &Image) -> RgbImage {
    let data = image.data();
    let channels = image.channels();
    RgbImage::from_fn(image.width() as u32, image.height() as u32, |x, y| {
        let sample = |k: usize| {
            let v = data[[y as usize, x as usize, k.min(channels - 1)]];
            (v.clamp(0.0, 1.0) * 255.0) as u8
        };
        image::Rgb([sample(0), sample(1), sample(2)])
    })
}

/// Save a float image; the format follows the file extension.
pub fn save_image(path: &Path, image: &Image) -> Result<()> {
    to_rgb8(image)
        .save(path)
        .map_err(|e| ImageIoError::SaveFailed(format!("{}: {}", path.display(), e)))
}
