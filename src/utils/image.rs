//! Image loading helpers.

use crate::core::OcrError;
use crate::core::constants::DEFAULT_PARALLEL_THRESHOLD;
use image::{DynamicImage, RgbImage};
use std::path::Path;

/// Converts any decoded image into 8-bit RGB.
pub fn dynamic_to_rgb(img: DynamicImage) -> RgbImage {
    img.to_rgb8()
}

/// Loads an image from disk as RGB.
///
/// # Errors
///
/// Returns [`OcrError::ImageLoad`] when the file cannot be decoded.
pub fn load_image(path: &Path) -> Result<RgbImage, OcrError> {
    let img = image::open(path)?;
    Ok(dynamic_to_rgb(img))
}

/// Loads a batch of images, in path order; goes parallel above a small
/// threshold.
pub fn load_images_batch<P: AsRef<Path> + Send + Sync>(
    paths: &[P],
) -> Result<Vec<RgbImage>, OcrError> {
    if paths.len() > DEFAULT_PARALLEL_THRESHOLD {
        use rayon::prelude::*;
        paths.par_iter().map(|p| load_image(p.as_ref())).collect()
    } else {
        paths.iter().map(|p| load_image(p.as_ref())).collect()
    }
}
