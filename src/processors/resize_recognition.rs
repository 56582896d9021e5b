//! Crop resizing for the fixed-height recognizer and orientation classifier.
//!
//! Both models take a fixed input height; width is the free dimension. A crop
//! is scaled to the model height, its width follows its own aspect ratio up
//! to the batch's common width, and the remainder is padded with black on the
//! right so every crop in a batch shares one tensor shape.

use image::{RgbImage, imageops};

/// Aspect-preserving resize-and-pad for a fixed-height model input.
#[derive(Debug, Clone)]
pub struct RecResize {
    /// Model input height.
    pub input_height: u32,
    /// Model base input width; sets the floor for the batch aspect ratio.
    pub input_width: u32,
    /// Hard cap on the padded batch width.
    pub max_width: u32,
}

impl RecResize {
    /// Creates a resizer from a `[channels, height, width]` model shape and a
    /// width cap.
    pub fn new(input_shape: [usize; 3], max_width: usize) -> Self {
        Self {
            input_height: input_shape[1] as u32,
            input_width: input_shape[2] as u32,
            max_width: max_width as u32,
        }
    }

    /// The width/height ratio of the model's base input shape.
    ///
    /// Batches never go narrower than this, matching the recognizer's
    /// training-time geometry.
    pub fn base_ratio(&self) -> f32 {
        self.input_width as f32 / self.input_height as f32
    }

    /// Common padded width for a batch whose widest aspect ratio is
    /// `max_wh_ratio`.
    pub fn batch_width(&self, max_wh_ratio: f32) -> u32 {
        let w = (self.input_height as f32 * max_wh_ratio).ceil() as u32;
        w.clamp(1, self.max_width)
    }

    /// Resizes `img` to the model height, capping width at `batch_width`, and
    /// pads the right edge with black up to `batch_width`.
    pub fn resize_for_batch(&self, img: &RgbImage, batch_width: u32) -> RgbImage {
        let (w, h) = img.dimensions();
        let ratio = w as f32 / h.max(1) as f32;
        let resized_w = ((self.input_height as f32 * ratio).ceil() as u32).clamp(1, batch_width);

        let resized = imageops::resize(
            img,
            resized_w,
            self.input_height,
            imageops::FilterType::Triangle,
        );
        if resized_w == batch_width {
            return resized;
        }

        let mut padded = RgbImage::new(batch_width, self.input_height);
        imageops::overlay(&mut padded, &resized, 0, 0);
        padded
    }
}
