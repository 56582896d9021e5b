//! Detector-side image resizing.
//!
//! The detector accepts any size whose dimensions are multiples of 32, so the
//! preprocessor caps the longer side at `limit_side_len`, snaps both
//! dimensions to the stride, and remembers the scale factors needed to map
//! detector-space boxes back onto the source image.

use crate::core::constants::{DEFAULT_LIMIT_SIDE_LEN, DETECTION_STRIDE};
use image::{RgbImage, imageops};
use tracing::debug;

/// Scale factors applied by [`DetResize`]; consumed by the detection
/// post-processor to restore source coordinates.
#[derive(Debug, Clone, Copy)]
pub struct ResizeInfo {
    /// `resized_height / source_height`.
    pub ratio_h: f32,
    /// `resized_width / source_width`.
    pub ratio_w: f32,
}

/// Resizes images to a detector-compatible shape.
#[derive(Debug, Clone)]
pub struct DetResize {
    /// Cap applied to the longer image side before stride snapping.
    pub limit_side_len: u32,
}

impl DetResize {
    /// Creates a resizer with the given longer-side cap.
    pub fn new(limit_side_len: u32) -> Self {
        Self { limit_side_len }
    }

    /// Resizes `img` and reports the applied scale factors.
    ///
    /// The longer side is capped at `limit_side_len` (images already within
    /// the cap keep their scale), then both dimensions are rounded to the
    /// nearest multiple of 32 with a floor of 32. Resampling is bilinear.
    pub fn apply(&self, img: &RgbImage) -> (RgbImage, ResizeInfo) {
        let img = self.pad_tiny(img);
        let (src_w, src_h) = img.dimensions();

        let longer = src_h.max(src_w);
        let ratio = if longer > self.limit_side_len {
            self.limit_side_len as f32 / longer as f32
        } else {
            1.0
        };

        let resize_h = snap_to_stride((src_h as f32 * ratio).round() as u32);
        let resize_w = snap_to_stride((src_w as f32 * ratio).round() as u32);

        if resize_h == src_h && resize_w == src_w {
            return (
                img.into_owned(),
                ResizeInfo {
                    ratio_h: 1.0,
                    ratio_w: 1.0,
                },
            );
        }

        debug!(
            "detection resize {}x{} -> {}x{}",
            src_w, src_h, resize_w, resize_h
        );
        let resized = imageops::resize(&*img, resize_w, resize_h, imageops::FilterType::Triangle);
        (
            resized,
            ResizeInfo {
                ratio_h: resize_h as f32 / src_h as f32,
                ratio_w: resize_w as f32 / src_w as f32,
            },
        )
    }

    /// Pads images whose combined dimensions are below 64 pixels onto a black
    /// canvas of at least 32x32. Tiny inputs destabilize the detector.
    fn pad_tiny<'a>(&self, img: &'a RgbImage) -> std::borrow::Cow<'a, RgbImage> {
        let (w, h) = img.dimensions();
        if w + h >= 64 {
            return std::borrow::Cow::Borrowed(img);
        }
        let mut padded = RgbImage::new(w.max(32), h.max(32));
        imageops::overlay(&mut padded, img, 0, 0);
        std::borrow::Cow::Owned(padded)
    }
}

impl Default for DetResize {
    fn default() -> Self {
        Self::new(DEFAULT_LIMIT_SIDE_LEN)
    }
}

/// Rounds to the nearest multiple of the detection stride, never below one
/// stride.
fn snap_to_stride(v: u32) -> u32 {
    ((v + DETECTION_STRIDE / 2) / DETECTION_STRIDE * DETECTION_STRIDE).max(DETECTION_STRIDE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn large_image_is_capped_and_stride_aligned() {
        let img = RgbImage::new(1920, 1080);
        let (resized, info) = DetResize::default().apply(&img);
        let (w, h) = resized.dimensions();
        assert!(w.max(h) <= 960 + DETECTION_STRIDE / 2);
        assert_eq!(w % 32, 0);
        assert_eq!(h % 32, 0);
        assert!((info.ratio_w - w as f32 / 1920.0).abs() < 1e-6);
        assert!((info.ratio_h - h as f32 / 1080.0).abs() < 1e-6);
    }

    #[test]
    fn aligned_image_within_cap_is_untouched() {
        let img = RgbImage::new(960, 544);
        let (resized, info) = DetResize::default().apply(&img);
        assert_eq!(resized.dimensions(), (960, 544));
        assert_eq!(info.ratio_w, 1.0);
        assert_eq!(info.ratio_h, 1.0);
    }

    #[test]
    fn odd_dimensions_snap_to_stride() {
        let img = RgbImage::new(960, 540);
        let (resized, info) = DetResize::default().apply(&img);
        assert_eq!(resized.dimensions(), (960, 544));
        assert!((info.ratio_h - 544.0 / 540.0).abs() < 1e-6);
    }

    #[test]
    fn tiny_image_is_padded_first() {
        let img = RgbImage::new(10, 12);
        let (resized, _) = DetResize::default().apply(&img);
        let (w, h) = resized.dimensions();
        assert!(w >= 32 && h >= 32);
    }
}
