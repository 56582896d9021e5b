//! Pixel normalization into channel-first float tensors.

use crate::core::{OcrError, Tensor4D};
use image::RgbImage;

/// Per-channel affine normalization, `value = pixel * alpha + beta` with
/// `alpha = scale / std` and `beta = -mean / std`, laid out channel-first.
#[derive(Debug, Clone)]
pub struct NormalizeImage {
    alpha: [f32; 3],
    beta: [f32; 3],
}

impl NormalizeImage {
    /// Builds a normalizer from scale, per-channel mean, and per-channel std.
    ///
    /// # Errors
    ///
    /// Rejects non-positive scale or std values.
    pub fn new(scale: f32, mean: [f32; 3], std: [f32; 3]) -> Result<Self, OcrError> {
        if scale <= 0.0 {
            return Err(OcrError::config("normalization scale must be positive"));
        }
        for (i, &s) in std.iter().enumerate() {
            if s <= 0.0 {
                return Err(OcrError::config(format!(
                    "normalization std[{i}] must be positive, got {s}"
                )));
            }
        }
        let mut alpha = [0.0; 3];
        let mut beta = [0.0; 3];
        for c in 0..3 {
            alpha[c] = scale / std[c];
            beta[c] = -mean[c] / std[c];
        }
        Ok(Self { alpha, beta })
    }

    /// ImageNet statistics used by the text detector.
    pub fn imagenet() -> Self {
        // Constants are valid, construction cannot fail.
        Self::new(1.0 / 255.0, [0.485, 0.456, 0.406], [0.229, 0.224, 0.225])
            .expect("imagenet normalization constants are valid")
    }

    /// `(pixel/255 - 0.5) / 0.5` normalization used by the recognizer and the
    /// orientation classifier.
    pub fn centered() -> Self {
        Self::new(1.0 / 255.0, [0.5, 0.5, 0.5], [0.5, 0.5, 0.5])
            .expect("centered normalization constants are valid")
    }

    /// Normalizes one image into a CHW float buffer.
    pub fn to_chw(&self, img: &RgbImage) -> Vec<f32> {
        let (w, h) = img.dimensions();
        let (w, h) = (w as usize, h as usize);
        let mut out = vec![0.0f32; 3 * h * w];
        for (y, row) in img.rows().enumerate() {
            for (x, px) in row.enumerate() {
                for c in 0..3 {
                    out[c * h * w + y * w + x] = px.0[c] as f32 * self.alpha[c] + self.beta[c];
                }
            }
        }
        out
    }

    /// Normalizes one image into a `[1,3,H,W]` tensor.
    pub fn image_to_tensor(&self, img: &RgbImage) -> Tensor4D {
        let (w, h) = img.dimensions();
        let data = self.to_chw(img);
        Tensor4D::from_shape_vec((1, 3, h as usize, w as usize), data)
            .expect("chw buffer matches declared shape")
    }

    /// Normalizes a batch of same-sized images into `[N,3,H,W]`.
    ///
    /// # Errors
    ///
    /// All images must share the same dimensions; callers pad beforehand.
    pub fn batch_to_tensor(&self, images: &[RgbImage]) -> Result<Tensor4D, OcrError> {
        let Some(first) = images.first() else {
            return Err(OcrError::invalid_input("empty normalization batch"));
        };
        let (w, h) = first.dimensions();
        let (wu, hu) = (w as usize, h as usize);
        let mut tensor = Tensor4D::zeros((images.len(), 3, hu, wu));

        for (n, img) in images.iter().enumerate() {
            if img.dimensions() != (w, h) {
                return Err(OcrError::invalid_input(format!(
                    "normalization batch mixes sizes: {:?} vs {:?}",
                    img.dimensions(),
                    (w, h)
                )));
            }
            let chw = self.to_chw(img);
            let plane = hu * wu;
            for c in 0..3 {
                for y in 0..hu {
                    for x in 0..wu {
                        tensor[[n, c, y, x]] = chw[c * plane + y * wu + x];
                    }
                }
            }
        }

        Ok(tensor)
    }
}
