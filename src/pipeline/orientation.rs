//! Text line orientation correction.
//!
//! Rectification cannot tell a line from its 180° flip, so crops optionally
//! pass through a tiny two-class classifier (labels `"0"` and `"180"`). Crops
//! classified as upside-down with high confidence are rotated in place.
//! Batching exists purely for inference throughput: batch boundaries are
//! invisible in the output.

use crate::core::constants::ORIENTATION_LABELS;
use crate::core::{OcrError, TensorInference};
use crate::pipeline::config::OcrConfig;
use crate::processors::{NormalizeImage, RecResize};
use image::{RgbImage, imageops};
use tracing::debug;

/// Index of the `"180"` label in the classifier output.
const FLIPPED_CLASS: usize = 1;

/// Batched orientation classification with in-place correction.
pub struct OrientationClassifier {
    engine: Box<dyn TensorInference>,
    resize: RecResize,
    normalize: NormalizeImage,
    input_width: u32,
    batch_size: usize,
    thresh: f32,
}

impl std::fmt::Debug for OrientationClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrientationClassifier")
            .field("batch_size", &self.batch_size)
            .field("thresh", &self.thresh)
            .finish()
    }
}

impl OrientationClassifier {
    /// Wraps an orientation-classification engine with the config's batch
    /// size, input shape, and flip threshold.
    pub fn new(engine: Box<dyn TensorInference>, config: &OcrConfig) -> Self {
        let shape = config.cls_image_shape;
        Self {
            engine,
            resize: RecResize::new(shape, shape[2]),
            normalize: NormalizeImage::centered(),
            input_width: shape[2] as u32,
            batch_size: config.cls_batch_size,
            thresh: config.cls_thresh,
        }
    }

    /// Classifies all crops and rotates confident `"180"` hits by 180°.
    ///
    /// Returns the number of crops flipped.
    ///
    /// # Errors
    ///
    /// Propagates engine failures; fails with
    /// [`OcrError::ShapeMismatch`] when the classifier output is not
    /// `[N, 2]` for a batch of N crops.
    pub fn correct(&self, crops: &mut [RgbImage]) -> Result<usize, OcrError> {
        let mut flipped = 0;

        for chunk in crops.chunks_mut(self.batch_size) {
            let resized: Vec<RgbImage> = chunk
                .iter()
                .map(|crop| self.resize.resize_for_batch(crop, self.input_width))
                .collect();
            let batch = self.normalize.batch_to_tensor(&resized)?;
            let probs = self.engine.infer_2d(&batch)?;

            if probs.shape() != [chunk.len(), ORIENTATION_LABELS.len()] {
                return Err(OcrError::shape_mismatch(
                    "orientation classifier output",
                    (chunk.len(), ORIENTATION_LABELS.len()),
                    probs.shape(),
                ));
            }

            for (i, crop) in chunk.iter_mut().enumerate() {
                let p_upright = probs[[i, 0]];
                let p_flipped = probs[[i, FLIPPED_CLASS]];
                if p_flipped > p_upright && p_flipped > self.thresh {
                    *crop = imageops::rotate180(crop);
                    flipped += 1;
                }
            }
        }

        if flipped > 0 {
            debug!("rotated {flipped} upside-down crops");
        }
        Ok(flipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Tensor2D, Tensor3D, Tensor4D};
    use image::Rgb;

    /// Flags a crop as flipped iff its top-left pixel is bright; confidence
    /// comes from the green channel.
    #[derive(Debug)]
    struct PixelDrivenCls;

    impl TensorInference for PixelDrivenCls {
        fn infer_4d(&self, _x: &Tensor4D) -> Result<Tensor4D, OcrError> {
            Err(OcrError::invalid_input("not a detector"))
        }
        fn infer_3d(&self, _x: &Tensor4D) -> Result<Tensor3D, OcrError> {
            Err(OcrError::invalid_input("not a recognizer"))
        }
        fn infer_2d(&self, x: &Tensor4D) -> Result<Tensor2D, OcrError> {
            let n = x.shape()[0];
            let mut out = Tensor2D::zeros((n, 2));
            for i in 0..n {
                // Centered normalization maps bright pixels above zero.
                let flipped = x[[i, 0, 0, 0]] > 0.0;
                let conf = if x[[i, 1, 0, 0]] > 0.0 { 0.95 } else { 0.5 };
                if flipped {
                    out[[i, 1]] = conf;
                    out[[i, 0]] = 1.0 - conf;
                } else {
                    out[[i, 0]] = conf;
                    out[[i, 1]] = 1.0 - conf;
                }
            }
            Ok(out)
        }
    }

    fn classifier() -> OrientationClassifier {
        OrientationClassifier::new(Box::new(PixelDrivenCls), &OcrConfig::default())
    }

    #[test]
    fn confident_flips_rotate_the_crop() {
        // Bright red+green top-left corner marks "flipped, confident".
        let mut crop = RgbImage::from_pixel(60, 20, Rgb([30, 30, 30]));
        crop.put_pixel(0, 0, Rgb([250, 250, 0]));
        let mut crops = vec![crop];
        let flipped = classifier().correct(&mut crops).unwrap();
        assert_eq!(flipped, 1);
        // After rotation the marker pixel lands in the bottom-right corner.
        assert_eq!(crops[0].get_pixel(59, 19).0[0], 250);
    }

    #[test]
    fn low_confidence_flips_are_ignored() {
        // Red-but-not-green marker: classified flipped with confidence 0.5.
        let mut crop = RgbImage::from_pixel(60, 20, Rgb([30, 30, 30]));
        crop.put_pixel(0, 0, Rgb([250, 0, 0]));
        let mut crops = vec![crop.clone()];
        let flipped = classifier().correct(&mut crops).unwrap();
        assert_eq!(flipped, 0);
        assert_eq!(crops[0], crop);
    }

    #[test]
    fn results_do_not_depend_on_batch_boundaries() {
        let make = |marked: bool| {
            let mut crop = RgbImage::from_pixel(40, 16, Rgb([20, 20, 20]));
            if marked {
                crop.put_pixel(0, 0, Rgb([250, 250, 0]));
            }
            crop
        };
        // 8 crops with batch size 6 spans two batches; 8 with size 3 spans
        // three. Flip pattern must be identical.
        let pattern = [true, false, true, true, false, false, true, false];
        let mut a: Vec<RgbImage> = pattern.iter().map(|&m| make(m)).collect();
        let mut b = a.clone();

        let cfg_a = OcrConfig::default();
        let cfg_b = OcrConfig {
            cls_batch_size: 3,
            ..Default::default()
        };
        OrientationClassifier::new(Box::new(PixelDrivenCls), &cfg_a)
            .correct(&mut a)
            .unwrap();
        OrientationClassifier::new(Box::new(PixelDrivenCls), &cfg_b)
            .correct(&mut b)
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn bad_output_shape_is_a_contract_violation() {
        #[derive(Debug)]
        struct WrongShape;
        impl TensorInference for WrongShape {
            fn infer_4d(&self, _x: &Tensor4D) -> Result<Tensor4D, OcrError> {
                unreachable!()
            }
            fn infer_3d(&self, _x: &Tensor4D) -> Result<Tensor3D, OcrError> {
                unreachable!()
            }
            fn infer_2d(&self, _x: &Tensor4D) -> Result<Tensor2D, OcrError> {
                Ok(Tensor2D::zeros((1, 5)))
            }
        }
        let cls = OrientationClassifier::new(Box::new(WrongShape), &OcrConfig::default());
        let mut crops = vec![RgbImage::new(40, 16)];
        assert!(matches!(
            cls.correct(&mut crops),
            Err(OcrError::ShapeMismatch { .. })
        ));
    }
}
