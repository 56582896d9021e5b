//! Batched text recognition with aspect-ratio ordering.
//!
//! The recognizer runs at a fixed height, so a batch's padded width is set by
//! its widest crop. Sorting each batch by aspect ratio keeps similar widths
//! together and minimizes wasted padding. The sort is an internal detail: an
//! index map restores the caller's order before results are returned, so
//! `predictions[i]` always corresponds to `crops[i]`.

use crate::core::{OcrError, TensorInference};
use crate::pipeline::config::OcrConfig;
use crate::processors::{CtcDecoder, NormalizeImage, RecResize, TextPrediction};
use image::RgbImage;
use tracing::debug;

/// Batched fixed-height text recognition.
pub struct TextRecognizer {
    engine: Box<dyn TensorInference>,
    resize: RecResize,
    normalize: NormalizeImage,
    decoder: CtcDecoder,
    batch_size: usize,
}

impl std::fmt::Debug for TextRecognizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextRecognizer")
            .field("batch_size", &self.batch_size)
            .field("classes", &self.decoder.symbol_count())
            .finish()
    }
}

impl TextRecognizer {
    /// Wraps a recognition engine with the config's batch geometry and the
    /// decoder built from `dict_lines`.
    pub fn new(engine: Box<dyn TensorInference>, dict_lines: &[String], config: &OcrConfig) -> Self {
        Self {
            engine,
            resize: RecResize::new(config.rec_image_shape, config.rec_max_width),
            normalize: NormalizeImage::centered(),
            decoder: CtcDecoder::new(dict_lines),
            batch_size: config.rec_batch_size,
        }
    }

    /// Recognizes every crop; `result[i]` corresponds to `crops[i]`.
    ///
    /// # Errors
    ///
    /// Propagates engine failures and output-shape contract violations.
    pub fn recognize(&self, crops: &[RgbImage]) -> Result<Vec<TextPrediction>, OcrError> {
        let mut results = vec![TextPrediction::default(); crops.len()];
        let ratio = |i: usize| {
            let (w, h) = crops[i].dimensions();
            w as f32 / h.max(1) as f32
        };

        for batch_start in (0..crops.len()).step_by(self.batch_size) {
            let batch_end = (batch_start + self.batch_size).min(crops.len());

            // Aspect-ascending processing order; undone after decoding.
            let mut order: Vec<usize> = (batch_start..batch_end).collect();
            order.sort_by(|&a, &b| {
                ratio(a)
                    .partial_cmp(&ratio(b))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

            let max_ratio = order
                .iter()
                .map(|&i| ratio(i))
                .fold(self.resize.base_ratio(), f32::max);
            let width = self.resize.batch_width(max_ratio);

            let images: Vec<RgbImage> = order
                .iter()
                .map(|&i| self.resize.resize_for_batch(&crops[i], width))
                .collect();
            let batch = self.normalize.batch_to_tensor(&images)?;
            let logits = self.engine.infer_3d(&batch)?;

            if logits.shape()[0] != order.len() {
                return Err(OcrError::shape_mismatch(
                    "recognizer output batch",
                    (order.len(),),
                    &logits.shape()[..1],
                ));
            }

            let decoded = self.decoder.apply(&logits);
            debug!(
                "recognition batch of {} crops, width {}",
                order.len(),
                width
            );
            for (slot, &original) in order.iter().enumerate() {
                results[original] = decoded[slot].clone();
            }
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Tensor2D, Tensor3D, Tensor4D};
    use image::Rgb;

    /// Echoes each batch row's identity: reads the (constant) gray level of
    /// the crop, which encodes the digit the test expects back.
    #[derive(Debug)]
    struct EchoRecognizer;

    impl TensorInference for EchoRecognizer {
        fn infer_4d(&self, _x: &Tensor4D) -> Result<Tensor4D, OcrError> {
            Err(OcrError::invalid_input("not a detector"))
        }
        fn infer_2d(&self, _x: &Tensor4D) -> Result<Tensor2D, OcrError> {
            Err(OcrError::invalid_input("not a classifier"))
        }
        fn infer_3d(&self, x: &Tensor4D) -> Result<Tensor3D, OcrError> {
            let n = x.shape()[0];
            // 12 classes: blank + digits 0..=9 + space.
            let mut out = Tensor3D::from_elem((n, 2, 12), 0.01);
            for i in 0..n {
                // Invert centered normalization at the top-left pixel.
                let gray = (x[[i, 0, 0, 0]] * 0.5 + 0.5) * 255.0;
                let digit = (gray / 20.0).round() as usize;
                out[[i, 0, digit.clamp(0, 9) + 1]] = 0.9;
                out[[i, 1, 0]] = 0.9;
            }
            Ok(out)
        }
    }

    fn digit_dict() -> Vec<String> {
        (0..10).map(|d| d.to_string()).collect()
    }

    /// Crop whose gray level encodes `digit` and whose width varies.
    fn crop_for(digit: u32, width: u32) -> RgbImage {
        let g = (digit * 20) as u8;
        RgbImage::from_pixel(width, 32, Rgb([g, g, g]))
    }

    #[test]
    fn order_is_restored_across_batches() {
        // Widths chosen so every batch's internal aspect sort differs from
        // the input order.
        let widths = [400, 40, 250, 90, 330, 60, 500, 20, 150];
        let crops: Vec<RgbImage> = widths
            .iter()
            .enumerate()
            .map(|(i, &w)| crop_for(i as u32, w))
            .collect();

        let rec = TextRecognizer::new(Box::new(EchoRecognizer), &digit_dict(), &OcrConfig::default());
        let out = rec.recognize(&crops).unwrap();
        assert_eq!(out.len(), crops.len());
        for (i, pred) in out.iter().enumerate() {
            assert_eq!(pred.text, i.to_string(), "crop {i} was reordered");
            assert!((pred.score - 0.9).abs() < 1e-5);
        }
    }

    #[test]
    fn batch_size_does_not_change_results() {
        let crops: Vec<RgbImage> = (0..7).map(|i| crop_for(i, 30 + i * 57)).collect();
        let a = TextRecognizer::new(Box::new(EchoRecognizer), &digit_dict(), &OcrConfig::default())
            .recognize(&crops)
            .unwrap();
        let cfg = OcrConfig {
            rec_batch_size: 2,
            ..Default::default()
        };
        let b = TextRecognizer::new(Box::new(EchoRecognizer), &digit_dict(), &cfg)
            .recognize(&crops)
            .unwrap();
        let texts_a: Vec<&str> = a.iter().map(|p| p.text.as_str()).collect();
        let texts_b: Vec<&str> = b.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts_a, texts_b);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let rec = TextRecognizer::new(Box::new(EchoRecognizer), &digit_dict(), &OcrConfig::default());
        assert!(rec.recognize(&[]).unwrap().is_empty());
    }

    #[test]
    fn batch_count_mismatch_is_a_contract_violation() {
        #[derive(Debug)]
        struct ShortBatch;
        impl TensorInference for ShortBatch {
            fn infer_4d(&self, _x: &Tensor4D) -> Result<Tensor4D, OcrError> {
                unreachable!()
            }
            fn infer_2d(&self, _x: &Tensor4D) -> Result<Tensor2D, OcrError> {
                unreachable!()
            }
            fn infer_3d(&self, _x: &Tensor4D) -> Result<Tensor3D, OcrError> {
                Ok(Tensor3D::zeros((1, 4, 12)))
            }
        }
        let rec = TextRecognizer::new(Box::new(ShortBatch), &digit_dict(), &OcrConfig::default());
        let crops = vec![RgbImage::new(40, 16), RgbImage::new(50, 16)];
        assert!(matches!(
            rec.recognize(&crops),
            Err(OcrError::ShapeMismatch { .. })
        ));
    }
}
