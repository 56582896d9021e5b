//! The OCR pipeline orchestrator.
//!
//! [`OcrEngine`] owns the loaded inference sessions and the symbol
//! dictionary, and wires the stages together:
//!
//! 1. detection resize + normalization + detector inference
//! 2. DB post-processing into candidates (early return when empty)
//! 3. perspective rectification of each candidate
//! 4. optional orientation correction
//! 5. batched recognition + CTC decoding
//! 6. score filtering into [`OcrResult`]s
//!
//! Every intermediate buffer is scoped to the call; the engine holds no
//! per-image state, so one engine value can serve concurrent calls.

use crate::core::{OcrError, OrtInfer, Tensor2D, TensorInference};
use crate::pipeline::config::OcrConfig;
use crate::pipeline::orientation::OrientationClassifier;
use crate::pipeline::recognition::TextRecognizer;
use crate::processors::{DbPostProcess, DetResize, NormalizeImage, Quadrilateral};
use crate::utils::transform::rotate_crop_quad;
use crate::utils::{dict::read_character_dict, image::load_image};
use image::RgbImage;
use ndarray::Axis;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// One recognized text region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrResult {
    /// Region corners in source-image pixels,
    /// `[top-left, top-right, bottom-right, bottom-left]`.
    pub quad: Quadrilateral,
    /// Recognized text.
    pub text: String,
    /// Recognition confidence in `[0, 1]`, at least the configured
    /// `drop_score`.
    pub score: f32,
}

/// A fully assembled OCR pipeline.
pub struct OcrEngine {
    detector: Box<dyn TensorInference>,
    recognizer: TextRecognizer,
    orientation: Option<OrientationClassifier>,
    det_resize: DetResize,
    det_normalize: NormalizeImage,
    postprocess: DbPostProcess,
    config: OcrConfig,
}

impl std::fmt::Debug for OcrEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OcrEngine")
            .field("orientation", &self.orientation.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl OcrEngine {
    /// Assembles an engine from already-constructed inference engines and
    /// dictionary lines.
    ///
    /// `classifier` is consulted only when `config.use_angle_cls` is set.
    /// This is also the entry point for tests that substitute stub engines.
    ///
    /// # Errors
    ///
    /// Fails when `config` does not validate.
    pub fn from_parts(
        detector: Box<dyn TensorInference>,
        classifier: Option<Box<dyn TensorInference>>,
        recognizer: Box<dyn TensorInference>,
        dict_lines: Vec<String>,
        config: OcrConfig,
    ) -> Result<Self, OcrError> {
        config.validate()?;

        let orientation = if config.use_angle_cls {
            let cls = classifier.ok_or_else(|| {
                OcrError::config("use_angle_cls is set but no classifier engine was provided")
            })?;
            Some(OrientationClassifier::new(cls, &config))
        } else {
            None
        };

        Ok(Self {
            detector,
            recognizer: TextRecognizer::new(recognizer, &dict_lines, &config),
            orientation,
            det_resize: DetResize::new(config.det_limit_side_len),
            det_normalize: NormalizeImage::imagenet(),
            postprocess: DbPostProcess {
                thresh: config.det_db_thresh,
                box_thresh: config.det_db_box_thresh,
                max_candidates: config.det_max_candidates,
                unclip_ratio: config.det_db_unclip_ratio,
                min_size: config.det_min_size,
                use_dilation: config.det_use_dilation,
            },
            config,
        })
    }

    /// The configuration this engine was built with.
    pub fn config(&self) -> &OcrConfig {
        &self.config
    }

    /// Runs the full pipeline over one image.
    ///
    /// Results come back in reading order (top to bottom, left to right
    /// within a row), never in confidence order. An image without text yields
    /// an empty vector without touching the classifier or recognizer.
    ///
    /// # Errors
    ///
    /// Engine failures and tensor-contract violations propagate; degenerate
    /// candidates are dropped silently.
    pub fn ocr(&self, image: &RgbImage) -> Result<Vec<OcrResult>, OcrError> {
        let (resized, scale) = self.det_resize.apply(image);
        let input = self.det_normalize.image_to_tensor(&resized);
        let pred = self.detector.infer_4d(&input)?;
        let map = Self::squeeze_probability_map(pred)?;

        let candidates = self
            .postprocess
            .apply(&map, scale, image.width(), image.height());
        if candidates.is_empty() {
            debug!("no text detected, skipping recognition");
            return Ok(Vec::new());
        }

        // Rectify; a candidate whose geometry collapses is dropped together
        // with its slot so candidates and crops stay 1:1.
        let mut kept = Vec::with_capacity(candidates.len());
        let mut crops = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            match rotate_crop_quad(image, &candidate.quad) {
                Ok(crop) => {
                    kept.push(candidate);
                    crops.push(crop);
                }
                Err(e) if e.is_recoverable() => {
                    debug!("skipping candidate: {e}");
                }
                Err(e) => return Err(e),
            }
        }

        if let Some(orientation) = &self.orientation {
            orientation.correct(&mut crops)?;
        }

        let predictions = self.recognizer.recognize(&crops)?;

        // Defensive truncation: a candidate without a prediction is dropped,
        // not an error.
        let paired = kept.len().min(predictions.len());
        let results: Vec<OcrResult> = kept
            .into_iter()
            .zip(predictions)
            .take(paired)
            .filter(|(_, pred)| pred.score >= self.config.drop_score)
            .map(|(candidate, pred)| OcrResult {
                quad: candidate.quad,
                text: pred.text,
                score: pred.score,
            })
            .collect();

        debug!("ocr produced {} results", results.len());
        Ok(results)
    }

    /// Runs [`OcrEngine::ocr`] over a slice of images, preserving order.
    pub fn ocr_batch(&self, images: &[RgbImage]) -> Result<Vec<Vec<OcrResult>>, OcrError> {
        images.iter().map(|img| self.ocr(img)).collect()
    }

    /// Loads an image from disk and runs the pipeline on it.
    pub fn ocr_file(&self, path: &Path) -> Result<Vec<OcrResult>, OcrError> {
        let image = load_image(path)?;
        self.ocr(&image)
    }

    /// Reduces a detector output of `[1,1,H,W]` to the `[H,W]` probability
    /// map, rejecting any other batch/channel layout.
    fn squeeze_probability_map(pred: crate::core::Tensor4D) -> Result<Tensor2D, OcrError> {
        let shape = pred.shape().to_vec();
        if shape[0] != 1 || shape[1] != 1 {
            return Err(OcrError::shape_mismatch(
                "detector output",
                "[1,1,H,W]",
                &shape,
            ));
        }
        Ok(pred.index_axis(Axis(0), 0).index_axis(Axis(0), 0).to_owned())
    }
}

/// Builder assembling an [`OcrEngine`] from ONNX model files.
#[derive(Debug, Default)]
pub struct OcrEngineBuilder {
    det_model: Option<PathBuf>,
    rec_model: Option<PathBuf>,
    cls_model: Option<PathBuf>,
    dict_path: Option<PathBuf>,
    session_pool_size: usize,
    config: OcrConfig,
}

impl OcrEngineBuilder {
    /// Starts a builder with default configuration.
    pub fn new() -> Self {
        Self {
            session_pool_size: 1,
            ..Default::default()
        }
    }

    /// Path to the detection model.
    pub fn det_model(mut self, path: impl Into<PathBuf>) -> Self {
        self.det_model = Some(path.into());
        self
    }

    /// Path to the recognition model.
    pub fn rec_model(mut self, path: impl Into<PathBuf>) -> Self {
        self.rec_model = Some(path.into());
        self
    }

    /// Path to the orientation classification model; enables `use_angle_cls`.
    pub fn cls_model(mut self, path: impl Into<PathBuf>) -> Self {
        self.cls_model = Some(path.into());
        self.config.use_angle_cls = true;
        self
    }

    /// Path to the recognizer character dictionary.
    pub fn dict(mut self, path: impl Into<PathBuf>) -> Self {
        self.dict_path = Some(path.into());
        self
    }

    /// Number of ONNX sessions per model for concurrent callers.
    pub fn session_pool_size(mut self, size: usize) -> Self {
        self.session_pool_size = size.max(1);
        self
    }

    /// Replaces the pipeline configuration.
    pub fn config(mut self, config: OcrConfig) -> Self {
        self.config = config;
        self
    }

    /// Loads all sessions and the dictionary and assembles the engine.
    ///
    /// # Errors
    ///
    /// Fails when a required path is missing, a model cannot be loaded, or
    /// the configuration does not validate.
    pub fn build(self) -> Result<OcrEngine, OcrError> {
        let det_path = self
            .det_model
            .ok_or_else(|| OcrError::config("detection model path is required"))?;
        let rec_path = self
            .rec_model
            .ok_or_else(|| OcrError::config("recognition model path is required"))?;
        let dict_path = self
            .dict_path
            .ok_or_else(|| OcrError::config("character dictionary path is required"))?;

        let detector = OrtInfer::with_pool(&det_path, None, self.session_pool_size)?;
        let recognizer = OrtInfer::with_pool(&rec_path, None, self.session_pool_size)?;
        let classifier = match &self.cls_model {
            Some(path) => Some(Box::new(OrtInfer::with_pool(
                path,
                None,
                self.session_pool_size,
            )?) as Box<dyn TensorInference>),
            None => None,
        };
        let dict_lines = read_character_dict(&dict_path)?;

        OcrEngine::from_parts(
            Box::new(detector),
            classifier,
            Box::new(recognizer),
            dict_lines,
            self.config,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_requires_model_paths() {
        let err = OcrEngineBuilder::new().build().unwrap_err();
        assert!(matches!(err, OcrError::Config { .. }));
    }

    #[test]
    fn from_parts_validates_config() {
        use crate::core::{Tensor3D, Tensor4D};

        #[derive(Debug)]
        struct Never;
        impl TensorInference for Never {
            fn infer_4d(&self, _x: &Tensor4D) -> Result<Tensor4D, OcrError> {
                unreachable!()
            }
            fn infer_3d(&self, _x: &Tensor4D) -> Result<Tensor3D, OcrError> {
                unreachable!()
            }
            fn infer_2d(&self, _x: &Tensor4D) -> Result<Tensor2D, OcrError> {
                unreachable!()
            }
        }

        let bad = OcrConfig {
            drop_score: 2.0,
            ..Default::default()
        };
        let result = OcrEngine::from_parts(Box::new(Never), None, Box::new(Never), vec![], bad);
        assert!(matches!(result, Err(OcrError::Config { .. })));
    }

    #[test]
    fn angle_cls_without_classifier_is_rejected() {
        use crate::core::{Tensor3D, Tensor4D};

        #[derive(Debug)]
        struct Never;
        impl TensorInference for Never {
            fn infer_4d(&self, _x: &Tensor4D) -> Result<Tensor4D, OcrError> {
                unreachable!()
            }
            fn infer_3d(&self, _x: &Tensor4D) -> Result<Tensor3D, OcrError> {
                unreachable!()
            }
            fn infer_2d(&self, _x: &Tensor4D) -> Result<Tensor2D, OcrError> {
                unreachable!()
            }
        }

        let cfg = OcrConfig {
            use_angle_cls: true,
            ..Default::default()
        };
        let result = OcrEngine::from_parts(Box::new(Never), None, Box::new(Never), vec![], cfg);
        assert!(matches!(result, Err(OcrError::Config { .. })));
    }
}
