//! # inkline
//!
//! A scene-text OCR pipeline over ONNX models: locate every text region in a
//! photo, rectify each region into a horizontal strip, and transcribe it with
//! a confidence score.
//!
//! The neural networks themselves are opaque collaborators behind the
//! [`core::TensorInference`] boundary; this crate implements everything
//! around them:
//!
//! - **Detection post-processing** ([`processors::DbPostProcess`]): binarize
//!   the detector's probability map, score contours, and offset ("unclip")
//!   the shrunk detection boundary back out to the true text extent.
//! - **Rectification** ([`utils::rotate_crop_quad`]): perspective-correct
//!   each quadrilateral into an upright crop, rotating vertical text.
//! - **Orientation correction** ([`pipeline::OrientationClassifier`]): flip
//!   crops the angle classifier marks as upside-down.
//! - **Recognition batching** ([`pipeline::TextRecognizer`]): group crops by
//!   aspect ratio to minimize padding under the fixed-height recognizer, and
//!   restore input order afterwards.
//! - **CTC decoding** ([`processors::CtcDecoder`]): greedy collapse of
//!   per-timestep logits into text plus a mean confidence.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use inkline::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = OcrEngineBuilder::new()
//!     .det_model("models/det.onnx")
//!     .rec_model("models/rec.onnx")
//!     .dict("models/dict.txt")
//!     .build()?;
//!
//! let image = load_image(std::path::Path::new("photo.jpg"))?;
//! for result in engine.ocr(&image)? {
//!     println!("{:.2} {}", result.score, result.text);
//! }
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod pipeline;
pub mod processors;
pub mod utils;

/// The most common imports in one place.
pub mod prelude {
    pub use crate::core::{OcrError, OrtInfer, TensorInference};
    pub use crate::pipeline::{OcrConfig, OcrEngine, OcrEngineBuilder, OcrResult};
    pub use crate::processors::Quadrilateral;
    pub use crate::utils::load_image;
}
