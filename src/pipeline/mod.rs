//! Pipeline stages and the orchestrating engine.

pub mod config;
pub mod ocr;
pub mod orientation;
pub mod recognition;

pub use config::OcrConfig;
pub use ocr::{OcrEngine, OcrEngineBuilder, OcrResult};
pub use orientation::OrientationClassifier;
pub use recognition::TextRecognizer;
