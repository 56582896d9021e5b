//! Pure image- and tensor-processing building blocks of the pipeline.
//!
//! Everything here is deterministic and engine-free: resizing, normalization,
//! geometry, detection post-processing, and CTC decoding.

pub mod db_postprocess;
pub mod decode;
pub mod geometry;
pub mod normalization;
pub mod resize_detection;
pub mod resize_recognition;
pub mod sorting;

pub use db_postprocess::{DbPostProcess, DetectionCandidate};
pub use decode::{CtcDecoder, TextPrediction};
pub use geometry::{Point, Polygon, Quadrilateral, RotatedRect};
pub use normalization::NormalizeImage;
pub use resize_detection::{DetResize, ResizeInfo};
pub use resize_recognition::RecResize;
pub use sorting::sort_reading_order;
