//! Core types shared across the pipeline: tensor aliases, errors, constants,
//! and the inference engine boundary.

pub mod constants;
pub mod errors;
pub mod inference;

pub use errors::OcrError;
pub use inference::{OrtInfer, TensorInference};

/// A 2-D float tensor (class probabilities, probability maps).
pub type Tensor2D = ndarray::Array2<f32>;

/// A 3-D float tensor (per-timestep recognizer logits).
pub type Tensor3D = ndarray::Array3<f32>;

/// A 4-D float tensor (batched channel-first images).
pub type Tensor4D = ndarray::Array4<f32>;
