//! Error types for the OCR pipeline.
//!
//! Errors fall into three behavioral classes, and callers can rely on the
//! distinction:
//!
//! * [`OcrError::Geometry`] — a single detection candidate turned out to be
//!   degenerate (collapsed polygon, unsolvable transform). Recoverable: the
//!   pipeline drops the candidate and moves on.
//! * [`OcrError::ShapeMismatch`] — an inference engine returned a tensor that
//!   violates its declared shape contract. Fatal for the call; propagated.
//! * [`OcrError::Inference`] — the engine itself failed at runtime. Propagated
//!   unretried; retry policy belongs to the caller.

use thiserror::Error;

/// Errors produced by the OCR pipeline.
#[derive(Error, Debug)]
pub enum OcrError {
    /// An image could not be decoded or loaded.
    #[error("image load")]
    ImageLoad(#[from] image::ImageError),

    /// A detection candidate has degenerate geometry.
    ///
    /// Never fatal: the orchestrator skips the candidate that produced it.
    #[error("degenerate geometry: {context}")]
    Geometry {
        /// What made the geometry unusable.
        context: String,
    },

    /// An inference engine output violated the expected tensor shape contract.
    #[error("shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Which call detected the mismatch.
        context: String,
        /// The shape the contract requires.
        expected: String,
        /// The shape the engine actually produced.
        actual: String,
    },

    /// The inference engine failed at runtime.
    #[error("inference failed for {model}: {context}")]
    Inference {
        /// Name of the model whose engine failed.
        model: String,
        /// What the pipeline was doing at the time.
        context: String,
        /// The underlying engine error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Input data that the pipeline cannot work with.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// Description of the problem.
        message: String,
    },

    /// A configuration value is out of range or missing.
    #[error("configuration: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },

    /// Error from the ONNX Runtime session layer.
    #[error(transparent)]
    Session(#[from] ort::Error),

    /// Error from a tensor reshape or view operation.
    #[error("tensor operation")]
    Tensor(#[from] ndarray::ShapeError),

    /// IO error (dictionary or model file access).
    #[error("io")]
    Io(#[from] std::io::Error),
}

impl OcrError {
    /// Creates a recoverable geometry error for a skippable candidate.
    pub fn geometry(context: impl Into<String>) -> Self {
        Self::Geometry {
            context: context.into(),
        }
    }

    /// Creates a shape-mismatch error from expected/actual dimension lists.
    pub fn shape_mismatch(context: &str, expected: impl std::fmt::Debug, actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            context: context.to_string(),
            expected: format!("{expected:?}"),
            actual: format!("{actual:?}"),
        }
    }

    /// Wraps an engine runtime failure with model and call context.
    pub fn inference(
        model: &str,
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Inference {
            model: model.to_string(),
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Creates an invalid-input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether this error only invalidates a single candidate.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Geometry { .. })
    }
}
