//! The neural-network execution boundary.
//!
//! Everything the pipeline knows about its models is captured by the
//! [`TensorInference`] trait: a float tensor goes in, a float tensor of the
//! model-declared rank comes out. The production implementation is
//! [`OrtInfer`], which wraps a small pool of ONNX Runtime sessions; tests
//! substitute stub implementations.
//!
//! Shape contracts (enforced here, violations surface as
//! [`OcrError::ShapeMismatch`]):
//!
//! * detector: `[1,3,H,W] -> [1,1,H,W]` (a `[1,H,W]` output is accepted and
//!   promoted to four dimensions)
//! * orientation classifier: `[N,3,clsH,clsW] -> [N,2]`
//! * recognizer: `[N,3,recH,recW] -> [N,T,numClasses]`

use crate::core::errors::OcrError;
use crate::core::{Tensor2D, Tensor3D, Tensor4D};
use ndarray::{ArrayView2, ArrayView3, ArrayView4};
use ort::logging::LogLevel;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A synchronous `run(tensor) -> tensor` inference engine.
///
/// One method per output rank the pipeline consumes. Implementations must be
/// safe to call from multiple threads ([`OrtInfer`] serializes access to each
/// pooled session internally).
pub trait TensorInference: std::fmt::Debug + Send + Sync {
    /// Runs the model and returns a 4-D output (detector probability map).
    fn infer_4d(&self, x: &Tensor4D) -> Result<Tensor4D, OcrError>;

    /// Runs the model and returns a 3-D output (recognizer logits).
    fn infer_3d(&self, x: &Tensor4D) -> Result<Tensor3D, OcrError>;

    /// Runs the model and returns a 2-D output (classifier probabilities).
    fn infer_2d(&self, x: &Tensor4D) -> Result<Tensor2D, OcrError>;
}

/// ONNX Runtime inference engine with a round-robin session pool.
pub struct OrtInfer {
    sessions: Vec<Mutex<Session>>,
    next_idx: AtomicUsize,
    input_name: String,
    output_name: Option<String>,
    model_name: String,
}

impl std::fmt::Debug for OrtInfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrtInfer")
            .field("sessions", &self.sessions.len())
            .field("input_name", &self.input_name)
            .field("output_name", &self.output_name)
            .field("model_name", &self.model_name)
            .finish()
    }
}

impl OrtInfer {
    /// Loads a model into a single session.
    ///
    /// `input_name` defaults to `"x"`, the conventional input of the detection
    /// and recognition models this pipeline targets.
    pub fn new(model_path: impl AsRef<Path>, input_name: Option<&str>) -> Result<Self, OcrError> {
        Self::with_pool(model_path, input_name, 1)
    }

    /// Loads a model into a pool of `pool_size` sessions.
    ///
    /// Each session is guarded by its own mutex and picked round-robin, so
    /// concurrent `ocr()` calls can overlap inference without external
    /// serialization.
    pub fn with_pool(
        model_path: impl AsRef<Path>,
        input_name: Option<&str>,
        pool_size: usize,
    ) -> Result<Self, OcrError> {
        let path = model_path.as_ref();
        let pool_size = pool_size.max(1);
        let mut sessions = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            let session = Session::builder()?
                .with_log_level(LogLevel::Error)?
                .commit_from_file(path)
                .map_err(|e| {
                    OcrError::inference(
                        path.file_stem().and_then(|s| s.to_str()).unwrap_or("model"),
                        format!("failed to create ONNX session from '{}'", path.display()),
                        e,
                    )
                })?;
            sessions.push(Mutex::new(session));
        }

        let model_name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown_model")
            .to_string();

        Ok(Self {
            sessions,
            next_idx: AtomicUsize::new(0),
            input_name: input_name.unwrap_or("x").to_string(),
            output_name: None,
            model_name,
        })
    }

    /// Returns the model name derived from the file stem.
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Resolves the output tensor name, discovering it from the session if it
    /// was not set explicitly.
    fn output_name(&self) -> Result<String, OcrError> {
        if let Some(ref name) = self.output_name {
            return Ok(name.clone());
        }
        let session = self.sessions[0]
            .lock()
            .map_err(|_| OcrError::invalid_input("failed to acquire session lock"))?;
        session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| OcrError::invalid_input("model declares no outputs"))
    }

    /// Runs a forward pass and hands the raw output shape and data to
    /// `processor` while the session lock is still held.
    fn run_with<T>(
        &self,
        x: &Tensor4D,
        processor: impl FnOnce(&[i64], &[f32]) -> Result<T, OcrError>,
    ) -> Result<T, OcrError> {
        let output_name = self.output_name()?;
        let input_tensor = TensorRef::from_array_view(x.view()).map_err(|e| {
            OcrError::inference(
                &self.model_name,
                format!("failed to wrap input tensor with shape {:?}", x.shape()),
                e,
            )
        })?;
        let inputs = ort::inputs![self.input_name.as_str() => input_tensor];

        let idx = self.next_idx.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        let mut session = self.sessions[idx]
            .lock()
            .map_err(|_| OcrError::invalid_input("failed to acquire session lock"))?;

        let outputs = session.run(inputs).map_err(|e| {
            OcrError::inference(
                &self.model_name,
                format!("forward pass failed for input shape {:?}", x.shape()),
                e,
            )
        })?;

        let (shape, data) = outputs[output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| {
                OcrError::inference(
                    &self.model_name,
                    format!("failed to extract output '{output_name}' as f32"),
                    e,
                )
            })?;

        processor(shape, data)
    }
}

fn dims(shape: &[i64]) -> Vec<usize> {
    shape.iter().map(|&d| d.max(0) as usize).collect()
}

impl TensorInference for OrtInfer {
    fn infer_4d(&self, x: &Tensor4D) -> Result<Tensor4D, OcrError> {
        self.run_with(x, |shape, data| {
            let d = dims(shape);
            // Single-channel detectors sometimes emit [N,H,W]; promote to 4-D.
            let (n, c, h, w) = match d.as_slice() {
                [n, c, h, w] => (*n, *c, *h, *w),
                [n, h, w] => (*n, 1, *h, *w),
                _ => return Err(OcrError::shape_mismatch("4d inference output", "[N,C,H,W]", &d)),
            };
            if data.len() != n * c * h * w {
                return Err(OcrError::shape_mismatch("4d inference output", (n, c, h, w), &[data.len()]));
            }
            let view = ArrayView4::from_shape((n, c, h, w), data)?;
            Ok(view.to_owned())
        })
    }

    fn infer_3d(&self, x: &Tensor4D) -> Result<Tensor3D, OcrError> {
        self.run_with(x, |shape, data| {
            let d = dims(shape);
            let [n, t, k] = match d.as_slice() {
                [n, t, k] => [*n, *t, *k],
                _ => return Err(OcrError::shape_mismatch("3d inference output", "[N,T,K]", &d)),
            };
            if data.len() != n * t * k {
                return Err(OcrError::shape_mismatch("3d inference output", (n, t, k), &[data.len()]));
            }
            let view = ArrayView3::from_shape((n, t, k), data)?;
            Ok(view.to_owned())
        })
    }

    fn infer_2d(&self, x: &Tensor4D) -> Result<Tensor2D, OcrError> {
        self.run_with(x, |shape, data| {
            let d = dims(shape);
            let [n, k] = match d.as_slice() {
                [n, k] => [*n, *k],
                _ => return Err(OcrError::shape_mismatch("2d inference output", "[N,K]", &d)),
            };
            if data.len() != n * k {
                return Err(OcrError::shape_mismatch("2d inference output", (n, k), &[data.len()]));
            }
            let view = ArrayView2::from_shape((n, k), data)?;
            Ok(view.to_owned())
        })
    }
}
