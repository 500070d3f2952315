//! Scoring engine: one loaded model, one forward pass per call.
//!
//! # Overview
//!
//! [`ScoringModel`] is the runtime seam. The ONNX Runtime backend
//! ([`super::onnx::OnnxModel`], cargo feature `onnx`) implements it for real
//! model files.
//!
//! [`InferenceEngine`] resolves the model's first input and first output
//! once at load time, checks the feature vector width, runs the model and
//! decodes the class-1 probability with
//! [`decode_probability`](super::output::decode_probability).
//!
//! [`FixedOutputModel`] (available under `#[cfg(test)]`) returns canned
//! outputs so the engine and pipeline can be tested without a model file.

use std::path::Path;

use thiserror::Error;

use crate::features::FeatureVector;

use super::output::{decode_probability, ModelOutputs, Probability};

// ---------------------------------------------------------------------------
// InferenceError
// ---------------------------------------------------------------------------

/// All errors that can arise from the inference subsystem.
#[derive(Debug, Clone, Error)]
pub enum InferenceError {
    /// The model could not be loaded, or declares no inputs or outputs.
    /// The engine is unusable.
    #[error("failed to load model: {0}")]
    ModelLoadFailure(String),

    /// The feature vector width does not match the model input.
    #[error("feature vector has {actual} values, model expects {expected}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// The model ran but its output could not be read as a probability.
    #[error("could not decode a probability from model output: {0}")]
    DecodeFailure(String),

    /// `predict` was called after `close`.
    #[error("inference engine is closed")]
    Closed,

    /// The runtime failed during the forward pass.
    #[error("model execution failed: {0}")]
    Runtime(String),
}

// ---------------------------------------------------------------------------
// ScoringModel trait
// ---------------------------------------------------------------------------

/// A loaded model able to score one `[1, N]` float row.
pub trait ScoringModel: Send {
    /// Declared input names, in model order.
    fn input_names(&self) -> Vec<String>;

    /// Declared output names, in model order.
    fn output_names(&self) -> Vec<String>;

    /// Fixed width of the first input's last dimension, when declared.
    fn input_width(&self) -> Option<usize>;

    /// Feed `row` as a `[1, row.len()]` tensor to `input_name` and return
    /// every output.
    fn run(&mut self, input_name: &str, row: &[f32]) -> Result<ModelOutputs, InferenceError>;

    /// Release runtime resources. Called at most once by the engine.
    fn close(&mut self) {}
}

// Compile-time assertion: Box<dyn ScoringModel> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn ScoringModel>) {}
};

// ---------------------------------------------------------------------------
// InferenceEngine
// ---------------------------------------------------------------------------

/// One loaded classifier.
///
/// Not internally synchronised: `predict` takes `&mut self`, so sharing an
/// engine across tasks needs a `Mutex`.
pub struct InferenceEngine {
    model: Option<Box<dyn ScoringModel>>,
    input_name: String,
    output_name: String,
    input_width: Option<usize>,
}

impl std::fmt::Debug for InferenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceEngine")
            .field("input_name", &self.input_name)
            .field("output_name", &self.output_name)
            .field("input_width", &self.input_width)
            .field("closed", &self.model.is_none())
            .finish()
    }
}

impl InferenceEngine {
    /// Wrap an already-loaded model.
    ///
    /// # Errors
    ///
    /// [`InferenceError::ModelLoadFailure`] if the model declares zero
    /// inputs or zero outputs.
    pub fn from_model(model: Box<dyn ScoringModel>) -> Result<Self, InferenceError> {
        let input_name = model
            .input_names()
            .into_iter()
            .next()
            .ok_or_else(|| InferenceError::ModelLoadFailure("model declares no inputs".into()))?;
        let output_name = model
            .output_names()
            .into_iter()
            .next()
            .ok_or_else(|| InferenceError::ModelLoadFailure("model declares no outputs".into()))?;
        let input_width = model.input_width();

        log::debug!(
            "inference: input '{}' (width {:?}), primary output '{}'",
            input_name,
            input_width,
            output_name
        );

        Ok(Self {
            model: Some(model),
            input_name,
            output_name,
            input_width,
        })
    }

    /// Load a model file.
    ///
    /// # Errors
    ///
    /// [`InferenceError::ModelLoadFailure`] if the file does not exist, the
    /// runtime rejects it, or this build has no model runtime (the `onnx`
    /// cargo feature is disabled).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, InferenceError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(InferenceError::ModelLoadFailure(format!(
                "model not found: {}",
                path.display()
            )));
        }

        let engine = Self::from_model(open_backend(path)?)?;
        log::info!("inference: model loaded from {}", path.display());
        Ok(engine)
    }

    pub fn input_name(&self) -> &str {
        &self.input_name
    }

    pub fn output_name(&self) -> &str {
        &self.output_name
    }

    pub fn input_width(&self) -> Option<usize> {
        self.input_width
    }

    pub fn is_closed(&self) -> bool {
        self.model.is_none()
    }

    /// Score one feature vector.
    ///
    /// # Errors
    ///
    /// - [`InferenceError::Closed`] after [`close`](Self::close).
    /// - [`InferenceError::ShapeMismatch`] if the model declares an input
    ///   width different from `features.len()`.
    /// - [`InferenceError::Runtime`] if the forward pass fails.
    /// - [`InferenceError::DecodeFailure`] if no decoding tier applies or the
    ///   decoded value is not finite.
    pub fn predict(&mut self, features: &FeatureVector) -> Result<Probability, InferenceError> {
        let model = self.model.as_mut().ok_or(InferenceError::Closed)?;

        if let Some(expected) = self.input_width {
            if expected != features.len() {
                return Err(InferenceError::ShapeMismatch {
                    expected,
                    actual: features.len(),
                });
            }
        }

        let outputs = model.run(&self.input_name, features.as_slice())?;
        let raw = decode_probability(&outputs, &self.output_name).ok_or_else(|| {
            let names: Vec<&str> = outputs.names().collect();
            InferenceError::DecodeFailure(format!("no usable score in outputs {names:?}"))
        })?;

        let probability = Probability::new(f64::from(raw))
            .ok_or_else(|| InferenceError::DecodeFailure(format!("non-finite score {raw}")))?;
        log::debug!("inference: class-1 probability {}", probability.value());
        Ok(probability)
    }

    /// Release the model. Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(mut model) = self.model.take() {
            model.close();
            log::debug!("inference: model closed");
        }
    }
}

impl Drop for InferenceEngine {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(feature = "onnx")]
fn open_backend(path: &Path) -> Result<Box<dyn ScoringModel>, InferenceError> {
    Ok(Box::new(super::onnx::OnnxModel::load(path)?))
}

#[cfg(not(feature = "onnx"))]
fn open_backend(path: &Path) -> Result<Box<dyn ScoringModel>, InferenceError> {
    Err(InferenceError::ModelLoadFailure(format!(
        "cannot load {}: built without the `onnx` feature",
        path.display()
    )))
}

// ---------------------------------------------------------------------------
// FixedOutputModel  (test-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
pub use fixed::FixedOutputModel;

#[cfg(test)]
mod fixed {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Returns the same outputs for every run and records what it was fed.
    #[derive(Clone)]
    pub struct FixedOutputModel {
        inputs: Vec<String>,
        outputs: Vec<String>,
        width: Option<usize>,
        result: Result<ModelOutputs, InferenceError>,
        /// Rows passed to `run`.
        pub rows: Arc<Mutex<Vec<Vec<f32>>>>,
        /// Number of `close` calls.
        pub closes: Arc<AtomicUsize>,
    }

    impl FixedOutputModel {
        /// Model with input `"features"`, the output names found in `outputs`
        /// and no declared width.
        pub fn returning(outputs: ModelOutputs) -> Self {
            let names = outputs.names().map(str::to_string).collect();
            Self {
                inputs: vec!["features".into()],
                outputs: names,
                width: None,
                result: Ok(outputs),
                rows: Arc::new(Mutex::new(Vec::new())),
                closes: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn failing(error: InferenceError) -> Self {
            Self {
                outputs: vec!["output".into()],
                result: Err(error),
                ..Self::returning(ModelOutputs::new())
            }
        }

        pub fn with_width(mut self, width: usize) -> Self {
            self.width = Some(width);
            self
        }

        pub fn with_names(mut self, inputs: &[&str], outputs: &[&str]) -> Self {
            self.inputs = inputs.iter().map(|s| s.to_string()).collect();
            self.outputs = outputs.iter().map(|s| s.to_string()).collect();
            self
        }

        pub fn close_count(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }
    }

    impl ScoringModel for FixedOutputModel {
        fn input_names(&self) -> Vec<String> {
            self.inputs.clone()
        }

        fn output_names(&self) -> Vec<String> {
            self.outputs.clone()
        }

        fn input_width(&self) -> Option<usize> {
            self.width
        }

        fn run(&mut self, _input_name: &str, row: &[f32]) -> Result<ModelOutputs, InferenceError> {
            self.rows.lock().unwrap().push(row.to_vec());
            self.result.clone()
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
