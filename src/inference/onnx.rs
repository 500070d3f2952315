//! ONNX Runtime backend (cargo feature `onnx`).
//!
//! Wraps an `ort` session and converts each output into an
//! [`OutputValue`]: float tensors as-is, integer tensors widened to `f32`,
//! and ZipMap sequences of `{i64 → f32}` maps as class probabilities.

use std::path::Path;

use ort::memory::Allocator;
use ort::session::Session;
use ort::value::{DynMapValueType, DynValue, TensorRef, ValueType};

use super::engine::{InferenceError, ScoringModel};
use super::output::{ModelOutputs, OutputValue};

/// A model file loaded into an ONNX Runtime session.
pub struct OnnxModel {
    session: Option<Session>,
    inputs: Vec<String>,
    outputs: Vec<String>,
    width: Option<usize>,
}

impl OnnxModel {
    /// Build a session from `path`.
    ///
    /// # Errors
    ///
    /// [`InferenceError::ModelLoadFailure`] if the runtime cannot be
    /// initialised or rejects the file.
    pub fn load(path: &Path) -> Result<Self, InferenceError> {
        let session = Session::builder()
            .map_err(|e| InferenceError::ModelLoadFailure(format!("session builder: {e}")))?
            .commit_from_file(path)
            .map_err(|e| InferenceError::ModelLoadFailure(format!("{}: {e}", path.display())))?;

        let inputs: Vec<String> = session.inputs().iter().map(|i| i.name().to_string()).collect();
        let outputs: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        let width = session.inputs().first().and_then(|i| match i.dtype() {
            ValueType::Tensor { shape, .. } => shape
                .last()
                .copied()
                .filter(|d| *d > 0)
                .map(|d| d as usize),
            _ => None,
        });

        log::info!(
            "inference: onnx session ready ({} inputs, {} outputs)",
            inputs.len(),
            outputs.len()
        );

        Ok(Self {
            session: Some(session),
            inputs,
            outputs,
            width,
        })
    }
}

impl ScoringModel for OnnxModel {
    fn input_names(&self) -> Vec<String> {
        self.inputs.clone()
    }

    fn output_names(&self) -> Vec<String> {
        self.outputs.clone()
    }

    fn input_width(&self) -> Option<usize> {
        self.width
    }

    fn run(&mut self, input_name: &str, row: &[f32]) -> Result<ModelOutputs, InferenceError> {
        let session = self.session.as_mut().ok_or(InferenceError::Closed)?;

        let input = TensorRef::from_array_view(([1usize, row.len()], row))
            .map_err(|e| InferenceError::Runtime(format!("input tensor: {e}")))?;
        let results = session
            .run(ort::inputs![input_name => input])
            .map_err(|e| InferenceError::Runtime(format!("forward pass: {e}")))?;

        let mut outputs = ModelOutputs::new();
        for name in &self.outputs {
            if let Some(value) = results.get(name.as_str()) {
                outputs.push(name.clone(), convert(value));
            }
        }
        Ok(outputs)
    }

    fn close(&mut self) {
        self.session.take();
    }
}

fn convert(value: &DynValue) -> OutputValue {
    match value.dtype() {
        ValueType::Tensor { .. } => convert_tensor(value),
        ValueType::Sequence(_) => convert_class_maps(value).unwrap_or_else(OutputValue::Unsupported),
        other => OutputValue::Unsupported(format!("{other:?}")),
    }
}

fn convert_tensor(value: &DynValue) -> OutputValue {
    // Integer tensors carry class labels, never scores.
    match value.try_extract_tensor::<f32>() {
        Ok((shape, data)) => OutputValue::Tensor {
            shape: shape.iter().copied().collect(),
            data: data.to_vec(),
        },
        Err(_) => OutputValue::Unsupported(format!("{:?}", value.dtype())),
    }
}

fn convert_class_maps(value: &DynValue) -> Result<OutputValue, String> {
    let allocator = Allocator::default();
    let maps = value
        .try_extract_sequence::<DynMapValueType>(&allocator)
        .map_err(|e| e.to_string())?;
    let rows = maps
        .iter()
        .map(|m| m.try_extract_map::<i64, f32>().map_err(|e| e.to_string()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(OutputValue::ClassProbabilities(rows))
}
