//! Inference: load a classifier, score one feature vector, decode the
//! class-1 probability.
//!
//! ```text
//! FeatureVector ──▶ [1, N] f32 tensor ──▶ ScoringModel::run ──▶ ModelOutputs
//!                                                                    │
//!                                          decode_probability ◀──────┘
//!                                                  │
//!                                                  ▼
//!                               Result<Probability, InferenceError>
//! ```

pub mod engine;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod output;

pub use engine::{InferenceEngine, InferenceError, ScoringModel};
pub use output::{decode_probability, ModelOutputs, OutputValue, Probability, PROBABILITIES_OUTPUT};

#[cfg(test)]
pub use engine::FixedOutputModel;
