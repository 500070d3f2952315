//! Model outputs and class-1 probability decoding.
//!
//! Classifier exports disagree on how they present scores. A gradient
//! boosting export with a ZipMap node yields a `probabilities` output holding
//! a sequence of `{label → probability}` maps; other exports return a raw
//! score tensor. [`decode_probability`] tries, in this order:
//!
//! ```text
//! 1. "probabilities" → seq[0] map   label 1 → p1, else label 0 → p0 (as is)
//! 2. primary output, rank 1          len ≥ 2 → [1], len 1 → [0]
//! 3. primary output, rank 2          cols ≥ 2 → [0][1], cols 1 → [0][0]
//! ```
//!
//! Anything else is undecodable. The label-0 branch returns `p0` without
//! inverting it.

use std::collections::HashMap;
use std::fmt;

/// Name of the class-probability output produced by ZipMap exports.
pub const PROBABILITIES_OUTPUT: &str = "probabilities";

// ---------------------------------------------------------------------------
// OutputValue / ModelOutputs
// ---------------------------------------------------------------------------

/// One output of a forward pass, converted out of the runtime's types.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputValue {
    /// Sequence of `{class label → probability}` maps (one per input row).
    ClassProbabilities(Vec<HashMap<i64, f32>>),
    /// Dense numeric tensor in row-major order.
    Tensor { shape: Vec<i64>, data: Vec<f32> },
    /// An output this crate cannot interpret (e.g. string labels).
    Unsupported(String),
}

impl OutputValue {
    /// 1-D tensor helper.
    pub fn vector(data: Vec<f32>) -> Self {
        Self::Tensor {
            shape: vec![data.len() as i64],
            data,
        }
    }

    /// 2-D tensor helper; `data` is row-major with `cols` columns.
    pub fn matrix(rows: usize, cols: usize, data: Vec<f32>) -> Self {
        Self::Tensor {
            shape: vec![rows as i64, cols as i64],
            data,
        }
    }
}

/// Named outputs in the order the model declares them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelOutputs {
    entries: Vec<(String, OutputValue)>,
}

impl ModelOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: OutputValue) {
        self.entries.push((name.into(), value));
    }

    /// Builder form of [`ModelOutputs::push`].
    pub fn with(mut self, name: impl Into<String>, value: OutputValue) -> Self {
        self.push(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&OutputValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn first(&self) -> Option<&OutputValue> {
        self.entries.first().map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }
}

// ---------------------------------------------------------------------------
// Probability
// ---------------------------------------------------------------------------

/// Class-1 probability reported by a model.
///
/// Only finite values can be represented, so a `Probability` is always a
/// real model answer; failures travel as `Err(InferenceError)`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Probability(f64);

impl Probability {
    /// `None` for NaN or infinite input.
    pub fn new(value: f64) -> Option<Self> {
        value.is_finite().then_some(Self(value))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Probability × 100, for display.
    pub fn as_percent(self) -> f64 {
        self.0 * 100.0
    }
}

impl fmt::Display for Probability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}%", self.as_percent())
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode the class-1 probability from `outputs`.
///
/// `primary` names the output used by the tensor tiers; when it is absent the
/// first output is used. Returns `None` when no tier applies.
pub fn decode_probability(outputs: &ModelOutputs, primary: &str) -> Option<f32> {
    if let Some(p) = outputs
        .get(PROBABILITIES_OUTPUT)
        .and_then(decode_class_map)
    {
        return Some(p);
    }

    let primary = outputs.get(primary).or_else(|| outputs.first())?;
    match primary {
        OutputValue::Tensor { shape, data } => decode_tensor(shape, data),
        _ => None,
    }
}

fn decode_class_map(value: &OutputValue) -> Option<f32> {
    let OutputValue::ClassProbabilities(rows) = value else {
        return None;
    };
    let row = rows.first()?;
    row.get(&1).or_else(|| row.get(&0)).copied()
}

fn decode_tensor(shape: &[i64], data: &[f32]) -> Option<f32> {
    match shape {
        [len] => match *len {
            n if n >= 2 => data.get(1).copied(),
            1 => data.first().copied(),
            _ => None,
        },
        [rows, cols] if *rows >= 1 => match *cols {
            n if n >= 2 => data.get(1).copied(),
            1 => data.first().copied(),
            _ => None,
        },
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
