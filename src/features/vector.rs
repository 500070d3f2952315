//! Named feature mapping → ordered model input.
//!
//! [`FeatureVector::build`] walks the profile's feature list in order and
//! looks each feature up in the extractor's mapping, so the result depends
//! only on the profile and never on the mapping's iteration order.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::profile::ModelProfile;

// ---------------------------------------------------------------------------
// FeatureValue / FeatureMap
// ---------------------------------------------------------------------------

/// A single value reported by the feature extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Number(f64),
    /// A numeric literal that arrived as text (e.g. `"0.0041"` or `"NaN"`).
    Text(String),
}

impl FeatureValue {
    /// Numeric interpretation, if any. Text is trimmed and parsed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            Self::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<&str> for FeatureValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Feature name → value, as returned by a [`super::FeatureExtractor`].
pub type FeatureMap = HashMap<String, FeatureValue>;

// ---------------------------------------------------------------------------
// FeatureError
// ---------------------------------------------------------------------------

/// Why a mapping could not be turned into a model input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeatureError {
    /// A profile feature is absent from the mapping.
    #[error("missing feature: {0}")]
    Missing(String),

    /// A profile feature is not a finite number.
    #[error("invalid value for feature: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// FeatureVector
// ---------------------------------------------------------------------------

/// Ordered `f32` model input; index `i` is the profile's feature `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    values: Vec<f32>,
}

impl FeatureVector {
    /// Assemble the input row for `profile` from `features`.
    ///
    /// # Errors
    ///
    /// - [`FeatureError::Missing`] names the first profile feature whose
    ///   lookup key is absent.
    /// - [`FeatureError::Invalid`] names the first feature that does not
    ///   parse, or is NaN or infinite (as `f64` or after narrowing to `f32`).
    ///
    /// ```rust
    /// use voice_screening::features::{FeatureMap, FeatureVector, VOICE_PROFILE};
    ///
    /// let mut map = FeatureMap::new();
    /// for (i, name) in VOICE_PROFILE.features.iter().enumerate() {
    ///     map.insert(name.to_string(), (i as f64).into());
    /// }
    /// let v = FeatureVector::build(&VOICE_PROFILE, &map).unwrap();
    /// assert_eq!(v.as_slice(), &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    /// ```
    pub fn build(profile: &ModelProfile, features: &FeatureMap) -> Result<Self, FeatureError> {
        let mut values = Vec::with_capacity(profile.width());
        for &name in profile.features {
            let raw = features
                .get(profile.lookup_key(name))
                .ok_or_else(|| FeatureError::Missing(name.to_string()))?;
            let value = raw
                .as_f64()
                .filter(|v| v.is_finite())
                .map(|v| v as f32)
                .filter(|v| v.is_finite())
                .ok_or_else(|| FeatureError::Invalid(name.to_string()))?;
            values.push(value);
        }

        log::debug!("features: built {}-wide vector for '{}'", values.len(), profile.key);
        Ok(Self { values })
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.values
    }
}

impl From<Vec<f32>> for FeatureVector {
    fn from(values: Vec<f32>) -> Self {
        Self { values }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
