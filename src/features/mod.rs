//! Feature handling: extractor seam, model profiles and vector assembly.
//!
//! ```text
//! audio path ──FeatureExtractor──▶ FeatureMap { "HNR": 18.5, "PPE": "0.21", … }
//!                                        │
//!                     ModelProfile ──────┤  (ordered names + renames)
//!                                        ▼
//!                                  FeatureVector [f32; profile width]
//! ```

pub mod extractor;
pub mod profile;
pub mod vector;

pub use extractor::{CommandExtractor, ExtractionError, FeatureExtractor, FILEPATH_KEY};
pub use profile::{ModelKind, ModelProfile, UnknownProfile, PROFILES, SPEECH_PROFILE, VOICE_PROFILE};
pub use vector::{FeatureError, FeatureMap, FeatureValue, FeatureVector};

#[cfg(test)]
pub use extractor::StaticExtractor;
