//! Classifier profiles: the ordered feature schema each model expects.
//!
//! Two profiles ship with the crate:
//! - [`SPEECH_PROFILE`]: 8 features measured on running speech.
//! - [`VOICE_PROFILE`] : 7 features measured on a sustained vowel.
//!
//! The feature order is part of each model's contract. Never sort it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ModelKind
// ---------------------------------------------------------------------------

/// Tag selecting a classifier variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Connected speech (reading passage).
    Speech,
    /// Sustained phonation ("aaah").
    Voice,
}

impl ModelKind {
    /// Lookup key used in config files and on the command line.
    pub fn key(self) -> &'static str {
        match self {
            Self::Speech => "speech",
            Self::Voice => "voice",
        }
    }

    /// The immutable profile for this variant.
    pub fn profile(self) -> &'static ModelProfile {
        match self {
            Self::Speech => &SPEECH_PROFILE,
            Self::Voice => &VOICE_PROFILE,
        }
    }
}

impl Default for ModelKind {
    fn default() -> Self {
        Self::Speech
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Returned by [`ModelKind::from_str`] for an unknown key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown model profile '{0}' (expected one of: speech, voice)")]
pub struct UnknownProfile(pub String);

impl FromStr for ModelKind {
    type Err = UnknownProfile;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelProfile::by_key(s)
            .map(|p| p.kind)
            .ok_or_else(|| UnknownProfile(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// ModelProfile
// ---------------------------------------------------------------------------

/// Immutable schema for one classifier variant.
#[derive(Debug, PartialEq, Eq)]
pub struct ModelProfile {
    pub kind: ModelKind,
    /// Key accepted by [`ModelProfile::by_key`].
    pub key: &'static str,
    /// Default model asset file name under the models directory.
    pub asset_name: &'static str,
    /// Canonical feature names in model input order.
    pub features: &'static [&'static str],
    /// `(canonical name, extractor key)` pairs for features the extractor
    /// reports under a different name.
    pub renames: &'static [(&'static str, &'static str)],
}

impl ModelProfile {
    /// Find a profile by key (case-insensitive, surrounding whitespace
    /// ignored).
    pub fn by_key(key: &str) -> Option<&'static ModelProfile> {
        let key = key.trim();
        PROFILES
            .iter()
            .copied()
            .find(|p| p.key.eq_ignore_ascii_case(key))
    }

    /// Number of model inputs.
    pub fn width(&self) -> usize {
        self.features.len()
    }

    /// Key to look up in the extractor's mapping for `feature`.
    pub fn lookup_key<'a>(&self, feature: &'a str) -> &'a str {
        self.renames
            .iter()
            .find(|(canonical, _)| *canonical == feature)
            .map(|(_, external)| *external)
            .unwrap_or(feature)
    }
}

impl fmt::Display for ModelProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} features)", self.key, self.width())
    }
}

// ---------------------------------------------------------------------------
// Built-in profiles
// ---------------------------------------------------------------------------

/// Running-speech classifier.
pub static SPEECH_PROFILE: ModelProfile = ModelProfile {
    kind: ModelKind::Speech,
    key: "speech",
    asset_name: "speech_model.onnx",
    features: &[
        "JITTER_LOCAL",
        "PPE",
        "SHIMMER_APQ11",
        "SHIMMER_APQ3",
        "HNR",
        "JITTER_ABS",
        "JITTER_PPQ5",
        "SHIMMER_DB",
    ],
    renames: &[],
};

/// Sustained-vowel classifier.
pub static VOICE_PROFILE: ModelProfile = ModelProfile {
    kind: ModelKind::Voice,
    key: "voice",
    asset_name: "voice_model.onnx",
    features: &[
        "F2",
        "F1",
        "SHIMMER_LOCAL",
        "JITTER_PPQ5",
        "F0_RANGE",
        "INTENSITY_RANGE",
        "HNR",
    ],
    renames: &[],
};

/// Every built-in profile.
pub static PROFILES: &[&ModelProfile] = &[&SPEECH_PROFILE, &VOICE_PROFILE];

#[cfg(test)]
mod tests {
    use super::*;

    static RENAMED: ModelProfile = ModelProfile {
        kind: ModelKind::Voice,
        key: "renamed",
        asset_name: "renamed.onnx",
        features: &["HNR", "F0_RANGE"],
        renames: &[("F0_RANGE", "PITCH_RANGE")],
    };

    #[test]
    fn profile_widths() {
        assert_eq!(SPEECH_PROFILE.width(), 8);
        assert_eq!(VOICE_PROFILE.width(), 7);
    }

    #[test]
    fn by_key_is_case_insensitive() {
        assert_eq!(ModelProfile::by_key("speech"), Some(&SPEECH_PROFILE));
        assert_eq!(ModelProfile::by_key(" Voice "), Some(&VOICE_PROFILE));
        assert!(ModelProfile::by_key("vowel").is_none());
    }

    #[test]
    fn kind_round_trips_through_key() {
        for kind in [ModelKind::Speech, ModelKind::Voice] {
            assert_eq!(kind.key().parse::<ModelKind>(), Ok(kind));
            assert_eq!(kind.profile().kind, kind);
        }
        assert!("other".parse::<ModelKind>().is_err());
    }

    #[test]
    fn lookup_key_applies_renames() {
        assert_eq!(RENAMED.lookup_key("F0_RANGE"), "PITCH_RANGE");
        assert_eq!(RENAMED.lookup_key("HNR"), "HNR");
        assert_eq!(SPEECH_PROFILE.lookup_key("PPE"), "PPE");
    }

    #[test]
    fn asset_names_differ() {
        assert_ne!(SPEECH_PROFILE.asset_name, VOICE_PROFILE.asset_name);
    }
}
