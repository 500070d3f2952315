//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.
//! Every section is `#[serde(default)]`, so a partial `settings.toml` only
//! overrides the keys it names.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::features::ModelKind;

use super::AppPaths;

// ---------------------------------------------------------------------------
// CaptureConfig
// ---------------------------------------------------------------------------

/// Settings for microphone capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Recording sample rate in Hz (the classifiers expect 16 000).
    pub sample_rate: u32,
    /// Lower bound for the capture read buffer in bytes (at least 4096).
    pub min_buffer_bytes: usize,
    /// Milliseconds `stop` waits for the capture thread.
    pub join_timeout_ms: u64,
    /// Recording file name; relative names live in the recordings dir.
    pub recording_file: PathBuf,
    /// Audio input device name: `None` means the system default.
    pub input_device: Option<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            min_buffer_bytes: 4_096,
            join_timeout_ms: 1_500,
            recording_file: PathBuf::from("speech_recording.wav"),
            input_device: None,
        }
    }
}

// ---------------------------------------------------------------------------
// ModelsConfig
// ---------------------------------------------------------------------------

/// Classifier assets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Speech-profile model file; relative names live in the models dir.
    pub speech_model: PathBuf,
    /// Voice-profile model file; relative names live in the models dir.
    pub voice_model: PathBuf,
    /// Profile used when none is given on the command line.
    pub default_profile: ModelKind,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            speech_model: PathBuf::from(ModelKind::Speech.profile().asset_name),
            voice_model: PathBuf::from(ModelKind::Voice.profile().asset_name),
            default_profile: ModelKind::default(),
        }
    }
}

impl ModelsConfig {
    /// Configured asset for `kind`, resolved against `paths`.
    pub fn model_path(&self, kind: ModelKind, paths: &AppPaths) -> PathBuf {
        let name = match kind {
            ModelKind::Speech => &self.speech_model,
            ModelKind::Voice => &self.voice_model,
        };
        paths.model_file(name)
    }
}

// ---------------------------------------------------------------------------
// ExtractorConfig
// ---------------------------------------------------------------------------

/// External feature extractor command.
///
/// The command line is `program args… <audio path>`: the path is always the
/// last argument, and `{profile}` inside any argument is replaced by
/// `speech` or `voice`. The program must:
///
/// - exit with status 0 on success; any other status is a failure and its
///   stderr is reported,
/// - finish within `timeout_secs`, or it is killed,
/// - print the features as one flat JSON object on the last stdout line
///   that starts with `{`. Earlier lines (progress output) are ignored.
///
/// Object values are numbers, numeric strings (`"0.0041"`) or one-element
/// arrays of either. A `FILEPATH` key is ignored. Key names are the feature
/// names of the selected profile, for example `HNR` or `JITTER_LOCAL`.
///
/// ```text
/// $ python3 audio_analysis.py --profile speech take.wav
/// Processed files: 1
/// {"FILEPATH": "take.wav", "HNR": 18.5, "PPE": "0.21", ...}
/// ```
///
/// The default expects an `audio_analysis.py` wrapper that calls the
/// analysis library's `get_speech_features` or `get_voice_features` for the
/// given profile and prints the result in this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Program to run (looked up on `PATH`).
    pub program: String,
    /// Arguments placed before the audio path.
    pub args: Vec<String>,
    /// Seconds before the extractor is killed.
    pub timeout_secs: u64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            program: "python3".into(),
            args: vec![
                "audio_analysis.py".into(),
                "--profile".into(),
                "{profile}".into(),
            ],
            timeout_secs: 120,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use voice_screening::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Microphone capture settings.
    pub capture: CaptureConfig,
    /// Classifier asset settings.
    pub models: ModelsConfig,
    /// Feature extractor command.
    pub extractor: ExtractorConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// (first-run scenario) so callers never need to special-case a missing
    /// file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Serialise to a TOML string (used by `config` on the command line).
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
