//! Acoustic feature extraction seam.
//!
//! The acoustic analysis itself (jitter, shimmer, HNR, formants …) lives
//! outside this crate. [`FeatureExtractor`] is the only contract: given a
//! recording, return a [`FeatureMap`].
//!
//! [`CommandExtractor`] runs a configured external program (by default the
//! `audio_analysis.py` script) with the audio path as its last argument and
//! reads a flat JSON object from the last `{…}` line of its stdout, so
//! progress output printed before it is tolerated.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::process::Command;

use crate::config::ExtractorConfig;

use super::profile::ModelKind;
use super::vector::{FeatureMap, FeatureValue};

/// Reserved key carrying the analysed file's path; never a feature.
pub const FILEPATH_KEY: &str = "FILEPATH";

/// Placeholder in configured arguments replaced by the profile key.
pub const PROFILE_PLACEHOLDER: &str = "{profile}";

// ---------------------------------------------------------------------------
// ExtractionError
// ---------------------------------------------------------------------------

/// Errors from the external feature extractor.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The extractor program could not be started.
    #[error("failed to launch feature extractor '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The extractor exited unsuccessfully.
    #[error("feature extractor failed ({status}): {stderr}")]
    Failed { status: String, stderr: String },

    /// The extractor did not finish in time and was killed.
    #[error("feature extractor timed out after {0:?}")]
    Timeout(Duration),

    /// The extractor's output was not a JSON object of features.
    #[error("malformed feature extractor output: {0}")]
    Malformed(String),
}

// ---------------------------------------------------------------------------
// FeatureExtractor trait
// ---------------------------------------------------------------------------

/// Async trait turning a recording into named acoustic features.
///
/// Implementors must be `Send + Sync` so they can be shared as
/// `Arc<dyn FeatureExtractor>`.
#[async_trait]
pub trait FeatureExtractor: Send + Sync {
    async fn extract_features(&self, audio_path: &Path) -> Result<FeatureMap, ExtractionError>;
}

// ---------------------------------------------------------------------------
// CommandExtractor
// ---------------------------------------------------------------------------

/// Runs an external program and parses its JSON feature output.
#[derive(Debug, Clone)]
pub struct CommandExtractor {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandExtractor {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// Build from config, substituting [`PROFILE_PLACEHOLDER`] in every
    /// argument with the profile key.
    pub fn from_config(config: &ExtractorConfig, kind: ModelKind) -> Self {
        let args = config
            .args
            .iter()
            .map(|a| a.replace(PROFILE_PLACEHOLDER, kind.key()))
            .collect();
        Self::new(
            config.program.clone(),
            args,
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

#[async_trait]
impl FeatureExtractor for CommandExtractor {
    async fn extract_features(&self, audio_path: &Path) -> Result<FeatureMap, ExtractionError> {
        log::info!(
            "extractor: running {} {:?} {}",
            self.program,
            self.args,
            audio_path.display()
        );

        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(audio_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExtractionError::Launch {
                program: self.program.clone(),
                source,
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ExtractionError::Timeout(self.timeout))?
            .map_err(|source| ExtractionError::Launch {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ExtractionError::Failed {
                status: output.status.to_string(),
                stderr,
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let features = parse_output(&stdout)?;
        log::debug!("extractor: {} features returned", features.len());
        Ok(features)
    }
}

// ---------------------------------------------------------------------------
// Output parsing
// ---------------------------------------------------------------------------

/// Parse the extractor's stdout into a [`FeatureMap`].
///
/// The last line starting with `{` must be a JSON object. Numbers and
/// strings are kept, single-element arrays are unwrapped, anything else is
/// skipped. [`FILEPATH_KEY`] is removed.
pub fn parse_output(stdout: &str) -> Result<FeatureMap, ExtractionError> {
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| l.starts_with('{'))
        .ok_or_else(|| ExtractionError::Malformed("no JSON object in output".into()))?;

    let object = match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(object)) => object,
        Ok(_) => return Err(ExtractionError::Malformed("expected a JSON object".into())),
        Err(e) => return Err(ExtractionError::Malformed(e.to_string())),
    };

    let mut features = FeatureMap::with_capacity(object.len());
    for (name, value) in object {
        if name == FILEPATH_KEY {
            continue;
        }
        match to_feature_value(value) {
            Some(v) => {
                features.insert(name, v);
            }
            None => log::debug!("extractor: skipping non-scalar value for {name}"),
        }
    }
    Ok(features)
}

fn to_feature_value(value: Value) -> Option<FeatureValue> {
    match value {
        Value::Number(n) => n.as_f64().map(FeatureValue::Number),
        Value::String(s) => Some(FeatureValue::Text(s)),
        Value::Array(mut items) if items.len() == 1 => to_feature_value(items.remove(0)),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// StaticExtractor  (test-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
pub use fixed::StaticExtractor;


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_last_json_line() {
        let stdout = "Start processing.\nProcessed files: 1\n\n\
                      {\"HNR\": 18.5, \"PPE\": \"0.21\", \"FILEPATH\": \"/tmp/a.wav\"}\n";
        let map = parse_output(stdout).unwrap();

        assert_eq!(map.len(), 2);
        assert_eq!(map["HNR"], FeatureValue::Number(18.5));
        assert_eq!(map["PPE"], FeatureValue::Text("0.21".into()));
        assert!(!map.contains_key(FILEPATH_KEY));
    }

    #[test]
    fn unwraps_single_element_arrays() {
        let map = parse_output(r#"{"F1": [512.0], "F2": [1.0, 2.0], "X": null}"#).unwrap();
        assert_eq!(map["F1"], FeatureValue::Number(512.0));
        assert!(!map.contains_key("F2"));
        assert!(!map.contains_key("X"));
    }

    #[test]
    fn rejects_output_without_object() {
        assert!(matches!(
            parse_output("Error: cant get characteristic."),
            Err(ExtractionError::Malformed(_))
        ));
        assert!(matches!(
            parse_output("{not json"),
            Err(ExtractionError::Malformed(_))
        ));
    }

    #[test]
    fn from_config_substitutes_profile() {
        let config = ExtractorConfig {
            program: "python3".into(),
            args: vec!["audio_analysis.py".into(), "--kind={profile}".into()],
            timeout_secs: 30,
        };
        let ex = CommandExtractor::from_config(&config, ModelKind::Voice);
        assert_eq!(ex.program(), "python3");
        assert_eq!(ex.args(), &["audio_analysis.py", "--kind=voice"]);
        assert_eq!(ex.timeout, Duration::from_secs(30));
    }

    #[test]
    fn default_command_names_profile_before_path() {
        let ex = CommandExtractor::from_config(&ExtractorConfig::default(), ModelKind::Speech);
        assert_eq!(ex.program(), "python3");
        assert_eq!(ex.args(), &["audio_analysis.py", "--profile", "speech"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn documented_output_shape_is_accepted() {
        let ex = sh(
            r#"echo "Processed files: 1"; printf '{"FILEPATH": "%s", "HNR": 18.5, "PPE": "0.21", "F1": [512.0]}\n' "$1""#,
            Duration::from_secs(10),
        );
        let map = ex.extract_features(Path::new("take.wav")).await.unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map["PPE"].as_f64(), Some(0.21));
        assert_eq!(map["F1"], FeatureValue::Number(512.0));
    }

    #[cfg(unix)]
    fn sh(script: &str, timeout: Duration) -> CommandExtractor {
        // `sh -c script sh <path>` puts the audio path in $1.
        CommandExtractor::new("sh", vec!["-c".into(), script.into(), "sh".into()], timeout)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_command_with_path_argument() {
        let ex = sh(
            r#"echo "working..."; printf '{"FILEPATH": "%s", "HNR": 21.0}\n' "$1""#,
            Duration::from_secs(10),
        );
        let map = ex.extract_features(Path::new("/tmp/rec.wav")).await.unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["HNR"], FeatureValue::Number(21.0));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_failure() {
        let ex = sh("echo boom >&2; exit 3", Duration::from_secs(10));
        match ex.extract_features(Path::new("x.wav")).await {
            Err(ExtractionError::Failed { stderr, .. }) => assert_eq!(stderr, "boom"),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_command_times_out() {
        let ex = sh("sleep 5", Duration::from_millis(100));
        assert!(matches!(
            ex.extract_features(Path::new("x.wav")).await,
            Err(ExtractionError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn missing_program_is_launch_error() {
        let ex = CommandExtractor::new("definitely-not-a-real-extractor", vec![], Duration::from_secs(1));
        assert!(matches!(
            ex.extract_features(Path::new("x.wav")).await,
            Err(ExtractionError::Launch { .. })
        ));
    }
}
