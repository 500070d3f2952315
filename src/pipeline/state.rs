//! Pipeline state machine and shared application state.
//!
//! [`PipelineState`] drives the orchestrator's state machine. A front-end
//! reads it via [`SharedState`] to show progress.
//!
//! [`AppState`] is the single source of truth for everything a front-end
//! needs: current pipeline phase, the last [`AnalysisReport`], config
//! snapshot, and any error message.
//!
//! [`SharedState`] is a type alias for `Arc<Mutex<AppState>>`: cheap to clone
//! and safe to share across threads.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::config::AppConfig;
use crate::features::{FeatureMap, ModelKind};
use crate::inference::Probability;

// ---------------------------------------------------------------------------
// PipelineState
// ---------------------------------------------------------------------------

/// States of the screening pipeline.
///
/// The state machine transitions are:
///
/// ```text
/// Idle ──start──▶ Recording
///      ──stop───▶ Extracting ──features──▶ Scoring ──probability──▶ Result
/// Idle ──analyze file──▶ Extracting ──▶ …
/// any state ──error──▶ Error
/// Error / Result ──next cycle──▶ Recording / Extracting
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    /// Nothing in progress.
    #[default]
    Idle,

    /// Microphone is active; audio is streaming to the recording file.
    Recording,

    /// The external extractor is computing acoustic features.
    Extracting,

    /// The classifier is running on the blocking thread pool.
    Scoring,

    /// A probability is available in [`AppState::last_report`].
    Result,

    /// The last cycle failed; see [`AppState::error_message`]. No result is
    /// shown for a failed cycle.
    Error,
}

impl PipelineState {
    /// Returns `true` while the pipeline is recording or analysing.
    ///
    /// ```
    /// use voice_screening::pipeline::PipelineState;
    ///
    /// assert!(!PipelineState::Idle.is_busy());
    /// assert!(PipelineState::Recording.is_busy());
    /// assert!(PipelineState::Extracting.is_busy());
    /// assert!(PipelineState::Scoring.is_busy());
    /// assert!(!PipelineState::Result.is_busy());
    /// assert!(!PipelineState::Error.is_busy());
    /// ```
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            PipelineState::Recording | PipelineState::Extracting | PipelineState::Scoring
        )
    }

    /// A short human-readable label for status output.
    pub fn label(&self) -> &'static str {
        match self {
            PipelineState::Idle => "Idle",
            PipelineState::Recording => "Recording",
            PipelineState::Extracting => "Extracting features",
            PipelineState::Scoring => "Scoring",
            PipelineState::Result => "Done",
            PipelineState::Error => "Error",
        }
    }
}

// ---------------------------------------------------------------------------
// AnalysisReport
// ---------------------------------------------------------------------------

/// Outcome of one successful analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisReport {
    /// Profile the recording was scored with.
    pub profile: ModelKind,
    /// Class-1 probability from the model.
    pub probability: Probability,
    /// Every feature the extractor returned (including ones the model does
    /// not use).
    pub features: FeatureMap,
    /// Recording that was analysed.
    pub audio_path: PathBuf,
}

impl AnalysisReport {
    /// Probability scaled to 0–100 for display.
    pub fn percent(&self) -> f64 {
        self.probability.as_percent()
    }

    /// Features sorted by name, for a stable details listing.
    pub fn sorted_features(&self) -> Vec<(&str, String)> {
        let mut rows: Vec<(&str, String)> = self
            .features
            .iter()
            .map(|(k, v)| (k.as_str(), v.to_string()))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(b.0));
        rows
    }
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Shared application state.
///
/// Held behind [`SharedState`] (`Arc<Mutex<AppState>>`). The orchestrator
/// mutates it; front-ends only read it.
pub struct AppState {
    /// Current phase of the pipeline.
    pub pipeline: PipelineState,

    /// The most recent successful analysis.
    ///
    /// Cleared when a new cycle starts, so a failed cycle never leaves a
    /// stale probability behind.
    pub last_report: Option<AnalysisReport>,

    /// Current application configuration.
    pub config: AppConfig,

    /// Error message to display when `pipeline == PipelineState::Error`.
    pub error_message: Option<String>,

    /// Duration of the last finalized recording in seconds.
    pub recording_secs: f32,
}

impl AppState {
    /// Create a new `AppState` with sensible defaults.
    pub fn new(config: AppConfig) -> Self {
        Self {
            pipeline: PipelineState::Idle,
            last_report: None,
            config,
            error_message: None,
            recording_secs: 0.0,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// SharedState
// ---------------------------------------------------------------------------

/// Thread-safe handle to [`AppState`].
///
/// Cheap to clone (`Arc` clone). Lock for a short critical section; do
/// **not** hold the lock across `.await` points.
pub type SharedState = Arc<Mutex<AppState>>;

/// Construct a new [`SharedState`] wrapping a default [`AppState`].
pub fn new_shared_state(config: AppConfig) -> SharedState {
    Arc::new(Mutex::new(AppState::new(config)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureValue;

    // ---- PipelineState ---

    #[test]
    fn busy_states() {
        let busy: Vec<PipelineState> = [
            PipelineState::Idle,
            PipelineState::Recording,
            PipelineState::Extracting,
            PipelineState::Scoring,
            PipelineState::Result,
            PipelineState::Error,
        ]
        .into_iter()
        .filter(PipelineState::is_busy)
        .collect();
        assert_eq!(
            busy,
            vec![
                PipelineState::Recording,
                PipelineState::Extracting,
                PipelineState::Scoring
            ]
        );
    }

    #[test]
    fn labels() {
        assert_eq!(PipelineState::Idle.label(), "Idle");
        assert_eq!(PipelineState::Extracting.label(), "Extracting features");
        assert_eq!(PipelineState::Result.label(), "Done");
        assert_eq!(PipelineState::Error.label(), "Error");
    }

    #[test]
    fn default_pipeline_state_is_idle() {
        assert_eq!(PipelineState::default(), PipelineState::Idle);
    }

    // ---- AnalysisReport ---

    #[test]
    fn report_percent_and_sorted_features() {
        let features: FeatureMap = [
            ("PPE".to_string(), FeatureValue::Number(0.21)),
            ("HNR".to_string(), FeatureValue::Number(18.5)),
        ]
        .into_iter()
        .collect();
        let report = AnalysisReport {
            profile: ModelKind::Speech,
            probability: Probability::new(0.5).unwrap(),
            features,
            audio_path: PathBuf::from("speech_recording.wav"),
        };

        assert_eq!(report.percent(), 50.0);
        assert_eq!(
            report.sorted_features(),
            vec![("HNR", "18.5".to_string()), ("PPE", "0.21".to_string())]
        );
    }

    // ---- AppState / SharedState ---

    #[test]
    fn app_state_default() {
        let state = AppState::default();
        assert_eq!(state.pipeline, PipelineState::Idle);
        assert!(state.last_report.is_none());
        assert!(state.error_message.is_none());
        assert!((state.recording_secs - 0.0).abs() < f32::EPSILON);
    }

    #[test]
    fn shared_state_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SharedState>();
    }

    #[test]
    fn shared_state_can_be_cloned_and_mutated() {
        let state = new_shared_state(AppConfig::default());
        let state2 = Arc::clone(&state);

        state.lock().unwrap().pipeline = PipelineState::Recording;
        assert_eq!(state2.lock().unwrap().pipeline, PipelineState::Recording);
    }
}
