//! Pipeline orchestrator: record → extract features → score.
//!
//! [`PipelineOrchestrator`] owns the [`SharedState`] and exposes each step as
//! an async method. It can also be driven by [`PipelineCommand`]s received
//! over a `tokio::sync::mpsc` channel (see [`run`](PipelineOrchestrator::run)).
//!
//! # Pipeline flow
//!
//! ```text
//! start_recording   spawn_blocking(recorder.start)              [Recording]
//! stop_and_analyze  spawn_blocking(recorder.stop) → analyze
//! analyze(path)     spawn_blocking(validate header)
//!                     └─▶ extractor.extract_features (async)    [Extracting]
//!                           └─▶ FeatureVector::build
//!                                 └─▶ spawn_blocking(engine.predict) [Scoring]
//!                                       ├─ Ok  → AnalysisReport      [Result]
//!                                       └─ Err → error message       [Error]
//! ```
//!
//! A failed step always ends in [`PipelineState::Error`] with no report, so
//! a front-end can never show 0% for a cycle that produced no probability.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::mpsc;

use crate::audio::{wav, CaptureError, HeaderError, RecordedAudio, WavRecorder};
use crate::features::{
    ExtractionError, FeatureError, FeatureExtractor, FeatureVector, ModelProfile,
};
use crate::inference::{InferenceEngine, InferenceError};

use super::state::{AnalysisReport, PipelineState, SharedState};

// ---------------------------------------------------------------------------
// PipelineError
// ---------------------------------------------------------------------------

/// Errors that can surface inside the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// The audio file is not a valid finalized recording.
    #[error("invalid recording: {0}")]
    Container(#[from] HeaderError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Feature(#[from] FeatureError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    /// `stop_and_analyze` was called with no active recording.
    #[error("no recording in progress")]
    NotRecording,

    /// Internal / unexpected error (e.g. tokio join failure).
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(e: tokio::task::JoinError) -> Self {
        PipelineError::Internal(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// PipelineCommand
// ---------------------------------------------------------------------------

/// Requests accepted by [`PipelineOrchestrator::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineCommand {
    /// Begin a new recording.
    StartRecording,
    /// Finish the recording and analyse it.
    StopAndAnalyze,
    /// Analyse an existing recording.
    Analyze(PathBuf),
}

// ---------------------------------------------------------------------------
// PipelineOrchestrator
// ---------------------------------------------------------------------------

/// Drives the complete screening pipeline for one model profile.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use voice_screening::audio::{CpalMicrophone, RecorderConfig, WavRecorder};
/// use voice_screening::config::AppConfig;
/// use voice_screening::features::{CommandExtractor, ModelKind};
/// use voice_screening::inference::InferenceEngine;
/// use voice_screening::pipeline::{new_shared_state, PipelineOrchestrator};
///
/// # async fn example() {
/// let config = AppConfig::default();
/// let kind = ModelKind::Speech;
/// let orchestrator = PipelineOrchestrator::new(
///     new_shared_state(config.clone()),
///     WavRecorder::new(Arc::new(CpalMicrophone::new()), RecorderConfig::from(&config.capture)),
///     Arc::new(CommandExtractor::from_config(&config.extractor, kind)),
///     InferenceEngine::load("models/speech_model.onnx").unwrap(),
///     kind.profile(),
///     "speech_recording.wav",
/// );
/// let report = orchestrator.analyze("speech_recording.wav").await.unwrap();
/// println!("{:.1}%", report.percent());
/// # }
/// ```
pub struct PipelineOrchestrator {
    state: SharedState,
    recorder: Arc<Mutex<WavRecorder>>,
    extractor: Arc<dyn FeatureExtractor>,
    engine: Arc<Mutex<InferenceEngine>>,
    profile: &'static ModelProfile,
    recording_path: PathBuf,
}

impl PipelineOrchestrator {
    /// Create a new orchestrator.
    ///
    /// # Arguments
    ///
    /// * `state`         : shared application state (also read by front-ends).
    /// * `recorder`      : microphone recorder.
    /// * `extractor`     : acoustic feature extractor.
    /// * `engine`        : classifier matching `profile`.
    /// * `profile`       : feature schema used to build the model input.
    /// * `recording_path`: file each new recording is written to.
    pub fn new(
        state: SharedState,
        recorder: WavRecorder,
        extractor: Arc<dyn FeatureExtractor>,
        engine: InferenceEngine,
        profile: &'static ModelProfile,
        recording_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            state,
            recorder: Arc::new(Mutex::new(recorder)),
            extractor,
            engine: Arc::new(Mutex::new(engine)),
            profile,
            recording_path: recording_path.into(),
        }
    }

    pub fn profile(&self) -> &'static ModelProfile {
        self.profile
    }

    pub fn recording_path(&self) -> &Path {
        &self.recording_path
    }

    // -----------------------------------------------------------------------
    // Command loop
    // -----------------------------------------------------------------------

    /// Run the orchestrator until `commands` is closed, then release the
    /// recorder and the model.
    ///
    /// Failures are recorded in the shared state; the loop keeps going.
    pub async fn run(self, mut commands: mpsc::Receiver<PipelineCommand>) {
        while let Some(command) = commands.recv().await {
            log::debug!("pipeline: command {command:?}");
            let outcome = match command {
                PipelineCommand::StartRecording => self.start_recording().await.map(|_| ()),
                PipelineCommand::StopAndAnalyze => self.stop_and_analyze().await.map(|_| ()),
                PipelineCommand::Analyze(path) => self.analyze(&path).await.map(|_| ()),
            };
            if let Err(e) = outcome {
                log::debug!("pipeline: command failed: {e}");
            }
        }

        log::info!("pipeline: command channel closed, orchestrator shutting down");
        self.shutdown().await;
    }

    // -----------------------------------------------------------------------
    // Recording
    // -----------------------------------------------------------------------

    /// Start recording to the configured recording path.
    pub async fn start_recording(&self) -> Result<(), PipelineError> {
        {
            let mut st = lock(&self.state);
            st.last_report = None;
            st.error_message = None;
            st.recording_secs = 0.0;
        }

        let recorder = Arc::clone(&self.recorder);
        let path = self.recording_path.clone();
        let started = tokio::task::spawn_blocking(move || lock(&recorder).start(&path)).await;

        match started.map_err(PipelineError::from).and_then(|r| r.map_err(PipelineError::from)) {
            Ok(()) => {
                self.set_pipeline(PipelineState::Recording);
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Stop recording and finalize the file.
    ///
    /// Returns `Ok(None)` when nothing was recording.
    pub async fn stop_recording(&self) -> Result<Option<RecordedAudio>, PipelineError> {
        let recorder = Arc::clone(&self.recorder);
        let stopped = tokio::task::spawn_blocking(move || lock(&recorder).stop()).await;

        match stopped.map_err(PipelineError::from).and_then(|r| r.map_err(PipelineError::from)) {
            Ok(Some(recording)) => {
                let mut st = lock(&self.state);
                st.recording_secs = recording.duration().as_secs_f32();
                st.pipeline = PipelineState::Idle;
                Ok(Some(recording))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Stop the active recording and analyse it.
    pub async fn stop_and_analyze(&self) -> Result<AnalysisReport, PipelineError> {
        match self.stop_recording().await? {
            Some(recording) => self.analyze(&recording.path).await,
            None => Err(self.fail(PipelineError::NotRecording)),
        }
    }

    // -----------------------------------------------------------------------
    // Analysis
    // -----------------------------------------------------------------------

    /// Extract features from `audio`, score them and publish the report.
    ///
    /// # Errors
    ///
    /// Any failure leaves the state in [`PipelineState::Error`] with no
    /// report.
    pub async fn analyze(&self, audio: impl AsRef<Path>) -> Result<AnalysisReport, PipelineError> {
        let audio = audio.as_ref();
        {
            let mut st = lock(&self.state);
            st.last_report = None;
            st.error_message = None;
        }

        match self.analyze_inner(audio).await {
            Ok(report) => {
                log::info!(
                    "pipeline: {} → {:.1}% ({})",
                    audio.display(),
                    report.percent(),
                    self.profile.key
                );
                let mut st = lock(&self.state);
                st.pipeline = PipelineState::Result;
                st.last_report = Some(report.clone());
                Ok(report)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn analyze_inner(&self, audio: &Path) -> Result<AnalysisReport, PipelineError> {
        // ── 1. Container check ───────────────────────────────────────────
        let path = audio.to_path_buf();
        let header = tokio::task::spawn_blocking(move || wav::validate_file(&path)).await??;
        log::debug!(
            "pipeline: {} holds {} bytes of {} Hz PCM",
            audio.display(),
            header.data_len,
            header.format.sample_rate
        );

        // ── 2. Feature extraction (async) ────────────────────────────────
        self.set_pipeline(PipelineState::Extracting);
        let features = self.extractor.extract_features(audio).await?;

        // ── 3. Ordered model input ───────────────────────────────────────
        let vector = FeatureVector::build(self.profile, &features).map_err(|e| {
            log::warn!("pipeline: cannot build '{}' input: {e}", self.profile.key);
            e
        })?;

        // ── 4. Scoring (blocking → thread pool) ──────────────────────────
        self.set_pipeline(PipelineState::Scoring);
        let engine = Arc::clone(&self.engine);
        let probability =
            tokio::task::spawn_blocking(move || lock(&engine).predict(&vector)).await??;

        Ok(AnalysisReport {
            profile: self.profile.kind,
            probability,
            features,
            audio_path: audio.to_path_buf(),
        })
    }

    // -----------------------------------------------------------------------
    // Shutdown
    // -----------------------------------------------------------------------

    /// Stop any recording (discarding it) and close the model.
    pub async fn shutdown(&self) {
        let recorder = Arc::clone(&self.recorder);
        let engine = Arc::clone(&self.engine);
        let closed = tokio::task::spawn_blocking(move || {
            lock(&recorder).close();
            lock(&engine).close();
        })
        .await;
        if let Err(e) = closed {
            log::warn!("pipeline: shutdown task failed: {e}");
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn set_pipeline(&self, state: PipelineState) {
        lock(&self.state).pipeline = state;
    }

    /// Record `error` in the shared state and hand it back.
    fn fail(&self, error: PipelineError) -> PipelineError {
        let message = error.to_string();
        log::error!("pipeline error: {message}");
        let mut st = lock(&self.state);
        st.pipeline = PipelineState::Error;
        st.last_report = None;
        st.error_message = Some(message);
        error
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
