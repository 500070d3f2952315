//! Pipeline orchestrator module.
//!
//! This module wires recording → feature extraction → scoring and exposes
//! the shared state a front-end reads.
//!
//! # Architecture
//!
//! ```text
//! PipelineCommand (mpsc) ──▶ PipelineOrchestrator::run()  ← async tokio task
//!                                   │
//!                                   ├─ StartRecording  → WavRecorder::start      [Recording]
//!                                   ├─ StopAndAnalyze  → WavRecorder::stop ─┐
//!                                   └─ Analyze(path)   ─────────────────────┤
//!                                                                           ▼
//!                     FeatureExtractor (async) → FeatureVector → InferenceEngine
//!
//! SharedState (Arc<Mutex<AppState>>) ←─── read by the CLI / any front-end
//! ```

pub mod runner;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use runner::{PipelineCommand, PipelineError, PipelineOrchestrator};
pub use state::{new_shared_state, AnalysisReport, AppState, PipelineState, SharedState};
