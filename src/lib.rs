//! Voice screening: record a speech sample, extract acoustic features and
//! score them with a pre-trained classifier.
//!
//! ```text
//! microphone ─▶ audio::WavRecorder ─▶ speech_recording.wav
//!                                          │
//!                      features::FeatureExtractor (external program)
//!                                          │
//!                          features::FeatureVector (profile order)
//!                                          │
//!                          inference::InferenceEngine ─▶ Probability
//! ```
//!
//! [`pipeline::PipelineOrchestrator`] sequences the steps and publishes
//! progress through a shared [`pipeline::AppState`].

pub mod audio;
pub mod config;
pub mod features;
pub mod inference;
pub mod pipeline;
