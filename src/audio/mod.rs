//! Audio capture: microphone → 16 kHz mono PCM16 → WAV file on disk.
//!
//! # Pipeline
//!
//! ```text
//! cpal callback (f32, native rate/channels)
//!        │  mpsc
//!        ▼
//! CpalInput::read → downmix → StreamResampler (rubato) → encode_pcm16le
//!        │
//!        ▼
//! WavRecorder capture thread → [44 zero bytes][PCM …] → header on stop
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use voice_screening::audio::{CpalMicrophone, RecorderConfig, WavRecorder};
//!
//! let mut recorder = WavRecorder::new(Arc::new(CpalMicrophone::new()), RecorderConfig::default());
//! recorder.start("speech_recording.wav").unwrap();
//! // ... speak ...
//! if let Some(recording) = recorder.stop().unwrap() {
//!     println!("{} ({:?})", recording.path.display(), recording.duration());
//! }
//! ```

pub mod capture;
pub mod convert;
pub mod device;
pub mod recorder;
pub mod wav;

pub use capture::CpalMicrophone;
pub use device::{DeviceError, DeviceOpener, InputDevice};
pub use recorder::{CaptureError, RecordedAudio, RecorderConfig, SessionState, WavRecorder};
pub use wav::{HeaderError, PcmFormat, WavHeader};

#[cfg(test)]
pub use device::ScriptedOpener;
