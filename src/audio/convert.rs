//! Sample conversion from the device's native stream to recording PCM.
//!
//! cpal delivers interleaved `f32` frames at whatever rate the hardware
//! prefers. Recordings are 16 kHz mono signed 16-bit, so every chunk goes
//! through three steps:
//!
//! 1. [`downmix`]: average interleaved channels into mono.
//! 2. [`StreamResampler`]: band-limited sinc resampling to the target rate.
//! 3. [`encode_pcm16le`]: clamp, scale and append little-endian bytes.
//!
//! The resampler is stateful. Device buffers of any size are queued and fed
//! to `rubato` in fixed blocks, so the output is the same as resampling the
//! whole stream at once: no phase reset or rounding at buffer boundaries.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use thiserror::Error;

/// Input frames handed to the sinc resampler per block.
const BLOCK_FRAMES: usize = 1_024;

/// Average interleaved `channels` down to a single channel.
///
/// Trailing samples that do not form a complete frame are dropped.
///
/// ```rust
/// use voice_screening::audio::convert::downmix;
///
/// let stereo = [0.5_f32, -0.5, 0.2, 0.4];
/// let mono = downmix(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[1] - 0.3).abs() < 1e-6);
/// ```
pub fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = usize::from(n);
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// StreamResampler
// ---------------------------------------------------------------------------

/// Errors from [`StreamResampler`].
#[derive(Debug, Error)]
pub enum ResamplerError {
    #[error("cannot resample {from} Hz to {to} Hz")]
    InvalidRate { from: u32, to: u32 },

    #[error("resampler setup failed: {0}")]
    Construction(#[from] rubato::ResamplerConstructionError),

    #[error("resampling failed: {0}")]
    Process(#[from] rubato::ResampleError),
}

/// Mono sample-rate converter fed one device buffer at a time.
///
/// Input that does not fill a whole block waits for the next call, so up to
/// one block (about 21 ms at 48 kHz) is still queued when capture stops.
/// The filter's group delay is trimmed from the start of the output.
pub struct StreamResampler {
    /// `None` when the rates already match.
    sinc: Option<SincFixedIn<f32>>,
    /// Input not yet handed to the resampler.
    queued: Vec<f32>,
    /// Leading output frames still to drop.
    skip: usize,
}

impl StreamResampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Result<Self, ResamplerError> {
        if from_rate == 0 || to_rate == 0 {
            return Err(ResamplerError::InvalidRate {
                from: from_rate,
                to: to_rate,
            });
        }
        if from_rate == to_rate {
            return Ok(Self {
                sinc: None,
                queued: Vec::new(),
                skip: 0,
            });
        }

        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };
        let ratio = f64::from(to_rate) / f64::from(from_rate);
        let sinc = SincFixedIn::<f32>::new(ratio, 2.0, params, BLOCK_FRAMES, 1)?;
        let skip = sinc.output_delay();

        log::debug!("capture: resampling {from_rate} Hz → {to_rate} Hz (delay {skip} frames)");
        Ok(Self {
            sinc: Some(sinc),
            queued: Vec::with_capacity(BLOCK_FRAMES * 2),
            skip,
        })
    }

    /// Whether the rates differ.
    pub fn is_active(&self) -> bool {
        self.sinc.is_some()
    }

    /// Queue `samples` and return every output frame that is now complete.
    pub fn process(&mut self, samples: &[f32]) -> Result<Vec<f32>, ResamplerError> {
        let Some(sinc) = self.sinc.as_mut() else {
            return Ok(samples.to_vec());
        };
        self.queued.extend_from_slice(samples);

        let mut out = Vec::new();
        let mut consumed = 0;
        loop {
            let need = sinc.input_frames_next();
            if self.queued.len() - consumed < need {
                break;
            }
            let block = &self.queued[consumed..consumed + need];
            let produced = sinc.process(&[block], None)?;
            out.extend_from_slice(&produced[0]);
            consumed += need;
        }
        self.queued.drain(..consumed);

        if self.skip > 0 {
            let n = self.skip.min(out.len());
            out.drain(..n);
            self.skip -= n;
        }
        Ok(out)
    }
}

/// Convert `[-1.0, 1.0]` float samples to signed 16-bit little-endian PCM
/// and append them to `out`. Out-of-range input is clamped.
pub fn encode_pcm16le(samples: &[f32], out: &mut Vec<u8>) {
    out.reserve(samples.len() * 2);
    for &s in samples {
        let v = (s.clamp(-1.0, 1.0) * f32::from(i16::MAX)).round() as i16;
        out.extend_from_slice(&v.to_le_bytes());
    }
}
