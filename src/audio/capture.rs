//! Microphone capture via `cpal`.
//!
//! [`CpalMicrophone`] implements [`DeviceOpener`] on top of the default (or
//! a named) input device. Opening builds and starts a cpal input stream whose
//! callback forwards raw interleaved `f32` buffers over an mpsc channel;
//! [`InputDevice::read`] drains that channel, downmixes each buffer, feeds it
//! through one [`StreamResampler`] kept for the whole session and hands out
//! 16-bit PCM bytes.
//!
//! The stream handle stays inside the returned device, which the recorder
//! keeps on its capture thread for the whole session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use super::convert::{downmix, encode_pcm16le, ResamplerError, StreamResampler};
use super::device::{DeviceError, DeviceOpener, InputDevice};
use super::wav::PcmFormat;

/// How long a single [`InputDevice::read`] waits for the hardware.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Audio the device should be able to hand over per read (20 ms).
const MIN_BUFFER_MS: u32 = 20;

// ---------------------------------------------------------------------------
// CpalMicrophone
// ---------------------------------------------------------------------------

/// Opens cpal input streams on the system audio host.
#[derive(Debug, Clone, Default)]
pub struct CpalMicrophone {
    /// Input device name; `None` selects the host default.
    device_name: Option<String>,
}

impl CpalMicrophone {
    /// Use the host's default input device.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the input device whose cpal name equals `name`.
    pub fn with_device_name(name: impl Into<String>) -> Self {
        Self {
            device_name: Some(name.into()),
        }
    }

    fn find_device(&self, host: &cpal::Host) -> Result<cpal::Device, DeviceError> {
        match &self.device_name {
            None => host.default_input_device().ok_or(DeviceError::NoDevice),
            Some(wanted) => host
                .input_devices()
                .map_err(|e| DeviceError::Init(e.to_string()))?
                .find(|d| d.name().map(|n| n == *wanted).unwrap_or(false))
                .ok_or(DeviceError::NoDevice),
        }
    }
}

impl DeviceOpener for CpalMicrophone {
    fn open(&self, format: PcmFormat) -> Result<Box<dyn InputDevice>, DeviceError> {
        let host = cpal::default_host();
        let device = self.find_device(&host)?;

        let supported = device
            .default_input_config()
            .map_err(|e| DeviceError::Init(e.to_string()))?;
        let sample_format = supported.sample_format();
        let native_rate = supported.sample_rate().0;
        let channels = supported.channels();
        let config: cpal::StreamConfig = supported.into();
        let resampler = StreamResampler::new(native_rate, format.sample_rate)
            .map_err(|e| DeviceError::Init(e.to_string()))?;

        let (tx, rx) = mpsc::channel::<Vec<f32>>();
        let failed = Arc::new(AtomicBool::new(false));

        let stream = match sample_format {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, tx, Arc::clone(&failed)),
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, tx, Arc::clone(&failed)),
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, tx, Arc::clone(&failed)),
            other => {
                return Err(DeviceError::Init(format!(
                    "unsupported sample format: {other:?}"
                )))
            }
        }?;

        stream
            .play()
            .map_err(|e| DeviceError::Init(e.to_string()))?;

        log::info!(
            "capture: microphone opened ({} Hz, {} ch, {:?}) → {} Hz mono",
            native_rate,
            channels,
            sample_format,
            format.sample_rate
        );

        Ok(Box::new(CpalInput {
            stream: Some(stream),
            rx,
            failed,
            resampler,
            channels,
            format,
            pending: Vec::new(),
        }))
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    tx: mpsc::Sender<Vec<f32>>,
    failed: Arc<AtomicBool>,
) -> Result<cpal::Stream, DeviceError>
where
    T: cpal::SizedSample,
    f32: cpal::FromSample<T>,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let samples = data
                    .iter()
                    .map(|&s| <f32 as cpal::FromSample<T>>::from_sample_(s))
                    .collect();
                // Receiver gone means the session is over.
                let _ = tx.send(samples);
            },
            move |err: cpal::StreamError| {
                log::error!("capture: cpal stream error: {err}");
                failed.store(true, Ordering::Release);
            },
            None,
        )
        .map_err(|e| DeviceError::Init(e.to_string()))
}

// ---------------------------------------------------------------------------
// CpalInput
// ---------------------------------------------------------------------------

/// A running cpal stream plus the conversion state for one session.
struct CpalInput {
    stream: Option<cpal::Stream>,
    rx: mpsc::Receiver<Vec<f32>>,
    failed: Arc<AtomicBool>,
    resampler: StreamResampler,
    channels: u16,
    format: PcmFormat,
    /// Converted bytes not yet handed out.
    pending: Vec<u8>,
}

impl CpalInput {
    fn convert(&mut self, raw: &[f32]) -> Result<(), ResamplerError> {
        let mono = downmix(raw, self.channels);
        let resampled = self.resampler.process(&mono)?;
        encode_pcm16le(&resampled, &mut self.pending);
        Ok(())
    }
}

impl InputDevice for CpalInput {
    fn min_buffer_bytes(&self) -> usize {
        (self.format.byte_rate() * MIN_BUFFER_MS / 1_000) as usize
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, DeviceError> {
        if self.failed.load(Ordering::Acquire) {
            return Err(DeviceError::Read("stream reported an error".into()));
        }

        if self.pending.is_empty() {
            match self.rx.recv_timeout(POLL_INTERVAL) {
                Ok(raw) => self.convert(&raw).map_err(|e| DeviceError::Read(e.to_string()))?,
                Err(RecvTimeoutError::Timeout) => return Ok(0),
                Err(RecvTimeoutError::Disconnected) => return Err(DeviceError::Disconnected),
            }
            // Pick up whatever else queued while converting.
            while let Ok(raw) = self.rx.try_recv() {
                self.convert(&raw).map_err(|e| DeviceError::Read(e.to_string()))?;
            }
        }

        // Keep whole samples together.
        let align = usize::from(self.format.block_align()).max(1);
        let n = (buf.len().min(self.pending.len()) / align) * align;
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }

    fn release(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                log::debug!("capture: failed to pause stream: {e}");
            }
            drop(stream);
            log::debug!("capture: microphone released");
        }
    }
}

impl Drop for CpalInput {
    fn drop(&mut self) {
        self.release();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opener_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CpalMicrophone>();
    }

    /// An input fed from a plain channel, without a cpal stream.
    fn detached_input(native_rate: u32, channels: u16) -> (mpsc::Sender<Vec<f32>>, CpalInput) {
        let (tx, rx) = mpsc::channel();
        let input = CpalInput {
            stream: None,
            rx,
            failed: Arc::new(AtomicBool::new(false)),
            resampler: StreamResampler::new(native_rate, 16_000).unwrap(),
            channels,
            format: PcmFormat::SPEECH,
            pending: Vec::new(),
        };
        (tx, input)
    }

    fn drain(input: &mut CpalInput) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = vec![0u8; 4_096];
        loop {
            match input.read(&mut buf) {
                Ok(0) => return out,
                Ok(n) => out.extend_from_slice(&buf[..n]),
                Err(e) => panic!("read failed: {e}"),
            }
        }
    }

    #[test]
    fn resampler_state_carries_across_reads() {
        // 1 s of 44.1 kHz stereo delivered as 512-frame callbacks.
        let frames: Vec<f32> = (0..44_100)
            .map(|i| 0.5 * (i as f32 * 0.0625).sin())
            .flat_map(|s| [s, s])
            .collect();
        let (tx, mut input) = detached_input(44_100, 2);
        for cb in frames.chunks(1_024) {
            tx.send(cb.to_vec()).unwrap();
        }
        let bytes = drain(&mut input);

        let mono = downmix(&frames, 2);
        let mut expected = Vec::new();
        let whole = StreamResampler::new(44_100, 16_000).unwrap().process(&mono).unwrap();
        encode_pcm16le(&whole, &mut expected);

        assert_eq!(bytes, expected);
        assert!(bytes.len() / 2 <= 16_000);
    }

    #[test]
    fn stream_failure_surfaces_as_read_error() {
        let (_tx, mut input) = detached_input(16_000, 1);
        input.failed.store(true, Ordering::Release);
        assert!(matches!(input.read(&mut [0u8; 64]), Err(DeviceError::Read(_))));
    }

    #[test]
    fn named_device_is_kept() {
        let mic = CpalMicrophone::with_device_name("USB Mic");
        assert_eq!(mic.device_name.as_deref(), Some("USB Mic"));
        assert!(CpalMicrophone::new().device_name.is_none());
    }
}
