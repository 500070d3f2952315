//! Microphone → WAV file recorder.
//!
//! [`WavRecorder`] owns at most one [`CaptureSession`]. A session is a
//! dedicated `audio-capture` thread that opens the input device, reads one
//! buffer at a time and appends the raw bytes straight to the target file.
//! [`WavRecorder::stop`] cancels the thread, waits a bounded time for it,
//! and then writes the canonical header once the final payload size is
//! known.
//!
//! # Session lifecycle
//!
//! ```text
//! Idle ──start──▶ Recording ──stop──▶ Finalizing ──▶ Closed
//!   ▲                                     │
//!   └──────── device / write failure ─────┘
//! ```
//!
//! The controlling thread and the capture thread share only the
//! cancellation flag and the target file (behind a mutex). The controller
//! takes the file out of the mutex before finalizing, so a capture thread
//! that outlived the join timeout can never write past the header.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use thiserror::Error;

use crate::config::CaptureConfig;

use super::device::{DeviceError, DeviceOpener, InputDevice};
use super::wav::{self, PcmFormat, WavHeader, HEADER_LEN};

/// Floor for the capture read buffer, whatever the device reports.
pub const MIN_CAPTURE_BUFFER: usize = 4_096;

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors surfaced by [`WavRecorder`].
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The input device could not be opened or started. Recoverable: the
    /// recorder is back in `Idle` and `start` may be retried.
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(#[source] DeviceError),

    /// `start` was called while a session is already recording.
    #[error("a recording session is already active")]
    AlreadyRecording,

    /// Creating, writing or finalizing the target file failed. The partial
    /// file has been discarded.
    #[error("failed to write recording: {0}")]
    WriteFailure(#[source] io::Error),

    /// No audio reached the file. The file has been discarded.
    #[error("recording contains no audio")]
    EmptyRecording,
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Phase of the recorder's current (or last) session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No session, or the last one failed.
    #[default]
    Idle,
    /// The capture thread is appending audio to the target file.
    Recording,
    /// `stop` is joining the thread and writing the header.
    Finalizing,
    /// The last session produced a valid file.
    Closed,
}

// ---------------------------------------------------------------------------
// RecorderConfig
// ---------------------------------------------------------------------------

/// Tuning knobs for [`WavRecorder`].
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Format requested from the device and declared in the header.
    pub format: PcmFormat,
    /// Lower bound for the read buffer size in bytes.
    pub min_buffer_bytes: usize,
    /// How long `stop` waits for the capture thread before moving on.
    pub join_timeout: Duration,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            format: PcmFormat::SPEECH,
            min_buffer_bytes: MIN_CAPTURE_BUFFER,
            join_timeout: Duration::from_millis(1_500),
        }
    }
}

impl From<&CaptureConfig> for RecorderConfig {
    fn from(cfg: &CaptureConfig) -> Self {
        Self {
            format: PcmFormat::mono_16bit(cfg.sample_rate),
            min_buffer_bytes: cfg.min_buffer_bytes.max(MIN_CAPTURE_BUFFER),
            join_timeout: Duration::from_millis(cfg.join_timeout_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// RecordedAudio
// ---------------------------------------------------------------------------

/// A finalized recording on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedAudio {
    pub path: PathBuf,
    pub header: WavHeader,
}

impl RecordedAudio {
    /// Number of PCM bytes following the header.
    pub fn payload_bytes(&self) -> u32 {
        self.header.data_len
    }

    /// Length of the recorded audio.
    pub fn duration(&self) -> Duration {
        let rate = u64::from(self.header.format.byte_rate()).max(1);
        Duration::from_micros(u64::from(self.header.data_len) * 1_000_000 / rate)
    }
}

// ---------------------------------------------------------------------------
// CaptureSession
// ---------------------------------------------------------------------------

/// File state shared between the controller and the capture thread.
#[derive(Debug, Default)]
struct PayloadSink {
    /// `None` once the controller has taken the file for finalizing.
    file: Option<File>,
    /// Bytes of PCM successfully appended after the header.
    payload_bytes: u64,
    /// First write error hit by the capture thread.
    write_error: Option<io::Error>,
}

type SharedSink = Arc<Mutex<PayloadSink>>;

/// One active recording.
struct CaptureSession {
    path: PathBuf,
    cancel: Arc<AtomicBool>,
    sink: SharedSink,
    done_rx: mpsc::Receiver<()>,
    thread: JoinHandle<()>,
}

/// What the capture thread reports after trying to open the device.
type ReadyResult = Result<usize, DeviceError>;

// ---------------------------------------------------------------------------
// WavRecorder
// ---------------------------------------------------------------------------

/// Records the microphone into a self-describing WAV file.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use voice_screening::audio::{CpalMicrophone, RecorderConfig, WavRecorder};
///
/// let mut recorder = WavRecorder::new(Arc::new(CpalMicrophone::new()), RecorderConfig::default());
/// recorder.start("speech_recording.wav").unwrap();
/// std::thread::sleep(std::time::Duration::from_secs(3));
/// let recording = recorder.stop().unwrap().expect("was recording");
/// println!("{} bytes of PCM", recording.payload_bytes());
/// ```
pub struct WavRecorder {
    opener: Arc<dyn DeviceOpener>,
    config: RecorderConfig,
    state: SessionState,
    session: Option<CaptureSession>,
}

impl WavRecorder {
    pub fn new(opener: Arc<dyn DeviceOpener>, config: RecorderConfig) -> Self {
        Self {
            opener,
            config,
            state: SessionState::Idle,
            session: None,
        }
    }

    /// Current session phase.
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == SessionState::Recording
    }

    /// PCM bytes written so far in the active session (0 when idle).
    pub fn bytes_captured(&self) -> u64 {
        self.session
            .as_ref()
            .map(|s| lock_sink(&s.sink).payload_bytes)
            .unwrap_or(0)
    }

    /// Target path of the active session.
    pub fn target_path(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.path.as_path())
    }

    /// Begin recording into `target`, truncating any existing file.
    ///
    /// The device is opened on the capture thread first; the file is only
    /// created once the device is running, so a missing microphone leaves
    /// the target untouched.
    ///
    /// # Errors
    ///
    /// - [`CaptureError::AlreadyRecording`]: a session is active.
    /// - [`CaptureError::DeviceUnavailable`]: the device failed to open.
    /// - [`CaptureError::WriteFailure`]: the target file could not be
    ///   prepared; the device has been released.
    pub fn start(&mut self, target: impl AsRef<Path>) -> Result<(), CaptureError> {
        if self.session.is_some() {
            return Err(CaptureError::AlreadyRecording);
        }
        let path = target.as_ref().to_path_buf();

        let cancel = Arc::new(AtomicBool::new(false));
        let sink: SharedSink = Arc::new(Mutex::new(PayloadSink::default()));
        let (ready_tx, ready_rx) = mpsc::sync_channel::<ReadyResult>(1);
        let (go_tx, go_rx) = mpsc::sync_channel::<bool>(1);
        let (done_tx, done_rx) = mpsc::sync_channel::<()>(1);

        let thread = {
            let opener = Arc::clone(&self.opener);
            let cancel = Arc::clone(&cancel);
            let sink = Arc::clone(&sink);
            let format = self.config.format;
            let floor = self.config.min_buffer_bytes;

            std::thread::Builder::new()
                .name("audio-capture".into())
                .spawn(move || {
                    run_capture_thread(opener.as_ref(), format, floor, &cancel, &sink, ready_tx, go_rx);
                    let _ = done_tx.send(());
                })
                .map_err(|e| CaptureError::DeviceUnavailable(DeviceError::Init(e.to_string())))?
        };

        let buffer_bytes = match ready_rx.recv() {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                let _ = thread.join();
                log::warn!("capture: device unavailable: {e}");
                return Err(CaptureError::DeviceUnavailable(e));
            }
            Err(_) => {
                let _ = thread.join();
                return Err(CaptureError::DeviceUnavailable(DeviceError::Init(
                    "capture thread exited during start-up".into(),
                )));
            }
        };

        let file = match create_target(&path) {
            Ok(file) => file,
            Err(e) => {
                let _ = go_tx.send(false);
                let _ = thread.join();
                return Err(CaptureError::WriteFailure(e));
            }
        };
        lock_sink(&sink).file = Some(file);
        let _ = go_tx.send(true);

        log::info!(
            "capture: recording started → {} ({} byte buffer)",
            path.display(),
            buffer_bytes
        );

        self.session = Some(CaptureSession {
            path,
            cancel,
            sink,
            done_rx,
            thread,
        });
        self.state = SessionState::Recording;
        Ok(())
    }

    /// Stop recording and finalize the file.
    ///
    /// Returns `Ok(None)` when no session is active. Otherwise the capture
    /// thread is cancelled and joined (bounded by the configured timeout),
    /// and the header is written with the final payload size.
    ///
    /// # Errors
    ///
    /// - [`CaptureError::EmptyRecording`]: nothing was captured; the file
    ///   has been deleted.
    /// - [`CaptureError::WriteFailure`]: writing audio or the header
    ///   failed; the file has been deleted.
    pub fn stop(&mut self) -> Result<Option<RecordedAudio>, CaptureError> {
        let Some(session) = self.session.take() else {
            return Ok(None);
        };
        self.state = SessionState::Finalizing;

        session.cancel.store(true, Ordering::Release);
        match session.done_rx.recv_timeout(self.config.join_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if session.thread.join().is_err() {
                    log::warn!("capture: capture thread panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "capture: thread did not finish within {:?}; finalizing anyway",
                    self.config.join_timeout
                );
            }
        }

        let (file, payload_bytes, write_error) = {
            let mut sink = lock_sink(&session.sink);
            (sink.file.take(), sink.payload_bytes, sink.write_error.take())
        };

        let result = match (file, write_error) {
            (_, Some(e)) => Err(CaptureError::WriteFailure(e)),
            (None, None) => Err(CaptureError::WriteFailure(io::Error::new(
                io::ErrorKind::Other,
                "recording file was not available",
            ))),
            (Some(_), None) if payload_bytes == 0 => Err(CaptureError::EmptyRecording),
            (Some(file), None) => finalize(file, self.config.format, payload_bytes)
                .map_err(CaptureError::WriteFailure),
        };

        match result {
            Ok(header) => {
                log::info!(
                    "capture: recording stopped → {} ({} bytes of PCM)",
                    session.path.display(),
                    header.data_len
                );
                self.state = SessionState::Closed;
                Ok(Some(RecordedAudio {
                    path: session.path,
                    header,
                }))
            }
            Err(e) => {
                discard(&session.path);
                log::warn!("capture: recording discarded: {e}");
                self.state = SessionState::Idle;
                Err(e)
            }
        }
    }

    /// Stop any active session, discarding its outcome.
    pub fn close(&mut self) {
        if let Err(e) = self.stop() {
            log::debug!("capture: session closed with {e}");
        }
    }
}

impl Drop for WavRecorder {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// Capture thread
// ---------------------------------------------------------------------------

fn run_capture_thread(
    opener: &dyn DeviceOpener,
    format: PcmFormat,
    buffer_floor: usize,
    cancel: &AtomicBool,
    sink: &Mutex<PayloadSink>,
    ready_tx: mpsc::SyncSender<ReadyResult>,
    go_rx: mpsc::Receiver<bool>,
) {
    let mut device = match opener.open(format) {
        Ok(device) => device,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    let buffer_bytes = device.min_buffer_bytes().max(buffer_floor);
    if ready_tx.send(Ok(buffer_bytes)).is_ok() && go_rx.recv().unwrap_or(false) {
        capture_loop(device.as_mut(), buffer_bytes, cancel, sink);
    }

    device.release();
}

/// Read one buffer at a time and append it to the file until cancelled,
/// the device fails, or a write fails.
fn capture_loop(
    device: &mut dyn InputDevice,
    buffer_bytes: usize,
    cancel: &AtomicBool,
    sink: &Mutex<PayloadSink>,
) {
    let mut buffer = vec![0u8; buffer_bytes];

    while !cancel.load(Ordering::Acquire) {
        let n = match device.read(&mut buffer) {
            Ok(0) => continue,
            Ok(n) => n,
            Err(e) => {
                log::warn!("capture: device error, ending capture: {e}");
                break;
            }
        };

        let mut sink = lock_sink(sink);
        let PayloadSink {
            file,
            payload_bytes,
            write_error,
        } = &mut *sink;
        let Some(file) = file.as_mut() else {
            break;
        };
        if let Err(e) = file.write_all(&buffer[..n]) {
            log::warn!("capture: write failed: {e}");
            *write_error = Some(e);
            break;
        }
        *payload_bytes += n as u64;
    }
}

// ---------------------------------------------------------------------------
// File helpers
// ---------------------------------------------------------------------------

/// Create/truncate the target and reserve the header with zero bytes.
fn create_target(path: &Path) -> io::Result<File> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    file.write_all(&[0u8; HEADER_LEN])?;
    Ok(file)
}

fn finalize(mut file: File, format: PcmFormat, payload_bytes: u64) -> io::Result<WavHeader> {
    let data_len = u32::try_from(payload_bytes)
        .ok()
        .filter(|len| len.checked_add(HEADER_LEN as u32).is_some())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{payload_bytes} bytes of PCM exceed the container limit"),
            )
        })?;

    let header = WavHeader::new(format, data_len);
    wav::write_header(&mut file, &header)?;
    file.sync_all()?;
    log::debug!(
        "capture: header written (riff={}, data={})",
        header.riff_len(),
        header.data_len
    );
    Ok(header)
}

fn discard(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("capture: could not remove {}: {e}", path.display()),
    }
}

fn lock_sink(sink: &Mutex<PayloadSink>) -> std::sync::MutexGuard<'_, PayloadSink> {
    sink.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use tempfile::tempdir;

    use super::*;
    use crate::audio::device::ScriptedOpener;

    /// `samples` of a ramp as little-endian PCM16, split into `chunk` sized
    /// pieces.
    fn pcm_chunks(samples: usize, chunk: usize) -> Vec<Vec<u8>> {
        let bytes: Vec<u8> = (0..samples)
            .flat_map(|i| ((i % 1_000) as i16).to_le_bytes())
            .collect();
        bytes.chunks(chunk).map(|c| c.to_vec()).collect()
    }

    fn recorder(opener: &ScriptedOpener) -> WavRecorder {
        WavRecorder::new(Arc::new(opener.clone()), RecorderConfig::default())
    }

    fn wait_for_bytes(rec: &WavRecorder, expected: u64) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while rec.bytes_captured() < expected && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    fn wait_for_release(opener: &ScriptedOpener) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while opener.release_count() == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn header_matches_written_payload() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("take.wav");

        // 0.5 s @ 16 kHz mono 16-bit = 16 000 bytes, uneven chunk size.
        let opener = ScriptedOpener::with_chunks(pcm_chunks(8_000, 1_000));
        let mut rec = recorder(&opener);

        rec.start(&path).unwrap();
        assert_eq!(rec.state(), SessionState::Recording);
        wait_for_bytes(&rec, 16_000);

        let recording = rec.stop().unwrap().expect("session was active");
        assert_eq!(rec.state(), SessionState::Closed);
        assert_eq!(recording.payload_bytes(), 16_000);
        assert_eq!(recording.duration(), Duration::from_millis(500));

        let file_len = std::fs::metadata(&path).unwrap().len();
        let header = wav::validate_file(&path).unwrap();
        assert_eq!(u64::from(header.data_len), file_len - HEADER_LEN as u64);
        assert_eq!(u64::from(header.riff_len()), file_len - 8);
        assert_eq!(header.format, PcmFormat::SPEECH);
    }

    #[test]
    fn finalized_file_reads_back_as_wav() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("readback.wav");

        let opener = ScriptedOpener::with_chunks(pcm_chunks(1_600, 640));
        let mut rec = recorder(&opener);
        rec.start(&path).unwrap();
        wait_for_bytes(&rec, 3_200);
        rec.stop().unwrap();

        let reader = hound::WavReader::open(&path).expect("valid wav");
        let spec = reader.spec();
        assert_eq!(spec.sample_rate, 16_000);
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.bits_per_sample, 16);

        let samples: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), 1_600);
        assert_eq!(samples[999], 999);
        assert_eq!(samples[1_000], 0);
    }

    #[test]
    fn empty_recording_is_discarded() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("empty.wav");

        let opener = ScriptedOpener::with_chunks(Vec::new());
        let mut rec = recorder(&opener);
        rec.start(&path).unwrap();
        assert!(path.exists(), "header space is reserved on start");

        let err = rec.stop().unwrap_err();
        assert!(matches!(err, CaptureError::EmptyRecording));
        assert!(!path.exists());
        assert_eq!(rec.state(), SessionState::Idle);
        assert_eq!(opener.release_count(), 1);
    }

    #[test]
    fn device_unavailable_leaves_target_untouched() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("keep.wav");
        std::fs::write(&path, b"previous").unwrap();

        let mut rec = recorder(&ScriptedOpener::unavailable());
        let err = rec.start(&path).unwrap_err();

        assert!(matches!(
            err,
            CaptureError::DeviceUnavailable(DeviceError::NoDevice)
        ));
        assert_eq!(rec.state(), SessionState::Idle);
        assert_eq!(std::fs::read(&path).unwrap(), b"previous");
    }

    #[test]
    fn start_can_be_retried_after_device_failure() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("retry.wav");

        let mut rec = recorder(&ScriptedOpener::unavailable());
        assert!(rec.start(&path).is_err());

        rec.opener = Arc::new(ScriptedOpener::with_chunks(pcm_chunks(100, 200)));
        rec.start(&path).unwrap();
        wait_for_bytes(&rec, 200);
        assert_eq!(rec.stop().unwrap().unwrap().payload_bytes(), 200);
    }

    #[test]
    fn second_start_is_rejected() {
        let dir = tempdir().expect("temp dir");
        let opener = ScriptedOpener::with_chunks(pcm_chunks(100, 200));
        let mut rec = recorder(&opener);

        rec.start(dir.path().join("a.wav")).unwrap();
        let err = rec.start(dir.path().join("b.wav")).unwrap_err();
        assert!(matches!(err, CaptureError::AlreadyRecording));
        assert_eq!(opener.opens.load(Ordering::SeqCst), 1);

        rec.stop().unwrap();
    }

    #[test]
    fn stop_when_idle_is_noop() {
        let mut rec = recorder(&ScriptedOpener::with_chunks(Vec::new()));
        assert!(rec.stop().unwrap().is_none());
        assert!(rec.stop().unwrap().is_none());
        assert_eq!(rec.state(), SessionState::Idle);
    }

    #[test]
    fn device_error_keeps_captured_audio() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("cut.wav");

        let opener = ScriptedOpener::with_chunks(pcm_chunks(500, 1_000)).then_fail();
        let mut rec = recorder(&opener);
        rec.start(&path).unwrap();
        wait_for_release(&opener);

        let recording = rec.stop().unwrap().unwrap();
        assert_eq!(recording.payload_bytes(), 1_000);
        assert_eq!(opener.release_count(), 1);
    }

    #[test]
    fn device_released_exactly_once() {
        let dir = tempdir().expect("temp dir");
        let opener = ScriptedOpener::with_chunks(pcm_chunks(100, 200));
        let mut rec = recorder(&opener);

        rec.start(dir.path().join("once.wav")).unwrap();
        wait_for_bytes(&rec, 200);
        rec.stop().unwrap();
        rec.stop().unwrap();

        assert_eq!(opener.release_count(), 1);
    }

    #[test]
    fn stop_does_not_hang_on_slow_device() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("slow.wav");

        let opener = ScriptedOpener::with_chunks(pcm_chunks(100, 200))
            .with_read_delay(Duration::from_millis(800));
        let config = RecorderConfig {
            join_timeout: Duration::from_millis(50),
            ..RecorderConfig::default()
        };
        let mut rec = WavRecorder::new(Arc::new(opener.clone()), config);

        rec.start(&path).unwrap();
        let started = Instant::now();
        let result = rec.stop();
        assert!(started.elapsed() < Duration::from_millis(700));

        // The first read is still sleeping, so nothing reached the file.
        assert!(matches!(result, Err(CaptureError::EmptyRecording)));
        assert!(!path.exists());

        // The thread releases the device once its read returns.
        wait_for_release(&opener);
        assert_eq!(opener.release_count(), 1);
    }

    #[test]
    fn buffer_respects_floor() {
        let dir = tempdir().expect("temp dir");
        // The device asks for 16 bytes; every read must still be handed a
        // MIN_CAPTURE_BUFFER sized buffer.
        let opener = ScriptedOpener::with_chunks(vec![vec![1u8; 10_000]]).with_min_buffer(16);
        let mut rec = recorder(&opener);

        rec.start(dir.path().join("floor.wav")).unwrap();
        wait_for_bytes(&rec, 10_000);
        assert_eq!(rec.stop().unwrap().unwrap().payload_bytes(), 10_000);

        let sizes = opener.read_sizes();
        // 10 000 bytes cannot arrive in fewer than three 4096 byte reads.
        assert!(sizes.len() >= 3, "{sizes:?}");
        assert!(sizes.iter().all(|&n| n == MIN_CAPTURE_BUFFER), "{sizes:?}");
    }

    #[test]
    fn larger_device_minimum_wins_over_floor() {
        let dir = tempdir().expect("temp dir");
        let opener = ScriptedOpener::with_chunks(vec![vec![1u8; 10_000]]).with_min_buffer(8_192);
        let mut rec = recorder(&opener);

        rec.start(dir.path().join("large.wav")).unwrap();
        wait_for_bytes(&rec, 10_000);
        rec.stop().unwrap();

        let sizes = opener.read_sizes();
        assert!(!sizes.is_empty());
        assert!(sizes.iter().all(|&n| n == 8_192), "{sizes:?}");
    }

    #[test]
    fn unwritable_target_releases_device() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("missing").join("take.wav");

        let opener = ScriptedOpener::with_chunks(pcm_chunks(100, 200));
        let mut rec = recorder(&opener);
        let err = rec.start(&path).unwrap_err();

        assert!(matches!(err, CaptureError::WriteFailure(_)));
        assert_eq!(rec.state(), SessionState::Idle);
        assert!(rec.target_path().is_none());
        // start() joins the capture thread before returning.
        assert_eq!(opener.opens.load(Ordering::SeqCst), 1);
        assert_eq!(opener.release_count(), 1);
        assert!(opener.read_sizes().is_empty(), "no audio read without a file");
        assert!(!path.exists());

        // The recorder can start again once the target is writable.
        let ok = dir.path().join("take.wav");
        rec.start(&ok).unwrap();
        wait_for_bytes(&rec, 200);
        assert_eq!(rec.stop().unwrap().unwrap().payload_bytes(), 200);
    }

    #[test]
    fn write_failure_mid_recording_discards_file() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("broken.wav");

        let opener = ScriptedOpener::with_chunks(pcm_chunks(5_000, 200))
            .with_read_delay(Duration::from_millis(20));
        let mut rec = recorder(&opener);
        rec.start(&path).unwrap();

        // Swap the open file for a read-only handle so the next write fails.
        {
            let session = rec.session.as_ref().unwrap();
            lock_sink(&session.sink).file = Some(File::open(&path).unwrap());
        }
        wait_for_release(&opener);

        let err = rec.stop().unwrap_err();
        assert!(matches!(err, CaptureError::WriteFailure(_)), "{err:?}");
        assert!(!path.exists());
        assert_eq!(rec.state(), SessionState::Idle);
        assert_eq!(opener.release_count(), 1);
    }

    #[test]
    fn config_conversion_applies_floor() {
        let cfg = CaptureConfig {
            min_buffer_bytes: 512,
            join_timeout_ms: 250,
            ..CaptureConfig::default()
        };
        let rc = RecorderConfig::from(&cfg);
        assert_eq!(rc.min_buffer_bytes, MIN_CAPTURE_BUFFER);
        assert_eq!(rc.join_timeout, Duration::from_millis(250));
        assert_eq!(rc.format, PcmFormat::SPEECH);
    }
}
