//! Capture-device abstraction used by the recorder.
//!
//! [`DeviceOpener`] is shared with the capture thread and opens a fresh
//! [`InputDevice`] there; the device never leaves that thread, so backends
//! whose stream handles are not `Send` (cpal on several hosts) still fit.
//!
//! [`ScriptedOpener`] (available under `#[cfg(test)]`) replays fixed PCM
//! chunks so the recorder can be tested without a microphone.

use thiserror::Error;

use super::wav::PcmFormat;

// ---------------------------------------------------------------------------
// DeviceError
// ---------------------------------------------------------------------------

/// Failures reported by a capture device.
#[derive(Debug, Clone, Error)]
pub enum DeviceError {
    #[error("no audio input device available")]
    NoDevice,

    #[error("failed to initialise input device: {0}")]
    Init(String),

    #[error("input device read failed: {0}")]
    Read(String),

    #[error("input stream disconnected")]
    Disconnected,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// An opened, running capture device producing PCM bytes in the format it
/// was opened with.
pub trait InputDevice {
    /// Smallest read buffer the device can fill without dropping samples.
    fn min_buffer_bytes(&self) -> usize;

    /// Copy up to `buf.len()` bytes of captured PCM into `buf`.
    ///
    /// `Ok(0)` means no audio arrived within the device's poll interval;
    /// the caller should check for cancellation and read again. An error
    /// ends the capture.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, DeviceError>;

    /// Stop the hardware stream and free the device. Called exactly once by
    /// the recorder when capture ends.
    fn release(&mut self);
}

/// Opens capture devices. Held by the recorder and handed to each capture
/// thread.
pub trait DeviceOpener: Send + Sync {
    /// Open and start a device delivering signed 16-bit little-endian PCM
    /// in `format`.
    fn open(&self, format: PcmFormat) -> Result<Box<dyn InputDevice>, DeviceError>;
}

// ---------------------------------------------------------------------------
// ScriptedOpener  (test-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
pub use scripted::ScriptedOpener;

#[cfg(test)]
mod scripted {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::*;

    /// Test double that replays a fixed list of PCM chunks.
    ///
    /// After the script runs out the device either idles (`Ok(0)`) or fails,
    /// depending on [`ScriptedOpener::then_fail`].
    #[derive(Clone)]
    pub struct ScriptedOpener {
        chunks: Vec<Vec<u8>>,
        fail_open: bool,
        fail_when_drained: bool,
        read_delay: Duration,
        min_buffer: usize,
        /// Number of successful `open` calls.
        pub opens: Arc<AtomicUsize>,
        /// Number of `release` calls across all opened devices.
        pub releases: Arc<AtomicUsize>,
        /// Length of the buffer passed to every `read`.
        pub read_sizes: Arc<Mutex<Vec<usize>>>,
    }

    impl ScriptedOpener {
        pub fn with_chunks(chunks: Vec<Vec<u8>>) -> Self {
            Self {
                chunks,
                fail_open: false,
                fail_when_drained: false,
                read_delay: Duration::ZERO,
                min_buffer: 1_024,
                opens: Arc::new(AtomicUsize::new(0)),
                releases: Arc::new(AtomicUsize::new(0)),
                read_sizes: Arc::new(Mutex::new(Vec::new())),
            }
        }

        /// An opener whose device can never be opened.
        pub fn unavailable() -> Self {
            Self {
                fail_open: true,
                ..Self::with_chunks(Vec::new())
            }
        }

        /// Report a read error once every chunk has been delivered.
        pub fn then_fail(mut self) -> Self {
            self.fail_when_drained = true;
            self
        }

        /// Sleep this long inside every read.
        pub fn with_read_delay(mut self, delay: Duration) -> Self {
            self.read_delay = delay;
            self
        }

        pub fn with_min_buffer(mut self, bytes: usize) -> Self {
            self.min_buffer = bytes;
            self
        }

        pub fn release_count(&self) -> usize {
            self.releases.load(Ordering::SeqCst)
        }

        pub fn read_sizes(&self) -> Vec<usize> {
            self.read_sizes.lock().unwrap().clone()
        }
    }

    impl DeviceOpener for ScriptedOpener {
        fn open(&self, _format: PcmFormat) -> Result<Box<dyn InputDevice>, DeviceError> {
            if self.fail_open {
                return Err(DeviceError::NoDevice);
            }
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ScriptedDevice {
                queue: self.chunks.iter().cloned().collect(),
                fail_when_drained: self.fail_when_drained,
                read_delay: self.read_delay,
                min_buffer: self.min_buffer,
                releases: Arc::clone(&self.releases),
                read_sizes: Arc::clone(&self.read_sizes),
            }))
        }
    }

    struct ScriptedDevice {
        queue: VecDeque<Vec<u8>>,
        fail_when_drained: bool,
        read_delay: Duration,
        min_buffer: usize,
        releases: Arc<AtomicUsize>,
        read_sizes: Arc<Mutex<Vec<usize>>>,
    }

    impl InputDevice for ScriptedDevice {
        fn min_buffer_bytes(&self) -> usize {
            self.min_buffer
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<usize, DeviceError> {
            self.read_sizes.lock().unwrap().push(buf.len());
            if !self.read_delay.is_zero() {
                std::thread::sleep(self.read_delay);
            }
            match self.queue.pop_front() {
                Some(chunk) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        self.queue.push_front(chunk[n..].to_vec());
                    }
                    Ok(n)
                }
                None if self.fail_when_drained => Err(DeviceError::Read("scripted failure".into())),
                None => {
                    std::thread::sleep(Duration::from_millis(2));
                    Ok(0)
                }
            }
        }

        fn release(&mut self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}
