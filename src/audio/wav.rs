//! Canonical 44-byte RIFF/WAVE header for 16-bit PCM recordings.
//!
//! The recorder reserves [`HEADER_LEN`] zero bytes at the start of the file,
//! streams raw PCM after them and only then writes the real header, because
//! the header declares both the payload size and the total file size.
//!
//! ```text
//!  0  "RIFF"        4  total - 8       8  "WAVE"
//! 12  "fmt "       16  16 (chunk)     20  1 (PCM)      22  channels
//! 24  sample rate  28  byte rate      32  block align  34  bits/sample
//! 36  "data"       40  payload bytes
//! ```
//!
//! All integers are little-endian.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use thiserror::Error;

/// Size of the canonical header in bytes.
pub const HEADER_LEN: usize = 44;

const FMT_CHUNK_LEN: u32 = 16;
const FORMAT_PCM: u16 = 1;

// ---------------------------------------------------------------------------
// PcmFormat
// ---------------------------------------------------------------------------

/// Sample layout of the PCM payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    /// Samples per second per channel.
    pub sample_rate: u32,
    /// Interleaved channel count.
    pub channels: u16,
    /// Bits per sample (always 16 for recordings produced by this crate).
    pub bits_per_sample: u16,
}

impl PcmFormat {
    /// 16 kHz, mono, signed 16-bit: the format every recording uses.
    pub const SPEECH: PcmFormat = PcmFormat {
        sample_rate: 16_000,
        channels: 1,
        bits_per_sample: 16,
    };

    /// Same layout as [`PcmFormat::SPEECH`] at a different sample rate.
    pub fn mono_16bit(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            ..Self::SPEECH
        }
    }

    /// Bytes per interleaved frame (`channels × bytes per sample`).
    pub fn block_align(&self) -> u16 {
        self.channels.saturating_mul(self.bits_per_sample / 8)
    }

    /// Bytes per second of audio (`sample_rate × block_align`).
    pub fn byte_rate(&self) -> u32 {
        self.sample_rate.saturating_mul(u32::from(self.block_align()))
    }
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self::SPEECH
    }
}

// ---------------------------------------------------------------------------
// HeaderError
// ---------------------------------------------------------------------------

/// Reasons a file is not a valid finalized recording.
#[derive(Debug, Error)]
pub enum HeaderError {
    #[error("i/o error while reading header: {0}")]
    Io(#[from] io::Error),

    #[error("missing `{0}` marker")]
    BadMarker(&'static str),

    #[error("unsupported audio format tag {0} (only PCM is supported)")]
    UnsupportedFormat(u16),

    #[error("fmt chunk declares {0} bytes (expected 16)")]
    BadFmtChunk(u32),

    #[error("header declares {declared} bytes of {field} but the file holds {actual}")]
    SizeMismatch {
        field: &'static str,
        declared: u64,
        actual: u64,
    },
}

// ---------------------------------------------------------------------------
// WavHeader
// ---------------------------------------------------------------------------

/// Decoded form of the 44-byte header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub format: PcmFormat,
    /// Number of payload bytes following the header.
    pub data_len: u32,
}

impl WavHeader {
    pub fn new(format: PcmFormat, data_len: u32) -> Self {
        Self { format, data_len }
    }

    /// Value of the RIFF size field: total file length minus 8.
    pub fn riff_len(&self) -> u32 {
        self.data_len.saturating_add(HEADER_LEN as u32 - 8)
    }

    /// Total file length the header describes.
    pub fn file_len(&self) -> u64 {
        HEADER_LEN as u64 + u64::from(self.data_len)
    }

    /// Encode the header into its exact on-disk byte layout.
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(b"RIFF");
        out[4..8].copy_from_slice(&self.riff_len().to_le_bytes());
        out[8..12].copy_from_slice(b"WAVE");
        out[12..16].copy_from_slice(b"fmt ");
        out[16..20].copy_from_slice(&FMT_CHUNK_LEN.to_le_bytes());
        out[20..22].copy_from_slice(&FORMAT_PCM.to_le_bytes());
        out[22..24].copy_from_slice(&self.format.channels.to_le_bytes());
        out[24..28].copy_from_slice(&self.format.sample_rate.to_le_bytes());
        out[28..32].copy_from_slice(&self.format.byte_rate().to_le_bytes());
        out[32..34].copy_from_slice(&self.format.block_align().to_le_bytes());
        out[34..36].copy_from_slice(&self.format.bits_per_sample.to_le_bytes());
        out[36..40].copy_from_slice(b"data");
        out[40..44].copy_from_slice(&self.data_len.to_le_bytes());
        out
    }

    /// Decode a header previously produced by [`WavHeader::to_bytes`].
    ///
    /// Only the canonical layout is accepted: `fmt ` directly followed by
    /// `data`, PCM format tag, 16-byte fmt chunk.
    pub fn parse(bytes: &[u8; HEADER_LEN]) -> Result<Self, HeaderError> {
        if &bytes[0..4] != b"RIFF" {
            return Err(HeaderError::BadMarker("RIFF"));
        }
        if &bytes[8..12] != b"WAVE" {
            return Err(HeaderError::BadMarker("WAVE"));
        }
        if &bytes[12..16] != b"fmt " {
            return Err(HeaderError::BadMarker("fmt "));
        }
        let fmt_len = read_u32(bytes, 16);
        if fmt_len != FMT_CHUNK_LEN {
            return Err(HeaderError::BadFmtChunk(fmt_len));
        }
        let tag = read_u16(bytes, 20);
        if tag != FORMAT_PCM {
            return Err(HeaderError::UnsupportedFormat(tag));
        }
        if &bytes[36..40] != b"data" {
            return Err(HeaderError::BadMarker("data"));
        }

        let header = Self {
            format: PcmFormat {
                channels: read_u16(bytes, 22),
                sample_rate: read_u32(bytes, 24),
                bits_per_sample: read_u16(bytes, 34),
            },
            data_len: read_u32(bytes, 40),
        };

        let riff_len = read_u32(bytes, 4);
        if riff_len != header.riff_len() {
            return Err(HeaderError::SizeMismatch {
                field: "RIFF chunk",
                declared: u64::from(riff_len),
                actual: u64::from(header.riff_len()),
            });
        }

        Ok(header)
    }
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

// ---------------------------------------------------------------------------
// File helpers
// ---------------------------------------------------------------------------

/// Write `header` over the first [`HEADER_LEN`] bytes of `out`.
///
/// The stream position is left just after the header.
pub fn write_header<W: Write + Seek>(out: &mut W, header: &WavHeader) -> io::Result<()> {
    out.seek(SeekFrom::Start(0))?;
    out.write_all(&header.to_bytes())?;
    out.flush()
}

/// Read and decode the header at the current position of `input`.
pub fn read_header<R: Read>(input: &mut R) -> Result<WavHeader, HeaderError> {
    let mut bytes = [0u8; HEADER_LEN];
    input.read_exact(&mut bytes)?;
    WavHeader::parse(&bytes)
}

/// Check that the file at `path` is a finalized recording: a valid header
/// whose declared sizes match the actual file length.
pub fn validate_file(path: &Path) -> Result<WavHeader, HeaderError> {
    let mut file = File::open(path)?;
    let actual_len = file.metadata()?.len();
    let header = read_header(&mut file)?;

    if header.file_len() != actual_len {
        return Err(HeaderError::SizeMismatch {
            field: "payload",
            declared: u64::from(header.data_len),
            actual: actual_len.saturating_sub(HEADER_LEN as u64),
        });
    }

    Ok(header)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
