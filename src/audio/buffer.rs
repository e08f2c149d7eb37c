//! Per-session audio frame buffer.
//!
//! Accumulates raw PCM bytes from AudioChunk events and yields fixed-size
//! decode windows once a time threshold of audio is buffered. Owned by
//! exactly one session; append-only between drains.

use crate::audio::format::AudioFormat;
use crate::error::{Result, SottoError};

/// Accumulates PCM bytes and hands out decode windows.
#[derive(Debug)]
pub struct FrameBuffer {
    format: AudioFormat,
    /// Window size in bytes, derived from the configured window duration.
    window_bytes: usize,
    /// Buffered raw PCM, little-endian 16-bit samples.
    buf: Vec<u8>,
    /// Total bytes accepted over the buffer's lifetime.
    total_bytes: usize,
}

impl FrameBuffer {
    /// Create a buffer that emits one window per `window_ms` of audio.
    pub fn new(format: AudioFormat, window_ms: u32) -> Self {
        let window_bytes = (format.bytes_per_ms() * window_ms as usize).max(format.width as usize);
        Self {
            format,
            window_bytes,
            buf: Vec::new(),
            total_bytes: 0,
        }
    }

    /// Append one chunk of raw PCM bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
        self.total_bytes += bytes.len();
    }

    /// Take one full decode window if enough audio is buffered.
    pub fn take_window(&mut self) -> Option<Vec<i16>> {
        if self.buf.len() < self.window_bytes {
            return None;
        }
        let rest = self.buf.split_off(self.window_bytes);
        let window = std::mem::replace(&mut self.buf, rest);
        Some(bytes_to_samples(&window))
    }

    /// Drain everything left for the final flush.
    ///
    /// A dangling half-sample means the byte stream was cut mid-sample,
    /// which is unrecoverable corruption.
    pub fn drain_rest(&mut self) -> Result<Vec<i16>> {
        if self.buf.len() % 2 != 0 {
            return Err(SottoError::Protocol {
                message: format!(
                    "audio stream ended mid-sample ({} bytes buffered)",
                    self.buf.len()
                ),
            });
        }
        let bytes = std::mem::take(&mut self.buf);
        Ok(bytes_to_samples(&bytes))
    }

    /// Milliseconds of audio currently buffered.
    pub fn buffered_ms(&self) -> u32 {
        self.format.duration_ms(self.buf.len())
    }

    /// Milliseconds of audio accepted over the buffer's lifetime.
    pub fn total_ms(&self) -> u32 {
        self.format.duration_ms(self.total_bytes)
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Convert little-endian PCM bytes to i16 samples. An odd trailing byte is
/// the caller's problem; window boundaries are always sample-aligned
/// because the window size is a multiple of the sample width.
fn bytes_to_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}
