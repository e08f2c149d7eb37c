//! Negotiated audio format.

use crate::defaults::{CHANNELS, SAMPLE_RATE, SAMPLE_WIDTH};
use crate::error::{Result, SottoError};
use serde::{Deserialize, Serialize};

/// Audio format announced by an AudioStart event.
///
/// The wire convention is fixed at 16kHz / 16-bit / mono, but every session
/// validates what the client actually announced rather than assuming it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample rate in Hz.
    pub rate: u32,
    /// Sample width in bytes.
    pub width: u16,
    /// Channel count.
    pub channels: u16,
}

impl AudioFormat {
    /// The only format accepted on the wire.
    pub const fn wire_default() -> Self {
        Self {
            rate: SAMPLE_RATE,
            width: SAMPLE_WIDTH,
            channels: CHANNELS,
        }
    }

    /// Reject anything other than the wire convention.
    pub fn validate(&self) -> Result<()> {
        if *self != Self::wire_default() {
            return Err(SottoError::UnsupportedFormat {
                message: format!(
                    "expected {}Hz/{}-bit/{}ch, got {}Hz/{}-bit/{}ch",
                    SAMPLE_RATE,
                    SAMPLE_WIDTH * 8,
                    CHANNELS,
                    self.rate,
                    self.width * 8,
                    self.channels
                ),
            });
        }
        Ok(())
    }

    /// Bytes of PCM per millisecond of audio in this format.
    pub fn bytes_per_ms(&self) -> usize {
        (self.rate as usize * self.width as usize * self.channels as usize) / 1000
    }

    /// Duration in milliseconds of `bytes` of PCM in this format.
    pub fn duration_ms(&self, bytes: usize) -> u32 {
        (bytes / self.bytes_per_ms().max(1)) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_default_is_valid() {
        AudioFormat::wire_default().validate().unwrap();
    }

    #[test]
    fn test_wrong_rate_rejected() {
        let format = AudioFormat {
            rate: 44100,
            width: 2,
            channels: 1,
        };
        match format.validate() {
            Err(SottoError::UnsupportedFormat { message }) => {
                assert!(message.contains("44100"), "got: {message}");
            }
            other => panic!("expected UnsupportedFormat, got {other:?}"),
        }
    }

    #[test]
    fn test_stereo_rejected() {
        let format = AudioFormat {
            rate: 16000,
            width: 2,
            channels: 2,
        };
        assert!(format.validate().is_err());
    }

    #[test]
    fn test_byte_math() {
        let format = AudioFormat::wire_default();
        // 16kHz * 2 bytes * 1 channel = 32 bytes per ms
        assert_eq!(format.bytes_per_ms(), 32);
        assert_eq!(format.duration_ms(3200), 100);
        assert_eq!(format.duration_ms(0), 0);
    }

    #[test]
    fn test_serde_field_names() {
        let format = AudioFormat::wire_default();
        let json = serde_json::to_string(&format).unwrap();
        assert!(json.contains("\"rate\":16000"), "got: {json}");
        assert!(json.contains("\"width\":2"), "got: {json}");
        assert!(json.contains("\"channels\":1"), "got: {json}");
    }
}
