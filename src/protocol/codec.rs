//! Event framing codec.
//!
//! One newline-terminated JSON header per event, optionally followed by
//! exactly `payload_length` raw bytes. The decoder is incremental: an event
//! may arrive across any number of reads, and decoding resumes where it
//! left off instead of failing on a short read.

use crate::defaults::{MAX_HEADER_BYTES, MAX_PAYLOAD_BYTES};
use crate::error::{Result, SottoError};
use crate::protocol::event::Event;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Self-describing event header. Field order on the wire is irrelevant;
/// absence of `payload_length` means zero payload bytes follow.
#[derive(Debug, Serialize, Deserialize)]
struct RawHeader {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload_length: Option<usize>,
}

/// Outcome of decoding one complete frame.
///
/// `Invalid` covers headers that parsed as JSON and declared their framing
/// correctly but named an unknown kind or failed field validation: the byte
/// stream is still synchronized, so the caller reports the problem to the
/// peer and keeps the connection.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Event(Event),
    Invalid { kind: String, message: String },
}

/// Encode an event into its wire form. Total for well-formed events.
pub fn encode(event: &Event) -> Vec<u8> {
    let payload = event.payload();
    let header = RawHeader {
        kind: event.kind().to_string(),
        data: event.header_data(),
        payload_length: payload.map(<[u8]>::len),
    };

    // The header holds only JSON-native values, so serialization cannot fail.
    let mut out = serde_json::to_vec(&header).unwrap_or_default();
    out.push(b'\n');
    if let Some(p) = payload {
        out.extend_from_slice(p);
    }
    out
}

/// Decode one event from the front of `buf`.
///
/// Returns `Ok(None)` when the buffer holds an incomplete event (partial
/// header line, or fewer payload bytes than declared) — the caller buffers
/// more input and retries. Returns the decoded frame and the number of
/// bytes consumed otherwise.
///
/// Errors are fatal for the stream: an unparseable header line or an
/// oversized header/payload declaration leaves the byte stream
/// desynchronized.
pub fn decode(buf: &[u8]) -> Result<Option<(Decoded, usize)>> {
    let Some(newline) = buf.iter().position(|&b| b == b'\n') else {
        if buf.len() > MAX_HEADER_BYTES {
            return Err(SottoError::MalformedHeader {
                message: format!("header line exceeds {MAX_HEADER_BYTES} bytes"),
            });
        }
        return Ok(None);
    };

    let header: RawHeader =
        serde_json::from_slice(&buf[..newline]).map_err(|e| SottoError::MalformedHeader {
            message: e.to_string(),
        })?;

    let payload_len = header.payload_length.unwrap_or(0);
    if payload_len > MAX_PAYLOAD_BYTES {
        return Err(SottoError::MalformedHeader {
            message: format!("declared payload of {payload_len} bytes exceeds limit"),
        });
    }

    let total = newline + 1 + payload_len;
    if buf.len() < total {
        return Ok(None);
    }

    let payload = buf[newline + 1..total].to_vec();
    let decoded = match Event::from_header(&header.kind, header.data, payload) {
        Ok(event) => Decoded::Event(event),
        Err(message) => Decoded::Invalid {
            kind: header.kind,
            message,
        },
    };
    Ok(Some((decoded, total)))
}

/// Incremental decoder for a byte stream.
#[derive(Debug, Default)]
pub struct EventDecoder {
    buf: Vec<u8>,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the stream.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the next complete frame, if one is buffered.
    pub fn next(&mut self) -> Result<Option<Decoded>> {
        match decode(&self.buf)? {
            Some((decoded, consumed)) => {
                self.buf.drain(..consumed);
                Ok(Some(decoded))
            }
            None => Ok(None),
        }
    }

    /// Validate stream end. A cleanly closed stream ends on an event
    /// boundary; leftover bytes mean the peer died mid-event.
    pub fn finish(&self) -> Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }

        let Some(newline) = self.buf.iter().position(|&b| b == b'\n') else {
            return Err(SottoError::MalformedHeader {
                message: "stream ended inside an event header".to_string(),
            });
        };

        let expected = serde_json::from_slice::<RawHeader>(&self.buf[..newline])
            .map_err(|e| SottoError::MalformedHeader {
                message: e.to_string(),
            })?
            .payload_length
            .unwrap_or(0);

        Err(SottoError::TruncatedPayload {
            expected,
            actual: self.buf.len() - newline - 1,
        })
    }

    /// Number of buffered, not-yet-decoded bytes.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}
