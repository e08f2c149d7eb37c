//! Wire event model.
//!
//! The protocol is a closed set of eight event kinds. Incoming headers are
//! validated per kind at decode time; an event that fails validation is
//! reported back to the peer instead of being guessed at.

use crate::audio::AudioFormat;
use crate::error::SottoError;
use crate::protocol::info::InfoData;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Transcribe (start) header fields. Everything is optional: a bare
/// `transcribe` means "default model, auto language".
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscribeData {
    pub name: Option<String>,
    pub language: Option<String>,
}

/// Transcript header fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptData {
    pub text: String,
    #[serde(default)]
    pub is_final: bool,
}

/// Error header fields. `code` is stable and machine-readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorData {
    pub message: String,
    pub code: String,
}

/// A protocol event.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Describe,
    Info(InfoData),
    Transcribe(TranscribeData),
    AudioStart(AudioFormat),
    AudioChunk(Vec<u8>),
    AudioStop,
    Transcript(TranscriptData),
    Error(ErrorData),
}

impl Event {
    /// Wire name of this event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Describe => "describe",
            Event::Info(_) => "info",
            Event::Transcribe(_) => "transcribe",
            Event::AudioStart(_) => "audio-start",
            Event::AudioChunk(_) => "audio-chunk",
            Event::AudioStop => "audio-stop",
            Event::Transcript(_) => "transcript",
            Event::Error(_) => "error",
        }
    }

    /// Build a Transcript event.
    pub fn transcript(text: impl Into<String>, is_final: bool) -> Self {
        Event::Transcript(TranscriptData {
            text: text.into(),
            is_final,
        })
    }

    /// Build an Error event from a domain error, carrying its stable code.
    pub fn error(err: &SottoError) -> Self {
        Event::Error(ErrorData {
            message: err.to_string(),
            code: err.code().to_string(),
        })
    }

    /// Header `data` value for encoding, if this kind has one.
    pub(crate) fn header_data(&self) -> Option<Value> {
        match self {
            Event::Describe | Event::AudioStop | Event::AudioChunk(_) => None,
            Event::Info(d) => serde_json::to_value(d).ok(),
            Event::Transcribe(d) => serde_json::to_value(d).ok(),
            Event::AudioStart(f) => serde_json::to_value(f).ok(),
            Event::Transcript(d) => serde_json::to_value(d).ok(),
            Event::Error(d) => serde_json::to_value(d).ok(),
        }
    }

    /// Payload bytes for encoding, if this kind carries any.
    pub(crate) fn payload(&self) -> Option<&[u8]> {
        match self {
            Event::AudioChunk(bytes) if !bytes.is_empty() => Some(bytes),
            _ => None,
        }
    }

    /// Assemble an event from a decoded header and its payload bytes,
    /// applying per-kind required-field validation.
    ///
    /// Returns a message describing the problem when the header names an
    /// unknown kind or is missing required fields. The framing itself was
    /// already consumed by the caller, so these failures are recoverable.
    pub(crate) fn from_header(
        kind: &str,
        data: Option<Value>,
        payload: Vec<u8>,
    ) -> std::result::Result<Event, String> {
        if !payload.is_empty() && kind != "audio-chunk" {
            return Err(format!("event '{kind}' does not take a payload"));
        }

        let data = data.unwrap_or(Value::Null);
        match kind {
            "describe" => Ok(Event::Describe),
            "audio-stop" => Ok(Event::AudioStop),
            "audio-chunk" => Ok(Event::AudioChunk(payload)),
            "info" => parse_data(kind, data).map(Event::Info),
            "transcribe" => {
                if data.is_null() {
                    Ok(Event::Transcribe(TranscribeData::default()))
                } else {
                    parse_data(kind, data).map(Event::Transcribe)
                }
            }
            "audio-start" => parse_data(kind, data).map(Event::AudioStart),
            "transcript" => parse_data(kind, data).map(Event::Transcript),
            "error" => parse_data(kind, data).map(Event::Error),
            other => Err(format!("unknown event type '{other}'")),
        }
    }
}

fn parse_data<T: serde::de::DeserializeOwned>(
    kind: &str,
    data: Value,
) -> std::result::Result<T, String> {
    serde_json::from_value(data).map_err(|e| format!("invalid '{kind}' data: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_match_wire_protocol() {
        assert_eq!(Event::Describe.kind(), "describe");
        assert_eq!(Event::AudioStop.kind(), "audio-stop");
        assert_eq!(Event::AudioChunk(vec![]).kind(), "audio-chunk");
        assert_eq!(
            Event::Transcribe(TranscribeData::default()).kind(),
            "transcribe"
        );
        assert_eq!(
            Event::AudioStart(AudioFormat::wire_default()).kind(),
            "audio-start"
        );
        assert_eq!(Event::transcript("hi", false).kind(), "transcript");
    }

    #[test]
    fn test_from_header_describe() {
        let event = Event::from_header("describe", None, vec![]).unwrap();
        assert_eq!(event, Event::Describe);
    }

    #[test]
    fn test_from_header_transcribe_without_data() {
        let event = Event::from_header("transcribe", None, vec![]).unwrap();
        assert_eq!(event, Event::Transcribe(TranscribeData::default()));
    }

    #[test]
    fn test_from_header_transcribe_with_language() {
        let data = serde_json::json!({"language": "en"});
        let event = Event::from_header("transcribe", Some(data), vec![]).unwrap();
        match event {
            Event::Transcribe(d) => assert_eq!(d.language.as_deref(), Some("en")),
            _ => panic!("expected Transcribe"),
        }
    }

    #[test]
    fn test_from_header_audio_start_requires_format_fields() {
        let data = serde_json::json!({"rate": 16000});
        let err = Event::from_header("audio-start", Some(data), vec![]).unwrap_err();
        assert!(err.contains("audio-start"), "got: {err}");
    }

    #[test]
    fn test_from_header_audio_start_valid() {
        let data = serde_json::json!({"rate": 16000, "width": 2, "channels": 1});
        let event = Event::from_header("audio-start", Some(data), vec![]).unwrap();
        match event {
            Event::AudioStart(f) => {
                assert_eq!(f.rate, 16000);
                assert_eq!(f.width, 2);
                assert_eq!(f.channels, 1);
            }
            _ => panic!("expected AudioStart"),
        }
    }

    #[test]
    fn test_from_header_unknown_kind() {
        let err = Event::from_header("ping", None, vec![]).unwrap_err();
        assert!(err.contains("unknown event type"), "got: {err}");
    }

    #[test]
    fn test_from_header_rejects_payload_on_control_event() {
        let err = Event::from_header("describe", None, vec![1, 2, 3]).unwrap_err();
        assert!(err.contains("does not take a payload"), "got: {err}");
    }

    #[test]
    fn test_transcript_default_is_final_false() {
        let data = serde_json::json!({"text": "hello"});
        let event = Event::from_header("transcript", Some(data), vec![]).unwrap();
        match event {
            Event::Transcript(d) => {
                assert_eq!(d.text, "hello");
                assert!(!d.is_final);
            }
            _ => panic!("expected Transcript"),
        }
    }

    #[test]
    fn test_error_event_requires_code() {
        let data = serde_json::json!({"message": "boom"});
        assert!(Event::from_header("error", Some(data), vec![]).is_err());
    }

    #[test]
    fn test_error_helper_carries_taxonomy_code() {
        let err = SottoError::InvalidState {
            event: "audio-chunk".to_string(),
            state: "AwaitingStart".to_string(),
        };
        match Event::error(&err) {
            Event::Error(d) => {
                assert_eq!(d.code, "invalid-state");
                assert!(d.message.contains("audio-chunk"));
            }
            _ => panic!("expected Error"),
        }
    }
}
