//! Transcript text scrubbing.
//!
//! Whisper-family models emit bracketed noise markers for non-speech audio.
//! Every decode result is scrubbed before it reaches the transcript cursor
//! so clients never see them.

/// Common recognizer output markers to filter.
const MARKERS: &[&str] = &[
    "[BLANK_AUDIO]",
    "[INAUDIBLE]",
    "[MUSIC]",
    "[APPLAUSE]",
    "[LAUGHTER]",
    "(BLANK_AUDIO)",
    "(inaudible)",
    "♪",
];

/// Remove noise markers and collapse surplus whitespace.
pub fn scrub(text: &str) -> String {
    let mut cleaned = text.to_string();
    for marker in MARKERS {
        cleaned = cleaned.replace(marker, "");
    }
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}
