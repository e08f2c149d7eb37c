//! Transcript cursor.
//!
//! Accumulates per-window decode results in arrival order and tracks the
//! boundary between windows. No reorder buffer is needed: a session runs
//! exactly one decode at a time, so results arrive in window order by
//! construction.

use crate::defaults::CONTEXT_CHARS;
use crate::text;

/// Ordered accumulation of window texts for one session.
#[derive(Debug, Default)]
pub struct TranscriptCursor {
    /// Scrubbed text per decoded window, in decode order.
    segments: Vec<String>,
    /// Last word of the previous window, for boundary deduplication.
    prev_last_word: Option<String>,
}

impl TranscriptCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one window's decode result.
    ///
    /// The text is scrubbed of recognizer markers; a word repeated across
    /// the window boundary (the model finishing the same word twice) is
    /// dropped once.
    pub fn push(&mut self, raw: &str) {
        let cleaned = text::scrub(raw);
        if cleaned.is_empty() {
            return;
        }

        let words: Vec<&str> = cleaned.split_whitespace().collect();
        let start = match (&self.prev_last_word, words.first()) {
            (Some(prev), Some(first))
                if first.len() >= 2 && first.eq_ignore_ascii_case(prev) =>
            {
                1
            }
            _ => 0,
        };

        self.prev_last_word = words.last().map(|w| w.to_string());
        let segment = words[start..].join(" ");
        if !segment.is_empty() {
            self.segments.push(segment);
        }
    }

    /// Transcript accumulated so far (the partial text).
    pub fn current(&self) -> String {
        self.segments.join(" ")
    }

    /// Trailing characters of the transcript, fed to the engine as prior
    /// context for the next window. None until something was recognized.
    pub fn prior_context(&self) -> Option<String> {
        let full = self.current();
        if full.is_empty() {
            return None;
        }
        // Cut on a char boundary at most CONTEXT_CHARS from the end.
        let start = full
            .char_indices()
            .rev()
            .take(CONTEXT_CHARS)
            .last()
            .map(|(i, _)| i)
            .unwrap_or(0);
        Some(full[start..].to_string())
    }

    /// Number of windows that contributed text.
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Final transcript for the session.
    pub fn finalize(self) -> String {
        self.segments.join(" ")
    }
}
