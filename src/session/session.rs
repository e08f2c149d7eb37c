//! Session state machine.
//!
//! One session owns one transcription pass over one connection:
//! `AwaitingStart → Streaming → Draining → Closed`. All audio routing,
//! decode triggering, and transcript emission happens here; the connection
//! handler only shuttles bytes and replaces a Closed session with a fresh
//! one when the client keeps the connection open.

use crate::audio::FrameBuffer;
use crate::engine::{DecodeContext, EnginePool};
use crate::error::{Result, SottoError};
use crate::protocol::codec::Decoded;
use crate::protocol::{Event, InfoData};
use crate::session::TranscriptCursor;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingStart,
    Streaming,
    Draining,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::AwaitingStart => "AwaitingStart",
            SessionState::Streaming => "Streaming",
            SessionState::Draining => "Draining",
            SessionState::Closed => "Closed",
        };
        f.write_str(name)
    }
}

/// Per-session tunables, shared by every session of one server.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Decode window duration in milliseconds.
    pub window_ms: u32,
    /// Language used when the client sends no hint.
    pub default_language: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            window_ms: crate::defaults::WINDOW_MS,
            default_language: None,
        }
    }
}

/// One client connection's transcription lifecycle.
pub struct Session {
    id: u64,
    state: SessionState,
    config: SessionConfig,
    pool: EnginePool,
    info: Arc<InfoData>,
    /// Language hint captured from the Transcribe event.
    language: Option<String>,
    /// Armed by AudioStart; its presence distinguishes "streaming but no
    /// audio negotiated yet" from "ready for chunks".
    buffer: Option<FrameBuffer>,
    cursor: TranscriptCursor,
    started_at: Instant,
}

impl Session {
    pub fn new(id: u64, pool: EnginePool, info: Arc<InfoData>, config: SessionConfig) -> Self {
        Self {
            id,
            state: SessionState::AwaitingStart,
            config,
            pool,
            info,
            language: None,
            buffer: None,
            cursor: TranscriptCursor::new(),
            started_at: Instant::now(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Process one decoded frame and return the events to send back.
    ///
    /// A returned error is fatal for the connection (framing corruption or
    /// I/O); everything recoverable comes back as an Error event in the
    /// reply list.
    pub async fn handle(&mut self, frame: Decoded) -> Result<Vec<Event>> {
        match frame {
            Decoded::Event(event) => self.handle_event(event).await,
            Decoded::Invalid { kind, message } => {
                warn!(session = self.id, %kind, %message, "rejecting invalid event");
                let err = SottoError::Protocol {
                    message: format!("invalid event '{kind}': {message}"),
                };
                Ok(vec![Event::error(&err)])
            }
        }
    }

    async fn handle_event(&mut self, event: Event) -> Result<Vec<Event>> {
        match event {
            Event::Describe if self.state == SessionState::AwaitingStart => {
                debug!(session = self.id, "describe");
                Ok(vec![Event::Info((*self.info).clone())])
            }

            Event::Transcribe(data) if self.state == SessionState::AwaitingStart => {
                self.language = data
                    .language
                    .clone()
                    .or_else(|| self.config.default_language.clone());
                self.state = SessionState::Streaming;
                debug!(
                    session = self.id,
                    language = self.language.as_deref().unwrap_or("auto"),
                    model = data.name.as_deref().unwrap_or("default"),
                    "transcription started"
                );
                Ok(vec![])
            }

            Event::AudioStart(format)
                if self.state == SessionState::Streaming && self.buffer.is_none() =>
            {
                match format.validate() {
                    Ok(()) => {
                        self.buffer = Some(FrameBuffer::new(format, self.config.window_ms));
                        Ok(vec![])
                    }
                    Err(err) => {
                        // The client may retry AudioStart with a supported
                        // format on the same session.
                        warn!(session = self.id, %err, "rejected audio format");
                        Ok(vec![Event::error(&err)])
                    }
                }
            }

            Event::AudioChunk(bytes)
                if self.state == SessionState::Streaming && self.buffer.is_some() =>
            {
                if let Some(buffer) = self.buffer.as_mut() {
                    buffer.push(&bytes);
                }

                let mut replies = Vec::new();
                while let Some(window) = self.buffer.as_mut().and_then(FrameBuffer::take_window) {
                    match self.decode_window(window).await {
                        Ok(()) => replies.push(Event::transcript(self.cursor.current(), false)),
                        Err(err) if !err.is_fatal() => {
                            warn!(session = self.id, %err, "window dropped");
                            replies.push(Event::error(&err));
                        }
                        Err(err) => return Err(err),
                    }
                }
                Ok(replies)
            }

            Event::AudioStop if self.state == SessionState::Streaming && self.buffer.is_some() => {
                self.state = SessionState::Draining;

                let rest = match self.buffer.as_mut() {
                    Some(buffer) => buffer.drain_rest()?,
                    None => Vec::new(),
                };

                let mut replies = Vec::new();
                if !rest.is_empty() {
                    match self.decode_window(rest).await {
                        Ok(()) => {}
                        Err(err) if !err.is_fatal() => {
                            warn!(session = self.id, %err, "final window dropped");
                            replies.push(Event::error(&err));
                        }
                        Err(err) => return Err(err),
                    }
                }

                let text = std::mem::take(&mut self.cursor).finalize();
                debug!(
                    session = self.id,
                    elapsed_ms = self.started_at.elapsed().as_millis() as u64,
                    chars = text.len(),
                    "session drained"
                );
                replies.push(Event::transcript(text, true));
                self.state = SessionState::Closed;
                Ok(replies)
            }

            // Anything else is a valid event in the wrong state: report it
            // and keep the connection.
            event => {
                let err = SottoError::InvalidState {
                    event: event.kind().to_string(),
                    state: self.state.to_string(),
                };
                warn!(session = self.id, %err, "out-of-state event");
                Ok(vec![Event::error(&err)])
            }
        }
    }

    /// Run one window through the engine, retrying a transient failure
    /// once, and fold the result into the cursor.
    async fn decode_window(&mut self, window: Vec<i16>) -> Result<()> {
        let ctx = DecodeContext {
            language: self.language.clone(),
            prior_text: self.cursor.prior_context(),
        };

        let output = match self.pool.decode(window.clone(), ctx.clone()).await {
            Ok(output) => output,
            Err(SottoError::DecodeFailed { .. }) | Err(SottoError::DecodeTimeout { .. }) => {
                debug!(session = self.id, "retrying window after transient failure");
                self.pool.decode(window, ctx).await?
            }
            Err(err) => return Err(err),
        };

        debug!(
            session = self.id,
            audio_ms = output.audio_ms,
            confidence = output.confidence,
            language = %output.language,
            "window decoded"
        );
        self.cursor.push(&output.text);
        Ok(())
    }
}
