//! Transcription engine adapter.
//!
//! `SpeechEngine` is the boundary to the opaque recognition backend. The
//! session never knows which backend is loaded; backend selection happens
//! once at startup. The trait is deliberately blocking — multiplexing onto
//! the async runtime is the pool's job (`engine::pool`).

pub mod pool;
pub mod whisper;

pub use pool::{EnginePool, PoolConfig};

use crate::error::{Result, SottoError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Language codes understood by Whisper-family models, plus auto-detect.
pub const LANGUAGES: &[&str] = &[
    "auto", "en", "zh", "de", "es", "ru", "ko", "fr", "ja", "pt", "tr", "pl", "ca", "nl", "ar",
    "sv", "it", "id", "hi", "fi", "vi", "he", "uk", "el", "ms", "cs", "ro", "da", "hu", "ta",
    "no", "th", "ur", "hr", "bg", "lt", "la", "mi", "ml", "cy", "sk", "te", "fa", "lv", "bn",
    "sr", "az", "sl", "kn", "et", "mk", "br", "eu", "is", "hy", "ne", "mn", "bs", "kk", "sq",
    "sw", "gl", "mr", "pa", "si", "km", "sn", "yo", "so", "af", "oc", "ka", "be", "tg", "sd",
    "gu", "am", "yi", "lo", "uz", "fo", "ht", "ps", "tk", "nn", "mt", "sa", "lb", "my", "bo",
    "tl", "mg", "as", "tt", "haw", "ln", "ha", "ba", "jw", "su",
];

/// Running state an engine needs for incremental continuity within one
/// session.
#[derive(Debug, Clone, Default)]
pub struct DecodeContext {
    /// Language hint captured at Transcribe time, if any.
    pub language: Option<String>,
    /// Tail of the transcript decoded so far, fed back as prompt context.
    pub prior_text: Option<String>,
}

/// Result of one incremental decode step.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeOutput {
    /// Recognized text for this window. May be empty.
    pub text: String,
    /// Language the engine detected (or was told).
    pub language: String,
    /// Mean recognition confidence, 0.0 to 1.0.
    pub confidence: f32,
    /// Duration of the decoded audio window in milliseconds.
    pub audio_ms: u32,
}

/// Capability flags queried by the Describe/Info flow.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineCapabilities {
    /// Whether inference runs on a GPU backend.
    pub gpu: bool,
    /// Whether the engine produces usable per-window partial results.
    pub streaming: bool,
    /// Language codes the engine accepts.
    pub languages: Vec<String>,
}

/// Trait for speech-to-text engines.
///
/// Implementations must be shareable across sessions; a single loaded model
/// serves every connection through the pool.
pub trait SpeechEngine: Send + Sync {
    /// Decode one audio window (16kHz mono i16 PCM) into text.
    ///
    /// Blocking. `ctx` carries the session's language hint and prior
    /// transcript tail so consecutive windows stay coherent.
    fn decode(&self, window: &[i16], ctx: &DecodeContext) -> Result<DecodeOutput>;

    /// Capability flags for the Info reply.
    fn capabilities(&self) -> EngineCapabilities;

    /// Name of the loaded model.
    fn model_name(&self) -> &str;

    /// Whether the engine is loaded and able to decode.
    fn is_ready(&self) -> bool;
}

/// Implement SpeechEngine for Arc<T> to allow sharing across sessions.
impl<T: SpeechEngine + ?Sized> SpeechEngine for Arc<T> {
    fn decode(&self, window: &[i16], ctx: &DecodeContext) -> Result<DecodeOutput> {
        (**self).decode(window, ctx)
    }

    fn capabilities(&self) -> EngineCapabilities {
        (**self).capabilities()
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }
}

/// One recorded call against a `MockEngine`.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub samples: usize,
    pub language: Option<String>,
    pub prior_text: Option<String>,
}

/// Mock engine for testing.
///
/// Cloning shares the scripted responses and the call log, so tests can
/// hand a clone to the server and inspect calls afterwards.
#[derive(Debug, Clone)]
pub struct MockEngine {
    model_name: String,
    response: String,
    scripted: Arc<Mutex<VecDeque<String>>>,
    always_fail: bool,
    transient_failures: Arc<AtomicUsize>,
    delay: Option<Duration>,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

impl MockEngine {
    /// Create a new mock engine with default settings.
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            response: "mock transcription".to_string(),
            scripted: Arc::new(Mutex::new(VecDeque::new())),
            always_fail: false,
            transient_failures: Arc::new(AtomicUsize::new(0)),
            delay: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Return this response for every decode.
    pub fn with_response(mut self, response: &str) -> Self {
        self.response = response.to_string();
        self
    }

    /// Return these responses in order, then fall back to the default.
    pub fn with_scripted(self, responses: &[&str]) -> Self {
        {
            let mut scripted = self.scripted.lock().unwrap_or_else(|e| e.into_inner());
            scripted.extend(responses.iter().map(|s| s.to_string()));
        }
        self
    }

    /// Fail every decode.
    pub fn with_failure(mut self) -> Self {
        self.always_fail = true;
        self
    }

    /// Fail the next `n` decodes, then succeed.
    pub fn with_transient_failures(self, n: usize) -> Self {
        self.transient_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Sleep this long inside every decode (on the blocking pool).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of decode calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Snapshot of every recorded call.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl SpeechEngine for MockEngine {
    fn decode(&self, window: &[i16], ctx: &DecodeContext) -> Result<DecodeOutput> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(MockCall {
            samples: window.len(),
            language: ctx.language.clone(),
            prior_text: ctx.prior_text.clone(),
        });

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        if self.always_fail {
            return Err(SottoError::DecodeFailed {
                message: "mock decode failure".to_string(),
            });
        }

        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(SottoError::DecodeFailed {
                message: "mock transient failure".to_string(),
            });
        }

        let text = self
            .scripted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| self.response.clone());

        Ok(DecodeOutput {
            text,
            language: ctx.language.clone().unwrap_or_else(|| "en".to_string()),
            confidence: 1.0,
            audio_ms: (window.len() / 16) as u32,
        })
    }

    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities {
            gpu: false,
            streaming: true,
            languages: vec!["auto".to_string(), "en".to_string()],
        }
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn is_ready(&self) -> bool {
        !self.always_fail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_engine_returns_response() {
        let engine = MockEngine::new("test-model").with_response("hello there");

        let window = vec![0i16; 1600];
        let output = engine.decode(&window, &DecodeContext::default()).unwrap();

        assert_eq!(output.text, "hello there");
        assert_eq!(output.audio_ms, 100);
    }

    #[test]
    fn test_mock_engine_scripted_responses_in_order() {
        let engine = MockEngine::new("test-model")
            .with_scripted(&["one", "two"])
            .with_response("rest");

        let ctx = DecodeContext::default();
        assert_eq!(engine.decode(&[0; 16], &ctx).unwrap().text, "one");
        assert_eq!(engine.decode(&[0; 16], &ctx).unwrap().text, "two");
        assert_eq!(engine.decode(&[0; 16], &ctx).unwrap().text, "rest");
    }

    #[test]
    fn test_mock_engine_failure() {
        let engine = MockEngine::new("test-model").with_failure();

        let result = engine.decode(&[0i16; 100], &DecodeContext::default());
        assert!(matches!(result, Err(SottoError::DecodeFailed { .. })));
        assert!(!engine.is_ready());
    }

    #[test]
    fn test_mock_engine_transient_failures_recover() {
        let engine = MockEngine::new("test-model").with_transient_failures(2);
        let ctx = DecodeContext::default();

        assert!(engine.decode(&[0; 16], &ctx).is_err());
        assert!(engine.decode(&[0; 16], &ctx).is_err());
        assert!(engine.decode(&[0; 16], &ctx).is_ok());
    }

    #[test]
    fn test_mock_engine_records_calls() {
        let engine = MockEngine::new("test-model");
        let shared = engine.clone();

        let ctx = DecodeContext {
            language: Some("en".to_string()),
            prior_text: Some("prior".to_string()),
        };
        engine.decode(&[0i16; 320], &ctx).unwrap();

        // The clone sees the same log.
        assert_eq!(shared.call_count(), 1);
        let calls = shared.calls();
        assert_eq!(calls[0].samples, 320);
        assert_eq!(calls[0].language.as_deref(), Some("en"));
        assert_eq!(calls[0].prior_text.as_deref(), Some("prior"));
    }

    #[test]
    fn test_language_table_has_auto_and_english() {
        assert!(LANGUAGES.contains(&"auto"));
        assert!(LANGUAGES.contains(&"en"));
        assert!(LANGUAGES.len() > 90);
    }

    #[test]
    fn test_engine_trait_is_object_safe() {
        let engine: Arc<dyn SpeechEngine> =
            Arc::new(MockEngine::new("boxed").with_response("boxed test"));

        assert_eq!(engine.model_name(), "boxed");
        assert!(engine.is_ready());
        let output = engine.decode(&[0i16; 16], &DecodeContext::default()).unwrap();
        assert_eq!(output.text, "boxed test");
    }
}
