//! Default configuration constants for sotto.
//!
//! Shared constants used across configuration types to keep the server,
//! the engine, and the tests agreed on one set of numbers.

/// Audio sample rate in Hz expected on the wire.
///
/// 16kHz is the standard for speech recognition; the session rejects any
/// other negotiated rate.
pub const SAMPLE_RATE: u32 = 16000;

/// Sample width in bytes (16-bit signed little-endian PCM).
pub const SAMPLE_WIDTH: u16 = 2;

/// Channel count expected on the wire (mono).
pub const CHANNELS: u16 = 1;

/// Default bind URI for the event server.
///
/// Port 10300 is the conventional port for speech-to-text services in the
/// Home Assistant ecosystem.
pub const DEFAULT_URI: &str = "tcp://0.0.0.0:10300";

/// Default decode window duration in milliseconds.
///
/// Buffered audio is handed to the engine once this much has accumulated.
/// Smaller windows give faster partials at the cost of more engine calls.
pub const WINDOW_MS: u32 = 1000;

/// Default per-call decode timeout in milliseconds.
///
/// A decode exceeding this is reported to the session as a failed decode;
/// the engine slot is released only when the underlying call returns.
pub const DECODE_TIMEOUT_MS: u64 = 30_000;

/// Default maximum number of concurrent sessions.
pub const MAX_SESSIONS: usize = 8;

/// Default wait before an overflow connection is rejected under the
/// `queue` policy, in milliseconds.
pub const QUEUE_WAIT_MS: u64 = 5_000;

/// Default number of decode calls the shared engine accepts at once.
///
/// Further calls wait at the pool, which backpressures their sessions.
pub const MAX_DECODE_CONCURRENCY: usize = 2;

/// Default Whisper model name.
///
/// "base" (multilingual) supports auto-detection of any language.
/// Use "base.en" explicitly for English-only optimized transcription.
pub const DEFAULT_MODEL: &str = "base";

/// Default language code for transcription.
///
/// "auto" lets the engine detect the spoken language. A Transcribe event
/// carrying a language overrides this per session.
pub const DEFAULT_LANGUAGE: &str = "auto";

/// Language value that triggers automatic language detection.
pub const AUTO_LANGUAGE: &str = "auto";

/// Default beam size for decoding.
pub const DEFAULT_BEAM_SIZE: usize = 5;

/// Maximum number of trailing transcript characters fed back to the engine
/// as context for the next window.
pub const CONTEXT_CHARS: usize = 224;

/// Maximum accepted event header line length in bytes.
///
/// A longer line without a newline means the peer is not speaking the
/// protocol; the connection is closed rather than buffering forever.
pub const MAX_HEADER_BYTES: usize = 64 * 1024;

/// Maximum accepted event payload length in bytes.
///
/// Ten seconds of 16kHz 16-bit mono is 320kB; anything past 8MiB is a
/// malformed header, not audio.
pub const MAX_PAYLOAD_BYTES: usize = 8 * 1024 * 1024;

/// Report the GPU backend compiled into this build.
///
/// Returns a human-readable name based on the compile-time feature flags.
/// Only one GPU backend can be active at a time; if none is enabled,
/// returns "CPU".
pub fn gpu_backend() -> &'static str {
    if cfg!(feature = "cuda") {
        "CUDA"
    } else if cfg!(feature = "vulkan") {
        "Vulkan"
    } else if cfg!(feature = "hipblas") {
        "HipBLAS (AMD)"
    } else if cfg!(feature = "openblas") {
        "OpenBLAS"
    } else {
        "CPU"
    }
}
