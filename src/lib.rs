//! sotto - Streaming speech-to-text event server
//!
//! Speaks a line-delimited JSON-header + binary-payload event protocol
//! over TCP or Unix sockets, feeding live PCM audio through a shared
//! Whisper engine and answering with partial and final transcripts.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod cli;
pub mod client;
pub mod config;
pub mod defaults;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod server;
pub mod session;
pub mod text;

// Core traits and handles
pub use engine::{DecodeContext, DecodeOutput, EngineCapabilities, EnginePool, SpeechEngine};
pub use server::{BindUri, OverflowPolicy, Server, ServerConfig};
pub use session::{Session, SessionConfig, SessionState};

// Wire protocol
pub use protocol::{Event, InfoData};

// Error handling
pub use error::{Result, SottoError};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
