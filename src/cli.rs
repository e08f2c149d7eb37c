//! Command-line interface for sotto
//!
//! Provides argument parsing using clap derive macros. Every engine flag
//! is passed through unchanged to the engine configuration.

use crate::config::Config;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Streaming speech-to-text event server
#[derive(Parser, Debug)]
#[command(name = "sotto", version, about = "Streaming speech-to-text event server")]
pub struct Cli {
    /// Subcommand to execute (default: serve)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the event server
    Serve(ServeArgs),

    /// Stream a WAV file to a running server and print the transcript
    Transcribe {
        /// WAV file to transcribe
        #[arg(value_name = "FILE")]
        wav: PathBuf,

        /// Server URI (default: from config)
        #[arg(long, value_name = "URI")]
        uri: Option<String>,

        /// Language hint sent with the request
        #[arg(long, value_name = "LANG")]
        language: Option<String>,
    },

    /// Check that a running server answers a describe request
    Probe {
        /// Server URI (default: from config)
        #[arg(long, value_name = "URI")]
        uri: Option<String>,

        /// Give up after this long. Examples: 5s, 500ms
        #[arg(long, value_name = "DURATION", default_value = "5s", value_parser = parse_duration_arg)]
        timeout: Duration,
    },
}

/// Server flags; each one overrides its configuration-file counterpart.
#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Bind URI (tcp://host:port or unix://path)
    #[arg(long, value_name = "URI")]
    pub uri: Option<String>,

    /// Whisper model name (e.g. base, small.en) or path to a ggml file
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Directory to load models from
    #[arg(long, value_name = "DIR")]
    pub model_dir: Option<PathBuf>,

    /// Additional data directory to check for models (repeatable)
    #[arg(long = "data-dir", value_name = "DIR")]
    pub data_dirs: Vec<PathBuf>,

    /// Inference device (cpu, cuda, auto)
    #[arg(long, value_name = "DEVICE")]
    pub device: Option<String>,

    /// Compute precision label, passed through to the engine
    #[arg(long, value_name = "TYPE")]
    pub compute_type: Option<String>,

    /// Default language for transcription. Examples: auto, en, de, es
    #[arg(long, value_name = "LANG")]
    pub language: Option<String>,

    /// Size of beam during decoding
    #[arg(long, value_name = "N")]
    pub beam_size: Option<usize>,

    /// Optional text to provide as a prompt for the first window
    #[arg(long, value_name = "TEXT")]
    pub initial_prompt: Option<String>,

    /// Maximum concurrent sessions
    #[arg(long, value_name = "N")]
    pub max_sessions: Option<usize>,
}

impl ServeArgs {
    /// Fold these flags over a loaded configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(uri) = &self.uri {
            config.server.uri = uri.clone();
        }
        if let Some(model) = &self.model {
            config.engine.model = model.clone();
        }
        if let Some(dir) = &self.model_dir {
            config.engine.model_dir = Some(dir.clone());
        }
        if !self.data_dirs.is_empty() {
            config.engine.data_dirs = self.data_dirs.clone();
        }
        if let Some(device) = &self.device {
            config.engine.device = device.clone();
        }
        if let Some(compute_type) = &self.compute_type {
            config.engine.compute_type = compute_type.clone();
        }
        if let Some(language) = &self.language {
            config.engine.language = language.clone();
        }
        if let Some(beam_size) = self.beam_size {
            config.engine.beam_size = beam_size;
        }
        if let Some(prompt) = &self.initial_prompt {
            config.engine.initial_prompt = Some(prompt.clone());
        }
        if let Some(max_sessions) = self.max_sessions {
            config.server.max_sessions = max_sessions;
        }
    }
}

/// Parse a duration argument.
///
/// Supports any format accepted by `humantime` (`5s`, `500ms`, `1m30s`)
/// plus bare numbers, which are taken as seconds.
fn parse_duration_arg(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}
