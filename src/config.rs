//! Configuration: TOML file, environment overrides, CLI precedence.

use crate::defaults;
use crate::engine::pool::PoolConfig;
use crate::engine::whisper::{Device, WhisperEngineConfig};
use crate::server::{OverflowPolicy, ServerConfig};
use crate::session::SessionConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerSection,
    pub engine: EngineSection,
}

/// Event server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerSection {
    pub uri: String,
    pub max_sessions: usize,
    pub overflow: OverflowPolicy,
    pub queue_wait_ms: u64,
    pub window_ms: u32,
    pub decode_timeout_ms: u64,
    pub max_decode_concurrency: usize,
}

/// Transcription engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSection {
    /// Model name (e.g. "base.en") or a direct path to a ggml file.
    pub model: String,
    /// Directory where model files live.
    pub model_dir: Option<PathBuf>,
    /// Additional directories searched for model files.
    pub data_dirs: Vec<PathBuf>,
    pub device: String,
    pub compute_type: String,
    pub language: String,
    pub beam_size: usize,
    pub initial_prompt: Option<String>,
    pub threads: Option<usize>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            uri: defaults::DEFAULT_URI.to_string(),
            max_sessions: defaults::MAX_SESSIONS,
            overflow: OverflowPolicy::default(),
            queue_wait_ms: defaults::QUEUE_WAIT_MS,
            window_ms: defaults::WINDOW_MS,
            decode_timeout_ms: defaults::DECODE_TIMEOUT_MS,
            max_decode_concurrency: defaults::MAX_DECODE_CONCURRENCY,
        }
    }
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            model: defaults::DEFAULT_MODEL.to_string(),
            model_dir: None,
            data_dirs: Vec::new(),
            device: "cpu".to_string(),
            compute_type: "default".to_string(),
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            beam_size: defaults::DEFAULT_BEAM_SIZE,
            initial_prompt: None,
            threads: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e) => {
                if e.downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false)
                {
                    Ok(Self::default())
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - SOTTO_URI → server.uri
    /// - SOTTO_MODEL → engine.model
    /// - SOTTO_LANGUAGE → engine.language
    /// - SOTTO_DEVICE → engine.device
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(uri) = std::env::var("SOTTO_URI")
            && !uri.is_empty()
        {
            self.server.uri = uri;
        }

        if let Ok(model) = std::env::var("SOTTO_MODEL")
            && !model.is_empty()
        {
            self.engine.model = model;
        }

        if let Ok(language) = std::env::var("SOTTO_LANGUAGE")
            && !language.is_empty()
        {
            self.engine.language = language;
        }

        if let Ok(device) = std::env::var("SOTTO_DEVICE")
            && !device.is_empty()
        {
            self.engine.device = device;
        }

        self
    }

    /// Reject configurations that cannot work.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.server.max_sessions == 0 {
            return Err(crate::error::SottoError::ConfigInvalidValue {
                key: "server.max_sessions".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.server.window_ms == 0 {
            return Err(crate::error::SottoError::ConfigInvalidValue {
                key: "server.window_ms".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.engine.beam_size == 0 {
            return Err(crate::error::SottoError::ConfigInvalidValue {
                key: "engine.beam_size".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        self.server.uri.parse::<crate::server::BindUri>()?;
        self.engine.device.parse::<Device>()?;
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/sotto/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sotto")
            .join("config.toml")
    }

    /// Resolve the model name to a file path.
    ///
    /// A name containing a path separator or ending in `.bin` is used
    /// verbatim. Otherwise `ggml-<name>.bin` is searched in the model
    /// directory and every data directory; when nothing exists yet the
    /// model-directory path is returned so the engine can report it.
    pub fn model_path(&self) -> PathBuf {
        let model = &self.engine.model;
        if model.contains('/') || model.ends_with(".bin") {
            return PathBuf::from(model);
        }

        let filename = format!("ggml-{model}.bin");
        let model_dir = self
            .engine
            .model_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("models"));

        let mut candidates = vec![model_dir.join(&filename)];
        for dir in &self.engine.data_dirs {
            candidates.push(dir.join(&filename));
        }

        for candidate in &candidates {
            if candidate.exists() {
                return candidate.clone();
            }
        }
        candidates.remove(0)
    }

    /// Dispatcher configuration derived from this file.
    pub fn server_config(&self) -> ServerConfig {
        let default_language = if self.engine.language == defaults::AUTO_LANGUAGE {
            None
        } else {
            Some(self.engine.language.clone())
        };

        ServerConfig {
            uri: self.server.uri.clone(),
            max_sessions: self.server.max_sessions,
            overflow: self.server.overflow,
            queue_wait: Duration::from_millis(self.server.queue_wait_ms),
            session: SessionConfig {
                window_ms: self.server.window_ms,
                default_language,
            },
        }
    }

    /// Decode pool configuration derived from this file.
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_concurrent: self.server.max_decode_concurrency,
            timeout: Duration::from_millis(self.server.decode_timeout_ms),
        }
    }

    /// Engine configuration derived from this file.
    pub fn engine_config(&self) -> crate::error::Result<WhisperEngineConfig> {
        Ok(WhisperEngineConfig {
            model_path: self.model_path(),
            device: self.engine.device.parse()?,
            compute_type: self.engine.compute_type.clone(),
            language: self.engine.language.clone(),
            beam_size: self.engine.beam_size,
            initial_prompt: self.engine.initial_prompt.clone(),
            threads: self.engine.threads,
        })
    }
}
