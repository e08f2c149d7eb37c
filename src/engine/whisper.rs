//! Whisper-based speech engine.
//!
//! Implements `SpeechEngine` with whisper-rs. Requires the `whisper`
//! feature (and cmake to build); without it a stub with the same surface
//! compiles, reports `is_ready() == false`, and the server refuses to
//! start.
//!
//! ```bash
//! cargo build --release --features whisper        # CPU
//! cargo build --release --features cuda           # NVIDIA GPU
//! ```

use crate::defaults;
#[cfg(feature = "whisper")]
use crate::engine::LANGUAGES;
use crate::engine::{DecodeContext, DecodeOutput, EngineCapabilities, SpeechEngine};
use crate::error::{Result, SottoError};
use std::path::PathBuf;
use std::str::FromStr;

#[cfg(feature = "whisper")]
use std::sync::{Mutex, Once};
#[cfg(feature = "whisper")]
use whisper_rs::{
    FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters, install_logging_hooks,
};

#[cfg(feature = "whisper")]
static LOGGING_HOOKS_INSTALLED: Once = Once::new();

/// Inference device, selected once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
    #[default]
    Cpu,
    Cuda,
}

impl Device {
    /// Whether this device offloads inference to a GPU.
    pub fn is_gpu(self) -> bool {
        matches!(self, Device::Cuda)
    }
}

impl FromStr for Device {
    type Err = SottoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(Device::Cpu),
            "cuda" | "gpu" => Ok(Device::Cuda),
            // "auto" picks the GPU when one was compiled in.
            "auto" => {
                if cfg!(any(
                    feature = "cuda",
                    feature = "vulkan",
                    feature = "hipblas"
                )) {
                    Ok(Device::Cuda)
                } else {
                    Ok(Device::Cpu)
                }
            }
            other => Err(SottoError::ConfigInvalidValue {
                key: "engine.device".to_string(),
                message: format!("unknown device '{other}' (expected cpu, cuda, or auto)"),
            }),
        }
    }
}

/// Configuration for the Whisper engine.
#[derive(Debug, Clone)]
pub struct WhisperEngineConfig {
    /// Path to the ggml model file.
    pub model_path: PathBuf,
    /// Inference device.
    pub device: Device,
    /// Compute precision label, passed through from the CLI. ggml model
    /// files carry their own quantization, so this backend only records it.
    pub compute_type: String,
    /// Default language code ("auto" for detection).
    pub language: String,
    /// Beam size for decoding; 1 falls back to greedy sampling.
    pub beam_size: usize,
    /// Optional prompt prefix for the first window.
    pub initial_prompt: Option<String>,
    /// Inference threads (None = library default).
    pub threads: Option<usize>,
}

impl Default for WhisperEngineConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/ggml-base.bin"),
            device: Device::Cpu,
            compute_type: "default".to_string(),
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            beam_size: defaults::DEFAULT_BEAM_SIZE,
            initial_prompt: None,
            threads: None,
        }
    }
}

/// Whisper implementation of `SpeechEngine`.
///
/// The context is wrapped in a Mutex; per-call decode state is created
/// fresh so concurrent pool calls cannot corrupt each other.
#[cfg(feature = "whisper")]
pub struct WhisperEngine {
    context: Mutex<WhisperContext>,
    config: WhisperEngineConfig,
    model_name: String,
}

#[cfg(feature = "whisper")]
impl std::fmt::Debug for WhisperEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperEngine")
            .field("config", &self.config)
            .field("model_name", &self.model_name)
            .field("context", &"<WhisperContext>")
            .finish()
    }
}

/// Stub engine compiled without the `whisper` feature.
#[cfg(not(feature = "whisper"))]
#[derive(Debug)]
pub struct WhisperEngine {
    config: WhisperEngineConfig,
    model_name: String,
}

/// Extract the model name from the model file path.
fn model_name_from_path(path: &std::path::Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string()
}

/// Convert i16 audio samples to f32 normalized to [-1.0, 1.0].
///
/// Whisper expects f32 in that range; the wire carries 16-bit PCM.
pub fn convert_audio(samples: &[i16]) -> Vec<f32> {
    samples
        .iter()
        .map(|&sample| sample as f32 / 32768.0)
        .collect()
}

#[cfg(feature = "whisper")]
impl WhisperEngine {
    /// Load the model and prepare the engine.
    ///
    /// # Errors
    /// `EngineUnavailable` if the model file does not exist or fails to
    /// load. Startup treats this as fatal — the server never begins
    /// accepting connections without a working engine.
    pub fn new(config: WhisperEngineConfig) -> Result<Self> {
        // Install logging hooks to suppress whisper.cpp output (only once)
        LOGGING_HOOKS_INSTALLED.call_once(|| {
            install_logging_hooks();
        });

        if !config.model_path.exists() {
            return Err(SottoError::EngineUnavailable {
                message: format!("model not found at {}", config.model_path.display()),
            });
        }

        let model_name = model_name_from_path(&config.model_path);

        let mut context_params = WhisperContextParameters::default();
        context_params.use_gpu(config.device.is_gpu());
        // Fused attention kernels avoid the standalone softmax CUDA kernel,
        // which crashes on Blackwell GPUs with older ggml.
        context_params.flash_attn(true);

        let path = config
            .model_path
            .to_str()
            .ok_or_else(|| SottoError::EngineUnavailable {
                message: "invalid UTF-8 in model path".to_string(),
            })?;
        let context = WhisperContext::new_with_params(path, context_params).map_err(|e| {
            SottoError::EngineUnavailable {
                message: format!("failed to load model: {e}"),
            }
        })?;

        Ok(Self {
            context: Mutex::new(context),
            config,
            model_name,
        })
    }

    pub fn config(&self) -> &WhisperEngineConfig {
        &self.config
    }

    /// Effective language for one decode call: the session hint wins over
    /// the configured default; "auto" maps to detection.
    fn effective_language<'a>(&'a self, ctx: &'a DecodeContext) -> Option<&'a str> {
        let lang = ctx.language.as_deref().unwrap_or(&self.config.language);
        if lang == defaults::AUTO_LANGUAGE {
            None
        } else {
            Some(lang)
        }
    }

    /// Prompt for this window: configured initial prompt plus the session's
    /// prior transcript tail, for word continuity across windows.
    fn window_prompt(&self, ctx: &DecodeContext) -> Option<String> {
        match (&self.config.initial_prompt, &ctx.prior_text) {
            (None, None) => None,
            (Some(p), None) => Some(p.clone()),
            (None, Some(t)) => Some(t.clone()),
            (Some(p), Some(t)) => Some(format!("{p} {t}")),
        }
    }
}

#[cfg(not(feature = "whisper"))]
impl WhisperEngine {
    /// Create the stub engine. Only validates that the model file exists.
    pub fn new(config: WhisperEngineConfig) -> Result<Self> {
        if !config.model_path.exists() {
            return Err(SottoError::EngineUnavailable {
                message: format!("model not found at {}", config.model_path.display()),
            });
        }
        let model_name = model_name_from_path(&config.model_path);
        Ok(Self { config, model_name })
    }

    pub fn config(&self) -> &WhisperEngineConfig {
        &self.config
    }
}

#[cfg(feature = "whisper")]
impl SpeechEngine for WhisperEngine {
    fn decode(&self, window: &[i16], ctx: &DecodeContext) -> Result<DecodeOutput> {
        let audio_f32 = convert_audio(window);
        let audio_ms = (window.len() as u64 * 1000 / defaults::SAMPLE_RATE as u64) as u32;

        let context = self
            .context
            .lock()
            .map_err(|e| SottoError::DecodeFailed {
                message: format!("failed to acquire context lock: {e}"),
            })?;

        // Fresh state per call keeps concurrent pool calls independent.
        let mut state = context.create_state().map_err(|e| SottoError::DecodeFailed {
            message: format!("failed to create decode state: {e}"),
        })?;

        let mut params = if self.config.beam_size > 1 {
            FullParams::new(SamplingStrategy::BeamSearch {
                beam_size: self.config.beam_size as i32,
                patience: -1.0,
            })
        } else {
            FullParams::new(SamplingStrategy::Greedy { best_of: 1 })
        };

        params.set_language(self.effective_language(ctx));
        if let Some(threads) = self.config.threads {
            params.set_n_threads(threads as i32);
        }

        let prompt = self.window_prompt(ctx);
        if let Some(prompt) = prompt.as_deref() {
            params.set_initial_prompt(prompt);
        }

        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        state
            .full(params, &audio_f32)
            .map_err(|e| SottoError::DecodeFailed {
                message: format!("inference failed: {e}"),
            })?;

        let lang_id = state.full_lang_id_from_state();
        let language = whisper_rs::get_lang_str(lang_id).unwrap_or("").to_string();

        let mut text = String::new();
        let mut confidence_sum = 0.0_f32;
        let mut segment_count = 0u32;
        for segment in state.as_iter() {
            text.push_str(&segment.to_string());
            confidence_sum += 1.0 - segment.no_speech_probability();
            segment_count += 1;
        }

        let confidence = if segment_count > 0 {
            (confidence_sum / segment_count as f32).clamp(0.0, 1.0)
        } else {
            0.0
        };

        Ok(DecodeOutput {
            text: text.trim().to_string(),
            language,
            confidence,
            audio_ms,
        })
    }

    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities {
            gpu: self.config.device.is_gpu(),
            streaming: true,
            languages: LANGUAGES.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn is_ready(&self) -> bool {
        true
    }
}

#[cfg(not(feature = "whisper"))]
impl SpeechEngine for WhisperEngine {
    fn decode(&self, _window: &[i16], _ctx: &DecodeContext) -> Result<DecodeOutput> {
        Err(SottoError::EngineUnavailable {
            message: concat!(
                "built without the whisper feature; ",
                "rebuild with: cargo build --release --features whisper"
            )
            .to_string(),
        })
    }

    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities {
            gpu: false,
            streaming: false,
            languages: vec![],
        }
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn is_ready(&self) -> bool {
        false
    }
}
