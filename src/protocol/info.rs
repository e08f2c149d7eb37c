//! Describe/Info metadata structures.
//!
//! The Info reply tells the client which transcription programs and models
//! this server exposes. Home Assistant uses it both for discovery and as a
//! liveness probe.

use serde::{Deserialize, Serialize};

/// Top-level payload of an Info event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoData {
    /// Speech-to-text programs served by this process.
    pub asr: Vec<AsrProgram>,
}

/// One speech-to-text program (engine backend).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsrProgram {
    pub name: String,
    pub description: String,
    pub attribution: Attribution,
    pub installed: bool,
    pub version: String,
    pub models: Vec<AsrModel>,
}

/// One model a program can serve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsrModel {
    pub name: String,
    pub description: String,
    pub attribution: Attribution,
    pub installed: bool,
    pub languages: Vec<String>,
    pub version: String,
}

/// Upstream credit for a program or model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribution {
    pub name: String,
    pub url: String,
}

impl InfoData {
    /// Build the Info payload for a single active engine.
    pub fn for_engine(model_name: &str, languages: Vec<String>) -> Self {
        Self {
            asr: vec![AsrProgram {
                name: "sotto".to_string(),
                description: "Streaming Whisper transcription".to_string(),
                attribution: Attribution {
                    name: "Georgi Gerganov".to_string(),
                    url: "https://github.com/ggerganov/whisper.cpp".to_string(),
                },
                installed: true,
                version: env!("CARGO_PKG_VERSION").to_string(),
                models: vec![AsrModel {
                    name: model_name.to_string(),
                    description: model_name.to_string(),
                    attribution: Attribution {
                        name: "OpenAI".to_string(),
                        url: "https://huggingface.co/ggerganov/whisper.cpp".to_string(),
                    },
                    installed: true,
                    languages,
                    version: env!("CARGO_PKG_VERSION").to_string(),
                }],
            }],
        }
    }

    /// Name of the first advertised model, if any.
    pub fn active_model(&self) -> Option<&str> {
        self.asr
            .first()
            .and_then(|p| p.models.first())
            .map(|m| m.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_engine_carries_model_and_languages() {
        let info = InfoData::for_engine("base.en", vec!["en".to_string()]);

        assert_eq!(info.asr.len(), 1);
        assert_eq!(info.asr[0].models.len(), 1);
        assert_eq!(info.asr[0].models[0].name, "base.en");
        assert_eq!(info.asr[0].models[0].languages, vec!["en".to_string()]);
        assert_eq!(info.active_model(), Some("base.en"));
    }

    #[test]
    fn test_info_json_roundtrip() {
        let info = InfoData::for_engine("small", vec!["en".to_string(), "de".to_string()]);
        let json = serde_json::to_string(&info).unwrap();
        let back: InfoData = serde_json::from_str(&json).unwrap();
        assert_eq!(info, back);
    }

    #[test]
    fn test_active_model_empty() {
        let info = InfoData { asr: vec![] };
        assert_eq!(info.active_model(), None);
    }
}
