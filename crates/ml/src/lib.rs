mod fallback;
mod http;

use std::env;
use std::time::Duration;

use faq_core::Speaker;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use fallback::CannedTextGenerator;
pub use http::{HttpGeneratorConfig, HttpTextGenerator};

/// Context budget for accumulated history sent to the generator.
pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 1_200;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generative fallback is disabled")]
    Disabled,
    #[error("generator request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("generator returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("generator response had no text")]
    EmptyOutput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub speaker: Speaker,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub history: Vec<HistoryTurn>,
    pub max_context_chars: usize,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, history: Vec<HistoryTurn>) -> Self {
        Self {
            prompt: prompt.into(),
            history,
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
        }
    }

    /// Newest history turns that fit the context budget, oldest first.
    pub fn bounded_history(&self) -> &[HistoryTurn] {
        let mut used = 0usize;
        let mut start = self.history.len();

        for (idx, turn) in self.history.iter().enumerate().rev() {
            used += turn.text.chars().count();
            if used > self.max_context_chars {
                break;
            }
            start = idx;
        }

        &self.history[start..]
    }

    pub fn render_prompt(&self) -> String {
        let mut rendered = String::new();
        for turn in self.bounded_history() {
            let label = match turn.speaker {
                Speaker::User => "Usuario",
                Speaker::Bot => "Asistente",
            };
            rendered.push_str(label);
            rendered.push_str(": ");
            rendered.push_str(turn.text.trim());
            rendered.push('\n');
        }
        rendered.push_str("Usuario: ");
        rendered.push_str(self.prompt.trim());
        rendered.push_str("\nAsistente:");
        rendered
    }
}

pub trait TextGenerator: Send + Sync {
    fn model_name(&self) -> &str;
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

/// Generator selected at startup for queries the catalog cannot answer.
#[derive(Debug, Clone)]
pub enum Fallback {
    Http(HttpTextGenerator),
    Canned(CannedTextGenerator),
    Disabled,
}

impl Fallback {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }

    /// `FAQ_FALLBACK_MODE` picks `http`, `canned` or `disabled`; without it an
    /// endpoint in `FAQ_FALLBACK_URL` selects `http`, otherwise `canned`.
    pub fn load_default() -> Result<Self, GenerationError> {
        let url = env::var("FAQ_FALLBACK_URL")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        let mode = env::var("FAQ_FALLBACK_MODE")
            .ok()
            .map(|value| value.trim().to_lowercase())
            .unwrap_or_else(|| {
                if url.is_some() {
                    "http".to_string()
                } else {
                    "canned".to_string()
                }
            });

        match (mode.as_str(), url) {
            ("disabled" | "off" | "none", _) => Ok(Self::Disabled),
            ("http", Some(endpoint)) => {
                let config = HttpGeneratorConfig {
                    endpoint,
                    api_token: env::var("FAQ_FALLBACK_TOKEN").ok(),
                    model: env::var("FAQ_FALLBACK_MODEL").unwrap_or_else(|_| "gpt2".to_string()),
                    max_new_tokens: env::var("FAQ_FALLBACK_MAX_NEW_TOKENS")
                        .ok()
                        .and_then(|value| value.parse::<u32>().ok())
                        .unwrap_or(120),
                    timeout: Duration::from_secs(
                        env::var("FAQ_FALLBACK_TIMEOUT_SECONDS")
                            .ok()
                            .and_then(|value| value.parse::<u64>().ok())
                            .unwrap_or(20),
                    ),
                };
                Ok(Self::Http(HttpTextGenerator::new(config)?))
            }
            ("http", None) => {
                tracing::warn!("FAQ_FALLBACK_MODE=http without FAQ_FALLBACK_URL, using canned fallback");
                Ok(Self::Canned(CannedTextGenerator::default()))
            }
            _ => Ok(Self::Canned(CannedTextGenerator::default())),
        }
    }
}

impl TextGenerator for Fallback {
    fn model_name(&self) -> &str {
        match self {
            Self::Http(generator) => generator.model_name(),
            Self::Canned(generator) => generator.model_name(),
            Self::Disabled => "disabled",
        }
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        match self {
            Self::Http(generator) => generator.generate(request).await,
            Self::Canned(generator) => generator.generate(request).await,
            Self::Disabled => Err(GenerationError::Disabled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(speaker: Speaker, text: &str) -> HistoryTurn {
        HistoryTurn {
            speaker,
            text: text.to_string(),
        }
    }

    #[test]
    fn history_is_trimmed_from_the_oldest_side() {
        let mut request = GenerationRequest::new(
            "¿y el horario?",
            vec![
                turn(Speaker::User, "aaaaaaaaaa"),
                turn(Speaker::Bot, "bbbbbbbbbb"),
                turn(Speaker::User, "cccccccccc"),
            ],
        );
        request.max_context_chars = 25;

        let kept = request.bounded_history();
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].text, "bbbbbbbbbb");
    }

    #[test]
    fn renders_labelled_prompt() {
        let request = GenerationRequest::new(
            "¿Dónde queda la oficina?",
            vec![turn(Speaker::User, "hola"), turn(Speaker::Bot, "¡Hola!")],
        );

        assert_eq!(
            request.render_prompt(),
            "Usuario: hola\nAsistente: ¡Hola!\nUsuario: ¿Dónde queda la oficina?\nAsistente:"
        );
    }

    #[tokio::test]
    async fn disabled_fallback_refuses() {
        let fallback = Fallback::Disabled;
        assert!(!fallback.is_enabled());
        let err = fallback
            .generate(&GenerationRequest::new("hola", Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Disabled));
    }
}
