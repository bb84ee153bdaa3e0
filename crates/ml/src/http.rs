use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};

use crate::{GenerationError, GenerationRequest, TextGenerator};

#[derive(Debug, Clone)]
pub struct HttpGeneratorConfig {
    pub endpoint: String,
    pub api_token: Option<String>,
    pub model: String,
    pub max_new_tokens: u32,
    pub timeout: Duration,
}

/// Client for a text-generation inference endpoint (`{"inputs", "parameters"}` request shape).
#[derive(Debug, Clone)]
pub struct HttpTextGenerator {
    config: HttpGeneratorConfig,
    client: Client,
}

impl HttpTextGenerator {
    pub fn new(config: HttpGeneratorConfig) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(6))
            .timeout(config.timeout)
            .build()?;
        Ok(Self { config, client })
    }

    fn payload(&self, request: &GenerationRequest) -> Value {
        json!({
            "model": self.config.model,
            "inputs": request.render_prompt(),
            "parameters": {
                "max_new_tokens": self.config.max_new_tokens,
                "return_full_text": false
            }
        })
    }
}

impl TextGenerator for HttpTextGenerator {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let mut builder = self
            .client
            .post(self.config.endpoint.as_str())
            .json(&self.payload(request));
        if let Some(token) = self.config.api_token.as_deref() {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response.json().await?;
        let text = extract_generated_text(&body).ok_or(GenerationError::EmptyOutput)?;
        tracing::debug!(model = %self.config.model, chars = text.chars().count(), "fallback text generated");
        Ok(text)
    }
}

/// Accepts `{"generated_text": ..}` or `[{"generated_text": ..}, ..]`.
pub(crate) fn extract_generated_text(body: &Value) -> Option<String> {
    let text = match body {
        Value::Array(items) => items.first()?.get("generated_text")?.as_str()?,
        Value::Object(map) => map.get("generated_text")?.as_str()?,
        _ => return None,
    };

    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
