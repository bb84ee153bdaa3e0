use crate::{GenerationError, GenerationRequest, TextGenerator};

const DEFAULT_CANNED_TEXT: &str = "Por ahora no tengo una respuesta exacta para esa consulta. Te recomiendo escribir a la Oficina de Egresados o acercarte en horario de atención para recibir orientación personalizada.";

/// Offline generator used when no text-generation endpoint is configured.
#[derive(Debug, Clone)]
pub struct CannedTextGenerator {
    text: String,
}

impl CannedTextGenerator {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl Default for CannedTextGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_CANNED_TEXT)
    }
}

impl TextGenerator for CannedTextGenerator {
    fn model_name(&self) -> &str {
        "canned"
    }

    async fn generate(&self, _request: &GenerationRequest) -> Result<String, GenerationError> {
        if self.text.trim().is_empty() {
            return Err(GenerationError::EmptyOutput);
        }
        Ok(self.text.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_configured_text() {
        let generator = CannedTextGenerator::new("Escríbenos a egresados.");
        let text = generator
            .generate(&GenerationRequest::new("hola", Vec::new()))
            .await
            .expect("canned text");
        assert_eq!(text, "Escríbenos a egresados.");
    }

    #[tokio::test]
    async fn blank_text_is_empty_output() {
        let generator = CannedTextGenerator::new("   ");
        let err = generator
            .generate(&GenerationRequest::new("hola", Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::EmptyOutput));
    }
}
