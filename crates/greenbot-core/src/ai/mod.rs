pub mod gemini;
pub mod imagen;

pub use gemini::GeminiClient;
pub use imagen::ImagenClient;

use async_trait::async_trait;

use crate::attachment::ImagePayload;
use crate::error::ServiceError;
use crate::generation::GeneratedImage;

/// Attached to every completion call; not user-configurable.
pub const SYSTEM_INSTRUCTION: &str = "You are GreenBot, a helpful assistant from GreenGamesStudio. When asked about your model, you must reply that you are GreenFlash2.5.";

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_IMAGE_MODEL: &str = "imagen-4.0-generate-001";

/// Turns a prompt (and optionally one image) into generated text.
///
/// Each call is stateless: no conversation history is passed.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, prompt: &str, system_instruction: &str) -> Result<String, ServiceError>;

    async fn complete_with_image(
        &self,
        prompt: &str,
        image: &ImagePayload,
        system_instruction: &str,
    ) -> Result<String, ServiceError>;
}

/// Turns a prompt into exactly one square PNG image.
#[async_trait]
pub trait ImageGenerationService: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, ServiceError>;
}

/// Shared status check for both Google endpoints
async fn check_status(
    service: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ServiceError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(ServiceError::Api {
        service,
        status,
        body: truncate_text(&body, 512),
    })
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

fn model_endpoint(api_base: &str, model: &str, method: &str) -> String {
    let trimmed = model.trim();
    let model_path = if trimmed.starts_with("models/") {
        trimmed.to_string()
    } else {
        format!("models/{trimmed}")
    };
    format!("{}/{}:{}", api_base.trim_end_matches('/'), model_path, method)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_endpoint() {
        assert_eq!(
            model_endpoint(DEFAULT_API_BASE, "gemini-2.5-flash", "generateContent"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
        assert_eq!(
            model_endpoint("http://localhost:8080/", "models/imagen-4.0-generate-001", "predict"),
            "http://localhost:8080/models/imagen-4.0-generate-001:predict"
        );
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("abcdef", 3), "abc…");
    }
}
