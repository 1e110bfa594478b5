use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{check_status, model_endpoint, CompletionService, DEFAULT_API_BASE, DEFAULT_CHAT_MODEL};
use crate::attachment::ImagePayload;
use crate::error::ServiceError;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    system_instruction: SystemInstruction,
    contents: Vec<Content>,
}

#[derive(Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    InlineData { inline_data: InlineData },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Gemini `generateContent` client for text and text+image prompts
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    api_base: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_CHAT_MODEL.to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.to_string();
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn generate_content(&self, request: GenerateContentRequest) -> Result<String, ServiceError> {
        let url = model_endpoint(&self.api_base, &self.model, "generateContent");
        tracing::debug!(model = %self.model, "gemini generateContent");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let response = check_status("Gemini", response).await?;
        let body: GenerateContentResponse = response.json().await?;
        extract_text(body)
    }
}

#[async_trait]
impl CompletionService for GeminiClient {
    async fn complete(&self, prompt: &str, system_instruction: &str) -> Result<String, ServiceError> {
        self.generate_content(build_request(prompt, None, system_instruction))
            .await
    }

    async fn complete_with_image(
        &self,
        prompt: &str,
        image: &ImagePayload,
        system_instruction: &str,
    ) -> Result<String, ServiceError> {
        self.generate_content(build_request(prompt, Some(image), system_instruction))
            .await
    }
}

/// Text part first, then the image, as a single user turn
fn build_request(
    prompt: &str,
    image: Option<&ImagePayload>,
    system_instruction: &str,
) -> GenerateContentRequest {
    let mut parts = vec![Part::Text {
        text: prompt.to_string(),
    }];
    if let Some(image) = image {
        parts.push(Part::InlineData {
            inline_data: InlineData {
                mime_type: image.mime_type.clone(),
                data: image.base64(),
            },
        });
    }

    GenerateContentRequest {
        system_instruction: SystemInstruction {
            parts: vec![Part::Text {
                text: system_instruction.to_string(),
            }],
        },
        contents: vec![Content {
            role: "user".to_string(),
            parts,
        }],
    }
}

fn extract_text(response: GenerateContentResponse) -> Result<String, ServiceError> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    if text.is_empty() {
        return Err(ServiceError::InvalidResponse(
            "response contained no text".to_string(),
        ));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_only_request_body() {
        let request = build_request("Hello", None, "Be nice.");
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(
            body,
            json!({
                "systemInstruction": { "parts": [{ "text": "Be nice." }] },
                "contents": [{ "role": "user", "parts": [{ "text": "Hello" }] }]
            })
        );
    }

    #[test]
    fn test_image_request_body() {
        let image = ImagePayload {
            bytes: b"abc".to_vec(),
            mime_type: "image/png".to_string(),
        };
        let request = build_request("What is this?", Some(&image), "Be nice.");
        let body = serde_json::to_value(&request).unwrap();
        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0], json!({ "text": "What is this?" }));
        assert_eq!(
            parts[1],
            json!({ "inlineData": { "mimeType": "image/png", "data": "YWJj" } })
        );
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "Hi " }, { "text": "there!" }] },
                "finishReason": "STOP"
            }]
        }))
        .unwrap();
        assert_eq!(extract_text(response).unwrap(), "Hi there!");
    }

    #[test]
    fn test_extract_text_without_candidates() {
        let response: GenerateContentResponse =
            serde_json::from_value(json!({ "promptFeedback": { "blockReason": "SAFETY" } })).unwrap();
        assert!(matches!(
            extract_text(response),
            Err(ServiceError::InvalidResponse(_))
        ));
    }
}
