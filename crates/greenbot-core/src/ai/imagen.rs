use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{check_status, model_endpoint, ImageGenerationService, DEFAULT_API_BASE, DEFAULT_IMAGE_MODEL};
use crate::error::ServiceError;
use crate::generation::GeneratedImage;

const OUTPUT_MIME_TYPE: &str = "image/png";

#[derive(Serialize)]
struct PredictRequest {
    instances: Vec<Instance>,
    parameters: Parameters,
}

#[derive(Serialize)]
struct Instance {
    prompt: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Parameters {
    sample_count: u32,
    aspect_ratio: String,
    output_options: OutputOptions,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutputOptions {
    mime_type: String,
}

#[derive(Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    bytes_base64_encoded: Option<String>,
    mime_type: Option<String>,
}

/// Imagen `predict` client. One square PNG per call.
#[derive(Clone)]
pub struct ImagenClient {
    client: Client,
    api_key: String,
    api_base: String,
    model: String,
}

impl ImagenClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_IMAGE_MODEL.to_string(),
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
}

#[async_trait]
impl ImageGenerationService for ImagenClient {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, ServiceError> {
        let url = model_endpoint(&self.api_base, &self.model, "predict");
        tracing::debug!(model = %self.model, "imagen predict");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&build_request(prompt))
            .send()
            .await?;

        let response = check_status("Imagen", response).await?;
        let body: PredictResponse = response.json().await?;
        extract_image(body)
    }
}

fn build_request(prompt: &str) -> PredictRequest {
    PredictRequest {
        instances: vec![Instance {
            prompt: prompt.to_string(),
        }],
        parameters: Parameters {
            sample_count: 1,
            aspect_ratio: "1:1".to_string(),
            output_options: OutputOptions {
                mime_type: OUTPUT_MIME_TYPE.to_string(),
            },
        },
    }
}

fn extract_image(response: PredictResponse) -> Result<GeneratedImage, ServiceError> {
    let prediction = response
        .predictions
        .into_iter()
        .find(|p| p.bytes_base64_encoded.as_deref().is_some_and(|b| !b.is_empty()))
        .ok_or(ServiceError::EmptyGenerationResult)?;

    let encoded = prediction.bytes_base64_encoded.unwrap_or_default();
    let bytes = BASE64
        .decode(encoded.as_bytes())
        .map_err(|e| ServiceError::InvalidResponse(format!("image base64 decode failed: {}", e)))?;
    let mime_type = prediction
        .mime_type
        .unwrap_or_else(|| OUTPUT_MIME_TYPE.to_string());

    Ok(GeneratedImage::new(bytes, mime_type, Utc::now()))
}
